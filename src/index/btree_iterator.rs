use std::sync::Arc;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{RecordId, Result, INVALID_PAGE_ID};

use super::btree_page::LeafNodeRef;

/// Forward iterator over a B+tree's leaf chain.
///
/// The iterator keeps its current leaf pinned through the read guard it
/// owns; crossing a leaf boundary swaps the guard for the successor's,
/// and dropping the iterator (or running off the rightmost leaf) unpins
/// whatever it held. It takes no tree latch, so the tree must not be
/// mutated while an iterator is live.
pub struct BTreeIterator {
    bpm: Arc<BufferPoolManager>,
    /// Pinned current leaf; None once exhausted
    leaf: Option<ReadPageGuard>,
    /// Position of the next entry within the current leaf
    index: usize,
}

impl BTreeIterator {
    pub(crate) fn new(bpm: Arc<BufferPoolManager>, leaf: ReadPageGuard, index: usize) -> Self {
        Self {
            bpm,
            leaf: Some(leaf),
            index,
        }
    }

    pub(crate) fn exhausted(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            leaf: None,
            index: 0,
        }
    }

    /// Yields the next entry in key order, hopping to the sibling leaf
    /// when the current one is used up.
    pub fn next_entry(&mut self) -> Result<Option<(u32, RecordId)>> {
        loop {
            let Some(guard) = self.leaf.as_ref() else {
                return Ok(None);
            };

            let leaf = LeafNodeRef::new(guard.data());
            if self.index < leaf.size() {
                let entry = (leaf.key_at(self.index), leaf.rid_at(self.index));
                self.index += 1;
                return Ok(Some(entry));
            }

            let next = leaf.next_page_id();
            // Unpin the exhausted leaf before pinning its successor
            self.leaf = None;
            if next == INVALID_PAGE_ID {
                return Ok(None);
            }
            self.leaf = Some(self.bpm.checked_read_page(next)?);
            self.index = 0;
        }
    }
}

impl Iterator for BTreeIterator {
    type Item = Result<(u32, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
