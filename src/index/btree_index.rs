use std::sync::Arc;

use parking_lot::Mutex;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{
    PageId, RecordId, Result, StratumError, HEADER_PAGE_ID, INVALID_PAGE_ID,
};

use super::btree_page::{
    node_kind, InternalNode, InternalNodeRef, LeafNode, LeafNodeRef, NodeKind,
};
use super::btree_iterator::BTreeIterator;
use super::header_page::{HeaderPage, HeaderPageRef};

/// A persistent B+tree mapping unique u32 keys to record ids. Nodes live
/// in buffer-pool pages; parent/child links are page ids, never pointers.
///
/// A single tree-wide latch serializes all operations and is taken before
/// any buffer-pool call. Iterators do not hold the latch; mutating the
/// tree while an iterator is live is unsupported.
pub struct BTreeIndex {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    leaf_max_size: usize,
    internal_max_size: usize,
    /// Tree latch; also guards the root pointer. INVALID when empty.
    root: Mutex<PageId>,
}

impl BTreeIndex {
    /// Creates an empty tree. The `(name, root)` record lands in the
    /// header page once the first insert materializes a root.
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        Self::ensure_header_page(&bpm)?;
        Ok(Self {
            index_name: name.into(),
            bpm,
            leaf_max_size,
            internal_max_size,
            root: Mutex::new(INVALID_PAGE_ID),
        })
    }

    /// Reopens a tree whose root is registered in the header page.
    pub fn open(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let name = name.into();
        Self::ensure_header_page(&bpm)?;
        let root = {
            let guard = bpm.checked_read_page(HEADER_PAGE_ID)?;
            HeaderPageRef::new(guard.data())
                .get_root_id(&name)
                .ok_or_else(|| StratumError::IndexNotFound(name.clone()))?
        };
        Ok(Self {
            index_name: name,
            bpm,
            leaf_max_size,
            internal_max_size,
            root: Mutex::new(root),
        })
    }

    /// Materializes page 0 on a fresh database file. A zeroed page is a
    /// valid empty header.
    fn ensure_header_page(bpm: &BufferPoolManager) -> Result<()> {
        if bpm.disk_manager().num_pages() == 0 {
            let guard = bpm.new_page()?;
            assert_eq!(
                guard.page_id(),
                HEADER_PAGE_ID,
                "header page must be the first allocation"
            );
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root.lock()
    }

    pub fn is_empty(&self) -> bool {
        *self.root.lock() == INVALID_PAGE_ID
    }

    fn leaf_min_size(&self) -> usize {
        self.leaf_max_size / 2
    }

    fn internal_min_size(&self) -> usize {
        (self.internal_max_size + 1) / 2
    }

    /// Point query.
    pub fn get(&self, key: u32) -> Result<Option<RecordId>> {
        let root = self.root.lock();
        if *root == INVALID_PAGE_ID {
            return Ok(None);
        }
        let leaf_id = self.find_leaf(*root, key)?;
        let guard = self.bpm.checked_read_page(leaf_id)?;
        Ok(LeafNodeRef::new(guard.data()).find(key))
    }

    /// Inserts if absent; returns false on a duplicate key.
    pub fn insert(&self, key: u32, rid: RecordId) -> Result<bool> {
        let mut root = self.root.lock();

        if *root == INVALID_PAGE_ID {
            let mut guard = self.bpm.new_page()?;
            let page_id = guard.page_id();
            let mut leaf =
                LeafNode::init(guard.data_mut(), page_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.push_key(key, rid);
            drop(guard);
            *root = page_id;
            self.update_root_record(page_id, true)?;
            return Ok(true);
        }

        let leaf_id = self.find_leaf(*root, key)?;
        let mut guard = self.bpm.checked_write_page(leaf_id)?;

        let split = {
            let mut leaf = LeafNode::new(guard.data_mut());
            if !leaf.push_key(key, rid) {
                return Ok(false);
            }
            if leaf.size() < leaf.max_size() {
                None
            } else {
                let parent_id = leaf.parent_page_id();
                let next_id = leaf.next_page_id();
                let mid = leaf.size() / 2;
                let tail = leaf.split_off(mid);
                Some((parent_id, next_id, tail))
            }
        };

        if let Some((parent_id, next_id, tail)) = split {
            let mut right_guard = self.bpm.new_page()?;
            let right_id = right_guard.page_id();
            let separator = tail[0].0;
            {
                let mut right = LeafNode::init(
                    right_guard.data_mut(),
                    right_id,
                    parent_id,
                    self.leaf_max_size,
                );
                right.extend(&tail);
                right.set_next_page_id(next_id);
            }
            drop(right_guard);

            LeafNode::new(guard.data_mut()).set_next_page_id(right_id);
            drop(guard);

            self.insert_in_parent(&mut root, leaf_id, right_id, separator, parent_id)?;
        }

        Ok(true)
    }

    /// Hooks `right` into `left`'s parent after a split, growing a new
    /// root when `left` was the root and splitting the parent when it
    /// overflows.
    fn insert_in_parent(
        &self,
        root: &mut PageId,
        left_id: PageId,
        right_id: PageId,
        separator: u32,
        parent_id: PageId,
    ) -> Result<()> {
        if parent_id == INVALID_PAGE_ID {
            let mut guard = self.bpm.new_page()?;
            let new_root_id = guard.page_id();
            {
                let mut node = InternalNode::init(
                    guard.data_mut(),
                    new_root_id,
                    INVALID_PAGE_ID,
                    self.internal_max_size,
                );
                node.populate_root(left_id, separator, right_id);
            }
            drop(guard);

            self.set_parent(left_id, new_root_id)?;
            self.set_parent(right_id, new_root_id)?;
            *root = new_root_id;
            self.update_root_record(new_root_id, false)?;
            return Ok(());
        }

        let mut guard = self.bpm.checked_write_page(parent_id)?;
        let split = {
            let mut node = InternalNode::new(guard.data_mut());
            let vi = node.child_index_of(left_id).ok_or_else(|| {
                StratumError::IndexCorrupted(format!("{left_id} missing from parent {parent_id}"))
            })?;
            node.insert_slot_at(vi + 1, separator, right_id);
            if node.size() <= node.max_size() {
                None
            } else {
                let grand_id = node.parent_page_id();
                let mid = node.size() / 2;
                let (promoted, tail) = node.split_off(mid);
                Some((grand_id, promoted, tail))
            }
        };
        drop(guard);

        if let Some((grand_id, promoted, tail)) = split {
            let mut right_guard = self.bpm.new_page()?;
            let new_internal_id = right_guard.page_id();
            {
                let mut right = InternalNode::init(
                    right_guard.data_mut(),
                    new_internal_id,
                    grand_id,
                    self.internal_max_size,
                );
                right.extend_slots(&tail);
            }
            drop(right_guard);

            for &(_, child) in &tail {
                self.set_parent(child, new_internal_id)?;
            }

            self.insert_in_parent(root, parent_id, new_internal_id, promoted, grand_id)?;
        }

        Ok(())
    }

    /// Removes `key` if present; a miss is a no-op.
    pub fn remove(&self, key: u32) -> Result<()> {
        let mut root = self.root.lock();
        if *root == INVALID_PAGE_ID {
            return Ok(());
        }

        let leaf_id = self.find_leaf(*root, key)?;
        let mut guard = self.bpm.checked_write_page(leaf_id)?;

        if LeafNodeRef::new(guard.data()).find(key).is_none() {
            return Ok(());
        }

        let (size, parent_id) = {
            let mut leaf = LeafNode::new(guard.data_mut());
            leaf.delete_key(key);
            (leaf.size(), leaf.parent_page_id())
        };

        if leaf_id == *root {
            // Root-as-leaf: an emptied root clears the whole tree
            if size == 0 {
                drop(guard);
                self.bpm.delete_page(leaf_id)?;
                *root = INVALID_PAGE_ID;
                self.update_root_record(INVALID_PAGE_ID, false)?;
            }
            return Ok(());
        }

        if size >= self.leaf_min_size() {
            return Ok(());
        }

        self.rebalance_leaf(&mut root, leaf_id, guard, parent_id)
    }

    /// Brings an under-full leaf back above `min_size` by borrowing from
    /// a sibling or merging with one.
    fn rebalance_leaf(
        &self,
        root: &mut PageId,
        leaf_id: PageId,
        mut leaf_guard: WritePageGuard,
        parent_id: PageId,
    ) -> Result<()> {
        let mut parent_guard = self.bpm.checked_write_page(parent_id)?;
        let (vi, parent_size) = {
            let parent = InternalNodeRef::new(parent_guard.data());
            let vi = parent.child_index_of(leaf_id).ok_or_else(|| {
                StratumError::IndexCorrupted(format!("{leaf_id} missing from parent {parent_id}"))
            })?;
            (vi, parent.size())
        };

        // Borrow from the left sibling
        if vi > 0 {
            let left_id = InternalNodeRef::new(parent_guard.data()).child_at(vi - 1);
            let mut left_guard = self.bpm.checked_write_page(left_id)?;
            let can_borrow = {
                let left = LeafNodeRef::new(left_guard.data());
                left.size() > left.min_size()
            };
            if can_borrow {
                let (key, rid) = LeafNode::new(left_guard.data_mut()).pop_last();
                let mut leaf = LeafNode::new(leaf_guard.data_mut());
                leaf.push_front(key, rid);
                let new_first = leaf.first_key();
                InternalNode::new(parent_guard.data_mut()).set_key_at(vi, new_first);
                return Ok(());
            }
        }

        // Borrow from the right sibling
        if vi + 1 < parent_size {
            let right_id = InternalNodeRef::new(parent_guard.data()).child_at(vi + 1);
            let mut right_guard = self.bpm.checked_write_page(right_id)?;
            let can_borrow = {
                let right = LeafNodeRef::new(right_guard.data());
                right.size() > right.min_size()
            };
            if can_borrow {
                let (key, rid) = LeafNode::new(right_guard.data_mut()).pop_first();
                LeafNode::new(leaf_guard.data_mut()).extend(&[(key, rid)]);
                let new_first = LeafNodeRef::new(right_guard.data()).key_at(0);
                InternalNode::new(parent_guard.data_mut()).set_key_at(vi + 1, new_first);
                return Ok(());
            }
        }

        // Merge, preferring the left sibling
        if vi > 0 {
            let left_id = InternalNodeRef::new(parent_guard.data()).child_at(vi - 1);
            let mut left_guard = self.bpm.checked_write_page(left_id)?;
            let (entries, leaf_next) = {
                let leaf = LeafNodeRef::new(leaf_guard.data());
                (leaf_entries(&leaf), leaf.next_page_id())
            };
            {
                let mut left = LeafNode::new(left_guard.data_mut());
                left.extend(&entries);
                left.set_next_page_id(leaf_next);
            }
            drop(left_guard);
            drop(leaf_guard);

            let parent_size = {
                let mut parent = InternalNode::new(parent_guard.data_mut());
                parent.remove_slot_at(vi);
                parent.size()
            };
            self.bpm.delete_page(leaf_id)?;
            self.check_parent(root, parent_guard, parent_id, parent_size)
        } else {
            let right_id = InternalNodeRef::new(parent_guard.data()).child_at(vi + 1);
            let mut right_guard = self.bpm.checked_write_page(right_id)?;
            let (entries, right_next) = {
                let right = LeafNodeRef::new(right_guard.data());
                (leaf_entries(&right), right.next_page_id())
            };
            drop(right_guard);
            {
                let mut leaf = LeafNode::new(leaf_guard.data_mut());
                leaf.extend(&entries);
                leaf.set_next_page_id(right_next);
            }
            drop(leaf_guard);

            let parent_size = {
                let mut parent = InternalNode::new(parent_guard.data_mut());
                parent.remove_slot_at(vi + 1);
                parent.size()
            };
            self.bpm.delete_page(right_id)?;
            self.check_parent(root, parent_guard, parent_id, parent_size)
        }
    }

    /// After a merge removed a slot from `parent`: collapse a
    /// single-child root, or keep rebalancing upward while internal
    /// nodes are under-full.
    fn check_parent(
        &self,
        root: &mut PageId,
        parent_guard: WritePageGuard,
        parent_id: PageId,
        parent_size: usize,
    ) -> Result<()> {
        if parent_id == *root {
            if parent_size == 1 {
                let child = InternalNodeRef::new(parent_guard.data()).child_at(0);
                drop(parent_guard);
                self.set_parent(child, INVALID_PAGE_ID)?;
                self.bpm.delete_page(parent_id)?;
                *root = child;
                self.update_root_record(child, false)?;
            }
            return Ok(());
        }

        if parent_size < self.internal_min_size() {
            let grand_id = InternalNodeRef::new(parent_guard.data()).parent_page_id();
            self.rebalance_internal(root, parent_id, parent_guard, grand_id)
        } else {
            Ok(())
        }
    }

    /// Internal-node counterpart of `rebalance_leaf`; the parent's
    /// separator key bridges borrows and merges.
    fn rebalance_internal(
        &self,
        root: &mut PageId,
        node_id: PageId,
        mut node_guard: WritePageGuard,
        parent_id: PageId,
    ) -> Result<()> {
        let mut parent_guard = self.bpm.checked_write_page(parent_id)?;
        let (vi, parent_size) = {
            let parent = InternalNodeRef::new(parent_guard.data());
            let vi = parent.child_index_of(node_id).ok_or_else(|| {
                StratumError::IndexCorrupted(format!("{node_id} missing from parent {parent_id}"))
            })?;
            (vi, parent.size())
        };

        // Borrow the left sibling's last child
        if vi > 0 {
            let left_id = InternalNodeRef::new(parent_guard.data()).child_at(vi - 1);
            let mut left_guard = self.bpm.checked_write_page(left_id)?;
            let can_borrow = {
                let left = InternalNodeRef::new(left_guard.data());
                left.size() > left.min_size()
            };
            if can_borrow {
                let (moved_key, moved_child) =
                    InternalNode::new(left_guard.data_mut()).pop_last_slot();
                let bridge = InternalNodeRef::new(parent_guard.data()).key_at(vi);
                InternalNode::new(node_guard.data_mut()).push_front_child(moved_child, bridge);
                InternalNode::new(parent_guard.data_mut()).set_key_at(vi, moved_key);
                drop(left_guard);
                drop(parent_guard);
                drop(node_guard);
                return self.set_parent(moved_child, node_id);
            }
        }

        // Borrow the right sibling's first child
        if vi + 1 < parent_size {
            let right_id = InternalNodeRef::new(parent_guard.data()).child_at(vi + 1);
            let mut right_guard = self.bpm.checked_write_page(right_id)?;
            let can_borrow = {
                let right = InternalNodeRef::new(right_guard.data());
                right.size() > right.min_size()
            };
            if can_borrow {
                let (moved_key, moved_child) =
                    InternalNode::new(right_guard.data_mut()).pop_first_slot();
                let bridge = InternalNodeRef::new(parent_guard.data()).key_at(vi + 1);
                InternalNode::new(node_guard.data_mut()).push_back_slot(bridge, moved_child);
                InternalNode::new(parent_guard.data_mut()).set_key_at(vi + 1, moved_key);
                drop(right_guard);
                drop(parent_guard);
                drop(node_guard);
                return self.set_parent(moved_child, node_id);
            }
        }

        // Merge, preferring the left sibling
        if vi > 0 {
            let left_id = InternalNodeRef::new(parent_guard.data()).child_at(vi - 1);
            let mut left_guard = self.bpm.checked_write_page(left_id)?;
            let bridge = InternalNodeRef::new(parent_guard.data()).key_at(vi);
            let moved = {
                let node = InternalNodeRef::new(node_guard.data());
                internal_slots(&node)
            };
            {
                let mut left = InternalNode::new(left_guard.data_mut());
                left.push_back_slot(bridge, moved[0].1);
                left.extend_slots(&moved[1..]);
            }
            drop(left_guard);
            drop(node_guard);

            let parent_size = {
                let mut parent = InternalNode::new(parent_guard.data_mut());
                parent.remove_slot_at(vi);
                parent.size()
            };
            for &(_, child) in &moved {
                self.set_parent(child, left_id)?;
            }
            self.bpm.delete_page(node_id)?;
            self.check_parent(root, parent_guard, parent_id, parent_size)
        } else {
            let right_id = InternalNodeRef::new(parent_guard.data()).child_at(vi + 1);
            let mut right_guard = self.bpm.checked_write_page(right_id)?;
            let bridge = InternalNodeRef::new(parent_guard.data()).key_at(vi + 1);
            let moved = {
                let right = InternalNodeRef::new(right_guard.data());
                internal_slots(&right)
            };
            drop(right_guard);
            {
                let mut node = InternalNode::new(node_guard.data_mut());
                node.push_back_slot(bridge, moved[0].1);
                node.extend_slots(&moved[1..]);
            }
            drop(node_guard);

            let parent_size = {
                let mut parent = InternalNode::new(parent_guard.data_mut());
                parent.remove_slot_at(vi + 1);
                parent.size()
            };
            for &(_, child) in &moved {
                self.set_parent(child, node_id)?;
            }
            self.bpm.delete_page(right_id)?;
            self.check_parent(root, parent_guard, parent_id, parent_size)
        }
    }

    /// Forward iterator over the whole tree in ascending key order.
    pub fn iter(&self) -> Result<BTreeIterator> {
        let root = self.root.lock();
        if *root == INVALID_PAGE_ID {
            return Ok(BTreeIterator::exhausted(Arc::clone(&self.bpm)));
        }

        let mut page_id = *root;
        loop {
            let guard = self.bpm.checked_read_page(page_id)?;
            match node_kind(guard.data()) {
                NodeKind::Leaf => {
                    return Ok(BTreeIterator::new(Arc::clone(&self.bpm), guard, 0));
                }
                NodeKind::Internal => {
                    page_id = InternalNodeRef::new(guard.data()).child_at(0);
                }
                NodeKind::Invalid => {
                    return Err(StratumError::IndexCorrupted(format!(
                        "invalid node at {page_id}"
                    )));
                }
            }
        }
    }

    /// Forward iterator positioned at the least key >= `key`.
    pub fn iter_from(&self, key: u32) -> Result<BTreeIterator> {
        let root = self.root.lock();
        if *root == INVALID_PAGE_ID {
            return Ok(BTreeIterator::exhausted(Arc::clone(&self.bpm)));
        }

        let leaf_id = self.find_leaf(*root, key)?;
        let guard = self.bpm.checked_read_page(leaf_id)?;
        let index = LeafNodeRef::new(guard.data()).lower_bound(key);
        Ok(BTreeIterator::new(Arc::clone(&self.bpm), guard, index))
    }

    /// Descends from `start` to the leaf that owns `key`. Each parent is
    /// unpinned before the walk moves to its child.
    fn find_leaf(&self, start: PageId, key: u32) -> Result<PageId> {
        let mut page_id = start;
        loop {
            let guard = self.bpm.checked_read_page(page_id)?;
            match node_kind(guard.data()) {
                NodeKind::Leaf => return Ok(page_id),
                NodeKind::Internal => {
                    let node = InternalNodeRef::new(guard.data());
                    page_id = node.child_at(node.lookup_child(key));
                }
                NodeKind::Invalid => {
                    return Err(StratumError::IndexCorrupted(format!(
                        "invalid node at {page_id}"
                    )));
                }
            }
        }
    }

    /// Rewrites a node's parent pointer.
    fn set_parent(&self, page_id: PageId, parent: PageId) -> Result<()> {
        let mut guard = self.bpm.checked_write_page(page_id)?;
        match node_kind(guard.data()) {
            NodeKind::Leaf => LeafNode::new(guard.data_mut()).set_parent_page_id(parent),
            NodeKind::Internal => InternalNode::new(guard.data_mut()).set_parent_page_id(parent),
            NodeKind::Invalid => {
                return Err(StratumError::IndexCorrupted(format!(
                    "invalid node at {page_id}"
                )));
            }
        }
        Ok(())
    }

    /// Persists a root change into the header page, still under the tree
    /// latch.
    fn update_root_record(&self, root: PageId, insert: bool) -> Result<()> {
        let mut guard = self.bpm.checked_write_page(HEADER_PAGE_ID)?;
        let mut header = HeaderPage::new(guard.data_mut());
        let updated = if insert {
            header.insert_record(&self.index_name, root)
                || header.update_record(&self.index_name, root)
        } else {
            header.update_record(&self.index_name, root)
        };
        if !updated {
            return Err(StratumError::HeaderPageFull);
        }
        Ok(())
    }
}

fn leaf_entries(leaf: &LeafNodeRef<'_>) -> Vec<(u32, RecordId)> {
    (0..leaf.size()).map(|i| (leaf.key_at(i), leaf.rid_at(i))).collect()
}

fn internal_slots(node: &InternalNodeRef<'_>) -> Vec<(u32, PageId)> {
    (0..node.size())
        .map(|i| {
            let key = if i == 0 { 0 } else { node.key_at(i) };
            (key, node.child_at(i))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::SlotId;
    use crate::storage::disk::DiskManager;
    use tempfile::NamedTempFile;

    fn rid(n: u32) -> RecordId {
        RecordId::new(PageId::new(n), SlotId::new(0))
    }

    fn create_index(pool_size: usize, leaf_max: usize, internal_max: usize) -> (BTreeIndex, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(pool_size, 2, dm));
        let index = BTreeIndex::new("test_idx", bpm, leaf_max, internal_max).unwrap();
        (index, temp_file)
    }

    #[test]
    fn test_btree_empty() {
        let (index, _temp) = create_index(10, 4, 4);
        assert!(index.is_empty());
        assert_eq!(index.root_page_id(), INVALID_PAGE_ID);
        assert_eq!(index.get(42).unwrap(), None);
        index.remove(42).unwrap(); // no-op
    }

    #[test]
    fn test_btree_first_insert_creates_root() {
        let (index, _temp) = create_index(10, 4, 4);

        assert!(index.insert(10, rid(10)).unwrap());
        assert!(!index.is_empty());
        assert_eq!(index.get(10).unwrap(), Some(rid(10)));
        assert_eq!(index.get(11).unwrap(), None);
    }

    #[test]
    fn test_btree_duplicate_insert_rejected() {
        let (index, _temp) = create_index(10, 4, 4);

        assert!(index.insert(10, rid(10)).unwrap());
        assert!(!index.insert(10, rid(99)).unwrap());
        assert_eq!(index.get(10).unwrap(), Some(rid(10)));
    }

    #[test]
    fn test_btree_leaf_split_sequence() {
        // leaf_max_size = 3: inserting 1,2,3 splits the root leaf; the
        // new root routes on the right leaf's first key.
        let (index, _temp) = create_index(10, 3, 4);
        let bpm = Arc::clone(&index.bpm);

        for k in [1, 2, 3] {
            assert!(index.insert(k, rid(k)).unwrap());
        }

        let root_id = index.root_page_id();
        {
            let guard = bpm.checked_read_page(root_id).unwrap();
            assert_eq!(node_kind(guard.data()), NodeKind::Internal);
            let root = InternalNodeRef::new(guard.data());
            assert_eq!(root.size(), 2);
            assert_eq!(root.key_at(1), 2);
        }

        // A fourth key lands in the right leaf [2,3] and splits it again
        assert!(index.insert(4, rid(4)).unwrap());
        {
            let guard = bpm.checked_read_page(root_id).unwrap();
            let root = InternalNodeRef::new(guard.data());
            assert_eq!(root.size(), 3);
            assert_eq!(root.key_at(1), 2);
            assert_eq!(root.key_at(2), 3);
        }

        for k in [1, 2, 3, 4] {
            assert_eq!(index.get(k).unwrap(), Some(rid(k)), "lost key {k}");
        }
    }

    #[test]
    fn test_btree_remove_to_empty_clears_root() {
        let (index, _temp) = create_index(10, 3, 3);

        for k in [1, 2, 3, 4] {
            index.insert(k, rid(k)).unwrap();
        }
        for k in [2, 4, 1, 3] {
            index.remove(k).unwrap();
        }

        assert!(index.is_empty());
        assert_eq!(index.root_page_id(), INVALID_PAGE_ID);
        for k in [1, 2, 3, 4] {
            assert_eq!(index.get(k).unwrap(), None);
        }
    }

    #[test]
    fn test_btree_reinsert_after_clear() {
        let (index, _temp) = create_index(10, 3, 3);

        index.insert(7, rid(7)).unwrap();
        index.remove(7).unwrap();
        assert!(index.is_empty());

        assert!(index.insert(8, rid(8)).unwrap());
        assert_eq!(index.get(8).unwrap(), Some(rid(8)));
    }

    #[test]
    fn test_btree_pin_balance() {
        // Every operation must return the pool to an all-unpinned state.
        let (index, _temp) = create_index(10, 3, 3);
        let bpm = Arc::clone(&index.bpm);

        for k in 0..30 {
            index.insert(k, rid(k)).unwrap();
        }
        for k in (0..30).step_by(2) {
            index.remove(k).unwrap();
        }
        index.get(11).unwrap();

        for page in 0..bpm.disk_manager().num_pages() {
            let pid = PageId::new(page);
            if let Some(pins) = bpm.get_pin_count(pid) {
                assert_eq!(pins, 0, "{pid} left pinned");
            }
        }
    }
}
