//! The header page (page 0) persists `(index name, root page id)` records
//! so trees can be reopened after a restart.
//!
//! Layout: `record_count : u32` at byte 0, then 36-byte records: a
//! 32-byte zero-padded UTF-8 name followed by the root page id.

use crate::common::{PageId, PAGE_SIZE};

const RECORD_COUNT_OFFSET: usize = 0;
const RECORDS_OFFSET: usize = 4;
const NAME_SIZE: usize = 32;
const RECORD_SIZE: usize = NAME_SIZE + 4;

/// Maximum number of index records one header page can hold.
pub const MAX_HEADER_RECORDS: usize = (PAGE_SIZE - RECORDS_OFFSET) / RECORD_SIZE;

fn record_offset(index: usize) -> usize {
    RECORDS_OFFSET + index * RECORD_SIZE
}

fn read_count(data: &[u8]) -> usize {
    u32::from_le_bytes(data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
        .try_into()
        .unwrap()) as usize
}

fn name_matches(data: &[u8], index: usize, name: &str) -> bool {
    let offset = record_offset(index);
    let stored = &data[offset..offset + NAME_SIZE];
    let bytes = name.as_bytes();
    stored[..bytes.len()] == *bytes && stored[bytes.len()..].iter().all(|&b| b == 0)
}

fn find_record(data: &[u8], name: &str) -> Option<usize> {
    (0..read_count(data)).find(|&i| name_matches(data, i, name))
}

/// Read-only view of the header page.
pub struct HeaderPageRef<'a> {
    data: &'a [u8],
}

impl<'a> HeaderPageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        read_count(self.data)
    }

    /// Looks up the persisted root page id of the named index.
    pub fn get_root_id(&self, name: &str) -> Option<PageId> {
        find_record(self.data, name).map(|i| {
            let offset = record_offset(i) + NAME_SIZE;
            PageId::new(u32::from_le_bytes(
                self.data[offset..offset + 4].try_into().unwrap(),
            ))
        })
    }
}

/// Mutable view of the header page.
pub struct HeaderPage<'a> {
    data: &'a mut [u8],
}

impl<'a> HeaderPage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        read_count(self.data)
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[RECORD_COUNT_OFFSET..RECORD_COUNT_OFFSET + 4]
            .copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn write_record(&mut self, index: usize, name: &str, root: PageId) {
        let offset = record_offset(index);
        self.data[offset..offset + NAME_SIZE].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        self.data[offset + NAME_SIZE..offset + RECORD_SIZE]
            .copy_from_slice(&root.as_u32().to_le_bytes());
    }

    /// Adds a new record; false if the name exists or the page is full.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> bool {
        assert!(!name.is_empty() && name.len() <= NAME_SIZE);
        let count = self.record_count();
        if count >= MAX_HEADER_RECORDS || find_record(self.data, name).is_some() {
            return false;
        }
        self.write_record(count, name, root);
        self.set_record_count(count + 1);
        true
    }

    /// Rewrites an existing record's root; false if the name is unknown.
    pub fn update_record(&mut self, name: &str, root: PageId) -> bool {
        match find_record(self.data, name) {
            Some(index) => {
                let offset = record_offset(index) + NAME_SIZE;
                self.data[offset..offset + 4].copy_from_slice(&root.as_u32().to_le_bytes());
                true
            }
            None => false,
        }
    }

    /// Drops a record, compacting the tail; false if the name is unknown.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let Some(index) = find_record(self.data, name) else {
            return false;
        };
        let count = self.record_count();
        self.data.copy_within(
            record_offset(index + 1)..record_offset(count),
            record_offset(index),
        );
        self.set_record_count(count - 1);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::INVALID_PAGE_ID;

    #[test]
    fn test_header_page_insert_and_get() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);

        assert!(page.insert_record("orders_pk", PageId::new(7)));
        assert!(page.insert_record("users_pk", INVALID_PAGE_ID));
        assert!(!page.insert_record("orders_pk", PageId::new(9)));
        assert_eq!(page.record_count(), 2);

        let view = HeaderPageRef::new(&data);
        assert_eq!(view.get_root_id("orders_pk"), Some(PageId::new(7)));
        assert_eq!(view.get_root_id("users_pk"), Some(INVALID_PAGE_ID));
        assert_eq!(view.get_root_id("missing"), None);
    }

    #[test]
    fn test_header_page_name_prefix_not_confused() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);

        assert!(page.insert_record("idx", PageId::new(1)));
        let view = HeaderPageRef::new(&data);
        assert_eq!(view.get_root_id("id"), None);
        assert_eq!(view.get_root_id("idx2"), None);
    }

    #[test]
    fn test_header_page_update_record() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);

        page.insert_record("idx", INVALID_PAGE_ID);
        assert!(page.update_record("idx", PageId::new(42)));
        assert!(!page.update_record("other", PageId::new(1)));

        let view = HeaderPageRef::new(&data);
        assert_eq!(view.get_root_id("idx"), Some(PageId::new(42)));
    }

    #[test]
    fn test_header_page_delete_record_compacts() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = HeaderPage::new(&mut data);

        page.insert_record("a", PageId::new(1));
        page.insert_record("b", PageId::new(2));
        page.insert_record("c", PageId::new(3));

        assert!(page.delete_record("b"));
        assert!(!page.delete_record("b"));
        assert_eq!(page.record_count(), 2);

        let view = HeaderPageRef::new(&data);
        assert_eq!(view.get_root_id("a"), Some(PageId::new(1)));
        assert_eq!(view.get_root_id("c"), Some(PageId::new(3)));
    }
}
