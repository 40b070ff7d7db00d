//! Stratum - the core of an educational disk-oriented storage engine
//!
//! This crate implements the three interlocking subsystems at the heart
//! of a disk-backed relational engine: a page-frame buffer pool with
//! LRU-K replacement, a persistent B+tree index stored in buffer-pool
//! pages, and a hierarchical two-phase lock manager with background
//! deadlock detection.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): page-granular disk I/O
//!   - `DiskManager`: reads/writes 4 KiB pages and allocates page ids
//!   - `DiskScheduler`: background worker funneling I/O requests
//!
//! - **Buffer Pool** (`buffer`): the in-memory page cache
//!   - `BufferPoolManager`: pins pages into frames, recycles frames
//!     through a free list and the replacer, writes dirty victims back
//!   - `LruKReplacer`: LRU-K eviction policy
//!   - `ReadPageGuard`/`WritePageGuard`: RAII pins; dropping a guard
//!     unpins its page
//!
//! - **Index** (`index`): a persistent ordered map
//!   - `BTreeIndex`: unique-key B+tree over buffer-pool pages, with
//!     splits, sibling borrows, merges, and root collapse
//!   - `BTreeIterator`: forward iterator along the leaf chain
//!
//! - **Concurrency** (`concurrency`): transactions and locking
//!   - `LockManager`: IS/IX/S/SIX/X locks on tables and rows, lock
//!     upgrades, and a deadlock detector that aborts the youngest
//!     transaction on every wait-for cycle
//!   - `TransactionManager`: begin/commit/abort and lock release
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stratum::buffer::BufferPoolManager;
//! use stratum::common::{PageId, RecordId, SlotId};
//! use stratum::index::BTreeIndex;
//! use stratum::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(100, 2, disk_manager));
//!
//! let index = BTreeIndex::new("orders_pk", bpm, 32, 32).unwrap();
//! let rid = RecordId::new(PageId::new(7), SlotId::new(0));
//! index.insert(42, rid).unwrap();
//! assert_eq!(index.get(42).unwrap(), Some(rid));
//! ```

pub mod buffer;
pub mod common;
pub mod concurrency;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StratumError, TxnId};
