use std::time::Duration;

use super::types::{FrameId, PageId};

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// The header page holding (index name, root page id) records lives at
/// page 0 of every database file.
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Default maximum number of entries in a B+tree leaf page
pub const DEFAULT_LEAF_MAX_SIZE: usize = 32;

/// Default maximum number of children in a B+tree internal page
pub const DEFAULT_INTERNAL_MAX_SIZE: usize = 32;

/// Default wakeup interval of the deadlock detection worker
pub const DEFAULT_CYCLE_DETECTION_INTERVAL: Duration = Duration::from_millis(50);
