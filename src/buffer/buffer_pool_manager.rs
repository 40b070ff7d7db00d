use std::collections::{HashMap, LinkedList};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, StratumError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping behind the pool-wide latch
struct PoolInner {
    /// Page table: maps resident page ids to frame ids
    page_table: HashMap<PageId, FrameId>,
    /// Frames not currently holding any page
    free_list: LinkedList<FrameId>,
}

/// State shared with page-guard release callbacks
struct PoolShared {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    /// The pool-wide latch; every public operation is one critical section
    inner: Mutex<PoolInner>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
}

impl PoolShared {
    /// Unpin path shared by guard drops and `unpin_page`. Returns false
    /// if the page is absent or was not pinned.
    fn release_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];
        frame.or_dirty(is_dirty);
        match frame.unpin() {
            None => false,
            Some(0) => {
                self.replacer.set_evictable(frame_id, true);
                true
            }
            Some(_) => true,
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of frames and hands
/// out pinned RAII guards for access. Frame recycling goes through the
/// free list first and the LRU-K replacer second; dirty victims are
/// written back before their frame is reused.
///
/// A single pool-wide latch serializes all public operations, including
/// the disk I/O they issue. Do not call `flush_page` for a page while
/// holding a write guard on it; the flush would block on the frame latch.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Shared state, also reachable from guard release callbacks
    shared: Arc<PoolShared>,
    /// Disk I/O path
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a buffer pool with `pool_size` frames and an LRU-K replacer
    /// with the given `replacer_k`.
    pub fn new(pool_size: usize, replacer_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        let shared = Arc::new(PoolShared {
            frames,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(replacer_k, pool_size),
        });

        Self {
            pool_size,
            shared,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh page and returns it pinned for writing. The new
    /// page id, the pin, the recorded access, and the non-evictable mark
    /// are installed in one critical section.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let mut inner = self.shared.inner.lock();
        let frame_id = self.acquire_frame(&mut inner)?;

        let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                inner.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        let frame = &self.shared.frames[frame_id.as_usize()];
        frame.set_page_id(page_id);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        self.shared.replacer.record_access(frame_id);
        self.shared.replacer.set_evictable(frame_id, false);
        drop(inner);

        Ok(self.write_guard(page_id, frame_id))
    }

    /// Fetches a page for shared access, reading it from disk if it is
    /// not resident.
    pub fn checked_read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(self.read_guard(page_id, frame_id))
    }

    /// Fetches a page for exclusive access, reading it from disk if it is
    /// not resident.
    pub fn checked_write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(self.write_guard(page_id, frame_id))
    }

    /// Drops one pin on a page. `is_dirty` is OR-ed into the frame's
    /// dirty bit and never clears it. Returns false if the page is not
    /// resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.shared.release_page(page_id, is_dirty)
    }

    /// Writes a page back to disk and clears its dirty bit. Pin state is
    /// unaffected. Returns Ok(false) if the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Err(StratumError::InvalidPageId(page_id));
        }

        let inner = self.shared.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(false);
        };

        let frame = &self.shared.frames[frame_id.as_usize()];
        let mut data = [0u8; PAGE_SIZE];
        frame.read_into(&mut data);
        self.disk_scheduler.schedule_write_sync(page_id, &data)?;
        frame.clear_dirty();
        Ok(true)
    }

    /// Writes every resident page with a valid page id back to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let inner = self.shared.inner.lock();

        for (&page_id, &frame_id) in inner.page_table.iter() {
            let frame = &self.shared.frames[frame_id.as_usize()];
            let mut data = [0u8; PAGE_SIZE];
            frame.read_into(&mut data);
            self.disk_scheduler.schedule_write_sync(page_id, &data)?;
            frame.clear_dirty();
        }
        Ok(())
    }

    /// Drops a page from the pool and deallocates it on disk. Returns
    /// Ok(false) if the page is pinned; Ok(true) if it was deleted or was
    /// not resident in the first place.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut inner = self.shared.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return Ok(true);
        };

        let frame = &self.shared.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        inner.page_table.remove(&page_id);
        self.shared.replacer.remove(frame_id);
        frame.reset();
        inner.free_list.push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
        Ok(true)
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.shared.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.shared.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.shared.inner.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Pins the frame holding `page_id`, loading the page into a
    /// victimized frame if needed. One critical section.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(StratumError::InvalidPageId(page_id));
        }

        let mut inner = self.shared.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &self.shared.frames[frame_id.as_usize()];
            frame.pin();
            self.shared.replacer.record_access(frame_id);
            self.shared.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut inner)?;
        let frame = &self.shared.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut data) {
            inner.free_list.push_back(frame_id);
            return Err(e);
        }

        frame.fill_from(&data);
        frame.set_page_id(page_id);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        self.shared.replacer.record_access(frame_id);
        self.shared.replacer.set_evictable(frame_id, false);
        Ok(frame_id)
    }

    /// Produces a clean frame: free list first, then an evicted victim
    /// (flushed first if dirty, then unmapped and reset).
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.shared.replacer.evict() else {
            return Err(StratumError::BufferPoolFull);
        };

        let frame = &self.shared.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            debug!("evicting dirty {old_page_id} from {frame_id}, writing back");
            let mut data = [0u8; PAGE_SIZE];
            frame.read_into(&mut data);
            self.disk_scheduler.schedule_write_sync(old_page_id, &data)?;
        }

        inner.page_table.remove(&old_page_id);
        frame.reset();
        Ok(frame_id)
    }

    fn read_guard(&self, page_id: PageId, frame_id: FrameId) -> ReadPageGuard {
        let frame = Arc::clone(&self.shared.frames[frame_id.as_usize()]);
        let shared = Arc::clone(&self.shared);
        unsafe {
            ReadPageGuard::new(
                page_id,
                frame,
                Box::new(move |pid, dirty| {
                    shared.release_page(pid, dirty);
                }),
            )
        }
    }

    fn write_guard(&self, page_id: PageId, frame_id: FrameId) -> WritePageGuard {
        let frame = Arc::clone(&self.shared.frames[frame_id.as_usize()]);
        let shared = Arc::clone(&self.shared);
        unsafe {
            WritePageGuard::new(
                page_id,
                frame,
                Box::new(move |pid, dirty| {
                    shared.release_page(pid, dirty);
                }),
            )
        }
    }
}
