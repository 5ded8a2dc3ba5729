use std::cell::{RefCell, RefMut};

use ahash::AHashMap;
use log::{debug, error, info, warn};

use super::disk_manager::DiskManager;
use super::error::{StorageError, StorageResult};
use super::frame::{FrameInfo, FrameMeta};
use super::guard::PageGuard;
use super::replacer::EvictionQueue;
use super::{BUFFER_POOL_SIZE, FrameId, MAX_PAGES, PageId};
use crate::config::{ConfigError, PoolConfig};

/// Bookkeeping mutated by every pool operation
struct PoolState {
    disk: DiskManager,
    /// Per-frame metadata, indexed by frame id
    meta: Vec<FrameMeta>,
    /// Resident pages only: page id -> frame id
    page_table: AHashMap<PageId, FrameId>,
    /// Frames holding no page
    free_list: Vec<FrameId>,
    replacer: EvictionQueue,
}

/// Fixed-capacity page cache on top of a `DiskManager`.
///
/// Pages are handed out as `PageGuard`s which keep the page pinned until
/// they are dropped. Only unpinned pages are evicted, least recently
/// unpinned first, and dirty pages are written back before their frame is
/// reused.
///
/// The pool is single-threaded: all methods take `&self` and mutate
/// through `RefCell`s, so it is neither `Send`-shared nor `Sync`. Each
/// frame's bytes sit in their own `RefCell`, which lets several guards be
/// alive at once while the pool keeps working.
pub struct BufferPoolManager {
    frames: Box<[RefCell<Box<[u8]>>]>,
    state: RefCell<PoolState>,
    page_size: usize,
    max_pages: usize,
}

impl BufferPoolManager {
    /// Create a buffer pool with the default capacity
    pub fn new(disk: DiskManager) -> Self {
        Self::build(disk, BUFFER_POOL_SIZE, MAX_PAGES)
    }

    /// Create a buffer pool with `pool_size` frames addressing at most
    /// `max_pages` pages
    pub fn with_capacity(
        disk: DiskManager,
        pool_size: usize,
        max_pages: usize,
    ) -> StorageResult<Self> {
        if pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be positive".to_string()).into());
        }
        if max_pages == 0 {
            return Err(ConfigError::Invalid("max_pages must be positive".to_string()).into());
        }
        Ok(Self::build(disk, pool_size, max_pages))
    }

    /// Open the configured database file and build a pool over it
    pub fn open(config: &PoolConfig) -> StorageResult<Self> {
        config.validate()?;
        let disk = DiskManager::open_with_page_size(&config.db_path, config.page_size)?;
        Self::with_capacity(disk, config.pool_size, config.max_pages)
    }

    fn build(disk: DiskManager, pool_size: usize, max_pages: usize) -> Self {
        let page_size = disk.page_size();
        let frames = (0..pool_size)
            .map(|_| RefCell::new(vec![0u8; page_size].into_boxed_slice()))
            .collect();

        Self {
            frames,
            state: RefCell::new(PoolState {
                disk,
                meta: vec![FrameMeta::default(); pool_size],
                page_table: AHashMap::with_capacity(pool_size),
                // Reversed so that frame 0 is handed out first
                free_list: (0..pool_size).rev().collect(),
                replacer: EvictionQueue::new(pool_size),
            }),
            page_size,
            max_pages,
        }
    }

    /// Fetch a page, pinning it until the returned guard is dropped
    pub fn fetch_page(&self, page_id: PageId) -> StorageResult<PageGuard<'_>> {
        self.check_page_id(page_id)?;

        let mut state = self.state.borrow_mut();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            debug!("buffer pool: hit page {} in frame {}", page_id, frame_id);
            state.meta[frame_id].pin();
            state.replacer.pin(frame_id);
            return Ok(PageGuard::new(self, frame_id, page_id));
        }

        debug!("buffer pool: miss page {}", page_id);
        let frame_id = self.acquire_frame(&mut state)?;
        self.load_page(&mut state, frame_id, page_id)?;
        Ok(PageGuard::new(self, frame_id, page_id))
    }

    /// Allocate a fresh page on disk and pin it.
    ///
    /// The id bound is checked and the frame secured before the id is
    /// reserved, so a rejected call never burns a page id or evicts a page.
    pub fn new_page(&self) -> StorageResult<PageGuard<'_>> {
        let mut state = self.state.borrow_mut();

        let next_page_id = state.disk.next_page_id()?;
        if next_page_id >= self.max_pages {
            return Err(StorageError::PageIdOutOfRange {
                page_id: next_page_id,
                max_pages: self.max_pages,
            });
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = match state.disk.allocate_page() {
            Ok(page_id) => page_id,
            Err(err) => {
                state.free_list.push(frame_id);
                return Err(err);
            }
        };

        self.load_page(&mut state, frame_id, page_id)?;
        debug!("buffer pool: new page {} in frame {}", page_id, frame_id);
        Ok(PageGuard::new(self, frame_id, page_id))
    }

    /// Release one pin taken over from a guard with `PageGuard::keep_pinned`.
    ///
    /// Pins still owned by live guards cannot be released here; they go
    /// away when the guard is dropped. `is_dirty` only ever sets the dirty
    /// flag; it stays set until the page is flushed.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> StorageResult<()> {
        let mut state = self.state.borrow_mut();

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(StorageError::PageNotResident(page_id))?;

        let meta = &mut state.meta[frame_id];
        if meta.pin_count == 0 {
            return Err(StorageError::PageNotPinned(page_id));
        }
        let remaining = meta
            .unpin(is_dirty)
            .ok_or(StorageError::PinHeldByGuard(page_id))?;

        if remaining == 0 {
            state.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Release the pin owned by a dropped guard
    pub(crate) fn release_guard_pin(&self, frame_id: FrameId, page_id: PageId) -> StorageResult<()> {
        let mut state = self.state.borrow_mut();

        let remaining = state.meta[frame_id]
            .unpin_guard()
            .ok_or(StorageError::PageNotPinned(page_id))?;

        if remaining == 0 {
            state.replacer.unpin(frame_id);
        }
        Ok(())
    }

    /// Hand a guard's pin over to the caller
    pub(crate) fn detach_guard_pin(&self, frame_id: FrameId) {
        self.state.borrow_mut().meta[frame_id].detach();
    }

    /// Write a resident page to disk and clear its dirty flag. Pinned
    /// pages may be flushed; the pin count is left alone.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<()> {
        let mut state = self.state.borrow_mut();

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(StorageError::PageNotResident(page_id))?;

        self.write_frame(&mut state, frame_id, page_id)?;
        state.meta[frame_id].is_dirty = false;
        debug!("buffer pool: flushed page {} from frame {}", page_id, frame_id);
        Ok(())
    }

    /// Flush every dirty resident page, then sync the file.
    ///
    /// A failure on one page does not stop the others; the first error is
    /// returned.
    pub fn flush_all_pages(&self) -> StorageResult<()> {
        let mut state = self.state.borrow_mut();
        let mut first_error = None;
        let mut flushed = 0;

        for frame_id in 0..state.meta.len() {
            let meta = state.meta[frame_id];
            let Some(page_id) = meta.page_id else {
                continue;
            };
            if !meta.is_dirty {
                continue;
            }

            match self.write_frame(&mut state, frame_id, page_id) {
                Ok(()) => {
                    state.meta[frame_id].is_dirty = false;
                    flushed += 1;
                }
                Err(err) => {
                    warn!("buffer pool: failed to flush page {}: {}", page_id, err);
                    first_error.get_or_insert(err);
                }
            }
        }

        if let Err(err) = state.disk.sync() {
            first_error.get_or_insert(err);
        }

        info!("buffer pool: flushed {} dirty pages", flushed);
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Flush everything and release the pool, reporting any write failure
    pub fn close(self) -> StorageResult<()> {
        self.flush_all_pages()
        // Drop flushes again, which finds nothing dirty
    }

    /// Find a frame for a page that is not resident: the free list first,
    /// otherwise the least recently unpinned frame.
    ///
    /// A dirty victim is written back before its mapping is removed. If
    /// that write fails the victim stays resident, dirty and first in line
    /// for eviction.
    fn acquire_frame(&self, state: &mut PoolState) -> StorageResult<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            debug!("buffer pool: using free frame {}", frame_id);
            return Ok(frame_id);
        }

        let frame_id = state
            .replacer
            .evict()
            .ok_or(StorageError::PoolExhausted(self.frames.len()))?;

        let victim = state.meta[frame_id];
        if let Some(old_page_id) = victim.page_id {
            debug!(
                "buffer pool: evicting page {} from frame {}",
                old_page_id, frame_id
            );

            if victim.is_dirty {
                debug!("buffer pool: writing back dirty page {}", old_page_id);
                if let Err(err) = self.write_frame(state, frame_id, old_page_id) {
                    warn!(
                        "buffer pool: write-back of page {} failed, keeping it resident: {}",
                        old_page_id, err
                    );
                    state.replacer.restore(frame_id);
                    return Err(err);
                }
            }
            state.page_table.remove(&old_page_id);
        }

        state.meta[frame_id] = FrameMeta::default();
        Ok(frame_id)
    }

    /// Read `page_id` into an unmapped frame and pin it. On a failed read
    /// the frame goes back to the free list.
    fn load_page(
        &self,
        state: &mut PoolState,
        frame_id: FrameId,
        page_id: PageId,
    ) -> StorageResult<()> {
        let mut data = self.frames[frame_id].borrow_mut();
        if let Err(err) = state.disk.read_page(page_id, &mut data) {
            state.free_list.push(frame_id);
            return Err(err);
        }

        state.meta[frame_id].load(page_id);
        state.page_table.insert(page_id, frame_id);
        state.replacer.pin(frame_id);
        Ok(())
    }

    fn write_frame(
        &self,
        state: &mut PoolState,
        frame_id: FrameId,
        page_id: PageId,
    ) -> StorageResult<()> {
        let data = self.frames[frame_id]
            .try_borrow()
            .map_err(|_| StorageError::PageLatched(page_id))?;
        state.disk.write_page(page_id, &data)
    }

    fn check_page_id(&self, page_id: PageId) -> StorageResult<()> {
        if page_id >= self.max_pages {
            return Err(StorageError::PageIdOutOfRange {
                page_id,
                max_pages: self.max_pages,
            });
        }
        Ok(())
    }

    pub(crate) fn frame_data(&self, frame_id: FrameId) -> &RefCell<Box<[u8]>> {
        &self.frames[frame_id]
    }

    pub(crate) fn mark_frame_dirty(&self, frame_id: FrameId) {
        self.state.borrow_mut().meta[frame_id].is_dirty = true;
    }

    fn resident_meta(&self, page_id: PageId) -> Option<FrameMeta> {
        let state = self.state.borrow();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| state.meta[frame_id])
    }

    /// Page size in bytes
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of frames
    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Check if a page is in the buffer pool
    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.state.borrow().page_table.contains_key(&page_id)
    }

    /// Pin count of a resident page
    pub fn pin_count(&self, page_id: PageId) -> Option<usize> {
        self.resident_meta(page_id).map(|meta| meta.pin_count)
    }

    /// Dirty flag of a resident page
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        self.resident_meta(page_id).map(|meta| meta.is_dirty)
    }

    pub fn resident_count(&self) -> usize {
        self.state.borrow().page_table.len()
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.borrow().free_list.len()
    }

    /// Number of frames that could be evicted right now
    pub fn evictable_count(&self) -> usize {
        self.state.borrow().replacer.len()
    }

    pub fn dirty_page_count(&self) -> usize {
        self.state
            .borrow()
            .meta
            .iter()
            .filter(|meta| meta.page_id.is_some() && meta.is_dirty)
            .count()
    }

    /// Number of pages physically present in the backing file
    pub fn disk_page_count(&self) -> StorageResult<usize> {
        self.state.borrow().disk.page_count()
    }

    /// Snapshot of every frame, in frame order
    pub fn frames(&self) -> Vec<FrameInfo> {
        self.state
            .borrow()
            .meta
            .iter()
            .enumerate()
            .map(|(frame_id, meta)| FrameInfo::new(frame_id, meta))
            .collect()
    }

    /// Direct access to the disk manager, bypassing the cache
    pub fn disk_manager_mut(&self) -> RefMut<'_, DiskManager> {
        RefMut::map(self.state.borrow_mut(), |state| &mut state.disk)
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        // Flush all dirty pages when the buffer pool is dropped
        if let Err(err) = self.flush_all_pages() {
            error!("buffer pool: flush on drop failed: {}", err);
        }
    }
}
