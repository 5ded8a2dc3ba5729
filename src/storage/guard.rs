//! Scoped page handles.
//!
//! A guard owns exactly one pin on its page and gives it back when dropped,
//! so every exit path of the caller unpins.

use std::cell::{Ref, RefMut};
use std::fmt;
use std::mem;

use log::warn;

use super::buffer_pool::BufferPoolManager;
use super::{FrameId, PageId};

/// A pinned page.
///
/// The page cannot be evicted while the guard is alive. Byte access goes
/// through `data` and `data_mut`, which borrow the frame like a
/// `RefCell`: any number of readers or a single writer at a time, across
/// all guards of the same page.
///
/// # Example
///
/// ```no_run
/// # use pagecache::storage::{BufferPoolManager, DiskManager};
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bpm = BufferPoolManager::new(DiskManager::open("example.db")?);
/// let mut page = bpm.new_page()?;
/// page.data_mut()[..5].copy_from_slice(b"hello");
/// // Page is unpinned when the guard is dropped and written back on eviction
/// # Ok(())
/// # }
/// ```
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
}

impl<'a> PageGuard<'a> {
    pub(super) fn new(bpm: &'a BufferPoolManager, frame_id: FrameId, page_id: PageId) -> Self {
        Self {
            bpm,
            frame_id,
            page_id,
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Read access to the page bytes.
    ///
    /// # Panics
    ///
    /// Panics if the page is currently borrowed through `data_mut`.
    pub fn data(&self) -> Ref<'_, [u8]> {
        Ref::map(self.bpm.frame_data(self.frame_id).borrow(), |data| &data[..])
    }

    /// Write access to the page bytes. Marks the page dirty.
    ///
    /// # Panics
    ///
    /// Panics if the page is currently borrowed through `data` or
    /// `data_mut`.
    pub fn data_mut(&mut self) -> RefMut<'_, [u8]> {
        self.mark_dirty();
        RefMut::map(self.bpm.frame_data(self.frame_id).borrow_mut(), |data| {
            &mut data[..]
        })
    }

    /// Report a modification made without going through `data_mut`
    pub fn mark_dirty(&mut self) {
        self.bpm.mark_frame_dirty(self.frame_id);
    }

    /// Give up the guard but keep its pin.
    ///
    /// The caller becomes responsible for a matching
    /// `BufferPoolManager::unpin_page` call with the returned id. Pins still
    /// held by guards cannot be released through `unpin_page`.
    pub fn keep_pinned(self) -> PageId {
        let page_id = self.page_id;
        self.bpm.detach_guard_pin(self.frame_id);
        mem::forget(self);
        page_id
    }
}

impl fmt::Debug for PageGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageGuard")
            .field("page_id", &self.page_id)
            .field("frame_id", &self.frame_id)
            .finish()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.bpm.release_guard_pin(self.frame_id, self.page_id) {
            warn!("page guard: failed to unpin page {}: {}", self.page_id, err);
        }
    }
}
