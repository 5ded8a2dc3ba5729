use std::fmt;

use super::{FrameId, PageId};

/// Residency state of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No page assigned, sitting on the free list
    Free,
    /// Holds a page with at least one outstanding pin
    Pinned,
    /// Holds a page nobody pins; an eviction candidate
    Unpinned,
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameState::Free => "free",
            FrameState::Pinned => "pinned",
            FrameState::Unpinned => "unpinned",
        };
        write!(f, "{}", name)
    }
}

/// Metadata kept for every frame of the pool. The page bytes live
/// separately so they can be borrowed while the metadata changes.
///
/// `pin_count` counts every pin. `manual_pins` is the part of it handed
/// over to callers by `PageGuard::keep_pinned`; the rest belongs to live
/// guards and can only be released by them.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrameMeta {
    pub page_id: Option<PageId>,
    pub pin_count: usize,
    pub manual_pins: usize,
    pub is_dirty: bool,
}

impl FrameMeta {
    /// Occupy the frame with a freshly read page, pinned once by its loader
    pub fn load(&mut self, page_id: PageId) {
        self.page_id = Some(page_id);
        self.pin_count = 1;
        self.manual_pins = 0;
        self.is_dirty = false;
    }

    pub fn pin(&mut self) {
        self.pin_count += 1;
    }

    /// Pins currently owned by guards
    pub fn guard_pins(&self) -> usize {
        self.pin_count - self.manual_pins
    }

    /// Turn one guard pin into a caller-owned pin
    pub fn detach(&mut self) {
        if self.guard_pins() > 0 {
            self.manual_pins += 1;
        }
    }

    /// Drop one caller-owned pin. Returns the remaining pin count, or
    /// `None` when the caller owns no pin (nothing changes in that case).
    pub fn unpin(&mut self, is_dirty: bool) -> Option<usize> {
        if self.manual_pins == 0 {
            return None;
        }
        self.manual_pins -= 1;
        Some(self.release(is_dirty))
    }

    /// Drop one guard-owned pin, same contract as `unpin`
    pub fn unpin_guard(&mut self) -> Option<usize> {
        if self.guard_pins() == 0 {
            return None;
        }
        Some(self.release(false))
    }

    fn release(&mut self, is_dirty: bool) -> usize {
        self.pin_count -= 1;
        // Dirty is sticky until the next successful flush
        if is_dirty {
            self.is_dirty = true;
        }
        self.pin_count
    }

    pub fn state(&self) -> FrameState {
        match (self.page_id, self.pin_count) {
            (None, _) => FrameState::Free,
            (Some(_), 0) => FrameState::Unpinned,
            (Some(_), _) => FrameState::Pinned,
        }
    }
}

/// Snapshot of one frame, as reported by `BufferPoolManager::frames`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame_id: FrameId,
    pub page_id: Option<PageId>,
    pub pin_count: usize,
    pub is_dirty: bool,
    pub state: FrameState,
}

impl FrameInfo {
    pub(crate) fn new(frame_id: FrameId, meta: &FrameMeta) -> Self {
        Self {
            frame_id,
            page_id: meta.page_id,
            pin_count: meta.pin_count,
            is_dirty: meta.is_dirty,
            state: meta.state(),
        }
    }
}
