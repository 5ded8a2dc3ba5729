use std::collections::VecDeque;

use super::FrameId;

/// One unpin event. `epoch` ties the entry to a single stay of the frame
/// in the queue, so an older stale entry is never mistaken for a newer one.
#[derive(Debug, Clone, Copy)]
struct QueueEntry {
    frame_id: FrameId,
    epoch: u64,
}

/// Least-recently-unpinned eviction queue.
///
/// Unpinning appends an entry; re-pinning only clears the frame's live
/// marker and leaves the physical entry behind as a stale one. Eviction
/// pops from the front and skips stale entries. Every operation is O(1)
/// amortized: stale entries are dropped when popped, or compacted in bulk
/// once they outnumber the frames.
pub struct EvictionQueue {
    queue: VecDeque<QueueEntry>,
    /// Epoch of the live queue entry for each frame, `None` when the frame
    /// is not evictable
    live: Vec<Option<u64>>,
    next_epoch: u64,
    /// Number of frames with a live entry
    evictable: usize,
}

impl EvictionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            live: vec![None; capacity],
            next_epoch: 0,
            evictable: 0,
        }
    }

    /// The frame's pin count dropped to zero: make it evictable.
    /// Does nothing if the frame is already queued.
    pub fn unpin(&mut self, frame_id: FrameId) {
        if self.live[frame_id].is_some() {
            return;
        }

        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.live[frame_id] = Some(epoch);
        self.evictable += 1;
        self.queue.push_back(QueueEntry { frame_id, epoch });

        if self.queue.len() > 2 * self.live.len() {
            self.compact();
        }
    }

    /// The frame was pinned again; its queue entry (if any) goes stale
    pub fn pin(&mut self, frame_id: FrameId) {
        if self.live[frame_id].take().is_some() {
            self.evictable -= 1;
        }
    }

    /// Pick the frame that has been unpinned the longest, or `None` when
    /// every frame is pinned
    pub fn evict(&mut self) -> Option<FrameId> {
        while let Some(entry) = self.queue.pop_front() {
            if self.is_live(&entry) {
                self.live[entry.frame_id] = None;
                self.evictable -= 1;
                return Some(entry.frame_id);
            }
        }
        None
    }

    /// Undo an eviction: the frame goes back to the front of the queue
    pub fn restore(&mut self, frame_id: FrameId) {
        if self.live[frame_id].is_some() {
            return;
        }

        let epoch = self.next_epoch;
        self.next_epoch += 1;
        self.live[frame_id] = Some(epoch);
        self.evictable += 1;
        self.queue.push_front(QueueEntry { frame_id, epoch });
    }

    pub fn is_evictable(&self, frame_id: FrameId) -> bool {
        self.live[frame_id].is_some()
    }

    /// Number of evictable frames
    pub fn len(&self) -> usize {
        self.evictable
    }

    pub fn is_empty(&self) -> bool {
        self.evictable == 0
    }

    fn is_live(&self, entry: &QueueEntry) -> bool {
        self.live[entry.frame_id] == Some(entry.epoch)
    }

    fn compact(&mut self) {
        let live = &self.live;
        self.queue
            .retain(|entry| live[entry.frame_id] == Some(entry.epoch));
    }
}
