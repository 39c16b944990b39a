/// CullQueue: bounded lock-free MPSC queue between traversal and the main thread.
///
/// Producers never block. When the ring is full the candidate is dropped,
/// the drop counters are bumped and a warning is logged once per frame.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use crossbeam::queue::ArrayQueue;

const NEVER_WARNED: u32 = u32::MAX;

pub struct CullQueue<T> {
    name: &'static str,
    queue: ArrayQueue<T>,
    dropped_total: AtomicUsize,
    dropped_frame: AtomicUsize,
    warned_frame: AtomicU32,
}

impl<T> CullQueue<T> {
    /// # Panics
    ///
    /// When `capacity` is 0 (`SceneConfig::validate` rejects it).
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            queue: ArrayQueue::new(capacity),
            dropped_total: AtomicUsize::new(0),
            dropped_frame: AtomicUsize::new(0),
            warned_frame: AtomicU32::new(NEVER_WARNED),
        }
    }

    /// Enqueue without blocking. Returns `false` when the item was dropped.
    pub fn push(&self, item: T, frame: u32) -> bool {
        if self.queue.push(item).is_ok() {
            return true;
        }

        self.dropped_total.fetch_add(1, Ordering::Relaxed);
        self.dropped_frame.fetch_add(1, Ordering::Relaxed);
        if self.warned_frame.swap(frame, Ordering::Relaxed) != frame {
            crate::engine_warn!(
                "galaxy3d::CullQueue",
                "Queue '{}' full (capacity {}) in frame {}, dropping candidates",
                self.name,
                self.queue.capacity(),
                frame
            );
        }
        false
    }

    pub fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    /// Pop everything currently queued into `out`
    pub fn drain_into(&self, out: &mut Vec<T>) -> usize {
        let before = out.len();
        while let Some(item) = self.queue.pop() {
            out.push(item);
        }
        out.len() - before
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.queue.is_full()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Drops since creation
    pub fn dropped_total(&self) -> usize {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// Drops since the last call; resets the per-frame counter
    pub fn take_frame_dropped(&self) -> usize {
        self.dropped_frame.swap(0, Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "cull_queue_tests.rs"]
mod tests;
