/// TaskGroup: join handle over the traversal tasks of one frame.
///
/// Tasks run on rayon's global pool. `join` blocks until every task spawned
/// since the last join has finished; the scheduler calls it at the start of
/// the next frame and at `end_frame`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use crossbeam::sync::WaitGroup;

/// Decrements the pending count even when the task unwinds
struct PendingGuard(Arc<AtomicUsize>);

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct TaskGroup {
    wait_group: Option<WaitGroup>,
    pending: Arc<AtomicUsize>,
    spawned: usize,
    /// Run tasks on the calling thread instead of the pool
    inline: bool,
}

impl TaskGroup {
    pub fn new(inline: bool) -> Self {
        Self {
            wait_group: None,
            pending: Arc::new(AtomicUsize::new(0)),
            spawned: 0,
            inline,
        }
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawned += 1;
        if self.inline {
            task();
            return;
        }

        let wait_group = self.wait_group.get_or_insert_with(WaitGroup::new).clone();
        self.pending.fetch_add(1, Ordering::AcqRel);
        let guard = PendingGuard(self.pending.clone());
        rayon::spawn(move || {
            let _guard = guard;
            let _wait_group = wait_group;
            task();
        });
    }

    /// Tasks spawned but not finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        self.pending() == 0
    }

    /// Tasks spawned since the last join
    pub fn spawned(&self) -> usize {
        self.spawned
    }

    /// Block until every spawned task finished. Returns how many were joined.
    pub fn join(&mut self) -> usize {
        if let Some(wait_group) = self.wait_group.take() {
            wait_group.wait();
        }
        std::mem::take(&mut self.spawned)
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
#[path = "task_group_tests.rs"]
mod tests;
