//! Queue types for the limiter

use std::collections::VecDeque;

use futures::future::BoxFuture;

/// Deferred runnable: invoking it starts the job and wires its outcome to
/// the handle that was returned at schedule time.
pub(crate) type Runnable = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A scheduled job waiting for dispatch
pub(crate) struct QueuedJob {
    /// Monotonic id, for tracing only
    pub id: u64,
    pub run: Runnable,
}

/// FIFO admission queue
///
/// An entry leaves the queue exactly once: popped by the dispatch step or
/// dropped by `clear`. `len` counts pending entries only; an entry is gone
/// from `len` the moment it is popped, before it starts running.
#[derive(Default)]
pub(crate) struct JobQueue {
    entries: VecDeque<QueuedJob>,
}

impl JobQueue {
    pub fn push(&mut self, job: QueuedJob) {
        self.entries.push_back(job);
    }

    /// Remove and return the oldest entry
    pub fn pop(&mut self) -> Option<QueuedJob> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Discard all pending entries, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let discarded = self.entries.len();
        self.entries.clear();
        discarded
    }
}

/// Statistics for the limiter
#[derive(Debug, Default, Clone)]
pub struct LimiterStats {
    pub total_scheduled: u64,
    pub total_completed: u64,
    pub total_discarded: u64,
    pub peak_active: usize,
    pub peak_queue_depth: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: u64) -> QueuedJob {
        QueuedJob {
            id,
            run: Box::new(|| -> BoxFuture<'static, ()> { Box::pin(async {}) }),
        }
    }

    #[test]
    fn test_fifo_order() {
        let mut queue = JobQueue::default();
        queue.push(job(1));
        queue.push(job(2));
        queue.push(job(3));

        assert_eq!(queue.pop().unwrap().id, 1);
        assert_eq!(queue.pop().unwrap().id, 2);
        assert_eq!(queue.pop().unwrap().id, 3);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_len_counts_pending_only() {
        let mut queue = JobQueue::default();
        assert_eq!(queue.len(), 0);

        queue.push(job(1));
        queue.push(job(2));
        assert_eq!(queue.len(), 2);

        let _popped = queue.pop();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear_reports_discarded() {
        let mut queue = JobQueue::default();
        queue.push(job(1));
        queue.push(job(2));

        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.clear(), 0);
    }
}
