//! Limiter implementation

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tracing::debug;

use super::config::{Concurrency, LimiterConfig};
use super::error::LimiterError;
use super::handle::{JobHandle, JobOutcome};
use super::queue::{JobQueue, LimiterStats, QueuedJob, Runnable};

/// Internal state protected by mutex
struct LimiterInner {
    /// FIFO of jobs waiting for a slot
    queue: JobQueue,

    /// Jobs started but not yet completed
    active: usize,

    /// Statistics
    stats: LimiterStats,
}

impl LimiterInner {
    /// Pop the oldest queued job and mark it active. The caller has
    /// already checked the gate under the same lock.
    fn admit(&mut self) -> Option<QueuedJob> {
        let job = self.queue.pop()?;
        self.active += 1;
        self.stats.peak_active = self.stats.peak_active.max(self.active);
        Some(job)
    }
}

/// State shared between limiter handles and running jobs
struct Shared {
    concurrency: Concurrency,
    inner: Mutex<LimiterInner>,
    next_job_id: AtomicU64,
}

impl Shared {
    /// Lock the state. Mutations under the lock are single non-panicking
    /// statements, so a poisoned lock still holds a consistent
    /// `LimiterInner`.
    fn lock(&self) -> MutexGuard<'_, LimiterInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Admission check: if the gate has spare capacity and the queue is
    /// non-empty, pop the oldest job and start it. Check-and-pop is one
    /// critical section, so the active count can never overshoot the
    /// ceiling, regardless of how many checks race.
    fn dispatch(self: &Arc<Self>) {
        let admitted = {
            let mut inner = self.lock();
            if self.concurrency.allows(inner.active) {
                inner.admit()
            } else {
                None
            }
        };

        if let Some(job) = admitted {
            self.start(job);
        }
    }

    /// Run an admitted job as its own task. On completion, free the slot
    /// and admit the next queued job inside the same critical section as
    /// the decrement.
    fn start(self: &Arc<Self>, job: QueuedJob) {
        debug!(job_id = job.id, "Limiter::start: job active");
        let shared = Arc::clone(self);
        let QueuedJob { id, run } = job;

        tokio::spawn(async move {
            // The runnable forwards the job's outcome to its handle before
            // returning; from here on the slot is the only concern.
            run().await;

            let next = {
                let mut inner = shared.lock();
                inner.active -= 1;
                inner.stats.total_completed += 1;
                if shared.concurrency.allows(inner.active) {
                    inner.admit()
                } else {
                    None
                }
            };
            debug!(job_id = id, "Limiter::start: job completed");

            if let Some(job) = next {
                shared.start(job);
            }
        });
    }
}

/// The Limiter runs scheduled jobs behind a fixed concurrency ceiling with
/// FIFO admission, forwarding each job's outcome to the handle returned at
/// schedule time.
///
/// Cloning is cheap; clones share the same queue and gate.
#[derive(Clone)]
pub struct Limiter {
    shared: Arc<Shared>,
}

impl Limiter {
    /// Create a limiter admitting at most `concurrency` jobs at once
    ///
    /// Fails with [`LimiterError::InvalidArgument`] when `concurrency` is
    /// zero, before any state is created.
    pub fn new(concurrency: usize) -> Result<Self, LimiterError> {
        Ok(Self::with_concurrency(Concurrency::limited(concurrency)?))
    }

    /// Create a limiter with no concurrency ceiling
    pub fn unbounded() -> Self {
        Self::with_concurrency(Concurrency::Unbounded)
    }

    /// Create a limiter from an already-validated ceiling
    pub fn with_concurrency(concurrency: Concurrency) -> Self {
        debug!(%concurrency, "Limiter::with_concurrency: called");
        Self {
            shared: Arc::new(Shared {
                concurrency,
                inner: Mutex::new(LimiterInner {
                    queue: JobQueue::default(),
                    active: 0,
                    stats: LimiterStats::default(),
                }),
                next_job_id: AtomicU64::new(0),
            }),
        }
    }

    /// Create a limiter from configuration
    pub fn from_config(config: &LimiterConfig) -> Self {
        Self::with_concurrency(config.concurrency)
    }

    /// Schedule an async job, returning a one-shot handle to its outcome
    ///
    /// The job starts at the next scheduling opportunity at which the
    /// active count is below the ceiling, in FIFO order relative to other
    /// `schedule` calls. Arguments are captured by the closure. The handle
    /// resolves with the job's return value; a job that panics resumes its
    /// panic in the awaiting task only, leaving the limiter and every
    /// other job undisturbed. Dropping the handle does not cancel the job.
    ///
    /// Never starts the job synchronously: immediately after this call
    /// returns, the job is pending, not active. Must be called from within
    /// a Tokio runtime.
    pub fn schedule<F, Fut, T>(&self, job: F) -> JobHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let job_id = self.shared.next_job_id.fetch_add(1, Ordering::Relaxed);
        debug!(job_id, "Limiter::schedule: called");

        let (tx, rx) = oneshot::channel::<JobOutcome<T>>();
        let run: Runnable = Box::new(move || -> BoxFuture<'static, ()> {
            Box::pin(async move {
                // A panic while calling `job()` and a panic inside the
                // returned future both land here as this job's single
                // outcome.
                let outcome = AssertUnwindSafe(async move { job().await }).catch_unwind().await;

                // A dropped handle leaves the outcome with no observer;
                // the error stops here either way.
                let _ = tx.send(outcome);
            })
        });

        {
            let mut inner = self.shared.lock();
            inner.queue.push(QueuedJob { id: job_id, run });
            inner.stats.total_scheduled += 1;
            inner.stats.peak_queue_depth = inner.stats.peak_queue_depth.max(inner.queue.len());
        }

        // Admission runs on a fresh task, never inside this call: counts
        // read right after scheduling reflect the enqueue only, and the
        // check observes settled active-count updates.
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            shared.dispatch();
        });

        JobHandle::new(rx)
    }

    /// Schedule a synchronous function
    ///
    /// Convenience over [`schedule`](Self::schedule) for jobs that produce
    /// their value without awaiting anything.
    pub fn schedule_fn<F, T>(&self, f: F) -> JobHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.schedule(move || std::future::ready(f()))
    }

    /// Number of jobs started but not yet completed
    pub fn active_count(&self) -> usize {
        self.shared.lock().active
    }

    /// Number of jobs queued but not yet started
    pub fn pending_count(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// The configured concurrency ceiling
    pub fn concurrency(&self) -> Concurrency {
        self.shared.concurrency
    }

    /// Discard every queued job, leaving active jobs to run to completion
    ///
    /// Discarded jobs never start and their handles never settle.
    pub fn clear_queue(&self) {
        let mut inner = self.shared.lock();
        let discarded = inner.queue.clear();
        inner.stats.total_discarded += discarded as u64;
        debug!(discarded, "Limiter::clear_queue: queue emptied");
    }

    /// Snapshot of the limiter statistics
    pub fn stats(&self) -> LimiterStats {
        self.shared.lock().stats.clone()
    }
}

impl fmt::Debug for Limiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("Limiter")
            .field("concurrency", &self.shared.concurrency)
            .field("active", &inner.active)
            .field("pending", &inner.queue.len())
            .finish()
    }
}
