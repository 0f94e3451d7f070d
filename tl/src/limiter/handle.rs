//! Outcome handle returned by `schedule`

use std::any::Any;
use std::future::Future;
use std::panic::resume_unwind;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Outcome of a finished job: its value, or the panic payload it died with
pub(crate) type JobOutcome<T> = Result<T, Box<dyn Any + Send + 'static>>;

/// One-shot handle to a scheduled job's outcome
///
/// Settles exactly once with the job's return value. A job that panicked
/// resumes its panic in the awaiting task, payload unmodified. A handle
/// whose job was discarded by [`clear_queue`](crate::Limiter::clear_queue)
/// never settles; callers that clear the queue must bring their own
/// timeout if they still await those handles.
pub struct JobHandle<T> {
    rx: Option<oneshot::Receiver<JobOutcome<T>>>,
}

impl<T> JobHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<JobOutcome<T>>) -> Self {
        Self { rx: Some(rx) }
    }
}

impl<T> Future for JobHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        let Some(rx) = this.rx.as_mut() else {
            return Poll::Pending;
        };

        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(value),
            Poll::Ready(Ok(Err(payload))) => resume_unwind(payload),
            Poll::Ready(Err(_closed)) => {
                // The runnable was dropped unrun (queue cleared). The job
                // will never produce an outcome, so the handle parks
                // permanently rather than inventing one.
                this.rx = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolves_with_sent_value() {
        let (tx, rx) = oneshot::channel::<JobOutcome<u32>>();
        let handle = JobHandle::new(rx);

        tx.send(Ok(42)).ok();
        assert_eq!(handle.await, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_parks_forever() {
        let (tx, rx) = oneshot::channel::<JobOutcome<u32>>();
        let handle = JobHandle::new(rx);
        drop(tx);

        let settled = tokio::time::timeout(Duration::from_secs(60), handle).await;
        assert!(settled.is_err(), "discarded handle must never settle");
    }
}
