//! Deferred work: retries and daemon timer chains go through [`Scheduler`] so
//! they can be cancelled explicitly and driven by tokio's paused clock in tests.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::task::AbortHandle;

/// Cancels a scheduled job if it has not run yet. Dropping the handle does
/// not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    abort: Option<AbortHandle>,
}

impl CancelHandle {
    pub fn noop() -> Self {
        Self { abort: None }
    }

    pub fn cancel(&self) {
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.abort.as_ref().map_or(true, |a| a.is_finished())
    }
}

pub trait Scheduler: Send + Sync {
    fn schedule_after(&self, delay: Duration, job: BoxFuture<'static, ()>) -> CancelHandle;
}

/// Sleeps on the current tokio runtime, then runs the job.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Scheduler for TokioScheduler {
    fn schedule_after(&self, delay: Duration, job: BoxFuture<'static, ()>) -> CancelHandle {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            job.await;
        });
        CancelHandle {
            abort: Some(handle.abort_handle()),
        }
    }
}
