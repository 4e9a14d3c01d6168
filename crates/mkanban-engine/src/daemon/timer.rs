use async_trait::async_trait;
use futures::FutureExt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::scheduler::{CancelHandle, Scheduler};

/// Work driven by a [`TimerChain`].
#[async_trait]
pub(crate) trait Tick: Send + Sync + 'static {
    async fn tick(&self);
    fn next_delay(&self) -> Duration;
}

/// Self-rescheduling timer. The next tick is armed only after the current one
/// finishes, so a slow tick delays the chain instead of overlapping it. Each
/// start bumps the generation; a tick from an older generation never re-arms.
pub(crate) struct TimerChain {
    scheduler: Arc<dyn Scheduler>,
    generation: AtomicU64,
    running: AtomicBool,
    pending: Mutex<Option<CancelHandle>>,
}

impl TimerChain {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            generation: AtomicU64::new(0),
            running: AtomicBool::new(false),
            pending: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Marks the chain running. Returns the new generation, or `None` if it
    /// was already running.
    pub fn begin(&self) -> Option<u64> {
        if self.running.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn arm(self: &Arc<Self>, target: Arc<dyn Tick>, generation: u64) {
        if !self.is_current(generation) {
            return;
        }
        let chain = self.clone();
        let delay = target.next_delay();
        let job = async move {
            if !chain.is_current(generation) {
                return;
            }
            target.tick().await;
            chain.arm(target, generation);
        }
        .boxed();
        let handle = self.scheduler.schedule_after(delay, job);
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Returns whether the chain was running.
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.pending.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.cancel();
        }
        was_running
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.generation.load(Ordering::SeqCst) == generation
    }
}
