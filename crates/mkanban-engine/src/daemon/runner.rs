use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use mkanban_core::event::{EventPayload, EventType};

use super::{AppState, DaemonTask};
use crate::bus::EventBus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub task_count: usize,
    pub active_tasks: Vec<String>,
}

struct RunnerInner {
    /// Registration order.
    tasks: RwLock<Vec<Arc<dyn DaemonTask>>>,
    running: AtomicBool,
    bus: EventBus,
    lifecycle: Mutex<Option<watch::Receiver<AppState>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the background tasks. Cheap to clone.
#[derive(Clone)]
pub struct DaemonRunner {
    inner: Arc<RunnerInner>,
}

impl DaemonRunner {
    pub fn new(bus: EventBus) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                tasks: RwLock::new(Vec::new()),
                running: AtomicBool::new(false),
                bus,
                lifecycle: Mutex::new(None),
                watcher: Mutex::new(None),
            }),
        }
    }

    /// Foreground/background transitions observed while the runner is started.
    pub fn with_lifecycle(self, states: watch::Receiver<AppState>) -> Self {
        *self.inner.lifecycle.lock().unwrap_or_else(|e| e.into_inner()) = Some(states);
        self
    }

    fn snapshot(&self) -> Vec<Arc<dyn DaemonTask>> {
        self.inner
            .tasks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    pub fn register_task(&self, task: Arc<dyn DaemonTask>) {
        let mut tasks = self.inner.tasks.write().unwrap_or_else(|e| e.into_inner());
        let name = task.name().to_string();
        if let Some(slot) = tasks.iter_mut().find(|t| t.name() == name) {
            warn!("[DaemonRunner] task '{name}' already registered, replacing");
            *slot = task;
        } else {
            tasks.push(task);
        }
        info!("[DaemonRunner] registered task: {name}");
    }

    /// Stops the task if it is running. Returns whether it was registered.
    pub fn unregister_task(&self, name: &str) -> bool {
        let removed = {
            let mut tasks = self.inner.tasks.write().unwrap_or_else(|e| e.into_inner());
            let idx = tasks.iter().position(|t| t.name() == name);
            idx.map(|i| tasks.remove(i))
        };
        match removed {
            Some(task) => {
                if task.is_active() {
                    task.stop();
                }
                info!("[DaemonRunner] unregistered task: {name}");
                true
            }
            None => false,
        }
    }

    pub fn get_task(&self, name: &str) -> Option<Arc<dyn DaemonTask>> {
        self.snapshot().into_iter().find(|t| t.name() == name)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts every registered task concurrently. A task that fails to start
    /// is logged and does not hold back the others.
    pub async fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            info!("[DaemonRunner] already running");
            return;
        }
        info!("[DaemonRunner] starting");
        self.watch_lifecycle();

        let tasks = self.snapshot();
        join_all(tasks.iter().map(|task| async move {
            if let Err(e) = task.start().await {
                error!("[DaemonRunner] failed to start task '{}': {e}", task.name());
            }
        }))
        .await;
        info!("[DaemonRunner] started");
    }

    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            info!("[DaemonRunner] not running");
            return;
        }
        if let Some(watcher) = self.inner.watcher.lock().unwrap_or_else(|e| e.into_inner()).take() {
            watcher.abort();
        }
        for task in self.snapshot() {
            task.stop();
        }
        info!("[DaemonRunner] stopped");
    }

    pub async fn restart(&self) {
        self.stop();
        self.start().await;
    }

    /// Stops every active task without waiting for in-flight work.
    pub fn pause(&self) {
        info!("[DaemonRunner] pausing tasks");
        for task in self.snapshot() {
            if task.is_active() {
                task.stop();
            }
        }
    }

    /// Restarts every enabled task that is not running.
    pub async fn resume(&self) {
        info!("[DaemonRunner] resuming tasks");
        let tasks = self.snapshot();
        join_all(tasks.iter().map(|task| async move {
            if task.is_active() || !task.config().enabled {
                return;
            }
            if let Err(e) = task.start().await {
                error!("[DaemonRunner] failed to resume task '{}': {e}", task.name());
            }
        }))
        .await;
    }

    pub fn is_active(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn get_status(&self) -> DaemonStatus {
        let tasks = self.snapshot();
        DaemonStatus {
            running: self.is_active(),
            task_count: tasks.len(),
            active_tasks: tasks
                .iter()
                .filter(|t| t.is_active())
                .map(|t| t.name().to_string())
                .collect(),
        }
    }

    pub async fn handle_app_state(&self, state: AppState) {
        match state {
            AppState::Foreground => {
                info!("[DaemonRunner] app came to foreground");
                self.inner
                    .bus
                    .publish(EventType::AppForeground, EventPayload::system())
                    .await;
                self.resume().await;
            }
            AppState::Background => {
                info!("[DaemonRunner] app went to background");
                self.inner
                    .bus
                    .publish(EventType::AppBackground, EventPayload::system())
                    .await;
                self.pause();
            }
        }
    }

    fn watch_lifecycle(&self) {
        let Some(mut states) = self
            .inner
            .lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
        else {
            return;
        };
        states.mark_unchanged();
        let runner = self.clone();
        let handle = tokio::spawn(async move {
            while states.changed().await.is_ok() {
                let state = *states.borrow_and_update();
                runner.handle_app_state(state).await;
            }
        });
        *self.inner.watcher.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }
}
