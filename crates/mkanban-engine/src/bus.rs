//! In-process publish/subscribe for application events.

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use tracing::{debug, error};

use mkanban_core::event::{EventPayload, EventType};

pub type EventHandler =
    Arc<dyn Fn(EventType, EventPayload) -> BoxFuture<'static, ()> + Send + Sync>;

const DEFAULT_HISTORY: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedEvent {
    pub event: EventType,
    pub payload: EventPayload,
}

struct Inner {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<EventType, Vec<(u64, EventHandler)>>>,
    history: Mutex<VecDeque<PublishedEvent>>,
    history_capacity: usize,
}

/// Cheap to clone; all clones share subscribers and history.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("history_capacity", &self.inner.history_capacity)
            .finish_non_exhaustive()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }

    pub fn with_history(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(1),
                handlers: RwLock::new(HashMap::new()),
                history: Mutex::new(VecDeque::new()),
                history_capacity: capacity,
            }),
        }
    }

    pub fn subscribe<F, Fut>(&self, event: EventType, handler: F) -> Subscription
    where
        F: Fn(EventType, EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |e, p| handler(e, p).boxed());
        self.subscribe_handler(event, handler)
    }

    /// One handler shared across several event types.
    pub fn subscribe_many<F, Fut>(&self, events: &[EventType], handler: F) -> Vec<Subscription>
    where
        F: Fn(EventType, EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |e, p| handler(e, p).boxed());
        events
            .iter()
            .map(|event| self.subscribe_handler(*event, handler.clone()))
            .collect()
    }

    fn subscribe_handler(&self, event: EventType, handler: EventHandler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(event)
            .or_default()
            .push((id, handler));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            event,
            id,
        }
    }

    /// Runs every handler for `event` concurrently and waits for all of them.
    /// A panicking handler is logged and does not affect the others.
    pub async fn publish(&self, event: EventType, payload: EventPayload) {
        self.record(event, &payload);

        let handlers: Vec<EventHandler> = self
            .inner
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&event)
            .map(|hs| hs.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default();
        if handlers.is_empty() {
            debug!(%event, "no subscribers");
            return;
        }

        let calls = handlers.into_iter().map(|handler| {
            let payload = payload.clone();
            async move {
                let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| handler(event, payload))) {
                    Ok(fut) => fut,
                    Err(_) => {
                        error!(%event, "event handler panicked");
                        return;
                    }
                };
                if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                    error!(%event, "event handler panicked");
                }
            }
        });
        join_all(calls).await;
    }

    fn record(&self, event: EventType, payload: &EventPayload) {
        if self.inner.history_capacity == 0 {
            return;
        }
        let mut history = self.inner.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.len() == self.inner.history_capacity {
            history.pop_front();
        }
        history.push_back(PublishedEvent {
            event,
            payload: payload.clone(),
        });
    }

    /// Most recent events, oldest first.
    pub fn history(&self) -> Vec<PublishedEvent> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn listener_count(&self, event: EventType) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&event)
            .map_or(0, Vec::len)
    }

    /// Drops every subscriber and the history.
    pub fn clear(&self) {
        self.inner
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.inner
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<Inner>,
    event: EventType,
    id: u64,
}

impl Subscription {
    pub fn event(&self) -> EventType {
        self.event
    }

    pub fn unsubscribe(self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut handlers = inner.handlers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = handlers.get_mut(&self.event) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                handlers.remove(&self.event);
            }
        }
    }
}
