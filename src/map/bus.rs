//! Event Bus
//!
//! Named-event publish/subscribe for map consumers.
//!
//! Dispatch rules:
//! - Handlers for a kind run in subscription order.
//! - Handlers run without any bus lock held, so a handler may emit, subscribe
//!   or unsubscribe re-entrantly.
//! - A handler removed during a dispatch is not invoked for the remainder of
//!   that dispatch; a handler added during a dispatch first sees the next one.
//! - A panicking handler is logged and skipped; the remaining handlers still run.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, trace};

use crate::map::events::{EventKind, MapEvent};

/// Shared event handler.
pub type EventHandler = Arc<dyn Fn(&MapEvent) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    handler: EventHandler,
}

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    subscribers: Mutex<BTreeMap<EventKind, Vec<Subscriber>>>,
}

/// Cloneable handle to a shared event bus.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    fn subscribers(&self) -> MutexGuard<'_, BTreeMap<EventKind, Vec<Subscriber>>> {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe `handler` to events of `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers().entry(kind).or_default().push(Subscriber {
            id,
            handler: Arc::new(handler),
        });
        id
    }

    /// Unsubscribe. Returns false if the subscription was not found.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers();
        let Some(list) = subscribers.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| s.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            subscribers.remove(&kind);
        }
        removed
    }

    /// True if `id` is currently subscribed to `kind`.
    pub fn is_subscribed(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.subscribers()
            .get(&kind)
            .is_some_and(|list| list.iter().any(|s| s.id == id))
    }

    /// Number of handlers subscribed to `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers().get(&kind).map_or(0, Vec::len)
    }

    /// Publish an event to every handler subscribed to its kind.
    pub fn emit(&self, event: MapEvent) {
        let kind = event.kind();
        let snapshot: Vec<(SubscriptionId, EventHandler)> = match self.subscribers().get(&kind) {
            Some(list) => list.iter().map(|s| (s.id, Arc::clone(&s.handler))).collect(),
            None => return,
        };

        trace!(event = %kind, handlers = snapshot.len(), "dispatching");

        for (id, handler) in snapshot {
            if !self.is_subscribed(kind, id) {
                continue;
            }
            if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                error!(event = %kind, subscription = id.0, "event handler panicked");
            }
        }
    }
}
