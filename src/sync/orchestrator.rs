//! Sync Orchestrator
//!
//! Debounced validation passes over the store, plus cross-tab convergence.
//!
//! ```text
//!  map:element:* / map:changed ──► schedule (cancel + restart debounce timer)
//!  map:saved ───────────────────► immediate pass
//!  cross-tab message ───────────► schedule, source = cross-tab
//!
//!  pass:  rate floor ─► candidate ─► map:sync:started ─► validate
//!                                       ├─ ok  ─► (remote: adopt) ─► map:sync:completed
//!                                       └─ err ─► map:sync:error + error callback
//! ```
//!
//! Only one timer is pending at any time; scheduling always cancels the
//! previous one, so a burst of events yields one pass. Cross-tab messages
//! from this store, for another key, or carrying the document the store
//! already holds are dropped before scheduling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::SyncConfig;
use crate::core::hash::short_hex;
use crate::map::bus::SubscriptionId;
use crate::map::events::{EventKind, MapEvent, SyncSource};
use crate::map::model::MapData;
use crate::map::store::MapStateStore;
use crate::sync::channel::CrossTabMessage;
use crate::validation::document::{validate_document_shape, validate_map_data};

/// Events that schedule a debounced pass.
const DEBOUNCED_EVENTS: [EventKind; 4] = [
    EventKind::ElementAdded,
    EventKind::ElementUpdated,
    EventKind::ElementRemoved,
    EventKind::MapChanged,
];

/// Sync pipeline errors. Never propagated across the event bus; reported as
/// `map:sync:error` and through the error callback.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Candidate document failed validation.
    #[error("invalid map document: {0}")]
    InvalidDocument(String),

    /// Cross-tab payload could not be parsed.
    #[error("malformed cross-tab payload: {0}")]
    MalformedPayload(String),

    /// `start` was called outside a tokio runtime.
    #[error("sync orchestrator requires a tokio runtime")]
    NoRuntime,
}

/// Callback invoked with every pipeline failure and the triggering event.
pub type ErrorCallback = Arc<dyn Fn(&SyncError, EventKind) + Send + Sync>;

enum Candidate {
    Local,
    Remote(CrossTabMessage),
}

struct Trigger {
    event_type: EventKind,
    source: SyncSource,
    candidate: Candidate,
}

impl Trigger {
    fn local(event_type: EventKind) -> Self {
        Self {
            event_type,
            source: SyncSource::Local,
            candidate: Candidate::Local,
        }
    }

    fn remote(message: CrossTabMessage) -> Self {
        Self {
            event_type: EventKind::MapChanged,
            source: SyncSource::CrossTab,
            candidate: Candidate::Remote(message),
        }
    }
}

#[derive(Default)]
struct SyncState {
    runtime: Option<Handle>,
    pending: Option<JoinHandle<()>>,
    generation: u64,
    last_completed: Option<Instant>,
    subscriptions: Vec<(EventKind, SubscriptionId)>,
    listener: Option<JoinHandle<()>>,
}

struct SyncInner {
    store: Arc<MapStateStore>,
    config: SyncConfig,
    on_error: Mutex<Option<ErrorCallback>>,
    state: Mutex<SyncState>,
    /// Set while a remote document is being adopted, so the resulting
    /// `map:changed` does not schedule another pass.
    applying_remote: AtomicBool,
}

impl SyncInner {
    fn state(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn schedule(self: &Arc<Self>, trigger: Trigger, delay: Duration) {
        let mut state = self.state();
        let Some(runtime) = state.runtime.clone() else {
            return;
        };
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.generation += 1;
        let generation = state.generation;

        trace!(
            event = %trigger.event_type,
            source = ?trigger.source,
            delay_ms = delay.as_millis() as u64,
            "sync pass scheduled"
        );
        let weak = Arc::downgrade(self);
        state.pending = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire(generation, trigger);
            }
        }));
    }

    fn fire(self: &Arc<Self>, generation: u64, trigger: Trigger) {
        {
            let mut state = self.state();
            if state.generation != generation {
                return;
            }
            state.pending = None;
        }
        self.run_pass(trigger);
    }

    fn cancel_pending(&self) {
        let mut state = self.state();
        if let Some(pending) = state.pending.take() {
            pending.abort();
        }
        state.generation += 1;
    }

    fn run_pass(self: &Arc<Self>, trigger: Trigger) {
        let floor = self.config.rate_floor();
        let since_last = self.state().last_completed.map(|last| last.elapsed());
        if let Some(elapsed) = since_last.filter(|elapsed| *elapsed < floor) {
            match trigger.candidate {
                // A remote document must not be lost; retry once the floor has passed.
                Candidate::Remote(_) => self.schedule(trigger, floor - elapsed),
                Candidate::Local => {
                    debug!(
                        event = %trigger.event_type,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "sync pass skipped by rate floor"
                    );
                }
            }
            return;
        }

        let data = match &trigger.candidate {
            Candidate::Local => match self.store.get_map_data() {
                Some(snapshot) => match serde_json::to_value(snapshot.as_ref()) {
                    Ok(value) => value,
                    Err(e) => {
                        let error = SyncError::InvalidDocument(e.to_string());
                        return self.fail(trigger.event_type, error);
                    }
                },
                None => {
                    debug!(event = %trigger.event_type, "nothing to sync");
                    return;
                }
            },
            Candidate::Remote(message) => match serde_json::from_str::<Value>(&message.document) {
                Ok(value) => value,
                Err(e) => {
                    let error = SyncError::MalformedPayload(e.to_string());
                    return self.fail(trigger.event_type, error);
                }
            },
        };

        self.store.emit(MapEvent::SyncStarted {
            event_type: trigger.event_type,
            data: data.clone(),
            timestamp: Utc::now(),
            source: trigger.source,
        });

        let outcome = validate_document_shape(&data)
            .map_err(SyncError::InvalidDocument)
            .and_then(|()| match &trigger.candidate {
                Candidate::Local => Ok(()),
                Candidate::Remote(message) => self.adopt_remote(&data, message),
            });

        match outcome {
            Ok(()) => {
                self.state().last_completed = Some(Instant::now());
                debug!(
                    event = %trigger.event_type,
                    source = ?trigger.source,
                    "sync pass completed"
                );
                self.store.emit(MapEvent::SyncCompleted {
                    event_type: trigger.event_type,
                    data,
                    timestamp: Utc::now(),
                    success: true,
                    source: trigger.source,
                });
            }
            Err(e) => self.fail(trigger.event_type, e),
        }
    }

    fn adopt_remote(&self, data: &Value, message: &CrossTabMessage) -> Result<(), SyncError> {
        let document: MapData = serde_json::from_value(data.clone())
            .map_err(|e| SyncError::InvalidDocument(e.to_string()))?;
        validate_map_data(&document)
            .map_err(|errors| SyncError::InvalidDocument(errors.join("; ")))?;

        self.applying_remote.store(true, Ordering::SeqCst);
        self.store.replace_from_remote(document, message.digest());
        self.applying_remote.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn fail(&self, event_type: EventKind, error: SyncError) {
        warn!(event = %event_type, error = %error, "sync pass failed");
        self.store
            .emit(MapEvent::sync_error(error.to_string(), event_type.as_str()));
        let callback = self
            .on_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(callback) = callback {
            callback(&error, event_type);
        }
    }

    fn on_remote(self: &Arc<Self>, message: CrossTabMessage) {
        if message.origin == self.store.origin() {
            trace!("ignoring own cross-tab message");
            return;
        }
        if message.key != self.store.storage_key() {
            trace!(key = %message.key, "ignoring cross-tab message for another key");
            return;
        }
        let digest = message.digest();
        if self.store.current_digest() == Some(digest) {
            debug!(digest = %short_hex(&digest), "cross-tab document already current");
            return;
        }
        debug!(origin = %message.origin, digest = %short_hex(&digest), "cross-tab change received");
        self.schedule(Trigger::remote(message), self.config.debounce());
    }
}

/// Debounced sync pipeline around a [`MapStateStore`].
pub struct SyncOrchestrator {
    inner: Arc<SyncInner>,
}

impl SyncOrchestrator {
    /// Orchestrator for `store`. Call [`start`](Self::start) to begin.
    pub fn new(store: Arc<MapStateStore>, config: SyncConfig) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                store,
                config,
                on_error: Mutex::new(None),
                state: Mutex::new(SyncState::default()),
                applying_remote: AtomicBool::new(false),
            }),
        }
    }

    /// Install the callback that receives every pipeline failure.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&SyncError, EventKind) + Send + Sync + 'static,
    {
        let mut slot = self.inner.on_error.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::new(handler));
    }

    /// True while subscribed to the store.
    pub fn is_running(&self) -> bool {
        self.inner.state().runtime.is_some()
    }

    /// True while a debounced pass is waiting to run.
    pub fn has_pending(&self) -> bool {
        self.inner.state().pending.as_ref().is_some_and(|p| !p.is_finished())
    }

    /// Subscribe to store events and, when the store has a cross-tab
    /// channel, start listening on it. Calling again while running does
    /// nothing. Must be called from within a tokio runtime.
    pub fn start(&self) -> Result<(), SyncError> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let mut state = self.inner.state();
        if state.runtime.is_some() {
            return Ok(());
        }
        let store = &self.inner.store;

        for kind in DEBOUNCED_EVENTS {
            let weak = Arc::downgrade(&self.inner);
            let id = store.on(kind, move |_| {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if inner.applying_remote.load(Ordering::SeqCst) {
                    return;
                }
                inner.schedule(Trigger::local(kind), inner.config.debounce());
            });
            state.subscriptions.push((kind, id));
        }

        let weak = Arc::downgrade(&self.inner);
        let id = store.on(EventKind::MapSaved, move |_| {
            if let Some(inner) = weak.upgrade() {
                inner.cancel_pending();
                inner.run_pass(Trigger::local(EventKind::MapSaved));
            }
        });
        state.subscriptions.push((EventKind::MapSaved, id));

        if let Some(channel) = store.channel() {
            let mut rx = channel.subscribe();
            let weak: Weak<SyncInner> = Arc::downgrade(&self.inner);
            state.listener = Some(runtime.spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(message) => {
                            let Some(inner) = weak.upgrade() else {
                                break;
                            };
                            inner.on_remote(message);
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "cross-tab listener lagged, messages dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
                debug!("cross-tab listener stopped");
            }));
        }

        state.runtime = Some(runtime);
        info!(
            debounce_ms = self.inner.config.debounce_ms,
            rate_floor_ms = self.inner.config.rate_floor_ms,
            cross_tab = state.listener.is_some(),
            "sync orchestrator started"
        );
        Ok(())
    }

    /// Unsubscribe, cancel any pending pass and stop the cross-tab listener.
    /// Safe to call when not running.
    pub fn stop(&self) {
        let (subscriptions, pending, listener) = {
            let mut state = self.inner.state();
            if state.runtime.take().is_none() {
                return;
            }
            state.generation += 1;
            (
                std::mem::take(&mut state.subscriptions),
                state.pending.take(),
                state.listener.take(),
            )
        };
        for (kind, id) in subscriptions {
            self.inner.store.off(kind, id);
        }
        for task in [pending, listener].into_iter().flatten() {
            task.abort();
        }
        info!("sync orchestrator stopped");
    }

    /// Cancel any pending pass and run one now.
    pub fn sync_now(&self) {
        self.inner.cancel_pending();
        self.inner.run_pass(Trigger::local(EventKind::MapChanged));
    }
}

impl Drop for SyncOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}
