//! Action Dispatcher
//!
//! Turns occupancy transitions into side-effect events. Listens for
//! `area-entered` / `area-exited`, resolves the full area definition and
//! emits at most one side-effect event per transition, according to the
//! area's action type and config.
//!
//! No de-duplication happens here: the collision engine already emits one
//! event per transition.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info};

use crate::actions::config::{jitsi_room_name, ActionConfig};
use crate::map::bus::{EventBus, SubscriptionId};
use crate::map::events::{EventKind, MapEvent};
use crate::map::model::{ActionType, InteractiveArea};
use crate::map::store::MapStateStore;

/// Default namespace token for derived video room names.
pub const DEFAULT_ROOM_PREFIX: &str = "stargety";

/// Resolves an area id to its current definition.
pub trait AreaLookup: Send + Sync {
    /// Current definition of area `id`, if it still exists.
    fn area_by_id(&self, id: &str) -> Option<InteractiveArea>;
}

impl AreaLookup for MapStateStore {
    fn area_by_id(&self, id: &str) -> Option<InteractiveArea> {
        self.get_map_data()?.interactive_area(id).cloned()
    }
}

impl<F> AreaLookup for F
where
    F: Fn(&str) -> Option<InteractiveArea> + Send + Sync,
{
    fn area_by_id(&self, id: &str) -> Option<InteractiveArea> {
        self(id)
    }
}

/// Side-effect for entering `area`, if its config enables one.
pub fn entry_effect(area: &InteractiveArea, room_prefix: &str) -> Option<MapEvent> {
    let config = ActionConfig::new(&area.action_config);
    let area_name = area.name.clone();

    match area.action_type {
        ActionType::Jitsi if config.auto_join_on_entry() => Some(MapEvent::JitsiJoin {
            room_name: jitsi_room_name(room_prefix, config.room_name().unwrap_or(&area.name)),
            area_name,
        }),
        ActionType::Alert if config.show_on_entry() => Some(MapEvent::AlertShow {
            area_name,
            message: config.message().to_string(),
            alert_type: config.alert_type().to_string(),
        }),
        ActionType::Url if config.open_on_entry() => {
            let Some(url) = config.url() else {
                debug!(area = %area.id, "url area has no url configured");
                return None;
            };
            Some(MapEvent::UrlOpen {
                area_name,
                url: url.to_string(),
                open_in_new_tab: config.open_in_new_tab(),
            })
        }
        ActionType::Modal if config.show_on_entry() => Some(MapEvent::ModalOpen {
            title: config.title().unwrap_or(&area.name).to_string(),
            content: config.content().to_string(),
            area_name,
        }),
        ActionType::Collectible if config.collect_on_entry() => Some(MapEvent::CollectibleCollect {
            area_id: area.id.clone(),
            item_id: config.item_id().unwrap_or(&area.id).to_string(),
            area_name,
        }),
        ActionType::Switch if config.toggle_on_entry() => Some(MapEvent::SwitchToggle {
            area_id: area.id.clone(),
            area_name,
            target_id: config.target_id().map(str::to_string),
        }),
        _ => None,
    }
}

/// Side-effect for leaving `area`, if its config enables one.
pub fn exit_effect(area: &InteractiveArea) -> Option<MapEvent> {
    let config = ActionConfig::new(&area.action_config);
    match area.action_type {
        ActionType::Jitsi if config.auto_leave_on_exit() => Some(MapEvent::JitsiLeave {
            area_name: area.name.clone(),
        }),
        ActionType::Modal if config.close_on_exit() => Some(MapEvent::ModalClose {
            area_name: area.name.clone(),
        }),
        _ => None,
    }
}

struct DispatchContext {
    bus: EventBus,
    lookup: Arc<dyn AreaLookup>,
    room_prefix: String,
}

impl DispatchContext {
    fn resolve(&self, area_id: &str) -> Option<InteractiveArea> {
        let area = self.lookup.area_by_id(area_id);
        if area.is_none() {
            debug!(area = area_id, "no definition for area, skipping action");
        }
        area
    }

    fn on_entered(&self, event: &MapEvent) {
        let MapEvent::AreaEntered { area_id, .. } = event else {
            return;
        };
        let Some(area) = self.resolve(area_id) else {
            return;
        };
        if let Some(effect) = entry_effect(&area, &self.room_prefix) {
            debug!(
                area = %area.id,
                action = area.action_type.as_str(),
                effect = %effect.kind(),
                "entry action"
            );
            self.bus.emit(effect);
        }
    }

    fn on_exited(&self, event: &MapEvent) {
        let MapEvent::AreaExited { area_id, .. } = event else {
            return;
        };
        let Some(area) = self.resolve(area_id) else {
            return;
        };
        if let Some(effect) = exit_effect(&area) {
            debug!(
                area = %area.id,
                action = area.action_type.as_str(),
                effect = %effect.kind(),
                "exit action"
            );
            self.bus.emit(effect);
        }
    }
}

/// Subscribes to occupancy transitions and emits action side-effects.
pub struct ActionDispatcher {
    context: Arc<DispatchContext>,
    subscriptions: Mutex<Option<(SubscriptionId, SubscriptionId)>>,
}

impl ActionDispatcher {
    /// Dispatcher on `bus`, resolving areas through `lookup`.
    pub fn new(bus: EventBus, lookup: Arc<dyn AreaLookup>) -> Self {
        Self {
            context: Arc::new(DispatchContext {
                bus,
                lookup,
                room_prefix: DEFAULT_ROOM_PREFIX.to_string(),
            }),
            subscriptions: Mutex::new(None),
        }
    }

    /// Dispatcher resolving areas from `store` and listening on its bus.
    pub fn for_store(store: Arc<MapStateStore>) -> Self {
        let bus = store.bus().clone();
        Self::new(bus, store)
    }

    /// Namespace token for derived video room names. Ignored once started.
    pub fn with_room_prefix(mut self, prefix: impl Into<String>) -> Self {
        if let Some(context) = Arc::get_mut(&mut self.context) {
            context.room_prefix = prefix.into();
        }
        self
    }

    fn subscriptions(&self) -> MutexGuard<'_, Option<(SubscriptionId, SubscriptionId)>> {
        self.subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while subscribed.
    pub fn is_running(&self) -> bool {
        self.subscriptions().is_some()
    }

    /// Subscribe to transitions. Calling again while running does nothing.
    pub fn start(&self) {
        let mut subscriptions = self.subscriptions();
        if subscriptions.is_some() {
            return;
        }

        let bus = &self.context.bus;
        let weak: Weak<DispatchContext> = Arc::downgrade(&self.context);
        let entered = bus.on(EventKind::AreaEntered, move |event| {
            if let Some(context) = weak.upgrade() {
                context.on_entered(event);
            }
        });
        let weak = Arc::downgrade(&self.context);
        let exited = bus.on(EventKind::AreaExited, move |event| {
            if let Some(context) = weak.upgrade() {
                context.on_exited(event);
            }
        });

        *subscriptions = Some((entered, exited));
        info!(prefix = %self.context.room_prefix, "action dispatcher started");
    }

    /// Unsubscribe. Safe to call when not running.
    pub fn stop(&self) {
        let Some((entered, exited)) = self.subscriptions().take() else {
            return;
        };
        let bus = &self.context.bus;
        bus.off(EventKind::AreaEntered, entered);
        bus.off(EventKind::AreaExited, exited);
        info!("action dispatcher stopped");
    }
}

impl Drop for ActionDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
