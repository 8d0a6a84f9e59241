//! Map Events
//!
//! The fixed event vocabulary shared by the store, the collision engine, the
//! action dispatcher and the sync orchestrator. Each event has a wire name
//! (`map:changed`, `area-entered`, ...) used when events are serialized for
//! consumers outside the process.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::map::model::{AssetRef, InteractiveArea, LegacyImpassableArea, MapData, WorldDimensions};

/// Event names a handler can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    /// `map:changed`
    MapChanged,
    /// `map:element:added`
    ElementAdded,
    /// `map:element:updated`
    ElementUpdated,
    /// `map:element:removed`
    ElementRemoved,
    /// `map:saved`
    MapSaved,
    /// `map:sync:started`
    SyncStarted,
    /// `map:sync:completed`
    SyncCompleted,
    /// `map:sync:error`
    SyncError,
    /// `area-entered`
    AreaEntered,
    /// `area-exited`
    AreaExited,
    /// `jitsi:join`
    JitsiJoin,
    /// `jitsi:leave`
    JitsiLeave,
    /// `alert:show`
    AlertShow,
    /// `url:open`
    UrlOpen,
    /// `modal:open`
    ModalOpen,
    /// `modal:close`
    ModalClose,
    /// `collectible:collect`
    CollectibleCollect,
    /// `switch:toggle`
    SwitchToggle,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [EventKind; 18] = [
        EventKind::MapChanged,
        EventKind::ElementAdded,
        EventKind::ElementUpdated,
        EventKind::ElementRemoved,
        EventKind::MapSaved,
        EventKind::SyncStarted,
        EventKind::SyncCompleted,
        EventKind::SyncError,
        EventKind::AreaEntered,
        EventKind::AreaExited,
        EventKind::JitsiJoin,
        EventKind::JitsiLeave,
        EventKind::AlertShow,
        EventKind::UrlOpen,
        EventKind::ModalOpen,
        EventKind::ModalClose,
        EventKind::CollectibleCollect,
        EventKind::SwitchToggle,
    ];

    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::MapChanged => "map:changed",
            EventKind::ElementAdded => "map:element:added",
            EventKind::ElementUpdated => "map:element:updated",
            EventKind::ElementRemoved => "map:element:removed",
            EventKind::MapSaved => "map:saved",
            EventKind::SyncStarted => "map:sync:started",
            EventKind::SyncCompleted => "map:sync:completed",
            EventKind::SyncError => "map:sync:error",
            EventKind::AreaEntered => "area-entered",
            EventKind::AreaExited => "area-exited",
            EventKind::JitsiJoin => "jitsi:join",
            EventKind::JitsiLeave => "jitsi:leave",
            EventKind::AlertShow => "alert:show",
            EventKind::UrlOpen => "url:open",
            EventKind::ModalOpen => "modal:open",
            EventKind::ModalClose => "modal:close",
            EventKind::CollectibleCollect => "collectible:collect",
            EventKind::SwitchToggle => "switch:toggle",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Where a sync pass originated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncSource {
    /// A mutation in this process.
    Local,
    /// A write by another process sharing the durable key.
    CrossTab,
}

/// A single map element carried by `map:element:*` events.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum MapElement {
    /// An interactive area
    InteractiveArea(InteractiveArea),
    /// A legacy impassable area
    ImpassableArea(LegacyImpassableArea),
    /// An asset reference
    Asset(AssetRef),
    /// The world extent
    WorldDimensions(WorldDimensions),
}

impl MapElement {
    /// Identifier of the element, if it has one.
    pub fn id(&self) -> Option<&str> {
        match self {
            MapElement::InteractiveArea(a) => Some(&a.id),
            MapElement::ImpassableArea(a) => Some(&a.id),
            MapElement::Asset(a) => Some(&a.id),
            MapElement::WorldDimensions(_) => None,
        }
    }
}

/// An event published on the map event bus.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum MapEvent {
    /// The document changed; carries the new snapshot.
    #[serde(rename = "map:changed")]
    MapChanged(Arc<MapData>),

    /// An element was added.
    #[serde(rename = "map:element:added")]
    ElementAdded {
        /// The new element
        element: MapElement,
    },

    /// An element was replaced.
    #[serde(rename = "map:element:updated")]
    ElementUpdated {
        /// The element after the update
        element: MapElement,
    },

    /// An element was removed.
    #[serde(rename = "map:element:removed")]
    ElementRemoved {
        /// The removed element
        element: MapElement,
    },

    /// The document was written to durable storage on request.
    #[serde(rename = "map:saved")]
    MapSaved(Arc<MapData>),

    /// A sync pass began.
    #[serde(rename = "map:sync:started", rename_all = "camelCase")]
    SyncStarted {
        /// Event that triggered the pass
        event_type: EventKind,
        /// Candidate document
        data: serde_json::Value,
        /// Pass start time
        timestamp: DateTime<Utc>,
        /// Local or cross-tab
        source: SyncSource,
    },

    /// A sync pass validated its candidate.
    #[serde(rename = "map:sync:completed", rename_all = "camelCase")]
    SyncCompleted {
        /// Event that triggered the pass
        event_type: EventKind,
        /// Validated document
        data: serde_json::Value,
        /// Completion time
        timestamp: DateTime<Utc>,
        /// Always true for a completed pass
        success: bool,
        /// Local or cross-tab
        source: SyncSource,
    },

    /// A mutation, persistence write or sync pass failed.
    #[serde(rename = "map:sync:error", rename_all = "camelCase")]
    SyncError {
        /// Human-readable reason
        error: String,
        /// Event or operation that failed
        event_type: String,
        /// Failure time
        timestamp: DateTime<Utc>,
    },

    /// A tracked point entered an area.
    #[serde(rename = "area-entered", rename_all = "camelCase")]
    AreaEntered {
        /// Area identifier
        area_id: String,
        /// Area display name
        area_name: String,
        /// Room identifier associated with the area
        room_id: String,
    },

    /// A tracked point left an area.
    #[serde(rename = "area-exited", rename_all = "camelCase")]
    AreaExited {
        /// Area identifier
        area_id: String,
        /// Area display name
        area_name: String,
    },

    /// Join a video room.
    #[serde(rename = "jitsi:join", rename_all = "camelCase")]
    JitsiJoin {
        /// Normalised room name
        room_name: String,
        /// Area display name
        area_name: String,
    },

    /// Leave the video room of an area.
    #[serde(rename = "jitsi:leave", rename_all = "camelCase")]
    JitsiLeave {
        /// Area display name
        area_name: String,
    },

    /// Show an alert.
    #[serde(rename = "alert:show", rename_all = "camelCase")]
    AlertShow {
        /// Area display name
        area_name: String,
        /// Alert text
        message: String,
        /// Severity ("info", "warning", ...)
        alert_type: String,
    },

    /// Open a link.
    #[serde(rename = "url:open", rename_all = "camelCase")]
    UrlOpen {
        /// Area display name
        area_name: String,
        /// Target URL
        url: String,
        /// Open in a new browser tab
        open_in_new_tab: bool,
    },

    /// Open a modal dialog.
    #[serde(rename = "modal:open", rename_all = "camelCase")]
    ModalOpen {
        /// Area display name
        area_name: String,
        /// Dialog title
        title: String,
        /// Dialog body
        content: String,
    },

    /// Close the modal dialog opened by an area.
    #[serde(rename = "modal:close", rename_all = "camelCase")]
    ModalClose {
        /// Area display name
        area_name: String,
    },

    /// Collect an item.
    #[serde(rename = "collectible:collect", rename_all = "camelCase")]
    CollectibleCollect {
        /// Area identifier
        area_id: String,
        /// Area display name
        area_name: String,
        /// Item identifier (the area id when not configured)
        item_id: String,
    },

    /// Toggle a switch.
    #[serde(rename = "switch:toggle", rename_all = "camelCase")]
    SwitchToggle {
        /// Area identifier
        area_id: String,
        /// Area display name
        area_name: String,
        /// Element toggled by the switch, if configured
        target_id: Option<String>,
    },
}

impl MapEvent {
    /// The subscription key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            MapEvent::MapChanged(_) => EventKind::MapChanged,
            MapEvent::ElementAdded { .. } => EventKind::ElementAdded,
            MapEvent::ElementUpdated { .. } => EventKind::ElementUpdated,
            MapEvent::ElementRemoved { .. } => EventKind::ElementRemoved,
            MapEvent::MapSaved(_) => EventKind::MapSaved,
            MapEvent::SyncStarted { .. } => EventKind::SyncStarted,
            MapEvent::SyncCompleted { .. } => EventKind::SyncCompleted,
            MapEvent::SyncError { .. } => EventKind::SyncError,
            MapEvent::AreaEntered { .. } => EventKind::AreaEntered,
            MapEvent::AreaExited { .. } => EventKind::AreaExited,
            MapEvent::JitsiJoin { .. } => EventKind::JitsiJoin,
            MapEvent::JitsiLeave { .. } => EventKind::JitsiLeave,
            MapEvent::AlertShow { .. } => EventKind::AlertShow,
            MapEvent::UrlOpen { .. } => EventKind::UrlOpen,
            MapEvent::ModalOpen { .. } => EventKind::ModalOpen,
            MapEvent::ModalClose { .. } => EventKind::ModalClose,
            MapEvent::CollectibleCollect { .. } => EventKind::CollectibleCollect,
            MapEvent::SwitchToggle { .. } => EventKind::SwitchToggle,
        }
    }

    /// Build a `map:sync:error` event stamped now.
    pub fn sync_error(error: impl Into<String>, event_type: impl Into<String>) -> Self {
        MapEvent::SyncError {
            error: error.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
