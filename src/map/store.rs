//! Map State Store
//!
//! The single in-memory source of truth for the map document.
//!
//! Every accepted mutation:
//! 1. merges onto the current document (or a fresh default one),
//! 2. bumps `version` by exactly one and stamps `last_modified`,
//! 3. passes [`validate_map_data`] or is rejected with `map:sync:error`,
//! 4. is persisted under the durable key and announced on the cross-tab
//!    channel when one is attached,
//! 5. is published as `map:changed` (plus `map:element:*` for element edits).
//!
//! Snapshots are handed out as `Arc<MapData>` and never mutated in place, so
//! a reader can hold one for as long as it likes without seeing a partial
//! update. Events are emitted after the writer and state locks are released,
//! so handlers may call back into the store.
//!
//! Every state change takes a sequence number under the writer lock.
//! `map:changed` announcements are serialised in that order across threads:
//! an announcement older than one already delivered is dropped, so the last
//! `map:changed` a subscriber sees always carries the current document.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, ThreadId};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DEFAULT_STORAGE_KEY;
use crate::core::hash::{document_digest, short_hex, DocumentDigest};
use crate::map::bus::{EventBus, SubscriptionId};
use crate::map::events::{EventKind, MapElement, MapEvent};
use crate::map::model::{
    ActionType, AssetRef, InteractiveArea, LegacyImpassableArea, MapData, MapDataPatch,
    WorldDimensions,
};
use crate::map::storage::{MapStorage, MemoryStorage, StorageError, PERSIST_EVENT_TYPE};
use crate::sync::channel::{CrossTabChannel, CrossTabMessage};
use crate::validation::document::validate_map_data;
use crate::validation::geometry::ValidationResult;
use crate::validation::shape::{validate_shape, Shape, ShapeCategory};

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The merged document violates a document invariant.
    #[error("map document rejected: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Nothing has been loaded or written yet.
    #[error("no map data loaded")]
    NoData,

    /// Referenced element does not exist.
    #[error("element not found: {0}")]
    NotFound(String),

    /// Durable storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Document (de)serialization failed.
    #[error("map document serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Default)]
struct StoreState {
    current: Option<Arc<MapData>>,
    digest: Option<DocumentDigest>,
    sequence: u64,
}

impl StoreState {
    fn install(&mut self, snapshot: &Arc<MapData>, digest: DocumentDigest) -> u64 {
        self.current = Some(Arc::clone(snapshot));
        self.digest = Some(digest);
        self.sequence += 1;
        self.sequence
    }
}

/// Orders `map:changed` delivery by sequence number.
///
/// The thread delivering an announcement owns the gate; a handler on that
/// thread that mutates the store announces inline instead of waiting on
/// itself.
#[derive(Default)]
struct Announcer {
    gate: Mutex<()>,
    owner: Mutex<Option<ThreadId>>,
    delivered: AtomicU64,
}

impl Announcer {
    fn owner(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `deliver` with the gate held. `deliver` receives `false` when a
    /// newer state has already been announced.
    fn announce(&self, sequence: u64, deliver: impl FnOnce(bool)) {
        let me = thread::current().id();
        if *self.owner() == Some(me) {
            deliver(self.advance(sequence));
            return;
        }

        let _gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        *self.owner() = Some(me);
        deliver(self.advance(sequence));
        *self.owner() = None;
    }

    fn advance(&self, sequence: u64) -> bool {
        self.delivered.fetch_max(sequence, Ordering::SeqCst) < sequence
    }
}

/// Result of a commit, acted on once the locks are released.
struct Commit {
    sequence: u64,
    snapshot: Arc<MapData>,
    element_event: Option<MapEvent>,
    persist_error: Option<StorageError>,
    broadcast: Option<CrossTabMessage>,
}

/// Authoritative map document with persistence and a named-event bus.
pub struct MapStateStore {
    storage: Arc<dyn MapStorage>,
    bus: EventBus,
    channel: Option<Arc<dyn CrossTabChannel>>,
    origin: Uuid,
    default_world: WorldDimensions,
    /// Serialises mutations so version numbers never repeat.
    writer: Mutex<()>,
    state: Mutex<StoreState>,
    announcer: Announcer,
}

impl MapStateStore {
    /// Store over `storage`, publishing on `bus`.
    pub fn new(storage: Arc<dyn MapStorage>, bus: EventBus) -> Self {
        Self {
            storage,
            bus,
            channel: None,
            origin: Uuid::new_v4(),
            default_world: WorldDimensions::default(),
            writer: Mutex::new(()),
            state: Mutex::new(StoreState::default()),
            announcer: Announcer::default(),
        }
    }

    /// Announce every persisted write on `channel`.
    pub fn with_channel(mut self, channel: Arc<dyn CrossTabChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// World extent of the document created on first mutation.
    pub fn with_default_world(mut self, world: WorldDimensions) -> Self {
        self.default_world = world;
        self
    }

    /// Process-wide store on in-memory storage, created on first access.
    pub fn global() -> Arc<MapStateStore> {
        static GLOBAL: OnceLock<Arc<MapStateStore>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| {
            Arc::new(MapStateStore::new(
                Arc::new(MemoryStorage::new(DEFAULT_STORAGE_KEY)),
                EventBus::new(),
            ))
        }))
    }

    fn state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit `map:changed` for the state installed as `sequence`, unless a
    /// newer state has been announced already, then `element_event`.
    fn announce(&self, sequence: u64, snapshot: &Arc<MapData>, element_event: Option<MapEvent>) {
        self.announcer.announce(sequence, |latest| {
            if latest {
                self.bus.emit(MapEvent::MapChanged(Arc::clone(snapshot)));
            } else {
                debug!(version = snapshot.version, sequence, "superseded before announcement");
            }
            if let Some(event) = element_event {
                self.bus.emit(event);
            }
        });
    }

    /// Identifier stamped on this store's cross-tab messages.
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    /// The durable key.
    pub fn storage_key(&self) -> &str {
        self.storage.key()
    }

    /// The event bus.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The attached cross-tab channel, if any.
    pub fn channel(&self) -> Option<&Arc<dyn CrossTabChannel>> {
        self.channel.as_ref()
    }

    /// Digest of the current document as last serialized.
    pub fn current_digest(&self) -> Option<DocumentDigest> {
        self.state().digest
    }

    /// Current snapshot, `None` before the first load or mutation.
    pub fn get_map_data(&self) -> Option<Arc<MapData>> {
        self.state().current.clone()
    }

    /// Subscribe to an event.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        self.bus.on(kind, handler)
    }

    /// Unsubscribe.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.bus.off(kind, id)
    }

    /// Publish an event on the store's bus.
    pub fn emit(&self, event: MapEvent) {
        self.bus.emit(event)
    }

    /// Shallow-merge `patch` into the current document.
    pub fn update_map_data(&self, patch: MapDataPatch) -> Result<Arc<MapData>, StoreError> {
        self.commit(EventKind::MapChanged, |base| Ok((patch.apply_to(base), None)))
    }

    /// Read the durable key. A corrupt or invalid document is logged and
    /// treated as absent.
    pub fn load_map_data(&self) -> Result<Option<Arc<MapData>>, StoreError> {
        let loaded = {
            let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(text) = self.storage.read()? else {
                debug!(key = self.storage.key(), "no stored map document");
                return Ok(None);
            };
            let data = match MapData::from_json(&text) {
                Ok(data) => data,
                Err(e) => {
                    warn!(
                        key = self.storage.key(),
                        error = %e,
                        "stored map document is corrupt, ignoring"
                    );
                    return Ok(None);
                }
            };
            if let Err(errors) = validate_map_data(&data) {
                warn!(
                    key = self.storage.key(),
                    ?errors,
                    "stored map document is invalid, ignoring"
                );
                return Ok(None);
            }
            let snapshot = Arc::new(data);
            let sequence = self.state().install(&snapshot, document_digest(&text));
            (sequence, snapshot)
        };
        let (sequence, loaded) = loaded;

        info!(
            key = self.storage.key(),
            version = loaded.version,
            areas = loaded.interactive_areas.len(),
            "map document loaded"
        );
        self.announce(sequence, &loaded, None);
        Ok(Some(loaded))
    }

    /// Write the current snapshot to durable storage and emit `map:saved`.
    pub fn save_map_data(&self) -> Result<Arc<MapData>, StoreError> {
        let snapshot = self.get_map_data().ok_or(StoreError::NoData)?;
        let document = snapshot.to_json()?;
        if let Err(e) = self.storage.write(&document) {
            error!(key = self.storage.key(), error = %e, "map save failed");
            self.bus
                .emit(MapEvent::sync_error(e.to_string(), EventKind::MapSaved.as_str()));
            return Err(e.into());
        }
        debug!(key = self.storage.key(), version = snapshot.version, "map saved");
        self.bus.emit(MapEvent::MapSaved(Arc::clone(&snapshot)));
        Ok(snapshot)
    }

    /// Adopt a document written by another instance.
    ///
    /// The caller has already validated `data`. Nothing is persisted or
    /// broadcast: the writer did both. Subscribers see `map:changed`.
    pub fn replace_from_remote(&self, data: MapData, digest: DocumentDigest) -> Arc<MapData> {
        let snapshot = Arc::new(data);
        let sequence = {
            let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            self.state().install(&snapshot, digest)
        };
        debug!(
            version = snapshot.version,
            digest = %short_hex(&digest),
            "adopted remote map document"
        );
        self.announce(sequence, &snapshot, None);
        snapshot
    }

    /// Add an interactive area. Duplicate ids are rejected.
    pub fn add_interactive_area(&self, area: InteractiveArea) -> Result<Arc<MapData>, StoreError> {
        self.commit(EventKind::ElementAdded, |base| {
            let mut next = base.clone();
            next.interactive_areas.push(area.clone());
            let event = MapEvent::ElementAdded {
                element: MapElement::InteractiveArea(area),
            };
            Ok((next, Some(event)))
        })
    }

    /// Replace the interactive area with the same id.
    pub fn update_interactive_area(
        &self,
        area: InteractiveArea,
    ) -> Result<Arc<MapData>, StoreError> {
        self.commit(EventKind::ElementUpdated, |base| {
            let mut next = base.clone();
            let slot = next
                .interactive_areas
                .iter_mut()
                .find(|a| a.id == area.id)
                .ok_or_else(|| StoreError::NotFound(area.id.clone()))?;
            *slot = area.clone();
            let event = MapEvent::ElementUpdated {
                element: MapElement::InteractiveArea(area),
            };
            Ok((next, Some(event)))
        })
    }

    /// Remove an interactive area by id.
    pub fn remove_interactive_area(&self, id: &str) -> Result<Arc<MapData>, StoreError> {
        self.commit(EventKind::ElementRemoved, |base| {
            let mut next = base.clone();
            let index = next
                .interactive_areas
                .iter()
                .position(|a| a.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let removed = next.interactive_areas.remove(index);
            let event = MapEvent::ElementRemoved {
                element: MapElement::InteractiveArea(removed),
            };
            Ok((next, Some(event)))
        })
    }

    /// Add a stand-alone impassable region.
    pub fn add_impassable_area(
        &self,
        area: LegacyImpassableArea,
    ) -> Result<Arc<MapData>, StoreError> {
        self.commit(EventKind::ElementAdded, |base| {
            let mut next = base.clone();
            next.impassable_areas.push(area.clone());
            let event = MapEvent::ElementAdded {
                element: MapElement::ImpassableArea(area),
            };
            Ok((next, Some(event)))
        })
    }

    /// Remove a stand-alone impassable region by id.
    pub fn remove_impassable_area(&self, id: &str) -> Result<Arc<MapData>, StoreError> {
        self.commit(EventKind::ElementRemoved, |base| {
            let mut next = base.clone();
            let index = next
                .impassable_areas
                .iter()
                .position(|a| a.id == id)
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let removed = next.impassable_areas.remove(index);
            let event = MapEvent::ElementRemoved {
                element: MapElement::ImpassableArea(removed),
            };
            Ok((next, Some(event)))
        })
    }

    /// Change the world extent.
    pub fn set_world_dimensions(&self, world: WorldDimensions) -> Result<Arc<MapData>, StoreError> {
        self.commit(EventKind::ElementUpdated, |base| {
            let mut next = base.clone();
            next.world_dimensions = world;
            let event = MapEvent::ElementUpdated {
                element: MapElement::WorldDimensions(world),
            };
            Ok((next, Some(event)))
        })
    }

    /// Register an asset reference.
    pub fn add_asset(&self, asset: AssetRef) -> Result<Arc<MapData>, StoreError> {
        self.commit(EventKind::ElementAdded, |base| {
            let mut next = base.clone();
            next.assets.push(asset.clone());
            let event = MapEvent::ElementAdded {
                element: MapElement::Asset(asset),
            };
            Ok((next, Some(event)))
        })
    }

    /// Validate a drawn shape and merge it into the document.
    ///
    /// Collision shapes become stand-alone impassable regions; interactive
    /// shapes become areas carrying `action_type` and `action_config`.
    /// Validation errors block the merge; warnings are returned.
    pub fn commit_shape(
        &self,
        shape: &Shape,
        name: &str,
        action_type: ActionType,
        action_config: serde_json::Value,
    ) -> Result<ValidationResult, StoreError> {
        let result = validate_shape(shape);
        if !result.is_valid {
            warn!(shape = %shape.id, errors = ?result.errors, "shape rejected");
            self.bus.emit(MapEvent::sync_error(
                result.errors.join("; "),
                EventKind::ElementAdded.as_str(),
            ));
            return Err(StoreError::Validation(result.errors));
        }

        match shape.category {
            ShapeCategory::Collision => {
                self.add_impassable_area(shape.to_impassable_area(Some(name.to_string())))?;
            }
            ShapeCategory::Interactive => {
                let area = shape.to_interactive_area(name, action_type, action_config);
                self.add_interactive_area(area)?;
            }
        }
        Ok(result)
    }

    /// Current document as pretty-printed JSON.
    pub fn export_json(&self) -> Result<String, StoreError> {
        let snapshot = self.get_map_data().ok_or(StoreError::NoData)?;
        Ok(serde_json::to_string_pretty(snapshot.as_ref())?)
    }

    /// Replace the whole document with one parsed from `json`.
    ///
    /// The imported version number is discarded; the result is one past the
    /// current version like any other mutation.
    pub fn import_json(&self, json: &str) -> Result<Arc<MapData>, StoreError> {
        let imported = MapData::from_json(json)?;
        self.commit(EventKind::MapChanged, |_| Ok((imported, None)))
    }

    /// Replace the document with an empty one.
    pub fn reset_to_default(&self) -> Result<Arc<MapData>, StoreError> {
        let world = self.default_world;
        self.commit(EventKind::MapChanged, |_| Ok((MapData::empty(world), None)))
    }

    fn commit<F>(&self, event_type: EventKind, build: F) -> Result<Arc<MapData>, StoreError>
    where
        F: FnOnce(&MapData) -> Result<(MapData, Option<MapEvent>), StoreError>,
    {
        let commit = match self.commit_locked(build) {
            Ok(commit) => commit,
            Err(StoreError::Validation(errors)) => {
                warn!(event = %event_type, ?errors, "map mutation rejected");
                self.bus
                    .emit(MapEvent::sync_error(errors.join("; "), event_type.as_str()));
                return Err(StoreError::Validation(errors));
            }
            Err(e @ StoreError::NotFound(_)) => {
                warn!(event = %event_type, error = %e, "map mutation rejected");
                self.bus.emit(MapEvent::sync_error(e.to_string(), event_type.as_str()));
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if let Some(e) = &commit.persist_error {
            self.bus.emit(MapEvent::sync_error(e.to_string(), PERSIST_EVENT_TYPE));
        }
        if let (Some(channel), Some(message)) = (&self.channel, commit.broadcast) {
            channel.publish(message);
        }
        self.announce(commit.sequence, &commit.snapshot, commit.element_event);
        Ok(commit.snapshot)
    }

    fn commit_locked<F>(&self, build: F) -> Result<Commit, StoreError>
    where
        F: FnOnce(&MapData) -> Result<(MapData, Option<MapEvent>), StoreError>,
    {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        let base = self
            .get_map_data()
            .unwrap_or_else(|| Arc::new(MapData::empty(self.default_world)));
        let (mut next, element_event) = build(&base)?;
        next.version = base.version + 1;
        next.last_modified = Utc::now();

        validate_map_data(&next).map_err(StoreError::Validation)?;

        let document = next.to_json()?;
        let digest = document_digest(&document);
        let (persist_error, broadcast) = match self.storage.write(&document) {
            Ok(()) => {
                let message = self
                    .channel
                    .as_ref()
                    .map(|_| CrossTabMessage::new(self.origin, self.storage.key(), document));
                (None, message)
            }
            Err(e) => {
                error!(
                    key = self.storage.key(),
                    error = %e,
                    "map persistence failed, keeping in-memory state"
                );
                (Some(e), None)
            }
        };

        let snapshot = Arc::new(next);
        let sequence = self.state().install(&snapshot, digest);
        debug!(version = snapshot.version, digest = %short_hex(&digest), "map committed");

        Ok(Commit {
            sequence,
            snapshot,
            element_event,
            persist_error,
            broadcast,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{BoundingBox, Point};
    use crate::sync::channel::LocalBroadcastChannel;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn store() -> (MapStateStore, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new("map"));
        (MapStateStore::new(storage.clone(), EventBus::new()), storage)
    }

    fn area(id: &str) -> InteractiveArea {
        InteractiveArea::rectangle(id, id.to_uppercase(), BoundingBox::new(10.0, 10.0, 50.0, 50.0))
    }

    fn counter(store: &MapStateStore, kind: EventKind) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        store.on(kind, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn test_empty_before_first_mutation() {
        let (store, _) = store();
        assert!(store.get_map_data().is_none());
        assert!(matches!(store.export_json(), Err(StoreError::NoData)));
        assert!(matches!(store.save_map_data(), Err(StoreError::NoData)));
    }

    #[test]
    fn test_version_increments_by_one() {
        let (store, storage) = store();
        let changed = counter(&store, EventKind::MapChanged);

        let first = store.update_map_data(MapDataPatch::default()).unwrap();
        assert_eq!(first.version, 1);
        let second = store
            .update_map_data(MapDataPatch {
                background_image: Some("/bg.png".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(second.version, 2);
        assert!(second.last_modified >= first.last_modified);
        assert_eq!(changed.load(Ordering::SeqCst), 2);

        let stored = MapData::from_json(&storage.read().unwrap().unwrap()).unwrap();
        assert_eq!(stored, *second);
    }

    #[test]
    fn test_rejected_update_keeps_version() {
        let (store, _) = store();
        store.add_interactive_area(area("a")).unwrap();
        let errors = counter(&store, EventKind::SyncError);
        let changed = counter(&store, EventKind::MapChanged);

        let result = store.update_map_data(MapDataPatch {
            world_dimensions: Some(WorldDimensions { width: -1.0, height: 600.0 }),
            ..Default::default()
        });
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(store.get_map_data().unwrap().version, 1);
        assert_eq!(errors.load(Ordering::SeqCst), 1);
        assert_eq!(changed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let (store, _) = store();
        let before = store.add_interactive_area(area("a")).unwrap();
        store.remove_interactive_area("a").unwrap();
        assert_eq!(before.interactive_areas.len(), 1);
        assert!(store.get_map_data().unwrap().interactive_areas.is_empty());
    }

    #[test]
    fn test_persistence_failure_keeps_memory_state() {
        let storage = Arc::new(MemoryStorage::new("map").with_quota(16));
        let store = MapStateStore::new(storage.clone(), EventBus::new());
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let r = reasons.clone();
        store.on(EventKind::SyncError, move |event| {
            if let MapEvent::SyncError { event_type, .. } = event {
                r.lock().unwrap().push(event_type.clone());
            }
        });

        let data = store.add_interactive_area(area("a")).unwrap();
        assert_eq!(data.version, 1);
        assert_eq!(store.get_map_data().unwrap().interactive_areas.len(), 1);
        assert!(storage.read().unwrap().is_none());
        assert_eq!(*reasons.lock().unwrap(), vec![PERSIST_EVENT_TYPE.to_string()]);
    }

    #[test]
    fn test_load_corrupt_document_is_absent() {
        let (store, storage) = store();
        storage.seed("{not json");
        assert!(store.load_map_data().unwrap().is_none());
        assert!(store.get_map_data().is_none());
    }

    #[test]
    fn test_load_emits_changed() {
        let (writer, storage) = store();
        writer.add_interactive_area(area("a")).unwrap();

        let reader = MapStateStore::new(storage, EventBus::new());
        let changed = counter(&reader, EventKind::MapChanged);
        let loaded = reader.load_map_data().unwrap().unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(changed.load(Ordering::SeqCst), 1);
        assert_eq!(reader.current_digest(), writer.current_digest());
    }

    #[test]
    fn test_element_events() {
        let (store, _) = store();
        let added = counter(&store, EventKind::ElementAdded);
        let updated = counter(&store, EventKind::ElementUpdated);
        let removed = counter(&store, EventKind::ElementRemoved);

        store.add_interactive_area(area("a")).unwrap();
        let mut renamed = area("a");
        renamed.name = "Renamed".into();
        store.update_interactive_area(renamed).unwrap();
        store.set_world_dimensions(WorldDimensions { width: 1024.0, height: 768.0 }).unwrap();
        store
            .add_asset(AssetRef {
                id: "tiles".into(),
                name: "Tiles".into(),
                url: "/tiles.png".into(),
                kind: None,
            })
            .unwrap();
        store.remove_interactive_area("a").unwrap();

        assert_eq!(added.load(Ordering::SeqCst), 2);
        assert_eq!(updated.load(Ordering::SeqCst), 2);
        assert_eq!(removed.load(Ordering::SeqCst), 1);
        assert_eq!(store.get_map_data().unwrap().version, 5);
    }

    #[test]
    fn test_duplicate_and_missing_ids() {
        let (store, _) = store();
        store.add_interactive_area(area("a")).unwrap();
        assert!(matches!(store.add_interactive_area(area("a")), Err(StoreError::Validation(_))));
        assert!(matches!(store.update_interactive_area(area("b")), Err(StoreError::NotFound(_))));
        assert!(matches!(store.remove_impassable_area("b"), Err(StoreError::NotFound(_))));
        assert_eq!(store.get_map_data().unwrap().version, 1);
    }

    #[test]
    fn test_missing_element_reports_sync_error() {
        let (store, _) = store();
        store.add_interactive_area(area("a")).unwrap();
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let r = reasons.clone();
        store.on(EventKind::SyncError, move |event| {
            if let MapEvent::SyncError { error, event_type, .. } = event {
                r.lock().unwrap().push((event_type.clone(), error.clone()));
            }
        });

        assert!(store.update_interactive_area(area("ghost")).is_err());
        assert!(store.remove_interactive_area("ghost").is_err());

        let reasons = reasons.lock().unwrap();
        assert_eq!(reasons.len(), 2);
        assert_eq!(reasons[0].0, "map:element:updated");
        assert_eq!(reasons[1].0, "map:element:removed");
        assert!(reasons[1].1.contains("ghost"));
    }

    #[test]
    fn test_commit_shape() {
        let (store, _) = store();
        let wall = Shape::rectangle(ShapeCategory::Collision, 0.0, 0.0, 100.0, 10.0);
        let result = store.commit_shape(&wall, "Wall", ActionType::None, json!(null)).unwrap();
        assert!(result.is_valid);

        let tent = Shape::polygon(
            ShapeCategory::Interactive,
            vec![200.0, 200.0, 260.0, 200.0, 230.0, 250.0],
        );
        store
            .commit_shape(&tent, "Tent", ActionType::Alert, json!({"showOnEntry": true}))
            .unwrap();

        let data = store.get_map_data().unwrap();
        assert_eq!(data.impassable_areas[0].name.as_deref(), Some("Wall"));
        assert_eq!(data.interactive_areas[0].action_type, ActionType::Alert);
        assert_eq!(data.interactive_areas[0].points[2], Point::new(230.0, 250.0));

        let broken = Shape::polygon(
            ShapeCategory::Interactive,
            vec![0.0, 0.0, 10.0, 10.0, 10.0, 0.0, 0.0, 10.0],
        );
        assert!(store.commit_shape(&broken, "Bowtie", ActionType::None, json!(null)).is_err());
        assert_eq!(store.get_map_data().unwrap().version, 2);
    }

    #[test]
    fn test_export_import_reset() {
        let (store, _) = store();
        store.add_interactive_area(area("a")).unwrap();
        let exported = store.export_json().unwrap();

        store.reset_to_default().unwrap();
        assert!(store.get_map_data().unwrap().interactive_areas.is_empty());

        let imported = store.import_json(&exported).unwrap();
        assert_eq!(imported.version, 3);
        assert_eq!(imported.interactive_areas[0].id, "a");
        assert!(matches!(store.import_json("[]"), Err(StoreError::Serialize(_))));
    }

    #[test]
    fn test_handlers_can_reenter_store() {
        let store = Arc::new(store().0);
        let seen = Arc::new(AtomicUsize::new(0));
        let weak = Arc::downgrade(&store);
        let s = seen.clone();
        store.on(EventKind::MapChanged, move |_| {
            if let Some(store) = weak.upgrade() {
                let version = store.get_map_data().map_or(0, |d| d.version);
                s.store(version as usize, Ordering::SeqCst);
            }
        });
        store.add_interactive_area(area("a")).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_handlers_can_mutate_store() {
        let store = Arc::new(store().0);
        let versions = Arc::new(Mutex::new(Vec::new()));
        let weak = Arc::downgrade(&store);
        let v = versions.clone();
        store.on(EventKind::MapChanged, move |event| {
            if let MapEvent::MapChanged(data) = event {
                v.lock().unwrap().push(data.version);
                if data.version == 1 {
                    if let Some(store) = weak.upgrade() {
                        store.add_interactive_area(area("b")).unwrap();
                    }
                }
            }
        });

        store.add_interactive_area(area("a")).unwrap();
        assert_eq!(*versions.lock().unwrap(), vec![1, 2]);
        assert_eq!(store.get_map_data().unwrap().interactive_areas.len(), 2);
    }

    #[test]
    fn test_superseded_commit_is_not_announced() {
        // Writes fail, so the commit reports a persistence error before it
        // announces; a remote document adopted in that window is newer.
        let storage = Arc::new(MemoryStorage::new("map").with_quota(1));
        let store = Arc::new(MapStateStore::new(storage, EventBus::new()));
        let weak = Arc::downgrade(&store);
        store.on(EventKind::SyncError, move |_| {
            if let Some(store) = weak.upgrade() {
                let mut remote = MapData::default();
                remote.version = 9;
                store.replace_from_remote(remote, document_digest("remote"));
            }
        });
        let versions = Arc::new(Mutex::new(Vec::new()));
        let v = versions.clone();
        store.on(EventKind::MapChanged, move |event| {
            if let MapEvent::MapChanged(data) = event {
                v.lock().unwrap().push(data.version);
            }
        });
        let added = counter(&store, EventKind::ElementAdded);

        store.add_interactive_area(area("a")).unwrap();
        assert_eq!(*versions.lock().unwrap(), vec![9]);
        assert_eq!(store.get_map_data().unwrap().version, 9);
        assert_eq!(added.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_commits_end_on_latest() {
        let store = Arc::new(store().0);
        let last = Arc::new(Mutex::new(0u64));
        let l = last.clone();
        store.on(EventKind::MapChanged, move |event| {
            if let MapEvent::MapChanged(data) = event {
                *l.lock().unwrap() = data.version;
            }
        });

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.add_interactive_area(area(&format!("t{t}-{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get_map_data().unwrap().version, 100);
        assert_eq!(*last.lock().unwrap(), 100);
    }

    #[test]
    fn test_commit_announced_on_channel() {
        let channel = LocalBroadcastChannel::default();
        let mut rx = channel.subscribe();
        let store = MapStateStore::new(Arc::new(MemoryStorage::new("map")), EventBus::new())
            .with_channel(Arc::new(channel));

        store.add_interactive_area(area("a")).unwrap();
        let message = rx.try_recv().unwrap();
        assert_eq!(message.origin, store.origin());
        assert_eq!(message.key, "map");
        assert_eq!(Some(message.digest()), store.current_digest());
    }

    #[test]
    fn test_replace_from_remote_does_not_persist() {
        let (store, storage) = store();
        let changed = counter(&store, EventKind::MapChanged);
        let mut remote = MapData::default();
        remote.version = 9;
        let digest = document_digest("remote");

        store.replace_from_remote(remote, digest);
        assert_eq!(store.get_map_data().unwrap().version, 9);
        assert_eq!(store.current_digest(), Some(digest));
        assert!(storage.read().unwrap().is_none());
        assert_eq!(changed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_global_is_shared() {
        let a = MapStateStore::global();
        let b = MapStateStore::global();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.storage_key(), DEFAULT_STORAGE_KEY);
    }
}
