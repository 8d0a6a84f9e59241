//! Map State
//!
//! The authoritative map document, its event vocabulary and bus, durable
//! storage and the store that ties them together.

pub mod bus;
pub mod events;
pub mod model;
pub mod storage;
pub mod store;

pub use bus::{EventBus, EventHandler, SubscriptionId};
pub use events::{EventKind, MapElement, MapEvent, SyncSource};
pub use model::{
    ActionType, AssetRef, BlockingRegion, InteractiveArea, LegacyImpassableArea, MapData,
    MapDataPatch, ShapeType, WorldDimensions,
};
pub use storage::{FileStorage, MapStorage, MemoryStorage, QueuedStorage, StorageError};
pub use store::{MapStateStore, StoreError};
