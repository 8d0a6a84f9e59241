//! # Area Sync
//!
//! Authoritative map-area store, collision engine and cross-tab sync for
//! shared virtual spaces.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         AREA SYNC                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Pure primitives                           │
//! │  ├── geometry.rs - Points, boxes, point-in-polygon           │
//! │  └── hash.rs     - Document digests for echo suppression     │
//! │                                                              │
//! │  validation/     - Stateless checks                          │
//! │  ├── geometry.rs - Polygon / rectangle validation            │
//! │  ├── shape.rs    - Editor shapes and conversion to areas     │
//! │  └── document.rs - Whole-document invariants and structure   │
//! │                                                              │
//! │  map/            - Authoritative state                       │
//! │  ├── model.rs    - MapData and its records                   │
//! │  ├── events.rs   - Event vocabulary                          │
//! │  ├── bus.rs      - Named-event publish/subscribe             │
//! │  ├── storage.rs  - Durable key-value backends                │
//! │  └── store.rs    - MapStateStore                             │
//! │                                                              │
//! │  collision/      - Blocking checks and occupancy tracking    │
//! │  actions/        - Side-effects on enter / exit              │
//! │  sync/           - Debounced passes, cross-tab convergence   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! - Every accepted mutation bumps `version` by exactly one.
//! - Readers get immutable `Arc<MapData>` snapshots; no partial updates.
//! - Conflicts between instances resolve last-write-wins on the whole
//!   document.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod actions;
pub mod collision;
pub mod config;
pub mod core;
pub mod map;
pub mod sync;
pub mod validation;

// Re-export commonly used types
pub use actions::{ActionDispatcher, AreaLookup};
pub use collision::{CollisionEngine, InteractionGate, MapSource, OpenGate};
pub use config::{CoreConfig, SyncConfig, DEFAULT_STORAGE_KEY};
pub use core::geometry::{BoundingBox, Point};
pub use map::{
    EventBus, EventKind, InteractiveArea, MapData, MapDataPatch, MapEvent, MapStateStore,
    StoreError,
};
pub use sync::{CrossTabChannel, LocalBroadcastChannel, SyncError, SyncOrchestrator};
pub use validation::{validate_shape, Shape, ValidationResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
