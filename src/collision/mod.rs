//! Collision
//!
//! Blocking checks and area occupancy tracking.

pub mod engine;

pub use engine::{
    check_polygon_collision, CollisionEngine, FixedMap, InteractionGate, MapSource,
    OccupancyState, OpenGate, DEFAULT_PLAYER_SIZE,
};
