//! Core primitives.
//!
//! Geometry and hashing helpers with no knowledge of map documents, events or
//! storage. Everything here is pure and safe to call from any thread.

pub mod geometry;
pub mod hash;

// Re-export core types
pub use geometry::{BoundingBox, Point, point_in_polygon, polygon_area};
pub use hash::{DocumentDigest, document_digest};
