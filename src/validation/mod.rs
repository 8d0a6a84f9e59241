//! Validation
//!
//! Stateless checks for drawn shapes and whole map documents.

pub mod document;
pub mod geometry;
pub mod shape;

pub use document::{validate_document_shape, validate_map_data};
pub use geometry::{
    validate_polygon, validate_rectangle, PolygonOptions, RectangleOptions, ValidationResult,
    MAX_COORDINATE, MAX_SANE_AREA, MAX_VERTICES,
};
pub use shape::{
    validate_shape, PolygonGeometry, RectangleGeometry, Shape, ShapeCategory, ShapeGeometry,
    ShapeStyle,
};
