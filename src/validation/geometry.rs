//! Geometry Validation
//!
//! Accept or reject newly drawn shapes. Validators never fail: they collect
//! every problem they find into a [`ValidationResult`]. Errors block a shape
//! from being committed; warnings are advisory.

use serde::Serialize;

use crate::core::geometry::{first_self_intersection, points_from_flat, polygon_area};
use crate::validation::shape::{PolygonGeometry, RectangleGeometry};

/// Maximum vertex count for a polygon.
pub const MAX_VERTICES: usize = 1000;

/// Maximum absolute value of any coordinate.
pub const MAX_COORDINATE: f64 = 100_000.0;

/// Areas above this are accepted with a warning.
pub const MAX_SANE_AREA: f64 = 25_000_000.0;

/// Outcome of a validation.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// No errors were found
    pub is_valid: bool,
    /// Problems that block the shape
    pub errors: Vec<String>,
    /// Advisory notes
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Empty, valid result.
    pub fn new() -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Record an error.
    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_valid = false;
    }

    /// Record a warning.
    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Fold another result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.is_valid = self.errors.is_empty();
    }
}

/// Polygon validation settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolygonOptions {
    /// Fewest vertices accepted
    pub min_vertices: usize,
    /// Area must exceed this
    pub min_area: f64,
    /// Reject polygons whose non-adjacent edges cross
    pub check_self_intersection: bool,
}

impl Default for PolygonOptions {
    fn default() -> Self {
        Self {
            min_vertices: 3,
            min_area: 1.0,
            check_self_intersection: true,
        }
    }
}

/// Rectangle validation settings.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RectangleOptions {
    /// Smallest accepted width or height
    pub min_size: f64,
    /// Largest accepted width or height
    pub max_size: f64,
    /// Area must exceed this
    pub min_area: f64,
}

impl Default for RectangleOptions {
    fn default() -> Self {
        Self {
            min_size: 1.0,
            max_size: 10_000.0,
            min_area: 0.0,
        }
    }
}

/// Validate a polygon given as a flattened coordinate array.
pub fn validate_polygon(geometry: &PolygonGeometry, options: &PolygonOptions) -> ValidationResult {
    let mut result = ValidationResult::new();
    let coords = &geometry.points;

    let Some(points) = points_from_flat(coords) else {
        result.error(format!(
            "polygon point array must have an even number of coordinates (found {})",
            coords.len()
        ));
        return result;
    };

    let count = points.len();
    if count < options.min_vertices {
        result.error(format!(
            "polygon must have at least {} vertices (found {count})",
            options.min_vertices
        ));
    }
    if count > MAX_VERTICES {
        result.error(format!("polygon must have at most {MAX_VERTICES} vertices (found {count})"));
    }

    for (index, value) in coords.iter().enumerate() {
        if !value.is_finite() {
            result.error(format!("coordinate {index} is not a finite number"));
        } else if value.abs() > MAX_COORDINATE {
            result.error(format!(
                "coordinate {index} ({value}) is outside the range ±{MAX_COORDINATE}"
            ));
        }
    }

    // Area and intersection checks are meaningless on broken input.
    if !result.is_valid {
        return result;
    }

    if points.windows(2).any(|w| w[0] == w[1]) {
        result.warn("polygon has duplicate consecutive vertices");
    }

    let area = polygon_area(&points);
    if area <= options.min_area {
        result.error(format!(
            "polygon area {area:.2} must exceed the minimum of {:.2}",
            options.min_area
        ));
    }
    if area > MAX_SANE_AREA {
        result.warn(format!("polygon area {area:.0} is unusually large"));
    }

    if options.check_self_intersection {
        if let Some((a, b)) = first_self_intersection(&points) {
            result.error(format!("polygon is self-intersecting (edges {a} and {b} cross)"));
        }
    }

    result
}

/// Validate an axis-aligned rectangle.
pub fn validate_rectangle(
    geometry: &RectangleGeometry,
    options: &RectangleOptions,
) -> ValidationResult {
    let mut result = ValidationResult::new();
    let fields = [
        ("x", geometry.x),
        ("y", geometry.y),
        ("width", geometry.width),
        ("height", geometry.height),
    ];

    for (name, value) in fields {
        if !value.is_finite() {
            result.error(format!("rectangle {name} is not a finite number"));
        } else if value.abs() > MAX_COORDINATE {
            result.error(format!(
                "rectangle {name} ({value}) is outside the range ±{MAX_COORDINATE}"
            ));
        }
    }
    if !result.is_valid {
        return result;
    }

    for (name, value) in [("width", geometry.width), ("height", geometry.height)] {
        if value < options.min_size {
            result.error(format!(
                "rectangle {name} {value} is below the minimum of {}",
                options.min_size
            ));
        } else if value > options.max_size {
            result.error(format!(
                "rectangle {name} {value} exceeds the maximum of {}",
                options.max_size
            ));
        }
    }

    let area = geometry.width * geometry.height;
    if area <= options.min_area {
        result.error(format!(
            "rectangle area {area:.2} must exceed the minimum of {:.2}",
            options.min_area
        ));
    }
    if area > MAX_SANE_AREA {
        result.warn(format!("rectangle area {area:.0} is unusually large"));
    }

    result
}
