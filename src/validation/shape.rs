//! Editor Shapes
//!
//! Working representation produced by the drawing tools. A shape is validated
//! with [`validate_shape`] before it is merged into the map document as an
//! interactive area or an impassable region.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::geometry::{points_from_flat, BoundingBox, Point};
use crate::map::model::{ActionType, InteractiveArea, LegacyImpassableArea, ShapeType};
use crate::validation::geometry::{
    validate_polygon, validate_rectangle, PolygonOptions, RectangleOptions, ValidationResult,
};

/// Layer a shape belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeCategory {
    /// Blocks movement
    Collision,
    /// Triggers an action
    Interactive,
}

/// Axis-aligned rectangle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RectangleGeometry {
    /// Left edge
    pub x: f64,
    /// Top edge
    pub y: f64,
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

/// Polygon as a flattened `[x0, y0, x1, y1, ...]` array.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolygonGeometry {
    /// Flattened coordinates
    pub points: Vec<f64>,
}

/// Tagged shape geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ShapeGeometry {
    /// Rectangle
    Rectangle(RectangleGeometry),
    /// Polygon
    Polygon(PolygonGeometry),
}

impl ShapeGeometry {
    /// Enclosing box, `None` for a polygon with a malformed point array.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            ShapeGeometry::Rectangle(r) => Some(BoundingBox::new(r.x, r.y, r.width, r.height)),
            ShapeGeometry::Polygon(p) => BoundingBox::from_points(&points_from_flat(&p.points)?),
        }
    }

    fn shape_type(&self) -> ShapeType {
        match self {
            ShapeGeometry::Rectangle(_) => ShapeType::Rectangle,
            ShapeGeometry::Polygon(_) => ShapeType::Polygon,
        }
    }

    fn vertices(&self) -> Vec<Point> {
        match self {
            ShapeGeometry::Rectangle(_) => Vec::new(),
            ShapeGeometry::Polygon(p) => points_from_flat(&p.points).unwrap_or_default(),
        }
    }
}

/// Display style.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeStyle {
    /// Fill opacity in `[0, 1]`
    pub opacity: f64,
    /// Outline width, non-negative
    pub stroke_width: f64,
    /// CSS fill colour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_color: Option<String>,
    /// CSS outline colour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_color: Option<String>,
}

impl Default for ShapeStyle {
    fn default() -> Self {
        Self {
            opacity: 0.5,
            stroke_width: 2.0,
            fill_color: None,
            stroke_color: None,
        }
    }
}

/// A drawn shape awaiting validation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shape {
    /// Unique identifier, reused as the area id on commit
    pub id: String,
    /// Collision or interactive layer
    pub category: ShapeCategory,
    /// Rectangle or polygon
    pub geometry: ShapeGeometry,
    /// Display style
    #[serde(default)]
    pub style: ShapeStyle,
}

impl Shape {
    /// New rectangle with a random id.
    pub fn rectangle(category: ShapeCategory, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            category,
            geometry: ShapeGeometry::Rectangle(RectangleGeometry { x, y, width, height }),
            style: ShapeStyle::default(),
        }
    }

    /// New polygon with a random id.
    pub fn polygon(category: ShapeCategory, points: Vec<f64>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            category,
            geometry: ShapeGeometry::Polygon(PolygonGeometry { points }),
            style: ShapeStyle::default(),
        }
    }

    /// Enclosing box of the geometry.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.geometry.bounding_box()
    }

    /// Convert into an interactive area carrying `action_type`.
    pub fn to_interactive_area(
        &self,
        name: impl Into<String>,
        action_type: ActionType,
        action_config: serde_json::Value,
    ) -> InteractiveArea {
        InteractiveArea {
            id: self.id.clone(),
            name: name.into(),
            shape_type: self.geometry.shape_type(),
            bounds: self.bounding_box().unwrap_or_default(),
            points: self.geometry.vertices(),
            action_type,
            action_config,
            description: None,
            color: self.style.fill_color.clone(),
        }
    }

    /// Convert into a stand-alone impassable region.
    pub fn to_impassable_area(&self, name: Option<String>) -> LegacyImpassableArea {
        LegacyImpassableArea {
            id: self.id.clone(),
            kind: self.geometry.shape_type(),
            bounds: self.bounding_box().unwrap_or_default(),
            points: self.geometry.vertices(),
            name,
        }
    }
}

/// Validate a shape's style and geometry with default options.
pub fn validate_shape(shape: &Shape) -> ValidationResult {
    let mut result = ValidationResult::new();

    if shape.id.trim().is_empty() {
        result.error("shape id must not be empty");
    }
    let style = &shape.style;
    if !(0.0..=1.0).contains(&style.opacity) {
        result.error(format!("opacity {} must be between 0 and 1", style.opacity));
    }
    if !(style.stroke_width >= 0.0) {
        result.error(format!("stroke width {} must be non-negative", style.stroke_width));
    }

    let geometry = match &shape.geometry {
        ShapeGeometry::Rectangle(r) => validate_rectangle(r, &RectangleOptions::default()),
        ShapeGeometry::Polygon(p) => validate_polygon(p, &PolygonOptions::default()),
    };
    result.merge(geometry);
    result
}
