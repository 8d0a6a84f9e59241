//! Map Document Model
//!
//! The persisted map document and the records it holds. Field names follow
//! the JSON document layout (camelCase) so the same types serve the durable
//! store, cross-tab payloads and event payloads.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::core::geometry::{BoundingBox, Point};

/// Default world width for a freshly created document.
pub const DEFAULT_WORLD_WIDTH: f64 = 800.0;

/// Default world height for a freshly created document.
pub const DEFAULT_WORLD_HEIGHT: f64 = 600.0;

/// Geometry kind of an area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeType {
    /// The bounding box is the shape.
    #[default]
    Rectangle,
    /// The `points` list is the shape; the bounding box encloses it.
    Polygon,
}

/// What happens when a player interacts with an area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    /// Decorative or informational only.
    #[default]
    None,
    /// Blocks movement.
    Impassable,
    /// Video room.
    Jitsi,
    /// Shows an alert.
    Alert,
    /// Opens a link.
    Url,
    /// Opens a modal dialog.
    Modal,
    /// Grants an item.
    Collectible,
    /// Toggles a target.
    Switch,
}

impl ActionType {
    /// Wire name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ActionType::None => "none",
            ActionType::Impassable => "impassable",
            ActionType::Jitsi => "jitsi",
            ActionType::Alert => "alert",
            ActionType::Url => "url",
            ActionType::Modal => "modal",
            ActionType::Collectible => "collectible",
            ActionType::Switch => "switch",
        }
    }
}

/// World extent in world units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldDimensions {
    /// Width
    pub width: f64,
    /// Height
    pub height: f64,
}

impl Default for WorldDimensions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WORLD_WIDTH,
            height: DEFAULT_WORLD_HEIGHT,
        }
    }
}

/// A named region with an associated action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveArea {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Rectangle or polygon
    #[serde(default)]
    pub shape_type: ShapeType,
    /// Bounding box (x, y, width, height at the top level of the record)
    #[serde(flatten)]
    pub bounds: BoundingBox,
    /// Polygon vertices; only meaningful for `ShapeType::Polygon`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
    /// Action kind
    #[serde(default)]
    pub action_type: ActionType,
    /// Action settings; shape depends on `action_type`
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub action_config: serde_json::Value,
    /// Optional free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Optional display colour
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl InteractiveArea {
    /// Rectangular area with no action.
    pub fn rectangle(id: impl Into<String>, name: impl Into<String>, bounds: BoundingBox) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            shape_type: ShapeType::Rectangle,
            bounds,
            points: Vec::new(),
            action_type: ActionType::None,
            action_config: serde_json::Value::Null,
            description: None,
            color: None,
        }
    }

    /// Polygon area with no action. The bounding box is derived from the points.
    pub fn polygon(id: impl Into<String>, name: impl Into<String>, points: Vec<Point>) -> Self {
        let bounds = BoundingBox::from_points(&points).unwrap_or_default();
        Self {
            shape_type: ShapeType::Polygon,
            points,
            ..Self::rectangle(id, name, bounds)
        }
    }

    /// Attach an action.
    pub fn with_action(
        mut self,
        action_type: ActionType,
        action_config: serde_json::Value,
    ) -> Self {
        self.action_type = action_type;
        self.action_config = action_config;
        self
    }

    /// Polygon vertices if this is a polygon with at least three of them.
    pub fn polygon_points(&self) -> Option<&[Point]> {
        polygon_points(self.shape_type, &self.points)
    }

    /// True if this area blocks movement.
    #[inline]
    pub fn is_impassable(&self) -> bool {
        self.action_type == ActionType::Impassable
    }
}

/// Deprecated stand-alone impassable region.
///
/// Equivalent to an `InteractiveArea` with `ActionType::Impassable`; kept for
/// documents written before actions existed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyImpassableArea {
    /// Unique identifier
    pub id: String,
    /// Rectangle or polygon
    #[serde(rename = "type", default)]
    pub kind: ShapeType,
    /// Bounding box
    #[serde(flatten)]
    pub bounds: BoundingBox,
    /// Polygon vertices
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl LegacyImpassableArea {
    /// Polygon vertices if this is a polygon with at least three of them.
    pub fn polygon_points(&self) -> Option<&[Point]> {
        polygon_points(self.kind, &self.points)
    }
}

fn polygon_points(kind: ShapeType, points: &[Point]) -> Option<&[Point]> {
    (kind == ShapeType::Polygon && points.len() >= 3).then_some(points)
}

/// Reference to an asset used by the map (tiles, sprites, background).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    /// Unique identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Location of the asset data
    pub url: String,
    /// Optional asset kind ("image", "tileset", ...)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// A region that blocks movement, from either area list.
#[derive(Clone, Copy, Debug)]
pub struct BlockingRegion<'a> {
    /// Area identifier
    pub id: &'a str,
    /// Bounding box
    pub bounds: BoundingBox,
    /// Declared geometry kind
    pub kind: ShapeType,
    /// Polygon vertices, `None` unless a polygon with at least three points
    pub polygon: Option<&'a [Point]>,
}

/// The root map document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapData {
    /// Incremented by one on every accepted mutation
    pub version: u64,
    /// Time of the last accepted mutation
    pub last_modified: DateTime<Utc>,
    /// World extent
    pub world_dimensions: WorldDimensions,
    /// Interactive areas
    #[serde(deserialize_with = "deserialize_lenient")]
    pub interactive_areas: Vec<InteractiveArea>,
    /// Deprecated impassable areas
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub impassable_areas: Vec<LegacyImpassableArea>,
    /// Asset references
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub assets: Vec<AssetRef>,
    /// Background image location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
}

impl MapData {
    /// Empty document at version 0.
    pub fn empty(world_dimensions: WorldDimensions) -> Self {
        Self {
            version: 0,
            last_modified: Utc::now(),
            world_dimensions,
            interactive_areas: Vec::new(),
            impassable_areas: Vec::new(),
            assets: Vec::new(),
            background_image: None,
        }
    }

    /// Look up an interactive area by id.
    pub fn interactive_area(&self, id: &str) -> Option<&InteractiveArea> {
        self.interactive_areas.iter().find(|a| a.id == id)
    }

    /// Union of impassable interactive areas and legacy impassable areas.
    pub fn blocking_regions(&self) -> impl Iterator<Item = BlockingRegion<'_>> {
        let interactive = self
            .interactive_areas
            .iter()
            .filter(|a| a.is_impassable())
            .map(|a| BlockingRegion {
                id: &a.id,
                bounds: a.bounds,
                kind: a.shape_type,
                polygon: a.polygon_points(),
            });
        let legacy = self.impassable_areas.iter().map(|a| BlockingRegion {
            id: &a.id,
            bounds: a.bounds,
            kind: a.kind,
            polygon: a.polygon_points(),
        });
        interactive.chain(legacy)
    }

    /// Serialize to compact JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Default for MapData {
    fn default() -> Self {
        Self::empty(WorldDimensions::default())
    }
}

/// Shallow update for a map document. Only present fields replace the
/// corresponding top-level field; lists are replaced whole.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapDataPatch {
    /// New world extent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_dimensions: Option<WorldDimensions>,
    /// Replacement interactive area list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactive_areas: Option<Vec<InteractiveArea>>,
    /// Replacement legacy impassable list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impassable_areas: Option<Vec<LegacyImpassableArea>>,
    /// Replacement asset list
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<Vec<AssetRef>>,
    /// New background image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_image: Option<String>,
}

impl MapDataPatch {
    /// Merge onto `base`. Version and timestamp are left for the caller.
    pub fn apply_to(self, base: &MapData) -> MapData {
        MapData {
            version: base.version,
            last_modified: base.last_modified,
            world_dimensions: self.world_dimensions.unwrap_or(base.world_dimensions),
            interactive_areas: self
                .interactive_areas
                .unwrap_or_else(|| base.interactive_areas.clone()),
            impassable_areas: self
                .impassable_areas
                .unwrap_or_else(|| base.impassable_areas.clone()),
            assets: self.assets.unwrap_or_else(|| base.assets.clone()),
            background_image: self.background_image.or_else(|| base.background_image.clone()),
        }
    }
}

/// Deserialize a list, dropping records that fail to parse.
///
/// One malformed area must not make the whole document unreadable.
fn deserialize_lenient<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw: Vec<serde_json::Value> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .enumerate()
        .filter_map(|(index, value)| match serde_json::from_value::<T>(value) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(index, error = %e, "skipping malformed map record");
                None
            }
        })
        .collect())
}
