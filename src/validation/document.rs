//! Document Validation
//!
//! Two checks on whole map documents:
//! - [`validate_map_data`]: invariants of a typed document (ids, boxes,
//!   polygon containment). Run by the store before every commit.
//! - [`validate_document_shape`]: structural check of a raw JSON document.
//!   Run by the sync pipeline on every candidate, local or cross-tab.

use std::collections::HashSet;

use chrono::DateTime;
use serde_json::Value;

use crate::core::geometry::{BoundingBox, Point};
use crate::map::model::{MapData, ShapeType};

/// Slack allowed when checking that polygon vertices sit inside their box.
const CONTAINMENT_TOLERANCE: f64 = 1e-6;

/// Check the invariants of a typed document. Returns every violation found.
pub fn validate_map_data(data: &MapData) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();

    let world = data.world_dimensions;
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !(positive(world.width) && positive(world.height)) {
        errors.push(format!(
            "world dimensions {}x{} must be finite and positive",
            world.width, world.height
        ));
    }

    let mut seen = HashSet::new();
    for area in &data.interactive_areas {
        check_region(
            &mut errors,
            "interactive area",
            &area.id,
            &mut seen,
            area.shape_type,
            &area.bounds,
            &area.points,
        );
    }

    seen.clear();
    for area in &data.impassable_areas {
        check_region(
            &mut errors,
            "impassable area",
            &area.id,
            &mut seen,
            area.kind,
            &area.bounds,
            &area.points,
        );
    }

    seen.clear();
    for asset in &data.assets {
        if asset.id.is_empty() {
            errors.push("asset has an empty id".to_string());
        } else if !seen.insert(asset.id.as_str()) {
            errors.push(format!("duplicate asset id '{}'", asset.id));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_region<'a>(
    errors: &mut Vec<String>,
    label: &str,
    id: &'a str,
    seen: &mut HashSet<&'a str>,
    kind: ShapeType,
    bounds: &BoundingBox,
    points: &[Point],
) {
    if id.is_empty() {
        errors.push(format!("{label} has an empty id"));
    } else if !seen.insert(id) {
        errors.push(format!("duplicate {label} id '{id}'"));
    }

    if !bounds.is_well_formed() {
        errors.push(format!(
            "{label} '{id}' has a malformed bounding box ({}, {}, {}, {})",
            bounds.x, bounds.y, bounds.width, bounds.height
        ));
        return;
    }

    if kind == ShapeType::Polygon {
        if points.len() < 3 {
            errors.push(format!(
                "{label} '{id}' polygon needs at least 3 points (found {})",
                points.len()
            ));
        } else if !points.iter().all(|p| p.is_finite()) {
            errors.push(format!("{label} '{id}' has a non-finite polygon point"));
        } else if !bounds.contains_points(points, CONTAINMENT_TOLERANCE) {
            errors.push(format!("{label} '{id}' bounding box does not contain all polygon points"));
        }
    }
}

/// Structural check of a raw document: required arrays, numeric world
/// dimensions and version, and an RFC 3339 `lastModified`.
pub fn validate_document_shape(document: &Value) -> Result<(), String> {
    let Some(object) = document.as_object() else {
        return Err("document is not a JSON object".to_string());
    };

    for key in ["interactiveAreas", "impassableAreas"] {
        match object.get(key) {
            Some(Value::Array(_)) => {}
            Some(_) => return Err(format!("{key} must be an array")),
            None => return Err(format!("missing required array {key}")),
        }
    }
    if let Some(assets) = object.get("assets") {
        if !assets.is_array() {
            return Err("assets must be an array".to_string());
        }
    }

    let world = object
        .get("worldDimensions")
        .ok_or_else(|| "missing worldDimensions".to_string())?;
    for key in ["width", "height"] {
        if !world.get(key).is_some_and(Value::is_number) {
            return Err(format!("worldDimensions.{key} must be a number"));
        }
    }

    if !object.get("version").is_some_and(Value::is_number) {
        return Err("version must be a number".to_string());
    }

    let stamp = object
        .get("lastModified")
        .and_then(Value::as_str)
        .ok_or_else(|| "lastModified must be a timestamp string".to_string())?;
    DateTime::parse_from_rfc3339(stamp)
        .map_err(|e| format!("lastModified '{stamp}' is not a valid timestamp: {e}"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::model::{ActionType, InteractiveArea, LegacyImpassableArea, WorldDimensions};
    use serde_json::json;

    fn valid_doc() -> Value {
        json!({
            "version": 4,
            "lastModified": "2024-05-01T12:00:00Z",
            "worldDimensions": {"width": 800, "height": 600},
            "interactiveAreas": [],
            "impassableAreas": [],
            "assets": []
        })
    }

    #[test]
    fn test_default_document_is_valid() {
        assert!(validate_map_data(&MapData::default()).is_ok());
        let value = serde_json::to_value(MapData::default()).unwrap();
        assert!(validate_document_shape(&value).is_ok());
    }

    #[test]
    fn test_duplicate_ids() {
        let mut data = MapData::default();
        let area = InteractiveArea::rectangle("a", "A", BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        data.interactive_areas.push(area.clone());
        data.interactive_areas.push(area);
        let errors = validate_map_data(&data).unwrap_err();
        assert_eq!(errors, vec!["duplicate interactive area id 'a'".to_string()]);
    }

    #[test]
    fn test_same_id_across_lists_allowed() {
        let mut data = MapData::default();
        data.interactive_areas
            .push(InteractiveArea::rectangle("a", "A", BoundingBox::new(0.0, 0.0, 10.0, 10.0)));
        data.impassable_areas.push(LegacyImpassableArea {
            id: "a".into(),
            kind: ShapeType::Rectangle,
            bounds: BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            points: Vec::new(),
            name: None,
        });
        assert!(validate_map_data(&data).is_ok());
    }

    #[test]
    fn test_negative_extent_rejected() {
        let mut data = MapData::default();
        data.interactive_areas
            .push(InteractiveArea::rectangle("a", "A", BoundingBox::new(0.0, 0.0, -5.0, 10.0)));
        assert!(validate_map_data(&data).is_err());
    }

    #[test]
    fn test_polygon_outside_box_rejected() {
        let mut area = InteractiveArea::polygon(
            "p",
            "P",
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(5.0, 10.0)],
        )
        .with_action(ActionType::Impassable, Value::Null);
        assert!(validate_map_data(&MapData {
            interactive_areas: vec![area.clone()],
            ..MapData::default()
        })
        .is_ok());

        area.bounds.width = 4.0;
        let errors = validate_map_data(&MapData {
            interactive_areas: vec![area],
            ..MapData::default()
        })
        .unwrap_err();
        assert!(errors[0].contains("does not contain"));
    }

    #[test]
    fn test_bad_world_dimensions() {
        let data = MapData::empty(WorldDimensions { width: 0.0, height: 600.0 });
        assert!(validate_map_data(&data).is_err());
    }

    #[test]
    fn test_document_shape_checks() {
        assert!(validate_document_shape(&valid_doc()).is_ok());
        assert!(validate_document_shape(&json!([])).is_err());

        let mut doc = valid_doc();
        doc.as_object_mut().unwrap().remove("impassableAreas");
        assert_eq!(
            validate_document_shape(&doc).unwrap_err(),
            "missing required array impassableAreas"
        );

        let mut doc = valid_doc();
        doc["worldDimensions"]["width"] = json!("wide");
        assert!(validate_document_shape(&doc).unwrap_err().contains("width"));

        let mut doc = valid_doc();
        doc["version"] = json!("4");
        assert!(validate_document_shape(&doc).is_err());

        let mut doc = valid_doc();
        doc["lastModified"] = json!("yesterday");
        assert!(validate_document_shape(&doc).unwrap_err().contains("lastModified"));

        let mut doc = valid_doc();
        doc["assets"] = json!({});
        assert!(validate_document_shape(&doc).is_err());
    }

    #[test]
    fn test_round_trip_revalidates() {
        let mut data = MapData::default();
        data.version = 12;
        data.interactive_areas.push(InteractiveArea::polygon(
            "p",
            "P",
            vec![Point::new(0.1, 0.2), Point::new(10.3, 0.7), Point::new(5.9, 10.1)],
        ));
        let json = data.to_json().unwrap();
        let back = MapData::from_json(&json).unwrap();
        assert_eq!(back, data);
        assert!(validate_map_data(&back).is_ok());
        assert!(validate_document_shape(&serde_json::from_str(&json).unwrap()).is_ok());
    }
}
