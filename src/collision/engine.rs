//! Collision Engine
//!
//! Per-tick collision queries against the current map snapshot.
//!
//! Two queries with deliberately different precision:
//! - Blocking ([`CollisionEngine::check_collision_with_impassable_areas`]):
//!   AABB pre-filter, then a 5-sample polygon test for polygon regions.
//! - Occupancy ([`CollisionEngine::check_area_collisions`]): bounding-box
//!   containment only, driving the `Idle` / `InArea(id)` state machine that
//!   emits `area-exited` and `area-entered`.
//!
//! The 5-sample test (4 corners + centre) is an approximation. A fast player
//! can tunnel through a thin polygon between ticks, and a polygon spike can
//! poke into the player box without covering any sample point. Occupancy has
//! no hysteresis: a point sitting exactly on a boundary may flicker.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::core::geometry::{point_in_polygon, BoundingBox, Point};
use crate::map::bus::EventBus;
use crate::map::events::MapEvent;
use crate::map::model::{BlockingRegion, MapData, ShapeType};
use crate::map::store::MapStateStore;

/// Default player box side length.
pub const DEFAULT_PLAYER_SIZE: f64 = 32.0;

/// Read access to the current map snapshot.
pub trait MapSource: Send + Sync {
    /// Current document, `None` if nothing is loaded.
    fn snapshot(&self) -> Option<Arc<MapData>>;
}

impl MapSource for MapStateStore {
    fn snapshot(&self) -> Option<Arc<MapData>> {
        self.get_map_data()
    }
}

/// A map that never changes.
#[derive(Clone, Debug)]
pub struct FixedMap(pub Arc<MapData>);

impl MapSource for FixedMap {
    fn snapshot(&self) -> Option<Arc<MapData>> {
        Some(Arc::clone(&self.0))
    }
}

/// Whether enter/exit events are currently suppressed (e.g. a modal is open).
pub trait InteractionGate: Send + Sync {
    /// True while enter/exit events must not fire.
    fn is_blocked(&self) -> bool;
}

impl<F> InteractionGate for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_blocked(&self) -> bool {
        self()
    }
}

/// Gate that never blocks.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenGate;

impl InteractionGate for OpenGate {
    fn is_blocked(&self) -> bool {
        false
    }
}

/// Occupancy of the tracked point.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OccupancyState {
    /// Area containing the point at the last check
    pub current_area: Option<String>,
    /// Area occupied before the last transition
    pub previous_area: Option<String>,
}

/// Test the player box against a polygon by sampling its four corners and
/// its centre.
pub fn check_polygon_collision(
    polygon: &[Point],
    player_left: f64,
    player_right: f64,
    player_top: f64,
    player_bottom: f64,
) -> bool {
    let samples = [
        Point::new(player_left, player_top),
        Point::new(player_right, player_top),
        Point::new(player_left, player_bottom),
        Point::new(player_right, player_bottom),
        Point::new((player_left + player_right) / 2.0, (player_top + player_bottom) / 2.0),
    ];
    samples.iter().any(|&p| point_in_polygon(p, polygon))
}

fn region_blocks(region: &BlockingRegion<'_>, player: &BoundingBox) -> bool {
    if !region.bounds.is_well_formed() {
        debug!(area = region.id, "skipping region with malformed bounds");
        return false;
    }
    if !region.bounds.overlaps(player) {
        return false;
    }
    match region.kind {
        ShapeType::Rectangle => true,
        ShapeType::Polygon => {
            let Some(points) = region.polygon.filter(|pts| pts.iter().all(|p| p.is_finite())) else {
                debug!(area = region.id, "skipping malformed polygon region");
                return false;
            };
            check_polygon_collision(
                points,
                player.left(),
                player.right(),
                player.top(),
                player.bottom(),
            )
        }
    }
}

/// Collision queries and occupancy tracking for one moving point.
pub struct CollisionEngine {
    source: Arc<dyn MapSource>,
    bus: EventBus,
    gate: Arc<dyn InteractionGate>,
    player_size: f64,
    occupancy: Mutex<OccupancyState>,
}

impl CollisionEngine {
    /// Engine reading `source`, emitting transitions on `bus`, consulting
    /// `gate` before each emission.
    pub fn new(source: Arc<dyn MapSource>, bus: EventBus, gate: Arc<dyn InteractionGate>) -> Self {
        Self {
            source,
            bus,
            gate,
            player_size: DEFAULT_PLAYER_SIZE,
            occupancy: Mutex::new(OccupancyState::default()),
        }
    }

    /// Engine over a store, emitting on the store's bus.
    pub fn for_store(store: Arc<MapStateStore>, gate: Arc<dyn InteractionGate>) -> Self {
        let bus = store.bus().clone();
        Self::new(store, bus, gate)
    }

    /// Player box size used by [`check_player`](Self::check_player).
    pub fn with_player_size(mut self, size: f64) -> Self {
        self.player_size = size;
        self
    }

    fn occupancy(&self) -> MutexGuard<'_, OccupancyState> {
        self.occupancy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Even-odd point-in-polygon; boundary points count as inside.
    #[inline]
    pub fn is_point_in_polygon(point: Point, polygon: &[Point]) -> bool {
        point_in_polygon(point, polygon)
    }

    /// True if a `size`-sided box centred on `(x, y)` hits any impassable
    /// region. Malformed regions are skipped.
    pub fn check_collision_with_impassable_areas(&self, x: f64, y: f64, size: f64) -> bool {
        let Some(map) = self.source.snapshot() else {
            return false;
        };
        let player = BoundingBox::centered(Point::new(x, y), size);
        let hit = map.blocking_regions().find(|region| region_blocks(region, &player));

        #[cfg(feature = "debug-tracing")]
        trace!(x, y, size, hit = hit.map(|r| r.id), "impassable check");

        hit.is_some()
    }

    /// Blocking check with the configured player size.
    pub fn check_player(&self, x: f64, y: f64) -> bool {
        self.check_collision_with_impassable_areas(x, y, self.player_size)
    }

    /// Update occupancy for `point` and emit exit/enter events on a change.
    ///
    /// Containment uses each area's bounding box. When areas overlap, the
    /// last match in document order wins. State is updated even while the
    /// gate is blocked; only the events are suppressed.
    pub fn check_area_collisions(&self, point: Point) -> Option<String> {
        let map = self.source.snapshot();
        let inside = map
            .as_deref()
            .and_then(|m| {
                m.interactive_areas
                    .iter()
                    .rev()
                    .find(|a| a.bounds.contains_point(point))
            })
            .map(|a| a.id.clone());

        #[cfg(feature = "debug-tracing")]
        trace!(x = point.x, y = point.y, area = ?inside, "occupancy check");

        let left = {
            let mut occupancy = self.occupancy();
            if occupancy.current_area == inside {
                return inside;
            }
            let left = occupancy.current_area.take();
            occupancy.previous_area = left.clone();
            occupancy.current_area = inside.clone();
            left
        };

        if self.gate.is_blocked() {
            debug!(from = ?left, to = ?inside, "area transition while interactions blocked");
            return inside;
        }

        let name_of = |id: &str| {
            map.as_deref()
                .and_then(|m| m.interactive_area(id))
                .map_or_else(|| id.to_string(), |a| a.name.clone())
        };

        if let Some(id) = left {
            debug!(area = %id, "area exited");
            self.bus.emit(MapEvent::AreaExited {
                area_name: name_of(&id),
                area_id: id,
            });
        }
        if let Some(id) = &inside {
            debug!(area = %id, "area entered");
            self.bus.emit(MapEvent::AreaEntered {
                area_id: id.clone(),
                area_name: name_of(id),
                room_id: id.clone(),
            });
        }
        inside
    }

    /// Area containing the point at the last check.
    pub fn current_area(&self) -> Option<String> {
        self.occupancy().current_area.clone()
    }

    /// Area occupied before the last transition.
    pub fn previous_area(&self) -> Option<String> {
        self.occupancy().previous_area.clone()
    }

    /// Forget occupancy without emitting events.
    pub fn reset_area_tracking(&self) {
        *self.occupancy() = OccupancyState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::events::EventKind;
    use crate::map::model::{ActionType, InteractiveArea, LegacyImpassableArea};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn recorder(bus: &EventBus) -> Arc<Mutex<Vec<MapEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::AreaEntered, EventKind::AreaExited] {
            let e = events.clone();
            bus.on(kind, move |event| e.lock().unwrap().push(event.clone()));
        }
        events
    }

    fn rect_area(id: &str, x: f64, y: f64, w: f64, h: f64) -> InteractiveArea {
        InteractiveArea::rectangle(id, format!("Area {id}"), BoundingBox::new(x, y, w, h))
    }

    fn engine_with(map: MapData) -> (CollisionEngine, Arc<Mutex<Vec<MapEvent>>>) {
        let bus = EventBus::new();
        let events = recorder(&bus);
        let source = Arc::new(FixedMap(Arc::new(map)));
        let engine = CollisionEngine::new(source, bus, Arc::new(OpenGate));
        (engine, events)
    }

    #[test]
    fn test_rectangle_impassable() {
        let mut map = MapData::default();
        let block = rect_area("block", 100.0, 100.0, 100.0, 100.0)
            .with_action(ActionType::Impassable, serde_json::Value::Null);
        map.interactive_areas.push(block);
        let (engine, _) = engine_with(map);

        assert!(engine.check_collision_with_impassable_areas(150.0, 150.0, 32.0));
        assert!(!engine.check_collision_with_impassable_areas(50.0, 50.0, 32.0));
        // Touching edges do not overlap
        assert!(!engine.check_collision_with_impassable_areas(84.0, 150.0, 32.0));
        assert!(engine.check_player(190.0, 190.0));
    }

    #[test]
    fn test_non_impassable_areas_do_not_block() {
        let mut map = MapData::default();
        map.interactive_areas.push(rect_area("room", 100.0, 100.0, 100.0, 100.0));
        let (engine, _) = engine_with(map);
        assert!(!engine.check_collision_with_impassable_areas(150.0, 150.0, 32.0));
    }

    #[test]
    fn test_polygon_impassable_is_precise() {
        // Right triangle filling the lower-left half of (100,100)-(200,200).
        let triangle = vec![
            Point::new(100.0, 100.0),
            Point::new(100.0, 200.0),
            Point::new(200.0, 200.0),
        ];
        let mut map = MapData::default();
        map.impassable_areas.push(LegacyImpassableArea {
            id: "tri".into(),
            kind: ShapeType::Polygon,
            bounds: BoundingBox::from_points(&triangle).unwrap(),
            points: triangle,
            name: None,
        });
        let (engine, _) = engine_with(map);

        assert!(engine.check_collision_with_impassable_areas(120.0, 180.0, 10.0));
        // Inside the bbox but in the empty upper-right half
        assert!(!engine.check_collision_with_impassable_areas(185.0, 115.0, 10.0));
    }

    #[test]
    fn test_bowtie_region_blocks_inside_lobes() {
        let bowtie = vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(100.0, 0.0),
            Point::new(0.0, 100.0),
        ];
        let mut map = MapData::default();
        map.impassable_areas.push(LegacyImpassableArea {
            id: "bowtie".into(),
            kind: ShapeType::Polygon,
            bounds: BoundingBox::from_points(&bowtie).unwrap(),
            points: bowtie,
            name: None,
        });
        let (engine, _) = engine_with(map);

        assert!(engine.check_collision_with_impassable_areas(10.0, 50.0, 4.0));
        assert!(engine.check_collision_with_impassable_areas(90.0, 50.0, 4.0));
        // Between the lobes, above the crossing
        assert!(!engine.check_collision_with_impassable_areas(50.0, 10.0, 4.0));
    }

    #[test]
    fn test_malformed_regions_skipped() {
        let mut map = MapData::default();
        map.impassable_areas.push(LegacyImpassableArea {
            id: "broken".into(),
            kind: ShapeType::Polygon,
            bounds: BoundingBox::new(0.0, 0.0, 100.0, 100.0),
            points: vec![Point::new(0.0, 0.0)],
            name: None,
        });
        map.impassable_areas.push(LegacyImpassableArea {
            id: "wall".into(),
            kind: ShapeType::Rectangle,
            bounds: BoundingBox::new(0.0, 0.0, 100.0, 100.0),
            points: Vec::new(),
            name: None,
        });
        let (engine, _) = engine_with(map);
        assert!(engine.check_collision_with_impassable_areas(50.0, 50.0, 10.0));
    }

    #[test]
    fn test_no_map_no_collision() {
        let engine = CollisionEngine::new(
            Arc::new(MapStateStore::new(
                Arc::new(crate::map::storage::MemoryStorage::new("map")),
                EventBus::new(),
            )),
            EventBus::new(),
            Arc::new(OpenGate),
        );
        assert!(!engine.check_collision_with_impassable_areas(0.0, 0.0, 32.0));
        assert_eq!(engine.check_area_collisions(Point::new(0.0, 0.0)), None);
    }

    #[test]
    fn test_stationary_ticks_enter_once() {
        let mut map = MapData::default();
        map.interactive_areas.push(rect_area("a", 0.0, 0.0, 100.0, 100.0));
        let (engine, events) = engine_with(map);

        for _ in 0..3 {
            assert_eq!(engine.check_area_collisions(Point::new(50.0, 50.0)).as_deref(), Some("a"));
        }
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            MapEvent::AreaEntered { area_id, area_name, room_id }
                if area_id == "a" && area_name == "Area a" && room_id == "a"
        ));
    }

    #[test]
    fn test_move_between_areas() {
        let mut map = MapData::default();
        map.interactive_areas.push(rect_area("a", 0.0, 0.0, 100.0, 100.0));
        map.interactive_areas.push(rect_area("b", 200.0, 0.0, 100.0, 100.0));
        let (engine, events) = engine_with(map);

        engine.check_area_collisions(Point::new(50.0, 50.0));
        events.lock().unwrap().clear();
        engine.check_area_collisions(Point::new(250.0, 50.0));

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], MapEvent::AreaExited { area_id, .. } if area_id == "a"));
        assert!(matches!(&events[1], MapEvent::AreaEntered { area_id, .. } if area_id == "b"));
        assert_eq!(engine.current_area().as_deref(), Some("b"));
        assert_eq!(engine.previous_area().as_deref(), Some("a"));
    }

    #[test]
    fn test_occupancy_uses_bounding_box() {
        let triangle = vec![Point::new(0.0, 0.0), Point::new(0.0, 100.0), Point::new(100.0, 100.0)];
        let mut map = MapData::default();
        map.interactive_areas.push(InteractiveArea::polygon("tri", "Tri", triangle));
        let (engine, _) = engine_with(map);
        // Outside the polygon but inside its box
        assert_eq!(engine.check_area_collisions(Point::new(90.0, 10.0)).as_deref(), Some("tri"));
    }

    #[test]
    fn test_overlap_last_match_wins() {
        let mut map = MapData::default();
        map.interactive_areas.push(rect_area("outer", 0.0, 0.0, 200.0, 200.0));
        map.interactive_areas.push(rect_area("inner", 50.0, 50.0, 20.0, 20.0));
        let (engine, _) = engine_with(map);
        assert_eq!(engine.check_area_collisions(Point::new(60.0, 60.0)).as_deref(), Some("inner"));
        assert_eq!(engine.check_area_collisions(Point::new(10.0, 10.0)).as_deref(), Some("outer"));
    }

    #[test]
    fn test_blocked_gate_updates_state_silently() {
        let mut map = MapData::default();
        map.interactive_areas.push(rect_area("a", 0.0, 0.0, 100.0, 100.0));
        let bus = EventBus::new();
        let events = recorder(&bus);
        let blocked = Arc::new(AtomicBool::new(true));
        let flag = blocked.clone();
        let engine = CollisionEngine::new(
            Arc::new(FixedMap(Arc::new(map))),
            bus,
            Arc::new(move || flag.load(Ordering::SeqCst)),
        );

        engine.check_area_collisions(Point::new(50.0, 50.0));
        assert_eq!(engine.current_area().as_deref(), Some("a"));
        assert!(events.lock().unwrap().is_empty());

        // Already inside once unblocked: no late enter event
        blocked.store(false, Ordering::SeqCst);
        engine.check_area_collisions(Point::new(50.0, 50.0));
        assert!(events.lock().unwrap().is_empty());

        engine.check_area_collisions(Point::new(500.0, 500.0));
        assert_eq!(events.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_area_tracking() {
        let mut map = MapData::default();
        map.interactive_areas.push(rect_area("a", 0.0, 0.0, 100.0, 100.0));
        let (engine, events) = engine_with(map);

        engine.check_area_collisions(Point::new(50.0, 50.0));
        engine.reset_area_tracking();
        assert_eq!(engine.current_area(), None);
        assert_eq!(engine.previous_area(), None);
        assert_eq!(events.lock().unwrap().len(), 1);

        // Re-entering after a reset fires again
        engine.check_area_collisions(Point::new(50.0, 50.0));
        assert_eq!(events.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_exit_name_falls_back_to_id() {
        let store = Arc::new(MapStateStore::new(
            Arc::new(crate::map::storage::MemoryStorage::new("map")),
            EventBus::new(),
        ));
        store.add_interactive_area(rect_area("a", 0.0, 0.0, 100.0, 100.0)).unwrap();
        let events = recorder(store.bus());
        let engine = CollisionEngine::for_store(store.clone(), Arc::new(OpenGate));

        engine.check_area_collisions(Point::new(50.0, 50.0));
        store.remove_interactive_area("a").unwrap();
        engine.check_area_collisions(Point::new(50.0, 50.0));

        let events = events.lock().unwrap();
        assert!(matches!(&events[1], MapEvent::AreaExited { area_name, .. } if area_name == "a"));
    }

    #[test]
    fn test_polygon_sampling() {
        let square = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        assert!(check_polygon_collision(&square, 8.0, 12.0, 8.0, 12.0));
        assert!(check_polygon_collision(&square, 2.0, 4.0, 2.0, 4.0));
        assert!(!check_polygon_collision(&square, 20.0, 30.0, 20.0, 30.0));
        // Box engulfing the polygon: only the centre sample lands inside
        assert!(check_polygon_collision(&square, -10.0, 20.0, -10.0, 20.0));
    }
}
