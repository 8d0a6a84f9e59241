//! Area Sync Demo
//!
//! Loads (or seeds) a map document from file storage, wires the sync
//! pipeline, collision engine and action dispatcher together and walks a
//! player across the map.

use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use area_sync::{
    actions::ActionDispatcher,
    collision::{CollisionEngine, OpenGate},
    config::CoreConfig,
    core::geometry::{BoundingBox, Point},
    map::{
        ActionType, EventBus, EventKind, FileStorage, InteractiveArea, MapStateStore, QueuedStorage,
    },
    sync::{LocalBroadcastChannel, SyncOrchestrator},
    validation::{Shape, ShapeCategory},
    VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    let config = CoreConfig::from_env();
    info!("Area Sync v{}", VERSION);
    info!(
        key = %config.storage_key,
        dir = %config.data_dir.display(),
        debounce_ms = config.sync.debounce_ms,
        "configuration loaded"
    );

    let bus = EventBus::new();
    let file = Arc::new(FileStorage::new(&config.data_dir, config.storage_key.clone()));
    let (storage, writer) = QueuedStorage::spawn(file, Some(bus.clone()));
    let channel = LocalBroadcastChannel::default();
    let store = Arc::new(
        MapStateStore::new(Arc::new(storage), bus)
            .with_channel(Arc::new(channel))
            .with_default_world(config.world),
    );
    log_events(&store);

    let sync = SyncOrchestrator::new(store.clone(), config.sync);
    sync.set_error_handler(|error, event| warn!(%event, %error, "sync error reported"));
    sync.start()?;

    match store.load_map_data()? {
        Some(data) => info!(version = data.version, "resuming stored map"),
        None => seed_demo_map(&store)?,
    }

    let dispatcher =
        ActionDispatcher::for_store(store.clone()).with_room_prefix(config.jitsi_prefix.clone());
    dispatcher.start();

    let engine = CollisionEngine::for_store(store.clone(), Arc::new(OpenGate))
        .with_player_size(config.player_size);
    walk_player(&engine);

    store.save_map_data()?;
    tokio::time::sleep(config.sync.debounce() * 2).await;

    dispatcher.stop();
    sync.stop();
    drop((engine, dispatcher, sync, store));
    writer.await.context("persistence writer failed")?;
    info!("done");
    Ok(())
}

/// Trace every event on the bus; payloads go to `debug`.
fn log_events(store: &MapStateStore) {
    for kind in EventKind::ALL {
        store.on(kind, move |event| {
            info!(event = %kind, "event");
            match event.to_json() {
                Ok(payload) => debug!(event = %kind, %payload, "event payload"),
                Err(e) => warn!(event = %kind, error = %e, "unserializable event"),
            }
        });
    }
}

fn seed_demo_map(store: &MapStateStore) -> anyhow::Result<()> {
    info!("seeding demo map");

    let meeting = BoundingBox::new(100.0, 100.0, 200.0, 150.0);
    store.add_interactive_area(
        InteractiveArea::rectangle("meeting-room", "Meeting Room", meeting).with_action(
            ActionType::Jitsi,
            json!({"autoJoinOnEntry": true, "autoLeaveOnExit": true}),
        ),
    )?;
    let board = BoundingBox::new(450.0, 100.0, 120.0, 80.0);
    store.add_interactive_area(
        InteractiveArea::rectangle("notice-board", "Notice Board", board).with_action(
            ActionType::Alert,
            json!({
                "showOnEntry": true,
                "message": "Welcome to the plaza",
                "alertType": "info"
            }),
        ),
    )?;
    store.add_interactive_area(
        InteractiveArea::polygon(
            "fountain",
            "Fountain",
            vec![
                Point::new(360.0, 300.0),
                Point::new(420.0, 330.0),
                Point::new(400.0, 390.0),
                Point::new(330.0, 380.0),
            ],
        )
        .with_action(ActionType::Impassable, serde_json::Value::Null),
    )?;

    let wall = Shape::rectangle(ShapeCategory::Collision, 0.0, 0.0, 800.0, 10.0);
    let report =
        store.commit_shape(&wall, "North Wall", ActionType::None, serde_json::Value::Null)?;
    for warning in report.warnings {
        warn!(%warning, "shape warning");
    }
    Ok(())
}

/// Walk left to right along y = 175, then down through the fountain.
fn walk_player(engine: &CollisionEngine) {
    let mut position = Point::new(40.0, 175.0);
    let route = (0..24)
        .map(|i| Point::new(40.0 + 25.0 * i as f64, 175.0))
        .chain((0..10).map(|i| Point::new(380.0, 200.0 + 20.0 * i as f64)));

    for step in route {
        if engine.check_player(step.x, step.y) {
            info!(x = step.x, y = step.y, "movement blocked");
            continue;
        }
        position = step;
        engine.check_area_collisions(position);
    }
    info!(
        x = position.x,
        y = position.y,
        area = ?engine.current_area(),
        "walk finished"
    );
}
