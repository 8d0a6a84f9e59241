//! Actions
//!
//! Side-effects triggered when a tracked point enters or leaves an area.

pub mod config;
pub mod dispatcher;

pub use config::{jitsi_room_name, ActionConfig};
pub use dispatcher::{entry_effect, exit_effect, ActionDispatcher, AreaLookup, DEFAULT_ROOM_PREFIX};
