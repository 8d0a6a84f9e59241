//! Configuration
//!
//! Runtime settings with defaults, overridable from `AREA_SYNC_*`
//! environment variables. Unparseable values fall back to the default.

use std::path::PathBuf;
use std::time::Duration;

use crate::actions::dispatcher::DEFAULT_ROOM_PREFIX;
use crate::collision::engine::DEFAULT_PLAYER_SIZE;
use crate::map::model::WorldDimensions;

/// Durable key holding the map document.
pub const DEFAULT_STORAGE_KEY: &str = "interactive_map_data";

/// Default debounce window for sync passes.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Default minimum spacing between completed sync passes.
pub const DEFAULT_RATE_FLOOR_MS: u64 = 50;

/// Parse an environment variable, falling back to `default` when the
/// variable is missing or does not parse.
pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Sync pipeline timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period before a scheduled pass runs (ms).
    pub debounce_ms: u64,
    /// Minimum spacing between completed passes (ms).
    pub rate_floor_ms: u64,
}

impl SyncConfig {
    /// Debounce window.
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Rate floor.
    pub fn rate_floor(&self) -> Duration {
        Duration::from_millis(self.rate_floor_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            rate_floor_ms: DEFAULT_RATE_FLOOR_MS,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    /// Durable key of the map document.
    pub storage_key: String,
    /// Directory for file-backed storage.
    pub data_dir: PathBuf,
    /// Sync timing.
    pub sync: SyncConfig,
    /// Player box side length for blocking checks.
    pub player_size: f64,
    /// World extent of a freshly created document.
    pub world: WorldDimensions,
    /// Namespace token for derived video room names.
    pub jitsi_prefix: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            data_dir: std::env::temp_dir().join("area-sync"),
            sync: SyncConfig::default(),
            player_size: DEFAULT_PLAYER_SIZE,
            world: WorldDimensions::default(),
            jitsi_prefix: DEFAULT_ROOM_PREFIX.to_string(),
        }
    }
}

impl CoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            storage_key: std::env::var("AREA_SYNC_STORAGE_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty())
                .unwrap_or(defaults.storage_key),
            data_dir: std::env::var("AREA_SYNC_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            sync: SyncConfig {
                debounce_ms: env_parse("AREA_SYNC_DEBOUNCE_MS", defaults.sync.debounce_ms),
                rate_floor_ms: env_parse("AREA_SYNC_RATE_FLOOR_MS", defaults.sync.rate_floor_ms),
            },
            player_size: env_parse("AREA_SYNC_PLAYER_SIZE", defaults.player_size),
            world: WorldDimensions {
                width: env_parse("AREA_SYNC_WORLD_WIDTH", defaults.world.width),
                height: env_parse("AREA_SYNC_WORLD_HEIGHT", defaults.world.height),
            },
            jitsi_prefix: std::env::var("AREA_SYNC_JITSI_PREFIX").unwrap_or(defaults.jitsi_prefix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.storage_key, "interactive_map_data");
        assert_eq!(config.sync.debounce(), Duration::from_millis(100));
        assert_eq!(config.sync.rate_floor(), Duration::from_millis(50));
        assert_eq!(config.player_size, 32.0);
        assert_eq!(config.world, WorldDimensions { width: 800.0, height: 600.0 });
        assert_eq!(config.jitsi_prefix, "stargety");
    }

    #[test]
    fn test_env_parse_missing_returns_default() {
        let val: u64 = env_parse("__AREA_SYNC_TEST_MISSING__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_parse_valid_and_invalid() {
        std::env::set_var("__AREA_SYNC_TEST_VALID__", "250");
        assert_eq!(env_parse::<u64>("__AREA_SYNC_TEST_VALID__", 0), 250);
        std::env::remove_var("__AREA_SYNC_TEST_VALID__");

        std::env::set_var("__AREA_SYNC_TEST_INVALID__", "soon");
        assert_eq!(env_parse::<u64>("__AREA_SYNC_TEST_INVALID__", 7), 7);
        std::env::remove_var("__AREA_SYNC_TEST_INVALID__");
    }
}
