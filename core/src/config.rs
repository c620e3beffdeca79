//! Application configuration.
//!
//! Persisted through confy at the platform config location. Every field
//! has a default so configs written by older builds keep deserializing.

use serde::{Deserialize, Serialize};
use tacmap_types::{MarkerConfig, OverlayWindowConfig};

use crate::geometry::FitPolicy;
use crate::map::FloorResolvePolicy;

pub const APP_NAME: &str = "tacmap";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory the game drops screenshots into.
    pub screenshot_directory: String,
    /// The game's application log file.
    pub log_file: String,
    /// Scan the existing log on startup to recover an in-progress raid.
    /// Off by default: tailing from the end matches "start the companion,
    /// then play".
    pub scan_existing_log: bool,
    /// Log tail poll interval when no new data is available.
    pub poll_interval_ms: u64,
    pub fit: FitPolicy,
    pub floor_resolve: FloorResolvePolicy,
    pub marker: MarkerConfig,
    pub overlay_window: OverlayWindowConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            screenshot_directory: String::new(),
            log_file: String::new(),
            scan_existing_log: false,
            poll_interval_ms: 500,
            fit: FitPolicy::default(),
            floor_resolve: FloorResolvePolicy::default(),
            marker: MarkerConfig::default(),
            overlay_window: OverlayWindowConfig::default(),
        }
    }
}

/// Load the persisted config, falling back to defaults on first run.
pub fn load_config() -> Result<AppConfig, confy::ConfyError> {
    confy::load(APP_NAME, None)
}

pub fn save_config(config: &AppConfig) -> Result<(), confy::ConfyError> {
    confy::store(APP_NAME, None, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.poll_interval_ms, 500);
        assert!(config.fit.robust);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: AppConfig = toml::from_str(
            r#"
log_file = "/games/eft/Logs/application.log"
scan_existing_log = true
floor_resolve = "first_match"
"#,
        )
        .unwrap();
        assert!(config.scan_existing_log);
        assert_eq!(config.log_file, "/games/eft/Logs/application.log");
        assert_eq!(config.floor_resolve, FloorResolvePolicy::FirstMatch);
        assert_eq!(config.marker, MarkerConfig::default());
    }
}
