//! Shared configuration types for TACMAP.
//!
//! These types cross the boundary between the tracking core and whatever
//! front end renders the marker (overlay window, CLI, debug viewer), so they
//! live in a leaf crate with no dependency on the core itself.

pub mod formatting;

use serde::{Deserialize, Serialize};

/// RGBA color used for marker and overlay styling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Color {
    fn default() -> Self {
        // Opaque orange-red, readable against most map art
        Self::rgba(0xe8, 0x5d, 0x2a, 0xff)
    }
}

/// Appearance of the player marker drawn on the map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkerConfig {
    /// Marker diameter in map-image pixels before zoom is applied.
    pub size_px: f32,
    pub color: Color,
    /// Whether to draw the heading wedge in addition to the dot.
    pub show_heading: bool,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            size_px: 14.0,
            color: Color::default(),
            show_heading: true,
        }
    }
}

/// Geometry and behavior of the floating map window.
///
/// The core never reads these; they are persisted alongside the tracking
/// settings so front ends share one config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayWindowConfig {
    pub enabled: bool,
    pub width: u32,
    pub height: u32,
    pub pos_x: i32,
    pub pos_y: i32,
    /// Window opacity in `0.0..=1.0`.
    pub opacity: f32,
    /// Locked windows are click-through.
    pub locked: bool,
    pub always_on_top: bool,
    pub toggle_hotkey: String,
    pub zoom: f32,
    pub center_on_player: bool,
}

impl Default for OverlayWindowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            width: 400,
            height: 400,
            pos_x: 100,
            pos_y: 100,
            opacity: 0.8,
            locked: false,
            always_on_top: true,
            toggle_hotkey: "F5".to_string(),
            zoom: 1.0,
            center_on_player: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_config_toml_round_trip() {
        let config = MarkerConfig {
            size_px: 20.0,
            color: Color::rgba(10, 20, 30, 200),
            show_heading: false,
        };

        let serialized = toml::to_string(&config).unwrap();
        let restored: MarkerConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_overlay_window_defaults_from_empty_toml() {
        // Older config files may omit the whole table; every field defaults.
        let config: OverlayWindowConfig = toml::from_str("").unwrap();
        assert_eq!(config, OverlayWindowConfig::default());
        assert_eq!(config.toggle_hotkey, "F5");
    }

    #[test]
    fn test_partial_overlay_window_toml() {
        let config: OverlayWindowConfig = toml::from_str("zoom = 2.5\nlocked = true").unwrap();
        assert_eq!(config.zoom, 2.5);
        assert!(config.locked);
        assert_eq!(config.width, 400);
    }
}
