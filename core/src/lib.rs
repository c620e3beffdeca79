//! TACMAP core: position tracking for the tactical-map overlay.
//!
//! The game never exposes the player's position directly; it leaks it
//! through screenshot filenames and a verbose application log. This crate
//! turns those two passive sources into calibrated map-pixel positions:
//!
//! ```text
//! watchers -> event queue -> PositionTracker -> (MapRegistry + geometry) -> signals
//! ```
//!
//! Rendering, window chrome, and hotkeys live in front-end crates; the
//! core publishes [`events::TrackerSignal`]s and exposes the calibration
//! control surface on [`watch::Pipeline`].

pub mod config;
pub mod events;
pub mod game_log;
pub mod geometry;
pub mod map;
pub mod reader;
pub mod screenshot;
pub mod tracker;
pub mod watch;

// Re-exports for convenience
pub use events::{PositionUpdate, SignalHandler, TrackerSignal};
pub use geometry::{AffineTransform, FitPolicy, GeometryError};
pub use map::{CalibrationPoint, MapConfig, MapLayer, MapRegistry, Position3D};
pub use tracker::{PositionTracker, RaidSession, TrackerEvent, TrackerState};
pub use watch::Pipeline;
