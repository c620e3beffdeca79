//! Signals emitted by the position tracker for downstream consumers.
//!
//! These are the outbound contract: the overlay renderer (or any other
//! subscriber) sees raid lifecycle and ready-to-render marker placements,
//! never raw log lines or filenames. Serializable so front ends can consume
//! them as JSON lines across a process boundary.

use serde::{Deserialize, Serialize};

use crate::map::Position3D;

/// A marker placement ready for rendering. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionUpdate {
    pub game_position: Position3D,
    /// Heading around the vertical axis, radians; marker orientation only.
    pub yaw_rad: f64,
    pub map_id: String,
    /// Which floor image to show the marker on.
    pub layer_id: i32,
    /// Pixel coordinates on that floor's image.
    pub map_pixel: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrackerSignal {
    /// A raid session opened. `map_id` is present when the match
    /// announcement already carried the location.
    RaidStarted {
        session_id: u64,
        map_id: Option<String>,
    },
    /// The active session's map became known after the raid started.
    MapResolved { session_id: u64, map_id: String },
    PositionUpdated(PositionUpdate),
    RaidEnded { session_id: u64 },
}
