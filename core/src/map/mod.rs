//! Multi-floor map data model.
//!
//! Each game level ([`MapConfig`]) holds an ordered set of floor layers.
//! A layer owns its calibration points and caches the fitted transform;
//! the cache is invalidated by any calibration mutation and rebuilt lazily
//! on the next resolve.

mod registry;
pub mod store;

pub use registry::{CalibrationError, FloorResolvePolicy, MapRegistry, ResolvedLayer};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::geometry::{self, AffineTransform, FitPolicy, GeometryError, SamplePair};

/// Game-world coordinate. `y` is height/elevation, not latitude; the
/// horizontal plane is `(x, z)`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Horizontal (x,z) distance, ignoring height.
    pub fn plane_distance_to(&self, other: &Position3D) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// One user-supplied world->pixel correspondence. Immutable once created;
/// owned by exactly one layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Layer-scoped id, assigned on insertion, never reused while loaded.
    pub id: u32,
    pub game_position: Position3D,
    pub map_pixel: (f64, f64),
    pub captured_at: NaiveDateTime,
}

/// One floor of a multi-story map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapLayer {
    /// 0 = ground floor, positive = above, negative = below.
    pub id: i32,
    pub display_name: String,
    /// Path or asset key of the floor image; opaque to the core.
    pub image_reference: String,
    /// Explicit height bounds; when unset, bounds derive from the
    /// calibration points' heights.
    pub height_min: Option<f64>,
    pub height_max: Option<f64>,
    pub calibration_points: Vec<CalibrationPoint>,

    #[serde(skip)]
    transform: Option<AffineTransform>,
    #[serde(skip)]
    dirty: bool,
    #[serde(skip)]
    next_point_id: u32,
}

impl MapLayer {
    pub fn new(id: i32, display_name: impl Into<String>, image_reference: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            image_reference: image_reference.into(),
            height_min: None,
            height_max: None,
            calibration_points: Vec::new(),
            transform: None,
            dirty: false,
            next_point_id: 0,
        }
    }

    /// Rebuild the non-persisted counters after deserialization.
    pub(crate) fn rehydrate(&mut self) {
        self.next_point_id = self
            .calibration_points
            .iter()
            .map(|p| p.id + 1)
            .max()
            .unwrap_or(0);
        self.transform = None;
        self.dirty = !self.calibration_points.is_empty();
    }

    /// Effective height range: explicit bounds, else min/max over the
    /// calibration points' heights. `None` with no points and no bounds.
    pub fn effective_bounds(&self) -> Option<(f64, f64)> {
        let derived_min = || {
            self.calibration_points
                .iter()
                .map(|p| p.game_position.y)
                .min_by(f64::total_cmp)
        };
        let derived_max = || {
            self.calibration_points
                .iter()
                .map(|p| p.game_position.y)
                .max_by(f64::total_cmp)
        };
        let min = self.height_min.or_else(derived_min)?;
        let max = self.height_max.or_else(derived_max)?;
        Some((min, max))
    }

    pub fn contains_height(&self, y: f64) -> bool {
        self.effective_bounds()
            .is_some_and(|(min, max)| y >= min && y <= max)
    }

    /// Distance from a height to the midpoint of this layer's range.
    /// Used to break ties between overlapping floors.
    pub fn midpoint_distance(&self, y: f64) -> f64 {
        match self.effective_bounds() {
            Some((min, max)) => (y - (min + max) / 2.0).abs(),
            None => f64::INFINITY,
        }
    }

    /// A layer is calibrated once it has enough points for a transform.
    pub fn is_calibrated(&self) -> bool {
        self.calibration_points.len() >= 3
    }

    /// The cached transform, if fitted and current.
    pub fn transform(&self) -> Option<&AffineTransform> {
        if self.dirty { None } else { self.transform.as_ref() }
    }

    /// A refit is worth attempting only after a mutation; a failed fit is
    /// not retried until the points change again.
    pub(crate) fn needs_refit(&self) -> bool {
        self.dirty && self.is_calibrated()
    }

    pub(crate) fn add_point(
        &mut self,
        game_position: Position3D,
        map_pixel: (f64, f64),
        captured_at: NaiveDateTime,
    ) -> u32 {
        let id = self.next_point_id;
        self.next_point_id += 1;
        self.calibration_points.push(CalibrationPoint {
            id,
            game_position,
            map_pixel,
            captured_at,
        });
        self.invalidate();
        id
    }

    /// Returns false when no point with that id exists.
    pub(crate) fn remove_point(&mut self, point_id: u32) -> bool {
        let before = self.calibration_points.len();
        self.calibration_points.retain(|p| p.id != point_id);
        if self.calibration_points.len() != before {
            self.invalidate();
            true
        } else {
            false
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.dirty = true;
    }

    /// Fit and cache the transform. Clears the cache on failure so callers
    /// see the layer as uncalibrated rather than stale.
    pub(crate) fn refit(&mut self, policy: FitPolicy) -> Result<(), GeometryError> {
        self.dirty = false;
        let samples: Vec<SamplePair> = self
            .calibration_points
            .iter()
            .map(|p| ((p.game_position.x, p.game_position.z), p.map_pixel))
            .collect();
        match geometry::fit_with_policy(&samples, policy) {
            Ok(outcome) => {
                if !outcome.excluded.is_empty() {
                    tracing::debug!(
                        layer = self.id,
                        excluded = ?outcome.excluded,
                        "excluded outlier calibration points from fit"
                    );
                }
                self.transform = Some(outcome.transform);
                Ok(())
            }
            Err(err) => {
                self.transform = None;
                Err(err)
            }
        }
    }
}

/// All floors of one game level, keyed by the level's log identifier
/// (e.g. `bigmap`, `Interchange`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    pub map_id: String,
    pub display_name: String,
    pub layers: Vec<MapLayer>,
}

impl MapConfig {
    pub fn new(map_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            map_id: map_id.into(),
            display_name: display_name.into(),
            layers: Vec::new(),
        }
    }

    pub fn layer(&self, layer_id: i32) -> Option<&MapLayer> {
        self.layers.iter().find(|l| l.id == layer_id)
    }

    pub fn layer_mut(&mut self, layer_id: i32) -> Option<&mut MapLayer> {
        self.layers.iter_mut().find(|l| l.id == layer_id)
    }

    /// Insert keeping layers ordered by id (basement first).
    pub fn add_layer(&mut self, layer: MapLayer) {
        self.layers.push(layer);
        self.layers.sort_by_key(|l| l.id);
    }

    pub fn remove_layer(&mut self, layer_id: i32) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| l.id != layer_id);
        self.layers.len() != before
    }

    pub(crate) fn rehydrate(&mut self) {
        for layer in &mut self.layers {
            layer.rehydrate();
        }
        self.layers.sort_by_key(|l| l.id);
    }
}
