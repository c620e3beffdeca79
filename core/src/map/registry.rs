//! Process-wide registry of map configurations.
//!
//! The registry is the only long-lived shared mutable state in the core:
//! read on every screenshot by the tracking path, written by explicit
//! calibration actions. Callers wrap it in a lock; the methods themselves
//! are synchronous.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{MapConfig, Position3D};
use crate::geometry::{AffineTransform, FitPolicy, GeometryError};
use crate::map::store::StoreError;

/// How to pick a floor when several height ranges contain the player.
/// Overlaps are legitimate (stairwells), so this is a policy choice, not
/// an error; nearest-midpoint keeps assignment stable near boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloorResolvePolicy {
    #[default]
    NearestMidpoint,
    /// First containing layer in id order (basement upward).
    FirstMatch,
}

/// Errors surfaced synchronously from calibration actions.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("unknown map `{0}`")]
    UnknownMap(String),
    #[error("map `{map_id}` has no layer {layer_id}")]
    UnknownLayer { map_id: String, layer_id: i32 },
    #[error("layer {layer_id} has no calibration point {point_id}")]
    UnknownPoint { layer_id: i32, point_id: u32 },
    #[error("invalid height bounds: min {min} exceeds max {max}")]
    InvalidBounds { min: f64, max: f64 },
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A successful floor resolution: which layer to draw, and the transform
/// to place the marker with. The transform is copied out so the lock on
/// the registry can be released before evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLayer {
    pub layer_id: i32,
    pub transform: AffineTransform,
}

#[derive(Debug, Default)]
pub struct MapRegistry {
    maps: HashMap<String, MapConfig>,
    fit_policy: FitPolicy,
    resolve_policy: FloorResolvePolicy,
}

impl MapRegistry {
    pub fn new(fit_policy: FitPolicy, resolve_policy: FloorResolvePolicy) -> Self {
        Self {
            maps: HashMap::new(),
            fit_policy,
            resolve_policy,
        }
    }

    pub fn insert_map(&mut self, mut config: MapConfig) {
        config.rehydrate();
        self.maps.insert(config.map_id.clone(), config);
    }

    pub fn map(&self, map_id: &str) -> Option<&MapConfig> {
        self.maps.get(map_id)
    }

    pub fn maps(&self) -> impl Iterator<Item = &MapConfig> {
        self.maps.values()
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Pick the floor for a height and hand back its transform.
    ///
    /// `None` is the expected steady-state answer for unknown maps, heights
    /// outside every range, and uncalibrated floors; callers suppress
    /// rendering, they do not treat it as a fault. Dirty layers are refitted
    /// lazily here; fit failures leave the layer uncalibrated.
    pub fn resolve(&mut self, map_id: &str, height: f64) -> Option<ResolvedLayer> {
        let fit_policy = self.fit_policy;
        let resolve_policy = self.resolve_policy;
        let config = self.maps.get_mut(map_id)?;

        for layer in &mut config.layers {
            if layer.needs_refit()
                && let Err(err) = layer.refit(fit_policy)
            {
                tracing::debug!(map_id, layer = layer.id, %err, "layer fit failed");
            }
        }

        let candidates = config
            .layers
            .iter()
            .filter(|l| l.contains_height(height))
            .filter_map(|l| l.transform().map(|t| (l, *t)));

        let chosen = match resolve_policy {
            FloorResolvePolicy::NearestMidpoint => candidates.min_by(|(a, _), (b, _)| {
                a.midpoint_distance(height)
                    .total_cmp(&b.midpoint_distance(height))
            }),
            // Layers are kept sorted by id, so "first" is well defined.
            FloorResolvePolicy::FirstMatch => candidates.take(1).next(),
        };

        chosen.map(|(layer, transform)| ResolvedLayer {
            layer_id: layer.id,
            transform,
        })
    }

    /// Add a correspondence point to a layer.
    ///
    /// The point is stored unconditionally; if the layer now has enough
    /// points, the transform is refitted immediately so a degenerate set is
    /// reported to the caller instead of failing silently later.
    pub fn add_calibration_point(
        &mut self,
        map_id: &str,
        layer_id: i32,
        game_position: Position3D,
        map_pixel: (f64, f64),
    ) -> Result<u32, CalibrationError> {
        let fit_policy = self.fit_policy;
        let layer = self.layer_mut(map_id, layer_id)?;
        let point_id = layer.add_point(game_position, map_pixel, chrono::Local::now().naive_local());
        tracing::info!(map_id, layer_id, point_id, "calibration point added");
        if layer.is_calibrated() {
            layer.refit(fit_policy)?;
        }
        Ok(point_id)
    }

    pub fn remove_calibration_point(
        &mut self,
        map_id: &str,
        layer_id: i32,
        point_id: u32,
    ) -> Result<(), CalibrationError> {
        let fit_policy = self.fit_policy;
        let layer = self.layer_mut(map_id, layer_id)?;
        if !layer.remove_point(point_id) {
            return Err(CalibrationError::UnknownPoint { layer_id, point_id });
        }
        tracing::info!(map_id, layer_id, point_id, "calibration point removed");
        if layer.is_calibrated() {
            layer.refit(fit_policy)?;
        }
        Ok(())
    }

    /// Set explicit height bounds, overriding point-derived bounds.
    pub fn set_height_bounds(
        &mut self,
        map_id: &str,
        layer_id: i32,
        min: f64,
        max: f64,
    ) -> Result<(), CalibrationError> {
        if min > max {
            return Err(CalibrationError::InvalidBounds { min, max });
        }
        let layer = self.layer_mut(map_id, layer_id)?;
        layer.height_min = Some(min);
        layer.height_max = Some(max);
        // Bounds don't affect the fit, only floor selection.
        Ok(())
    }

    fn layer_mut(
        &mut self,
        map_id: &str,
        layer_id: i32,
    ) -> Result<&mut super::MapLayer, CalibrationError> {
        let config = self
            .maps
            .get_mut(map_id)
            .ok_or_else(|| CalibrationError::UnknownMap(map_id.to_string()))?;
        config
            .layer_mut(layer_id)
            .ok_or_else(|| CalibrationError::UnknownLayer {
                map_id: map_id.to_string(),
                layer_id,
            })
    }
}
