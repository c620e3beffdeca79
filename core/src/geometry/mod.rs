//! Affine calibration fitting and evaluation.
//!
//! A calibrated floor maps game-world `(x, z)` onto map-image pixels through
//! six coefficients:
//!
//! ```text
//! px = a·x + b·z + c
//! py = d·x + e·z + f
//! ```
//!
//! The coefficients are the single source of truth for evaluation. Rotation
//! and scale can be read back out for diagnostics, but they are never fed
//! into `apply`: the rotation is already baked into `a/b/d/e`, and applying
//! a decomposed angle on top of them rotates twice.

use nalgebra::{Matrix2, Vector2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scatter determinant below this fraction of the squared trace is treated
/// as rank-deficient (collinear or coincident input points).
const DEGENERACY_EPS: f64 = 1e-12;

/// Absolute residual floor for outlier rejection. An exact 3-point fit has
/// residuals at floating-point noise level; without a floor every point
/// would sit above `multiplier x median` and get excluded.
const RESIDUAL_FLOOR: f64 = 1e-6;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// The point set cannot determine a unique transform.
    #[error("degenerate calibration: {reason}")]
    DegenerateCalibration { reason: &'static str },
}

/// One world->pixel correspondence, already reduced to the horizontal plane.
pub type SamplePair = ((f64, f64), (f64, f64));

/// Six-coefficient 2D affine transform from world `(x, z)` to map pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    /// Map a world-plane coordinate to map pixels.
    ///
    /// Applies the coefficients directly; there is deliberately no rotation
    /// parameter anywhere in this path.
    pub fn apply(&self, x: f64, z: f64) -> (f64, f64) {
        (
            self.a * x + self.b * z + self.c,
            self.d * x + self.e * z + self.f,
        )
    }

    /// Decompose into scale/rotation/translation for display.
    ///
    /// Read-only diagnostics for the calibration UI; the values must never
    /// be recombined into an evaluation path.
    pub fn diagnostics(&self) -> TransformDiagnostics {
        TransformDiagnostics {
            scale_x: (self.a * self.a + self.d * self.d).sqrt(),
            scale_z: (self.b * self.b + self.e * self.e).sqrt(),
            rotation_rad: self.d.atan2(self.a),
            translation: (self.c, self.f),
        }
    }
}

/// Display-only view of a transform's geometric parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformDiagnostics {
    pub scale_x: f64,
    pub scale_z: f64,
    pub rotation_rad: f64,
    pub translation: (f64, f64),
}

/// Outlier handling for the fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitPolicy {
    /// Exclude outlier points and refit once. Only kicks in above 3 points.
    pub robust: bool,
    /// A point is an outlier when its residual exceeds this multiple of the
    /// median residual.
    pub outlier_multiplier: f64,
}

impl Default for FitPolicy {
    fn default() -> Self {
        Self {
            robust: true,
            outlier_multiplier: 3.0,
        }
    }
}

/// Result of a policy-driven fit, with residuals for diagnostics.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub transform: AffineTransform,
    /// Pixel-distance residual per input point, in input order. Residuals
    /// are measured against the final transform, including excluded points.
    pub residuals: Vec<f64>,
    /// Indices of points excluded by the robust pass.
    pub excluded: Vec<usize>,
}

/// Least-squares affine fit over all samples.
///
/// With exactly 3 non-collinear points the fit is exact; with more it
/// minimizes squared pixel error. Fewer than 3 points, or a collinear set,
/// fails with [`GeometryError::DegenerateCalibration`].
pub fn fit_affine(samples: &[SamplePair]) -> Result<AffineTransform, GeometryError> {
    if samples.len() < 3 {
        return Err(GeometryError::DegenerateCalibration {
            reason: "fewer than 3 calibration points",
        });
    }

    let n = samples.len() as f64;
    let (mut mean_x, mut mean_z, mut mean_px, mut mean_py) = (0.0, 0.0, 0.0, 0.0);
    for &((x, z), (px, py)) in samples {
        mean_x += x;
        mean_z += z;
        mean_px += px;
        mean_py += py;
    }
    mean_x /= n;
    mean_z /= n;
    mean_px /= n;
    mean_py /= n;

    // Centered normal equations: the translation drops out, leaving one 2x2
    // scatter solve per output axis. Centering keeps the system conditioned
    // for maps whose world coordinates sit far from the origin.
    let (mut sxx, mut sxz, mut szz) = (0.0, 0.0, 0.0);
    let (mut spx_x, mut spx_z, mut spy_x, mut spy_z) = (0.0, 0.0, 0.0, 0.0);
    for &((x, z), (px, py)) in samples {
        let (dx, dz) = (x - mean_x, z - mean_z);
        let (dpx, dpy) = (px - mean_px, py - mean_py);
        sxx += dx * dx;
        sxz += dx * dz;
        szz += dz * dz;
        spx_x += dx * dpx;
        spx_z += dz * dpx;
        spy_x += dx * dpy;
        spy_z += dz * dpy;
    }

    let trace = sxx + szz;
    let det = sxx * szz - sxz * sxz;
    if trace <= 0.0 || det <= DEGENERACY_EPS * trace * trace {
        return Err(GeometryError::DegenerateCalibration {
            reason: "calibration points are collinear",
        });
    }

    let scatter = Matrix2::new(sxx, sxz, sxz, szz);
    let lu = scatter.lu();
    let ab = lu
        .solve(&Vector2::new(spx_x, spx_z))
        .ok_or(GeometryError::DegenerateCalibration {
            reason: "calibration points are collinear",
        })?;
    let de = lu
        .solve(&Vector2::new(spy_x, spy_z))
        .ok_or(GeometryError::DegenerateCalibration {
            reason: "calibration points are collinear",
        })?;

    let (a, b) = (ab[0], ab[1]);
    let (d, e) = (de[0], de[1]);
    Ok(AffineTransform {
        a,
        b,
        c: mean_px - a * mean_x - b * mean_z,
        d,
        e,
        f: mean_py - d * mean_x - e * mean_z,
    })
}

/// Fit with the configured outlier policy.
///
/// Robust mode fits once, excludes points whose residual exceeds
/// `outlier_multiplier x median residual`, and refits once over the
/// survivors. If fewer than 3 points survive, the full fit stands; a
/// majority of "outliers" means the calibration is bad data, not noise.
pub fn fit_with_policy(
    samples: &[SamplePair],
    policy: FitPolicy,
) -> Result<FitOutcome, GeometryError> {
    let full = fit_affine(samples)?;

    if !policy.robust || samples.len() <= 3 {
        return Ok(FitOutcome {
            residuals: residuals(&full, samples),
            transform: full,
            excluded: Vec::new(),
        });
    }

    let initial = residuals(&full, samples);
    let mut sorted = initial.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let median = sorted[sorted.len() / 2];
    let threshold = (policy.outlier_multiplier * median).max(RESIDUAL_FLOOR);

    let excluded: Vec<usize> = initial
        .iter()
        .enumerate()
        .filter(|(_, r)| **r > threshold)
        .map(|(i, _)| i)
        .collect();

    if excluded.is_empty() || samples.len() - excluded.len() < 3 {
        return Ok(FitOutcome {
            residuals: initial,
            transform: full,
            excluded: Vec::new(),
        });
    }

    let kept: Vec<SamplePair> = samples
        .iter()
        .enumerate()
        .filter(|(i, _)| !excluded.contains(i))
        .map(|(_, s)| *s)
        .collect();

    // The survivors passed the full fit, so a degenerate refit here means
    // the outliers were carrying all the geometric information; fall back.
    match fit_affine(&kept) {
        Ok(refit) => Ok(FitOutcome {
            residuals: residuals(&refit, samples),
            transform: refit,
            excluded,
        }),
        Err(_) => Ok(FitOutcome {
            residuals: initial,
            transform: full,
            excluded: Vec::new(),
        }),
    }
}

/// Pixel-distance residual of each sample against a transform.
pub fn residuals(transform: &AffineTransform, samples: &[SamplePair]) -> Vec<f64> {
    samples
        .iter()
        .map(|&((x, z), (px, py))| {
            let (tx, ty) = transform.apply(x, z);
            ((tx - px).powi(2) + (ty - py).powi(2)).sqrt()
        })
        .collect()
}
