//! Screenshot filename parsing.
//!
//! The game names screenshots after the player's pose at capture time:
//!
//! ```text
//! 2024-12-05[14-32]_123.45, 67.89, -10.23_0.1234, 0.5678, 0.9012, 0.3456 (0).png
//! └────date──────┘ └───────x, y, z─────┘└────────rx, ry, rz, rw────────┘ └seq┘
//! ```
//!
//! Field order is fixed: date-time (minute precision), world coordinates
//! (`y` is height), a rotation quaternion, an optional extra numeric field
//! some game builds append, and a per-minute sequence index. Any structural
//! mismatch is [`ParseError::UnrecognizedFormat`]; numeric values are passed
//! through unvalidated: implausible coordinates are still telemetry, and
//! range policy belongs to the tracker.

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::map::Position3D;

/// `YYYY-MM-DD[HH-MM]` prefix length.
const TIMESTAMP_LEN: usize = 17;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d[%H-%M]";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unrecognized screenshot filename format")]
    UnrecognizedFormat,
}

/// Rotation quaternion as written into the filename.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rotation {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Rotation {
    /// Heading around the vertical axis, radians.
    ///
    /// The filename stores the quaternion with its y and z components
    /// transposed relative to the standard yaw formula, so they are swapped
    /// back here before evaluation.
    pub fn yaw_radians(&self) -> f64 {
        let (qx, qz, qy, qw) = (self.x, self.y, self.z, self.w);
        let siny_cosp = 2.0 * (qw * qz + qx * qy);
        let cosy_cosp = 1.0 - 2.0 * (qy * qy + qz * qz);
        siny_cosp.atan2(cosy_cosp)
    }

    pub fn yaw_degrees(&self) -> f64 {
        self.yaw_radians().to_degrees()
    }
}

/// Player pose extracted from one screenshot filename.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPosition {
    pub captured_at: NaiveDateTime,
    pub position: Position3D,
    pub rotation: Rotation,
    /// Trailing `(N)` index distinguishing captures within one minute.
    pub sequence: u32,
}

/// Parse a screenshot filename (bare name or full path, either separator).
pub fn parse_screenshot_name(filename: &str) -> Result<RawPosition, ParseError> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .ok_or(ParseError::UnrecognizedFormat)?;
    let name = name
        .strip_suffix(".png")
        .ok_or(ParseError::UnrecognizedFormat)?;

    let (stamp, rest) = name
        .split_at_checked(TIMESTAMP_LEN)
        .ok_or(ParseError::UnrecognizedFormat)?;
    let captured_at = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .map_err(|_| ParseError::UnrecognizedFormat)?;

    let rest = rest.strip_prefix('_').unwrap_or(rest);

    // Trailing sequence: " (N)".
    let seq_open = rest.rfind(" (").ok_or(ParseError::UnrecognizedFormat)?;
    let seq_str = rest[seq_open + 2..]
        .strip_suffix(')')
        .ok_or(ParseError::UnrecognizedFormat)?;
    let sequence = seq_str
        .parse::<u32>()
        .map_err(|_| ParseError::UnrecognizedFormat)?;

    // Underscore-separated groups: coordinates, quaternion, optional extra.
    let body = &rest[..seq_open];
    let mut groups = body.split('_');
    let coords = parse_floats::<3>(groups.next().ok_or(ParseError::UnrecognizedFormat)?)?;
    let quat = parse_floats::<4>(groups.next().ok_or(ParseError::UnrecognizedFormat)?)?;
    if let Some(extra) = groups.next() {
        // Some builds append one more numeric field; tolerate exactly that.
        extra
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseError::UnrecognizedFormat)?;
    }
    if groups.next().is_some() {
        return Err(ParseError::UnrecognizedFormat);
    }

    Ok(RawPosition {
        captured_at,
        position: Position3D::new(coords[0], coords[1], coords[2]),
        rotation: Rotation {
            x: quat[0],
            y: quat[1],
            z: quat[2],
            w: quat[3],
        },
        sequence,
    })
}

/// Quick structural check without building a `RawPosition`.
pub fn is_screenshot_name(filename: &str) -> bool {
    parse_screenshot_name(filename).is_ok()
}

fn parse_floats<const N: usize>(group: &str) -> Result<[f64; N], ParseError> {
    let mut out = [0.0; N];
    let mut parts = group.split(',');
    for slot in &mut out {
        let part = parts.next().ok_or(ParseError::UnrecognizedFormat)?;
        *slot = part
            .trim()
            .parse::<f64>()
            .map_err(|_| ParseError::UnrecognizedFormat)?;
    }
    if parts.next().is_some() {
        return Err(ParseError::UnrecognizedFormat);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    const SAMPLE: &str =
        "2024-12-05[14-32]_123.45, 67.89, -10.23_0.1234, 0.5678, 0.9012, 0.3456 (0).png";

    #[test]
    fn test_parse_full_filename() {
        let raw = parse_screenshot_name(SAMPLE).unwrap();
        assert_eq!(raw.position, Position3D::new(123.45, 67.89, -10.23));
        assert_eq!(raw.rotation.x, 0.1234);
        assert_eq!(raw.rotation.w, 0.3456);
        assert_eq!(raw.sequence, 0);
        assert_eq!(
            raw.captured_at.date(),
            NaiveDate::from_ymd_opt(2024, 12, 5).unwrap()
        );
        assert_eq!(raw.captured_at.hour(), 14);
        assert_eq!(raw.captured_at.minute(), 32);
    }

    #[test]
    fn test_exact_coordinates_pass_through() {
        let name = "2024-12-05[14-32]_100.0, 0.0, 100.0_0.0, 0.0, 0.0, 1.0 (3).png";
        let raw = parse_screenshot_name(name).unwrap();
        assert_eq!(raw.position, Position3D::new(100.0, 0.0, 100.0));
        assert_eq!(raw.sequence, 3);
    }

    #[test]
    fn test_path_prefixes_stripped() {
        let unix = format!("/home/p/Screenshots/{SAMPLE}");
        let windows = format!(r"C:\Users\p\Documents\Escape from Tarkov\Screenshots\{SAMPLE}");
        assert!(parse_screenshot_name(&unix).is_ok());
        assert!(parse_screenshot_name(&windows).is_ok());
    }

    #[test]
    fn test_optional_extra_field() {
        let name =
            "2024-12-05[14-32]_1.0, 2.0, 3.0_0.0, 0.0, 0.0, 1.0_12.3456 (1).png";
        let raw = parse_screenshot_name(name).unwrap();
        assert_eq!(raw.sequence, 1);
    }

    #[test]
    fn test_missing_quaternion_component_rejected() {
        let name = "2024-12-05[14-32]_1.0, 2.0, 3.0_0.0, 0.0, 1.0 (0).png";
        assert_eq!(
            parse_screenshot_name(name),
            Err(ParseError::UnrecognizedFormat)
        );
    }

    #[test]
    fn test_missing_sequence_rejected() {
        let name = "2024-12-05[14-32]_1.0, 2.0, 3.0_0.0, 0.0, 0.0, 1.0.png";
        assert_eq!(
            parse_screenshot_name(name),
            Err(ParseError::UnrecognizedFormat)
        );
    }

    #[test]
    fn test_arbitrary_png_rejected() {
        assert!(parse_screenshot_name("desktop.png").is_err());
        assert!(parse_screenshot_name("2024-12-05[14-32].png").is_err());
        assert!(!is_screenshot_name("notes.txt"));
    }

    #[test]
    fn test_implausible_values_still_parse() {
        // Range validation is not the parser's job.
        let name = "2024-12-05[14-32]_999999.0, -4000.5, 0.1_9.0, 9.0, 9.0, 9.0 (42).png";
        let raw = parse_screenshot_name(name).unwrap();
        assert_eq!(raw.position.x, 999999.0);
        assert_eq!(raw.sequence, 42);
    }

    #[test]
    fn test_yaw_identity_quaternion_faces_north() {
        let rot = Rotation {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        };
        assert!(rot.yaw_radians().abs() < 1e-9);
    }

    #[test]
    fn test_yaw_uses_swapped_components() {
        // 90° about the vertical axis: the filename carries sin/cos halves
        // in its y slot, which the swap routes into the yaw term.
        let half = std::f64::consts::FRAC_PI_4;
        let rot = Rotation {
            x: 0.0,
            y: half.sin(),
            z: 0.0,
            w: half.cos(),
        };
        assert!((rot.yaw_degrees() - 90.0).abs() < 1e-6);
    }
}
