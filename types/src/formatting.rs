//! Display formatting for positions and headings.
//!
//! All human-readable coordinate output goes through this module so the CLI
//! and overlay label text agree on precision and compass conventions.

/// Format a world coordinate triple for display.
///
/// # Examples
/// ```
/// use tacmap_types::formatting::format_world;
/// assert_eq!(format_world(123.456, -10.2, 67.0), "(123.5, -10.2, 67.0)");
/// ```
pub fn format_world(x: f64, y: f64, z: f64) -> String {
    format!("({x:.1}, {y:.1}, {z:.1})")
}

/// Format a map-pixel coordinate pair for display.
///
/// # Examples
/// ```
/// use tacmap_types::formatting::format_pixel;
/// assert_eq!(format_pixel(1000.0, 998.7), "[1000, 999]");
/// ```
pub fn format_pixel(px: f64, py: f64) -> String {
    format!("[{:.0}, {:.0}]", px, py)
}

/// Format a heading (radians, game convention) as degrees plus a compass
/// point, e.g. `"135° SE"`.
///
/// The angle is normalized into `0..360`.
///
/// # Examples
/// ```
/// use tacmap_types::formatting::format_heading;
/// assert_eq!(format_heading(0.0), "0° N");
/// assert_eq!(format_heading(std::f64::consts::FRAC_PI_2), "90° E");
/// assert_eq!(format_heading(-std::f64::consts::FRAC_PI_2), "270° W");
/// ```
pub fn format_heading(yaw_rad: f64) -> String {
    let degrees = yaw_rad.to_degrees().rem_euclid(360.0);
    format!("{:.0}° {}", degrees, compass_point(degrees))
}

/// Nearest of the eight compass points for a heading in degrees.
fn compass_point(degrees: f64) -> &'static str {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    let sector = ((degrees + 22.5).rem_euclid(360.0) / 45.0) as usize;
    POINTS[sector % 8]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compass_sectors() {
        assert_eq!(compass_point(0.0), "N");
        assert_eq!(compass_point(44.0), "NE");
        assert_eq!(compass_point(90.0), "E");
        assert_eq!(compass_point(180.0), "S");
        assert_eq!(compass_point(315.0), "NW");
        assert_eq!(compass_point(359.0), "N");
    }

    #[test]
    fn test_heading_wraps_negative() {
        assert_eq!(format_heading(-std::f64::consts::PI), "180° S");
    }
}
