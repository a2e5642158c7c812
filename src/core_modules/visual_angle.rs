// THEORY:
// The `visual_angle` module is the physics layer of the engine. Eye trackers
// report gaze in screen pixels, but oculomotor events are defined in degrees of
// visual angle, so everything downstream that talks about "how far" or "how fast"
// routes through here.
//
// Conventions held by every function in this module:
// 1.  **Units**: distances on screen are pixels, physical lengths are centimeters,
//     timestamps are milliseconds, angles are degrees unless `use_radians` is set.
//     Velocities are reported per second.
// 2.  **Missing data**: non-finite coordinates produce NaN results, never errors.
//     Errors are reserved for contract violations (negative lengths, mismatched
//     array lengths, unknown reference directions).
// 3.  **Per-sample series**: arrays computed between consecutive samples keep the
//     input length and start with NaN, since the first sample has no predecessor.
// 4.  **Screen orientation**: the y-axis points down, as in every screen
//     coordinate system; azimuths are counter-clockwise as seen by the viewer.

use crate::core_modules::signal::{self, MILLISECONDS_PER_SECOND};
use crate::error::{GazeError, GazeResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use std::str::FromStr;

pub type Point = (f64, f64);

/// The reference direction from which azimuths are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ZeroDirection {
    #[default]
    East,
    North,
    West,
    South,
}

impl ZeroDirection {
    /// Counter-clockwise angle of this direction from East, in radians.
    fn offset(&self) -> f64 {
        match self {
            ZeroDirection::East => 0.0,
            ZeroDirection::North => FRAC_PI_2,
            ZeroDirection::West => PI,
            ZeroDirection::South => 3.0 * FRAC_PI_2,
        }
    }
}

impl FromStr for ZeroDirection {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "E" | "EAST" => Ok(ZeroDirection::East),
            "N" | "NORTH" => Ok(ZeroDirection::North),
            "W" | "WEST" => Ok(ZeroDirection::West),
            "S" | "SOUTH" => Ok(ZeroDirection::South),
            _ => Err(GazeError::invalid_argument(format!("unknown zero direction `{s}`"))),
        }
    }
}

fn ensure_same_length(name_a: &str, a: usize, name_b: &str, b: usize) -> GazeResult<()> {
    if a != b {
        return Err(GazeError::invalid_input(format!(
            "{name_a} ({a}) and {name_b} ({b}) must have the same length"
        )));
    }
    Ok(())
}

/// Size of a single (square) pixel in centimeters, from the screen diagonal.
pub fn pixel_size(width_cm: f64, height_cm: f64, resolution: (u32, u32)) -> f64 {
    let diagonal_cm = width_cm.hypot(height_cm);
    let diagonal_px = (resolution.0 as f64).hypot(resolution.1 as f64);
    diagonal_cm / diagonal_px
}

/// Number of pixels spanned by a visual angle of `deg` degrees centered on the line of sight.
///
/// The sign of `deg` is dropped unless `keep_sign` is set. Non-finite input yields NaN.
pub fn visual_angle_to_pixels(deg: f64, distance_cm: f64, pixel_size_cm: f64, keep_sign: bool) -> f64 {
    if !deg.is_finite() {
        return f64::NAN;
    }
    let half_edge_cm = distance_cm * (deg.abs() / 2.0).to_radians().tan();
    let edge_px = 2.0 * half_edge_cm / pixel_size_cm;
    if keep_sign { edge_px.copysign(deg) } else { edge_px }
}

/// Visual angle (degrees) subtended by `num_px` pixels centered on the line of sight.
/// Exact inverse of [`visual_angle_to_pixels`].
pub fn pixels_to_visual_angle(num_px: f64, distance_cm: f64, pixel_size_cm: f64) -> GazeResult<f64> {
    if !(num_px.is_finite() && distance_cm.is_finite() && pixel_size_cm.is_finite()) {
        return Ok(f64::NAN);
    }
    if num_px < 0.0 || distance_cm < 0.0 || pixel_size_cm < 0.0 {
        return Err(GazeError::invalid_argument(format!(
            "pixels ({num_px}), distance ({distance_cm}) and pixel size ({pixel_size_cm}) must be non-negative"
        )));
    }
    let half_edge_cm = num_px * pixel_size_cm / 2.0;
    Ok(2.0 * (half_edge_cm / distance_cm).atan().to_degrees())
}

/// Visual angle between two on-screen points, `atan(distance_cm / viewer_distance_cm)`.
/// NaN if either point has a non-finite coordinate.
pub fn visual_angle_between_pixels(
    p1: Point,
    p2: Point,
    distance_cm: f64,
    pixel_size_cm: f64,
    use_radians: bool,
) -> f64 {
    if ![p1.0, p1.1, p2.0, p2.1].iter().all(|v| v.is_finite()) {
        return f64::NAN;
    }
    let distance_px = (p2.0 - p1.0).hypot(p2.1 - p1.1);
    let angle = (distance_px * pixel_size_cm / distance_cm).atan();
    if use_radians { angle } else { angle.to_degrees() }
}

/// Counter-clockwise angle of the vector `p1 → p2` measured from `zero_direction`,
/// normalized to `[0, 2π)` (or `[0, 360)` degrees). Identical points yield exactly 0.
pub fn azimuth(p1: Point, p2: Point, zero_direction: ZeroDirection, use_radians: bool) -> f64 {
    if ![p1.0, p1.1, p2.0, p2.1].iter().all(|v| v.is_finite()) {
        return f64::NAN;
    }
    let dx = p2.0 - p1.0;
    // screen y grows downwards
    let dy = p1.1 - p2.1;
    if dx == 0.0 && dy == 0.0 {
        return 0.0;
    }
    let mut angle = (dy.atan2(dx) - zero_direction.offset()).rem_euclid(TAU);
    if angle >= TAU {
        angle = 0.0;
    }
    if use_radians {
        angle
    } else {
        let degrees = angle.to_degrees();
        if degrees >= 360.0 { 0.0 } else { degrees }
    }
}

/// Distance in pixels between each sample and its predecessor (first element NaN).
pub fn euclidean_distances(xs: &[f64], ys: &[f64]) -> GazeResult<Vec<f64>> {
    ensure_same_length("x", xs.len(), "y", ys.len())?;
    let dx = signal::diff(xs);
    let dy = signal::diff(ys);
    Ok(dx.iter().zip(&dy).map(|(dx, dy)| dx.hypot(*dy)).collect())
}

/// Pixel velocity of each sample relative to its predecessor, in px/s (first element NaN).
pub fn velocities(xs: &[f64], ys: &[f64], timestamps: &[f64]) -> GazeResult<Vec<f64>> {
    ensure_same_length("x", xs.len(), "timestamps", timestamps.len())?;
    let distances = euclidean_distances(xs, ys)?;
    let dt = signal::diff(timestamps);
    Ok(distances
        .iter()
        .zip(&dt)
        .map(|(d, dt)| d / dt * MILLISECONDS_PER_SECOND)
        .collect())
}

/// Visual angle travelled between each sample and its predecessor (first element NaN).
pub fn pixels_to_visual_angles(
    xs: &[f64],
    ys: &[f64],
    distance_cm: f64,
    pixel_size_cm: f64,
    use_radians: bool,
) -> GazeResult<Vec<f64>> {
    let distances = euclidean_distances(xs, ys)?;
    Ok(distances
        .iter()
        .map(|d| {
            let angle = (d * pixel_size_cm / distance_cm).atan();
            if use_radians { angle } else { angle.to_degrees() }
        })
        .collect())
}

/// Angular velocity of each sample relative to its predecessor, per second (first element NaN).
pub fn pixels_to_angular_velocities(
    xs: &[f64],
    ys: &[f64],
    timestamps: &[f64],
    distance_cm: f64,
    pixel_size_cm: f64,
    use_radians: bool,
) -> GazeResult<Vec<f64>> {
    ensure_same_length("x", xs.len(), "timestamps", timestamps.len())?;
    let angles = pixels_to_visual_angles(xs, ys, distance_cm, pixel_size_cm, use_radians)?;
    let dt = signal::diff(timestamps);
    Ok(angles
        .iter()
        .zip(&dt)
        .map(|(a, dt)| a / dt * MILLISECONDS_PER_SECOND)
        .collect())
}

fn ensure_finite_point(p: Point, name: &str) -> GazeResult<()> {
    if !(p.0.is_finite() && p.1.is_finite()) {
        return Err(GazeError::invalid_input(format!("{name} must have finite coordinates")));
    }
    Ok(())
}

/// Whether `p` lies inside (or on the edge of) the axis-aligned rectangle.
pub fn is_in_rectangle(p: Point, top_left: Point, bottom_right: Point) -> GazeResult<bool> {
    ensure_finite_point(p, "point")?;
    ensure_finite_point(top_left, "top-left corner")?;
    ensure_finite_point(bottom_right, "bottom-right corner")?;
    if top_left.0 > bottom_right.0 || top_left.1 > bottom_right.1 {
        return Err(GazeError::invalid_input("top-left corner must be above and left of bottom-right corner"));
    }
    Ok(top_left.0 <= p.0 && p.0 <= bottom_right.0 && top_left.1 <= p.1 && p.1 <= bottom_right.1)
}

/// Whether `p` lies inside (or on the edge of) the circle.
pub fn is_in_circle(p: Point, center: Point, radius: f64) -> GazeResult<bool> {
    ensure_finite_point(p, "point")?;
    ensure_finite_point(center, "center")?;
    if !radius.is_finite() || radius < 0.0 {
        return Err(GazeError::invalid_input(format!("radius must be finite and non-negative, got {radius}")));
    }
    Ok((p.0 - center.0).hypot(p.1 - center.1) <= radius)
}
