// Physical setup of an experiment: the monitor the stimuli were shown on and
// how far the viewer sat from it. Everything that converts pixels to visual
// angle takes a `ViewingGeometry` explicitly; there is no global screen.

use crate::core_modules::visual_angle;
use crate::error::{GazeError, GazeResult};
use serde::{Deserialize, Serialize};
use std::fmt;

const DEFAULT_VIEWER_DISTANCE_CM: f64 = 65.0;

/// The computer screen used for an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenMonitor {
    /// Width of the visible screen area in centimeters.
    pub width_cm: f64,
    /// Height of the visible screen area in centimeters.
    pub height_cm: f64,
    pub refresh_rate_hz: f64,
    /// Number of pixels along the width and height.
    pub resolution: (u32, u32),
}

impl Default for ScreenMonitor {
    fn default() -> Self {
        Self {
            width_cm: 53.5,
            height_cm: 31.0,
            refresh_rate_hz: 60.0,
            resolution: (1920, 1080),
        }
    }
}

impl ScreenMonitor {
    /// Approximate size of one (square) pixel in centimeters.
    pub fn pixel_size(&self) -> f64 {
        visual_angle::pixel_size(self.width_cm, self.height_cm, self.resolution)
    }
}

impl fmt::Display for ScreenMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ScreenMonitor ({}×{}@{}Hz)",
            self.resolution.0, self.resolution.1, self.refresh_rate_hz
        )
    }
}

/// Viewer distance and pixel size, the two scalars needed to turn pixels into visual angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewingGeometry {
    pub viewer_distance_cm: f64,
    pub pixel_size_cm: f64,
}

impl Default for ViewingGeometry {
    fn default() -> Self {
        Self::from_monitor(&ScreenMonitor::default(), DEFAULT_VIEWER_DISTANCE_CM)
    }
}

impl ViewingGeometry {
    pub fn new(viewer_distance_cm: f64, pixel_size_cm: f64) -> Self {
        Self {
            viewer_distance_cm,
            pixel_size_cm,
        }
    }

    pub fn from_monitor(monitor: &ScreenMonitor, viewer_distance_cm: f64) -> Self {
        Self::new(viewer_distance_cm, monitor.pixel_size())
    }

    /// Checks that both scalars are strictly positive and finite.
    pub fn validate(&self) -> GazeResult<()> {
        for (name, value) in [
            ("viewer distance", self.viewer_distance_cm),
            ("pixel size", self.pixel_size_cm),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GazeError::invalid_input(format!(
                    "{name} must be a positive finite number, got {value}"
                )));
            }
        }
        Ok(())
    }

    pub fn degrees_to_pixels(&self, deg: f64) -> f64 {
        visual_angle::visual_angle_to_pixels(deg, self.viewer_distance_cm, self.pixel_size_cm, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_monitor_pixel_size() {
        let monitor = ScreenMonitor::default();
        let expected = 53.5f64.hypot(31.0) / 1920f64.hypot(1080.0);
        assert_relative_eq!(monitor.pixel_size(), expected);
        assert_eq!(monitor.to_string(), "ScreenMonitor (1920×1080@60Hz)");
    }

    #[test]
    fn geometry_validation() {
        assert!(ViewingGeometry::default().validate().is_ok());
        assert!(ViewingGeometry::new(0.0, 0.03).validate().is_err());
        assert!(ViewingGeometry::new(60.0, f64::NAN).validate().is_err());
    }
}
