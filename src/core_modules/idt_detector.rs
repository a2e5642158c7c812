// THEORY:
// Dispersion-threshold identification (I-DT) grows a window over the samples for
// as long as the gaze stays inside a small area, then commits the whole window as
// one fixation. Samples that cannot start such a window are saccadic.
//
// The window is measured in samples, derived from a duration and the trial's
// sampling rate. The dispersion threshold is configured in degrees of visual angle
// and converted to pixels with the viewing geometry, so the same configuration
// works across monitors and viewer distances.

use crate::core_modules::detector::{ensure_aligned, DetectionContext, GazeEventDetector};
use crate::core_modules::gaze_event_type::GazeEventType;
use crate::core_modules::screen_monitor::ViewingGeometry;
use crate::error::{GazeError, GazeResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdtConfig {
    /// Largest spread, in degrees, a window may have and still be a fixation.
    pub dispersion_threshold_deg: f64,
    /// Length of the initial window, in milliseconds.
    pub window_duration_ms: f64,
    pub geometry: ViewingGeometry,
}

impl Default for IdtConfig {
    fn default() -> Self {
        Self {
            dispersion_threshold_deg: 0.5,
            window_duration_ms: 100.0,
            geometry: ViewingGeometry::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdtDetector {
    config: IdtConfig,
    /// Dispersion threshold converted to pixels.
    threshold_px: f64,
}

impl IdtDetector {
    pub fn new(config: IdtConfig) -> GazeResult<Self> {
        config.geometry.validate()?;
        if !config.dispersion_threshold_deg.is_finite() || config.dispersion_threshold_deg <= 0.0 {
            return Err(GazeError::invalid_argument(format!(
                "dispersion threshold must be positive and finite, got {}",
                config.dispersion_threshold_deg
            )));
        }
        if !config.window_duration_ms.is_finite() || config.window_duration_ms <= 0.0 {
            return Err(GazeError::invalid_argument(format!(
                "window duration must be positive and finite, got {}",
                config.window_duration_ms
            )));
        }
        let threshold_px = config.geometry.degrees_to_pixels(config.dispersion_threshold_deg);
        Ok(Self { config, threshold_px })
    }

    pub fn config(&self) -> &IdtConfig {
        &self.config
    }

    pub fn threshold_px(&self) -> f64 {
        self.threshold_px
    }
}

/// `(max x - min x) + (max y - min y)` over the window; NaN if any sample is missing.
pub fn dispersion(x: &[f64], y: &[f64]) -> f64 {
    if x.iter().chain(y).any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let spread = |values: &[f64]| {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
        max - min
    };
    spread(x) + spread(y)
}

impl GazeEventDetector for IdtDetector {
    fn name(&self) -> &'static str {
        "I-DT"
    }

    fn classify(
        &self,
        context: &DetectionContext<'_>,
        x: &[f64],
        y: &[f64],
        labels: &[GazeEventType],
    ) -> GazeResult<Vec<GazeEventType>> {
        ensure_aligned(context, x, y, labels)?;
        let n = x.len();
        let window = context.samples_in(self.config.window_duration_ms);
        if window < 2 {
            return Err(GazeError::invalid_input(format!(
                "a {} ms window spans {window} samples at {} Hz; at least 2 are needed",
                self.config.window_duration_ms, context.sample_rate
            )));
        }
        if n < window {
            return Err(GazeError::invalid_input(format!(
                "{n} samples cannot fill a {window}-sample dispersion window"
            )));
        }

        let mut classified = labels.to_vec();
        // `end` is inclusive
        let mut start = 0;
        let mut end = window - 1;
        let mut in_fixation = false;
        while end < n {
            // NaN dispersion compares false and counts as exceeding the threshold
            if dispersion(&x[start..=end], &y[start..=end]) < self.threshold_px {
                in_fixation = true;
                end += 1;
            } else if in_fixation {
                classified[start..end].fill(GazeEventType::Fixation);
                start = end;
                end = start + window - 1;
                in_fixation = false;
            } else {
                classified[start] = GazeEventType::Saccade;
                start += 1;
                end += 1;
            }
        }

        // whatever is left is shorter than a fresh window, or the open fixation
        let tail = if in_fixation {
            GazeEventType::Fixation
        } else {
            GazeEventType::Saccade
        };
        classified[start..n].fill(tail);
        Ok(classified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::gaze_event_type::GazeEventType::*;
    use approx::assert_relative_eq;

    fn timestamps(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * 2.0).collect()
    }

    fn detector(window_duration_ms: f64) -> IdtDetector {
        IdtDetector::new(IdtConfig {
            window_duration_ms,
            ..IdtConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn dispersion_sums_both_spreads() {
        assert_relative_eq!(dispersion(&[1.0, 4.0, 2.0], &[0.0, 0.5, 1.0]), 4.0);
        assert_eq!(dispersion(&[3.0; 4], &[7.0; 4]), 0.0);
        assert!(dispersion(&[1.0, f64::NAN], &[0.0, 0.0]).is_nan());
    }

    #[test]
    fn threshold_is_converted_with_the_geometry() {
        let config = IdtConfig {
            geometry: ViewingGeometry::new(60.0, 0.025),
            ..IdtConfig::default()
        };
        let expected = config.geometry.degrees_to_pixels(0.5);
        assert_relative_eq!(IdtDetector::new(config).unwrap().threshold_px(), expected);
    }

    #[test]
    fn constant_gaze_is_one_fixation() {
        let ts = timestamps(50);
        let ctx = DetectionContext {
            timestamps: &ts,
            sample_rate: 500.0,
        };
        let labels = detector(100.0)
            .classify(&ctx, &[100.0; 50], &[100.0; 50], &[Undefined; 50])
            .unwrap();
        assert_eq!(labels, vec![Fixation; 50]);
    }

    #[test]
    fn a_jump_splits_two_fixations() {
        let n = 40;
        let ts = timestamps(n);
        let ctx = DetectionContext {
            timestamps: &ts,
            sample_rate: 500.0,
        };
        let x: Vec<f64> = (0..n)
            .map(|i| match i {
                0..15 => 100.0,
                15..20 => 100.0 + (i - 14) as f64 * 60.0,
                _ => 400.0,
            })
            .collect();
        let y = vec![300.0; n];
        // 10 ms windows are 5 samples long
        let labels = detector(10.0).classify(&ctx, &x, &y, &vec![Undefined; n]).unwrap();
        assert_eq!(&labels[..15], &[Fixation; 15]);
        assert_eq!(&labels[15..19], &[Saccade; 4]);
        assert_eq!(&labels[19..], &vec![Fixation; n - 19][..]);
    }

    #[test]
    fn windows_longer_than_the_trial_are_rejected() {
        let ts = timestamps(20);
        let ctx = DetectionContext {
            timestamps: &ts,
            sample_rate: 500.0,
        };
        let result = detector(100.0).classify(&ctx, &[0.0; 20], &[0.0; 20], &[Undefined; 20]);
        assert!(matches!(result, Err(GazeError::InvalidInput(_))));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let config = IdtConfig {
            dispersion_threshold_deg: -1.0,
            ..IdtConfig::default()
        };
        assert!(IdtDetector::new(config).is_err());
        let config = IdtConfig {
            geometry: ViewingGeometry::new(0.0, 0.03),
            ..IdtConfig::default()
        };
        assert!(matches!(IdtDetector::new(config), Err(GazeError::InvalidInput(_))));
    }
}
