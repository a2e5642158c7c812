// THEORY:
// The Engbert & Kliegl detector finds saccades as velocity outliers relative to
// the recording's own noise level, so it adapts to trackers and subjects without
// a hand-tuned speed threshold.
//
// Key architectural principles & pipeline stages:
// 1.  **Smoothed Velocity**: each axis is differentiated with a symmetric moving
//     window of `derivation_window_size` samples on each side, excluding the center.
//     The first and last `derivation_window_size` samples have no velocity.
// 2.  **Robust Noise**: the per-axis noise level is a median-based standard
//     deviation, so the saccades being searched for barely influence it.
// 3.  **Elliptic Threshold**: a sample is saccadic when its velocity lies on or
//     outside the ellipse with semi-axes `λ·σx` and `λ·σy`.

use crate::core_modules::detector::{ensure_aligned, DetectionContext, GazeEventDetector};
use crate::core_modules::gaze_event_type::GazeEventType;
use crate::core_modules::signal;
use crate::error::{GazeError, GazeResult};
use serde::{Deserialize, Serialize};

/// Lower bound of the noise level, so perfectly still recordings do not divide by zero.
const MIN_NOISE_STD: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngbertConfig {
    /// Multiple of the noise level that separates saccades from fixations.
    pub lambda_noise_threshold: f64,
    /// Samples taken on each side of a sample when differentiating.
    pub derivation_window_size: usize,
}

impl Default for EngbertConfig {
    fn default() -> Self {
        Self {
            lambda_noise_threshold: 5.0,
            derivation_window_size: 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngbertDetector {
    config: EngbertConfig,
}

impl EngbertDetector {
    pub fn new(config: EngbertConfig) -> GazeResult<Self> {
        if !config.lambda_noise_threshold.is_finite() || config.lambda_noise_threshold <= 0.0 {
            return Err(GazeError::invalid_argument(format!(
                "lambda noise threshold must be positive and finite, got {}",
                config.lambda_noise_threshold
            )));
        }
        if config.derivation_window_size == 0 {
            return Err(GazeError::invalid_argument("derivation window size must be at least 1"));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngbertConfig {
        &self.config
    }

    /// Windowed velocity of one axis, in units per second.
    pub fn axial_velocities(&self, values: &[f64], sample_rate: f64) -> Vec<f64> {
        let ws = self.config.derivation_window_size;
        let n = values.len();
        let mut velocities = vec![f64::NAN; n];
        if n <= 2 * ws {
            return velocities;
        }
        let scale = sample_rate / (2.0 * (ws as f64 + 1.0));
        for (t, velocity) in velocities.iter_mut().enumerate().take(n - ws).skip(ws) {
            let ahead: f64 = values[t + 1..=t + ws].iter().sum();
            let behind: f64 = values[t - ws..t].iter().sum();
            *velocity = (ahead - behind) * scale;
        }
        velocities
    }
}

/// Median-based standard deviation `sqrt(median(v²) - median(v)²)`, NaN ignored,
/// floored at a small positive value.
pub fn median_noise_std(velocities: &[f64]) -> f64 {
    let squared: Vec<f64> = velocities.iter().map(|v| v * v).collect();
    let variance = signal::nan_median(&squared) - signal::nan_median(velocities).powi(2);
    let std = variance.max(0.0).sqrt();
    if std.is_nan() { MIN_NOISE_STD } else { std.max(MIN_NOISE_STD) }
}

impl GazeEventDetector for EngbertDetector {
    fn name(&self) -> &'static str {
        "Engbert"
    }

    fn classify(
        &self,
        context: &DetectionContext<'_>,
        x: &[f64],
        y: &[f64],
        labels: &[GazeEventType],
    ) -> GazeResult<Vec<GazeEventType>> {
        ensure_aligned(context, x, y, labels)?;
        let ws = self.config.derivation_window_size;
        if x.len() < 2 * ws {
            return Err(GazeError::invalid_input(format!(
                "{} samples are too few for a derivation window of {ws}",
                x.len()
            )));
        }
        if !context.sample_rate.is_finite() {
            return Err(GazeError::computation("sampling rate is not finite"));
        }

        let vx = self.axial_velocities(x, context.sample_rate);
        let vy = self.axial_velocities(y, context.sample_rate);
        let lambda = self.config.lambda_noise_threshold;
        let radius_x = lambda * median_noise_std(&vx);
        let radius_y = lambda * median_noise_std(&vy);

        Ok(vx
            .iter()
            .zip(&vy)
            .zip(labels)
            .map(|((vx, vy), label)| {
                let ellipse = (vx / radius_x).powi(2) + (vy / radius_y).powi(2);
                if ellipse.is_nan() {
                    *label
                } else if ellipse < 1.0 {
                    GazeEventType::Fixation
                } else {
                    GazeEventType::Saccade
                }
            })
            .collect())
    }
}
