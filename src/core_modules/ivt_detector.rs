// Velocity-threshold identification (I-VT): a sample is a saccade when the gaze
// moved faster than a fixed threshold since its neighbour, and a fixation otherwise.

use crate::core_modules::detector::{ensure_aligned, DetectionContext, GazeEventDetector};
use crate::core_modules::gaze_event_type::GazeEventType;
use crate::core_modules::signal::MILLISECONDS_PER_SECOND;
use crate::error::{GazeError, GazeResult};
use serde::{Deserialize, Serialize};

/// How the time between two consecutive samples is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleInterval {
    /// `1000 / sample_rate`, from the rate estimated for each trial.
    #[default]
    Estimated,
    /// A constant interval in milliseconds regardless of the recording's timestamps.
    /// `FixedMs(2.0)` reproduces the legacy 500 Hz assumption.
    FixedMs(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IvtConfig {
    /// Speeds at or above this (pixels per millisecond) are saccadic.
    pub velocity_threshold_px_per_ms: f64,
    pub sample_interval: SampleInterval,
}

impl Default for IvtConfig {
    fn default() -> Self {
        Self {
            velocity_threshold_px_per_ms: 0.5,
            sample_interval: SampleInterval::Estimated,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IvtDetector {
    config: IvtConfig,
}

impl IvtDetector {
    pub fn new(config: IvtConfig) -> GazeResult<Self> {
        let threshold = config.velocity_threshold_px_per_ms;
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(GazeError::invalid_argument(format!(
                "velocity threshold must be positive and finite, got {threshold}"
            )));
        }
        if let SampleInterval::FixedMs(interval) = config.sample_interval {
            if !interval.is_finite() || interval <= 0.0 {
                return Err(GazeError::invalid_argument(format!(
                    "fixed sample interval must be positive and finite, got {interval}"
                )));
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &IvtConfig {
        &self.config
    }

    fn interval_ms(&self, sample_rate: f64) -> GazeResult<f64> {
        match self.config.sample_interval {
            SampleInterval::FixedMs(interval) => Ok(interval),
            SampleInterval::Estimated => {
                let interval = MILLISECONDS_PER_SECOND / sample_rate;
                if interval.is_finite() && interval > 0.0 {
                    Ok(interval)
                } else {
                    Err(GazeError::computation(format!(
                        "cannot derive a sample interval from sampling rate {sample_rate}"
                    )))
                }
            }
        }
    }
}

fn step(x: &[f64], y: &[f64], from: usize, to: usize) -> f64 {
    (x[to] - x[from]).hypot(y[to] - y[from])
}

impl GazeEventDetector for IvtDetector {
    fn name(&self) -> &'static str {
        "I-VT"
    }

    fn classify(
        &self,
        context: &DetectionContext<'_>,
        x: &[f64],
        y: &[f64],
        labels: &[GazeEventType],
    ) -> GazeResult<Vec<GazeEventType>> {
        ensure_aligned(context, x, y, labels)?;
        let interval = self.interval_ms(context.sample_rate)?;
        let n = x.len();

        let classified = (0..n)
            .map(|i| {
                // backward difference, or forward when the predecessor is missing
                let backward = if i > 0 { step(x, y, i - 1, i) } else { f64::NAN };
                let distance = if backward.is_finite() || i + 1 >= n {
                    backward
                } else {
                    step(x, y, i, i + 1)
                };
                if !distance.is_finite() {
                    return labels[i];
                }
                if distance / interval < self.config.velocity_threshold_px_per_ms {
                    GazeEventType::Fixation
                } else {
                    GazeEventType::Saccade
                }
            })
            .collect();
        Ok(classified)
    }
}
