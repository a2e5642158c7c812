// THEORY:
// The `nh_detector` implements the adaptive, multi-stage saccade and glissade
// detector of Nyström & Holmqvist. Instead of a fixed speed threshold, it learns
// the noise floor of each recording from the recording itself and then grows every
// saccade outward from its velocity peak.
//
// Key architectural principles & pipeline stages:
// 1.  **Denoising**: coordinates are smoothed with a Savitzky-Golay filter and
//     converted to angular velocity (deg/s) and acceleration (deg/s²). Physically
//     implausible values are discarded as NaN.
// 2.  **Adaptive Peak Threshold**: starting at 300 deg/s, the threshold is
//     repeatedly reset to `mean + 6·std` of the samples below it until it settles.
// 3.  **Saccades**: every local velocity maximum above the threshold is a peak.
//     The onset is the nearest quiet local minimum before it; the offset is the
//     nearest local minimum after it that falls below a threshold blending the
//     global noise floor with the local noise just after the candidate.
// 4.  **Glissades**: a wobble right after a saccade that still crosses the
//     saccade's offset threshold is a post-saccadic oscillation.
// 5.  **Fixations**: whatever is left, if it lasts long enough.
//
// Smoothing and differentiation create undefined samples of their own, so samples
// with neither velocity nor acceleration end up UNDEFINED, and blinks are restored.

use crate::core_modules::chunk::chunk_indices;
use crate::core_modules::detector::{ensure_aligned, DetectionContext, GazeEventDetector};
use crate::core_modules::gaze_event_type::GazeEventType;
use crate::core_modules::screen_monitor::ViewingGeometry;
use crate::core_modules::signal::{self, nan_mean_and_std};
use crate::core_modules::visual_angle;
use crate::error::{GazeError, GazeResult};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_ANGULAR_VELOCITY: f64 = 1000.0;
const MAX_ANGULAR_ACCELERATION: f64 = 100_000.0;
const INITIAL_PEAK_THRESHOLD: f64 = 300.0;
const PEAK_THRESHOLD_TOLERANCE: f64 = 1.0;
const MAX_PEAK_THRESHOLD_ITERATIONS: usize = 100;
const PEAK_THRESHOLD_STDS: f64 = 6.0;
const ONSET_THRESHOLD_STDS: f64 = 3.0;
/// Length of the local-noise and glissade windows.
const LOOKAHEAD_WINDOW_MS: f64 = 40.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NhConfig {
    /// Savitzky-Golay window, in samples (odd).
    pub filter_window_length: usize,
    pub filter_poly_order: usize,
    /// Weight of the global onset threshold in the offset threshold.
    pub alpha: f64,
    /// Weight of the local noise in the offset threshold.
    pub beta: f64,
    pub min_saccade_duration_ms: f64,
    pub min_fixation_duration_ms: f64,
    pub geometry: ViewingGeometry,
}

impl Default for NhConfig {
    fn default() -> Self {
        Self {
            filter_window_length: 3,
            filter_poly_order: 2,
            alpha: 0.7,
            beta: 0.3,
            min_saccade_duration_ms: 10.0,
            min_fixation_duration_ms: 40.0,
            geometry: ViewingGeometry::default(),
        }
    }
}

/// Statistics of the velocity samples below the converged peak threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakThreshold {
    pub threshold: f64,
    pub noise_mean: f64,
    pub noise_std: f64,
    pub iterations: usize,
}

impl PeakThreshold {
    pub fn onset_threshold(&self) -> f64 {
        self.noise_mean + ONSET_THRESHOLD_STDS * self.noise_std
    }
}

/// A committed saccade and the offset threshold its glissade is measured against.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SaccadeSpan {
    peak: usize,
    onset: usize,
    offset: usize,
    offset_threshold: f64,
}

#[derive(Debug, Clone)]
pub struct NhDetector {
    config: NhConfig,
}

impl NhDetector {
    pub fn new(config: NhConfig) -> GazeResult<Self> {
        config.geometry.validate()?;
        if config.filter_window_length % 2 == 0 || config.filter_poly_order >= config.filter_window_length {
            return Err(GazeError::invalid_argument(format!(
                "smoothing window ({}) must be odd and longer than the polynomial order ({})",
                config.filter_window_length, config.filter_poly_order
            )));
        }
        for (name, value) in [
            ("alpha", config.alpha),
            ("beta", config.beta),
            ("minimum saccade duration", config.min_saccade_duration_ms),
            ("minimum fixation duration", config.min_fixation_duration_ms),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(GazeError::invalid_argument(format!(
                    "{name} must be non-negative and finite, got {value}"
                )));
            }
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &NhConfig {
        &self.config
    }

    /// Angular velocity (deg/s) and acceleration (deg/s²) of the smoothed gaze,
    /// with implausible values replaced by NaN.
    pub fn angular_kinematics(&self, timestamps: &[f64], x: &[f64], y: &[f64]) -> GazeResult<(Vec<f64>, Vec<f64>)> {
        let x = signal::savgol_filter(x, self.config.filter_window_length, self.config.filter_poly_order)?;
        let y = signal::savgol_filter(y, self.config.filter_window_length, self.config.filter_poly_order)?;
        let geometry = &self.config.geometry;
        let mut velocities = visual_angle::pixels_to_angular_velocities(
            &x,
            &y,
            timestamps,
            geometry.viewer_distance_cm,
            geometry.pixel_size_cm,
            false,
        )?;
        let mut accelerations = signal::temporal_derivative(&velocities, timestamps)?;

        for v in velocities.iter_mut().filter(|v| **v > MAX_ANGULAR_VELOCITY) {
            *v = f64::NAN;
        }
        for a in accelerations.iter_mut().filter(|a| a.abs() > MAX_ANGULAR_ACCELERATION) {
            *a = f64::NAN;
        }
        Ok((velocities, accelerations))
    }
}

/// Iterates `threshold = mean + 6·std` over the samples below the previous threshold.
pub fn peak_velocity_threshold(velocities: &[f64]) -> GazeResult<PeakThreshold> {
    let below = |threshold: f64| -> Vec<f64> { velocities.iter().copied().filter(|v| *v < threshold).collect() };

    let initial = below(INITIAL_PEAK_THRESHOLD);
    if initial.is_empty() {
        return Err(GazeError::computation(format!(
            "no angular velocity below {INITIAL_PEAK_THRESHOLD} deg/s to estimate the noise level from"
        )));
    }
    let (mut noise_mean, mut noise_std) = nan_mean_and_std(&initial);
    let mut previous = INITIAL_PEAK_THRESHOLD;
    let mut threshold = noise_mean + PEAK_THRESHOLD_STDS * noise_std;
    let mut iterations = 1;

    while (threshold - previous).abs() >= PEAK_THRESHOLD_TOLERANCE && iterations < MAX_PEAK_THRESHOLD_ITERATIONS {
        let samples = below(threshold);
        if samples.is_empty() {
            // perfectly still gaze: nothing lies below a zero threshold
            break;
        }
        previous = threshold;
        (noise_mean, noise_std) = nan_mean_and_std(&samples);
        threshold = noise_mean + PEAK_THRESHOLD_STDS * noise_std;
        iterations += 1;
    }

    if !threshold.is_finite() {
        return Err(GazeError::computation("peak velocity threshold is not finite"));
    }
    Ok(PeakThreshold {
        threshold,
        noise_mean,
        noise_std,
        iterations,
    })
}

/// Strict local maximum or minimum tests; missing neighbours fail them.
fn is_local_max(v: &[f64], i: usize) -> bool {
    i > 0 && i + 1 < v.len() && v[i] > v[i - 1] && v[i] > v[i + 1]
}

fn is_local_min(v: &[f64], i: usize) -> bool {
    i > 0 && i + 1 < v.len() && v[i] < v[i - 1] && v[i] < v[i + 1]
}

/// Index of the first sample at least `duration_ms` after `start`, or the last sample.
pub fn find_window_end(timestamps: &[f64], start: usize, duration_ms: f64) -> usize {
    let last = timestamps.len().saturating_sub(1);
    let Some(origin) = timestamps.get(start) else {
        return last;
    };
    timestamps[start..]
        .iter()
        .position(|t| t - origin >= duration_ms)
        .map_or(last, |offset| start + offset)
}

impl NhDetector {
    fn find_onset(&self, velocities: &[f64], peak: usize, onset_threshold: f64) -> usize {
        let mut onset = peak.saturating_sub(1);
        while onset > 0 {
            if is_local_min(velocities, onset) && velocities[onset] < onset_threshold {
                break;
            }
            onset -= 1;
        }
        onset
    }

    /// Returns the offset index and the offset threshold in force there.
    fn find_offset(&self, timestamps: &[f64], velocities: &[f64], peak: usize, onset_threshold: f64) -> (usize, f64) {
        let n = velocities.len();
        let mut offset_threshold = 0.0;
        let mut offset = peak + 1;
        while offset + 1 < n {
            if is_local_min(velocities, offset) {
                let window_end = find_window_end(timestamps, offset, LOOKAHEAD_WINDOW_MS);
                let (mean, std) = nan_mean_and_std(&velocities[offset..=window_end]);
                offset_threshold =
                    self.config.alpha * onset_threshold + self.config.beta * (mean + ONSET_THRESHOLD_STDS * std);
                if velocities[offset] < offset_threshold {
                    return (offset, offset_threshold);
                }
            }
            offset += 1;
        }
        (n - 1, offset_threshold)
    }

    fn detect_saccades(
        &self,
        timestamps: &[f64],
        velocities: &[f64],
        peaks: &[usize],
        onset_threshold: f64,
        labels: &mut [GazeEventType],
    ) -> Vec<SaccadeSpan> {
        let mut saccades: Vec<SaccadeSpan> = Vec::new();
        for &peak in peaks {
            if saccades.last().is_some_and(|s| peak <= s.offset) {
                continue;
            }
            let onset = self.find_onset(velocities, peak, onset_threshold);
            let (offset, offset_threshold) = self.find_offset(timestamps, velocities, peak, onset_threshold);
            if timestamps[offset] - timestamps[onset] > self.config.min_saccade_duration_ms {
                labels[onset..=offset].fill(GazeEventType::Saccade);
                saccades.push(SaccadeSpan {
                    peak,
                    onset,
                    offset,
                    offset_threshold,
                });
            } else {
                // a rejected candidate may start on the tail of a committed saccade
                for label in labels[onset..=offset].iter_mut().filter(|l| **l != GazeEventType::Saccade) {
                    *label = GazeEventType::Undefined;
                }
            }
        }
        saccades
    }

    fn detect_glissades(
        &self,
        timestamps: &[f64],
        velocities: &[f64],
        saccades: &[SaccadeSpan],
        labels: &mut [GazeEventType],
    ) {
        let n = velocities.len();
        for (i, saccade) in saccades.iter().enumerate() {
            let onset = saccade.offset + 1;
            if onset >= n {
                continue;
            }
            let threshold = saccade.offset_threshold;
            let window_end = find_window_end(timestamps, onset, LOOKAHEAD_WINDOW_MS);
            let window = &velocities[onset..=window_end];
            let crosses = window.iter().any(|v| *v > threshold) && window.iter().any(|v| *v < threshold);
            if !crosses {
                continue;
            }

            // the search stops at the next saccade, or at the end of the recording
            let (boundary, last_allowed) = match saccades.get(i + 1) {
                Some(next) if next.onset < saccade.peak => continue,
                Some(next) => (next.onset, next.onset.saturating_sub(1)),
                None => (n - 1, n - 1),
            };

            let Some(last_peak) = (onset + 1..boundary)
                .rev()
                .find(|&j| is_local_max(velocities, j) && velocities[j] > threshold)
            else {
                continue;
            };
            let mut offset = last_peak + 1;
            while offset < boundary && !(is_local_min(velocities, offset) && velocities[offset] < threshold) {
                offset += 1;
            }
            let offset = offset.min(last_allowed);
            if offset >= onset {
                labels[onset..=offset].fill(GazeEventType::Pso);
            }
        }
    }

    fn detect_fixations(&self, timestamps: &[f64], labels: &mut [GazeEventType]) {
        for chunk in chunk_indices(labels) {
            if labels[chunk.start] != GazeEventType::Undefined {
                continue;
            }
            let duration = timestamps[chunk.end - 1] - timestamps[chunk.start];
            if duration > self.config.min_fixation_duration_ms {
                labels[chunk].fill(GazeEventType::Fixation);
            }
        }
    }
}

impl GazeEventDetector for NhDetector {
    fn name(&self) -> &'static str {
        "NH"
    }

    fn classify(
        &self,
        context: &DetectionContext<'_>,
        x: &[f64],
        y: &[f64],
        labels: &[GazeEventType],
    ) -> GazeResult<Vec<GazeEventType>> {
        ensure_aligned(context, x, y, labels)?;
        let timestamps = context.timestamps;

        // --- 1. Denoising ---
        let (velocities, accelerations) = self.angular_kinematics(timestamps, x, y)?;

        // --- 2. Adaptive Peak Threshold ---
        let peak_threshold = peak_velocity_threshold(&velocities)?;
        debug!(
            threshold = peak_threshold.threshold,
            iterations = peak_threshold.iterations,
            "NH peak velocity threshold converged"
        );
        let peaks: Vec<usize> = (0..velocities.len())
            .filter(|&i| is_local_max(&velocities, i) && velocities[i] > peak_threshold.threshold)
            .collect();

        // --- 3. Saccades ---
        let mut classified = labels.to_vec();
        let saccades = self.detect_saccades(
            timestamps,
            &velocities,
            &peaks,
            peak_threshold.onset_threshold(),
            &mut classified,
        );

        // --- 4. Glissades ---
        self.detect_glissades(timestamps, &velocities, &saccades, &mut classified);

        // --- 5. Fixations ---
        self.detect_fixations(timestamps, &mut classified);

        for ((label, v), a) in classified.iter_mut().zip(&velocities).zip(&accelerations) {
            if v.is_nan() && a.is_nan() {
                *label = GazeEventType::Undefined;
            }
        }
        for (label, original) in classified.iter_mut().zip(labels) {
            if *original == GazeEventType::Blink {
                *label = GazeEventType::Blink;
            }
        }
        Ok(classified)
    }
}
