// THEORY:
// The `detector` module is the orchestration layer of the engine. It owns the
// parts of event detection that every algorithm shares, and delegates exactly one
// step, per-sample classification, to a pluggable `GazeEventDetector` strategy.
//
// Key architectural principles & pipeline stages (per eye):
// 1.  **Validation**: timestamps and coordinates must be equal-length, finite-time,
//     non-decreasing series.
// 2.  **Sampling Rate**: estimated fresh for every call from the median timestamp
//     step. It is transient state, never stored on the engine.
// 3.  **Blink Masking**: samples whose coordinates carry the missing-value marker
//     become blink candidates. Short candidates are dropped, short gaps between
//     blinks are healed, survivors are optionally dilated, and coordinates under
//     the final mask are nulled so no algorithm mistakes tracker loss for motion.
// 4.  **Classification**: the strategy labels the remaining samples.
// 5.  **Post-processing**: short chunks are erased and short interruptions between
//     identical chunks are merged. Blink labels survive every step verbatim.
// 6.  **Failure Isolation**: `detect_monocular` never fails. A trial that cannot be
//     classified is logged and comes back all-UNDEFINED, so one corrupt recording
//     cannot abort a batch.
//
// Binocular detection runs the per-eye pipeline independently and fuses the two
// label sequences according to a `BinocularPolicy`.

use crate::core_modules::chunk::{chunk_indices, merge_proximal_chunks, suppress_short_chunks};
use crate::core_modules::gaze_event_type::GazeEventType;
use crate::core_modules::signal::{self, MILLISECONDS_PER_SECOND};
use crate::error::{GazeError, GazeResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{debug, warn};

/// Per-call information an algorithm may need besides the coordinates.
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    /// Sample timestamps in milliseconds.
    pub timestamps: &'a [f64],
    /// Sampling rate in Hz, estimated from `timestamps`.
    pub sample_rate: f64,
}

impl DetectionContext<'_> {
    /// Number of samples spanning `duration_ms` at this context's sampling rate.
    pub fn samples_in(&self, duration_ms: f64) -> usize {
        samples_in(duration_ms, self.sample_rate)
    }
}

/// A per-sample classification strategy.
///
/// `classify` receives blink-masked coordinates (NaN where the eye was closed or
/// untracked) and the current labels, which hold BLINK at masked samples and
/// UNDEFINED elsewhere. It must return one label per input sample.
pub trait GazeEventDetector: Send + Sync {
    fn name(&self) -> &'static str;

    fn classify(
        &self,
        context: &DetectionContext<'_>,
        x: &[f64],
        y: &[f64],
        labels: &[GazeEventType],
    ) -> GazeResult<Vec<GazeEventType>>;
}

/// Cross-cutting parameters of the detection pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Coordinate value marking a missing sample. `None` means missing samples are NaN.
    pub missing_value: Option<f64>,
    /// Chunks shorter than this are erased after classification.
    pub min_event_duration_ms: f64,
    /// Gaps shorter than this between two identical chunks are merged.
    pub min_gap_between_identical_events_ms: f64,
    /// Missing-data runs shorter than this are not blinks.
    pub min_blink_duration_ms: f64,
    /// Non-missing gaps shorter than this between two blinks are absorbed into one blink.
    pub min_gap_between_blinks_ms: f64,
    /// Every blink is widened by this much on both sides.
    pub dilate_blinks_by_ms: f64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            missing_value: None,
            min_event_duration_ms: 5.0,
            min_gap_between_identical_events_ms: 5.0,
            min_blink_duration_ms: 5.0,
            min_gap_between_blinks_ms: 5.0,
            dilate_blinks_by_ms: 0.0,
        }
    }
}

impl DetectorConfig {
    fn is_missing(&self, value: f64) -> bool {
        match self.missing_value {
            Some(marker) if !marker.is_nan() => value == marker,
            _ => value.is_nan(),
        }
    }
}

/// How the labels of the two eyes are combined into one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinocularPolicy {
    /// Use the left eye's labels.
    Left,
    /// Use the right eye's labels.
    Right,
    /// Keep a label only where both eyes agree.
    #[default]
    Both,
    /// Keep any label reported by either eye.
    Either,
}

impl FromStr for BinocularPolicy {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(BinocularPolicy::Left),
            "right" => Ok(BinocularPolicy::Right),
            "both" | "and" => Ok(BinocularPolicy::Both),
            "either" | "or" => Ok(BinocularPolicy::Either),
            _ => Err(GazeError::invalid_argument(format!("unknown binocular policy `{s}`"))),
        }
    }
}

impl BinocularPolicy {
    /// Combines one sample's left and right labels.
    ///
    /// Under `Either`, UNDEFINED defers to the other eye, a BLINK in one eye defers to
    /// the gaze label of the other, and two different gaze labels resolve to the left eye.
    pub fn fuse(&self, left: GazeEventType, right: GazeEventType) -> GazeEventType {
        match self {
            BinocularPolicy::Left => left,
            BinocularPolicy::Right => right,
            BinocularPolicy::Both => {
                if left == right {
                    left
                } else {
                    GazeEventType::Undefined
                }
            }
            BinocularPolicy::Either => match (left, right) {
                (GazeEventType::Undefined, other) | (other, GazeEventType::Undefined) => other,
                (GazeEventType::Blink, other) | (other, GazeEventType::Blink) => other,
                (left, _) => left,
            },
        }
    }
}

/// Combines two equal-length label sequences sample by sample.
pub fn fuse_labels(
    left: &[GazeEventType],
    right: &[GazeEventType],
    policy: BinocularPolicy,
) -> GazeResult<Vec<GazeEventType>> {
    if left.len() != right.len() {
        return Err(GazeError::invalid_input(format!(
            "left ({}) and right ({}) label sequences must have the same length",
            left.len(),
            right.len()
        )));
    }
    Ok(left.iter().zip(right).map(|(l, r)| policy.fuse(*l, *r)).collect())
}

/// Number of samples spanning `duration_ms` at `sample_rate` Hz, rounded.
pub fn samples_in(duration_ms: f64, sample_rate: f64) -> usize {
    let samples = (duration_ms * sample_rate / MILLISECONDS_PER_SECOND).round();
    if samples.is_finite() && samples > 0.0 { samples as usize } else { 0 }
}

/// Checks that the coordinate and label sequences handed to `classify` line up.
pub(crate) fn ensure_aligned(
    context: &DetectionContext<'_>,
    x: &[f64],
    y: &[f64],
    labels: &[GazeEventType],
) -> GazeResult<()> {
    let n = context.timestamps.len();
    if x.len() != n || y.len() != n || labels.len() != n {
        return Err(GazeError::invalid_input(format!(
            "timestamps ({n}), x ({}), y ({}) and labels ({}) must have the same length",
            x.len(),
            y.len(),
            labels.len()
        )));
    }
    Ok(())
}

/// Sampling rate in Hz from the median step between consecutive timestamps (ms).
pub fn estimate_sample_rate(timestamps: &[f64]) -> GazeResult<f64> {
    if timestamps.len() < 2 {
        return Err(GazeError::invalid_input(format!(
            "at least 2 samples are needed to estimate the sampling rate, got {}",
            timestamps.len()
        )));
    }
    let steps = signal::diff(timestamps);
    let rate = MILLISECONDS_PER_SECOND / signal::nan_median(&steps[1..]);
    if !rate.is_finite() || rate <= 0.0 {
        return Err(GazeError::computation(format!(
            "sampling rate estimated from timestamps is not a positive finite number ({rate})"
        )));
    }
    Ok(rate)
}

/// The shared detection pipeline wrapped around one classification strategy.
pub struct DetectionEngine {
    detector: Box<dyn GazeEventDetector>,
    config: DetectorConfig,
}

impl DetectionEngine {
    pub fn new(detector: impl GazeEventDetector + 'static, config: DetectorConfig) -> Self {
        Self::from_boxed(Box::new(detector), config)
    }

    pub fn from_boxed(detector: Box<dyn GazeEventDetector>, config: DetectorConfig) -> Self {
        Self { detector, config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    /// Labels one eye's samples. Any failure is logged and yields all-UNDEFINED.
    pub fn detect_monocular(&self, timestamps: &[f64], x: &[f64], y: &[f64]) -> Vec<GazeEventType> {
        match self.try_detect_monocular(timestamps, x, y) {
            Ok(labels) => labels,
            Err(error) => {
                warn!(detector = self.detector.name(), %error, "detection failed; labelling trial as undefined");
                vec![GazeEventType::Undefined; timestamps.len()]
            }
        }
    }

    /// Labels one eye's samples, returning the first error encountered.
    pub fn try_detect_monocular(
        &self,
        timestamps: &[f64],
        x: &[f64],
        y: &[f64],
    ) -> GazeResult<Vec<GazeEventType>> {
        // --- 1. Validation ---
        validate_inputs(timestamps, x, y)?;

        // --- 2. Sampling Rate ---
        let sample_rate = estimate_sample_rate(timestamps)?;
        let context = DetectionContext {
            timestamps,
            sample_rate,
        };

        // --- 3. Blink Masking ---
        let blink_labels = self.detect_blinks(&context, x, y);
        let (x_masked, y_masked) = self.mask_coordinates(x, y, &blink_labels);
        debug!(
            detector = self.detector.name(),
            sample_rate,
            blink_samples = blink_labels.iter().filter(|l| **l == GazeEventType::Blink).count(),
            "blink masking complete"
        );

        // --- 4. Classification ---
        let mut labels = self.detector.classify(&context, &x_masked, &y_masked, &blink_labels)?;
        if labels.len() != timestamps.len() {
            return Err(GazeError::computation(format!(
                "{} returned {} labels for {} samples",
                self.detector.name(),
                labels.len(),
                timestamps.len()
            )));
        }
        restore_blinks(&mut labels, &blink_labels);

        // --- 5. Post-processing ---
        let min_event_samples = context.samples_in(self.config.min_event_duration_ms);
        let min_gap_samples = context.samples_in(self.config.min_gap_between_identical_events_ms);
        labels = suppress_short_chunks(&labels, min_event_samples, GazeEventType::Undefined);
        restore_blinks(&mut labels, &blink_labels);
        labels = merge_proximal_chunks(&labels, min_gap_samples, &[GazeEventType::Blink]);
        restore_blinks(&mut labels, &blink_labels);

        Ok(labels)
    }

    /// Labels both eyes independently and fuses the results with `policy`.
    pub fn detect_binocular(
        &self,
        timestamps: &[f64],
        left: (&[f64], &[f64]),
        right: (&[f64], &[f64]),
        policy: BinocularPolicy,
    ) -> Vec<GazeEventType> {
        match policy {
            BinocularPolicy::Left => self.detect_monocular(timestamps, left.0, left.1),
            BinocularPolicy::Right => self.detect_monocular(timestamps, right.0, right.1),
            BinocularPolicy::Both | BinocularPolicy::Either => {
                let left_labels = self.detect_monocular(timestamps, left.0, left.1);
                let right_labels = self.detect_monocular(timestamps, right.0, right.1);
                // both sequences have the length of `timestamps`
                left_labels
                    .iter()
                    .zip(&right_labels)
                    .map(|(l, r)| policy.fuse(*l, *r))
                    .collect()
            }
        }
    }

    fn detect_blinks(&self, context: &DetectionContext<'_>, x: &[f64], y: &[f64]) -> Vec<GazeEventType> {
        let candidates: Vec<GazeEventType> = x
            .iter()
            .zip(y)
            .map(|(x, y)| {
                if self.config.is_missing(*x) || self.config.is_missing(*y) {
                    GazeEventType::Blink
                } else {
                    GazeEventType::Undefined
                }
            })
            .collect();

        let min_blink_samples = context.samples_in(self.config.min_blink_duration_ms);
        let min_gap_samples = context.samples_in(self.config.min_gap_between_blinks_ms);
        let blinks = suppress_short_chunks(&candidates, min_blink_samples, GazeEventType::Undefined);
        let blinks = merge_proximal_chunks(&blinks, min_gap_samples, &[GazeEventType::Blink]);

        let dilation = context.samples_in(self.config.dilate_blinks_by_ms);
        if dilation == 0 {
            return blinks;
        }
        let mut dilated = blinks.clone();
        for chunk in chunk_indices(&blinks) {
            if blinks[chunk.start] != GazeEventType::Blink {
                continue;
            }
            let start = chunk.start.saturating_sub(dilation);
            let end = (chunk.end + dilation).min(blinks.len());
            dilated[start..end].fill(GazeEventType::Blink);
        }
        dilated
    }

    /// Copies of the coordinates with NaN at blinks and at any other missing sample.
    fn mask_coordinates(&self, x: &[f64], y: &[f64], blinks: &[GazeEventType]) -> (Vec<f64>, Vec<f64>) {
        let mask = |values: &[f64]| -> Vec<f64> {
            values
                .iter()
                .zip(blinks)
                .map(|(v, label)| {
                    if *label == GazeEventType::Blink || self.config.is_missing(*v) {
                        f64::NAN
                    } else {
                        *v
                    }
                })
                .collect()
        };
        (mask(x), mask(y))
    }
}

fn restore_blinks(labels: &mut [GazeEventType], blinks: &[GazeEventType]) {
    for (label, blink) in labels.iter_mut().zip(blinks) {
        if *blink == GazeEventType::Blink {
            *label = GazeEventType::Blink;
        }
    }
}

fn validate_inputs(timestamps: &[f64], x: &[f64], y: &[f64]) -> GazeResult<()> {
    if timestamps.len() != x.len() || timestamps.len() != y.len() {
        return Err(GazeError::invalid_input(format!(
            "timestamps ({}), x ({}) and y ({}) must have the same length",
            timestamps.len(),
            x.len(),
            y.len()
        )));
    }
    if timestamps.iter().any(|t| !t.is_finite()) {
        return Err(GazeError::invalid_input("timestamps must be finite"));
    }
    if timestamps.windows(2).any(|w| w[1] < w[0]) {
        return Err(GazeError::invalid_input("timestamps must be non-decreasing"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::gaze_event_type::GazeEventType::*;
    use approx::assert_relative_eq;

    /// Labels every unmasked sample as a fixation.
    struct FixateEverywhere;

    impl GazeEventDetector for FixateEverywhere {
        fn name(&self) -> &'static str {
            "fixate-everywhere"
        }

        fn classify(
            &self,
            _context: &DetectionContext<'_>,
            x: &[f64],
            _y: &[f64],
            labels: &[GazeEventType],
        ) -> GazeResult<Vec<GazeEventType>> {
            Ok(x.iter()
                .zip(labels)
                .map(|(x, label)| if x.is_nan() { *label } else { Fixation })
                .collect())
        }
    }

    struct AlwaysFails;

    impl GazeEventDetector for AlwaysFails {
        fn name(&self) -> &'static str {
            "always-fails"
        }

        fn classify(
            &self,
            _context: &DetectionContext<'_>,
            _x: &[f64],
            _y: &[f64],
            _labels: &[GazeEventType],
        ) -> GazeResult<Vec<GazeEventType>> {
            Err(GazeError::invalid_input("window does not fit"))
        }
    }

    fn timestamps(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64 * 2.0).collect()
    }

    #[test]
    fn sample_rate_from_median_step() {
        assert_relative_eq!(estimate_sample_rate(&timestamps(10)).unwrap(), 500.0);
        let irregular = [0.0, 1.0, 2.0, 3.0, 10.0];
        assert_relative_eq!(estimate_sample_rate(&irregular).unwrap(), 1000.0);
        assert!(matches!(estimate_sample_rate(&[0.0]), Err(GazeError::InvalidInput(_))));
        assert!(matches!(estimate_sample_rate(&[5.0, 5.0, 5.0]), Err(GazeError::Computation(_))));
    }

    #[test]
    fn samples_in_rounds_durations() {
        assert_eq!(samples_in(5.0, 500.0), 3);
        assert_eq!(samples_in(10.0, 500.0), 5);
        assert_eq!(samples_in(0.0, 500.0), 0);
        assert_eq!(samples_in(5.0, f64::NAN), 0);
    }

    #[test]
    fn policy_parsing() {
        assert_eq!("and".parse::<BinocularPolicy>().unwrap(), BinocularPolicy::Both);
        assert_eq!("OR".parse::<BinocularPolicy>().unwrap(), BinocularPolicy::Either);
        assert_eq!("right".parse::<BinocularPolicy>().unwrap(), BinocularPolicy::Right);
        assert!(matches!("nose".parse::<BinocularPolicy>(), Err(GazeError::InvalidArgument(_))));
    }

    #[test]
    fn both_policy_keeps_agreement_only() {
        let left = vec![Fixation; 10];
        let mut right = vec![Fixation; 5];
        right.extend([Saccade; 5]);
        let fused = fuse_labels(&left, &right, BinocularPolicy::Both).unwrap();
        assert_eq!(&fused[..5], &[Fixation; 5]);
        assert_eq!(&fused[5..], &[Undefined; 5]);
    }

    #[test]
    fn either_policy_tie_breaks() {
        let policy = BinocularPolicy::Either;
        assert_eq!(policy.fuse(Undefined, Saccade), Saccade);
        assert_eq!(policy.fuse(Fixation, Undefined), Fixation);
        assert_eq!(policy.fuse(Blink, Fixation), Fixation);
        assert_eq!(policy.fuse(Saccade, Blink), Saccade);
        assert_eq!(policy.fuse(Saccade, Fixation), Saccade);
        assert_eq!(policy.fuse(Blink, Blink), Blink);
        assert!(fuse_labels(&[Fixation], &[], policy).is_err());
    }

    #[test]
    fn missing_samples_become_blinks() {
        let engine = DetectionEngine::new(FixateEverywhere, DetectorConfig::default());
        let ts = timestamps(50);
        let mut x = vec![100.0; 50];
        let y = vec![100.0; 50];
        x[10..15].fill(f64::NAN);
        let labels = engine.detect_monocular(&ts, &x, &y);
        assert_eq!(&labels[..10], &[Fixation; 10]);
        assert_eq!(&labels[10..15], &[Blink; 5]);
        assert_eq!(&labels[15..], &[Fixation; 35]);
    }

    #[test]
    fn isolated_missing_sample_is_not_a_blink() {
        let engine = DetectionEngine::new(FixateEverywhere, DetectorConfig::default());
        let ts = timestamps(30);
        let mut x = vec![100.0; 30];
        let y = vec![100.0; 30];
        x[12] = f64::NAN;
        let labels = engine.detect_monocular(&ts, &x, &y);
        assert!(!labels.contains(&Blink));
        // the single masked sample is healed by the surrounding fixation
        assert_eq!(labels, vec![Fixation; 30]);
    }

    #[test]
    fn custom_missing_marker_and_dilation() {
        let config = DetectorConfig {
            missing_value: Some(-1.0),
            dilate_blinks_by_ms: 4.0,
            ..DetectorConfig::default()
        };
        let engine = DetectionEngine::new(FixateEverywhere, config);
        let ts = timestamps(40);
        let mut x = vec![100.0; 40];
        let mut y = vec![100.0; 40];
        x[20..25].fill(-1.0);
        y[20..25].fill(-1.0);
        let labels = engine.detect_monocular(&ts, &x, &y);
        // 4 ms at 500 Hz widens each side by 2 samples
        assert_eq!(&labels[18..27], &[Blink; 9]);
        assert_eq!(labels[17], Fixation);
        assert_eq!(labels[27], Fixation);
    }

    #[test]
    fn dilation_is_clamped_at_the_recording_edges() {
        let config = DetectorConfig {
            dilate_blinks_by_ms: 10.0,
            ..DetectorConfig::default()
        };
        let engine = DetectionEngine::new(FixateEverywhere, config);
        let ts = timestamps(30);
        let mut x = vec![100.0; 30];
        let mut y = vec![100.0; 30];
        for i in (0..4).chain(27..30) {
            x[i] = f64::NAN;
            y[i] = f64::NAN;
        }
        let labels = engine.try_detect_monocular(&ts, &x, &y).unwrap();
        assert_eq!(labels.len(), 30);
        assert_eq!(&labels[..9], &[Blink; 9]);
        assert_eq!(&labels[9..22], &[Fixation; 13]);
        assert_eq!(&labels[22..], &[Blink; 8]);
    }

    #[test]
    fn short_gap_between_blinks_is_absorbed() {
        let engine = DetectionEngine::new(FixateEverywhere, DetectorConfig::default());
        let ts = timestamps(40);
        let mut x = vec![100.0; 40];
        let y = vec![100.0; 40];
        x[10..15].fill(f64::NAN);
        x[17..22].fill(f64::NAN);
        let labels = engine.detect_monocular(&ts, &x, &y);
        assert_eq!(&labels[10..22], &[Blink; 12]);
    }

    #[test]
    fn failures_degrade_to_undefined() {
        let engine = DetectionEngine::new(AlwaysFails, DetectorConfig::default());
        let ts = timestamps(20);
        let x = vec![1.0; 20];
        assert_eq!(engine.detect_monocular(&ts, &x, &x), vec![Undefined; 20]);
        assert!(matches!(
            engine.try_detect_monocular(&ts, &x, &x),
            Err(GazeError::InvalidInput(_))
        ));
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let engine = DetectionEngine::new(FixateEverywhere, DetectorConfig::default());
        let ts = timestamps(10);
        let x = vec![1.0; 10];
        assert!(matches!(
            engine.try_detect_monocular(&ts, &x[..9], &x),
            Err(GazeError::InvalidInput(_))
        ));
        let mut backwards = ts.clone();
        backwards.swap(3, 4);
        assert!(engine.try_detect_monocular(&backwards, &x, &x).is_err());
        // the degrading path still answers with one label per timestamp
        assert_eq!(engine.detect_monocular(&ts, &x[..9], &x).len(), 10);
    }

    #[test]
    fn binocular_detection_fuses_per_policy() {
        let engine = DetectionEngine::new(FixateEverywhere, DetectorConfig::default());
        let ts = timestamps(30);
        let clean = vec![50.0; 30];
        let mut closed = vec![50.0; 30];
        closed[10..20].fill(f64::NAN);

        let both = engine.detect_binocular(&ts, (&clean, &clean), (&closed, &clean), BinocularPolicy::Both);
        assert_eq!(&both[10..20], &[Undefined; 10]);
        assert_eq!(both[0], Fixation);

        let either = engine.detect_binocular(&ts, (&clean, &clean), (&closed, &clean), BinocularPolicy::Either);
        assert_eq!(either, vec![Fixation; 30]);

        let right = engine.detect_binocular(&ts, (&clean, &clean), (&closed, &clean), BinocularPolicy::Right);
        assert_eq!(&right[10..20], &[Blink; 10]);
    }
}
