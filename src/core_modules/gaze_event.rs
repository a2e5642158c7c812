// THEORY:
// The `gaze_event` module is the record layer of the engine. Where the detectors
// speak in per-sample labels, downstream analysis speaks in events: a fixation
// with a center and a spread, a saccade with an amplitude and a direction, a
// blink with a duration. An event is built once from a chunk of samples and is
// immutable afterwards.
//
// Key architectural principles:
// 1.  **Closed Set**: `GazeEvent` is a sum type over the event kinds, so every
//     consumer handles every kind through one exhaustive match.
// 2.  **Shared Core**: every event owns an `EventCore` (validated timestamps plus
//     duration bounds). Events with gaze data also own a `GazeTrace`.
// 3.  **Per-Instance Bounds**: the duration range outside which an event counts as
//     an outlier is passed in at construction, never read from shared state.

use crate::core_modules::blink_event::BlinkEvent;
use crate::core_modules::fixation_event::FixationEvent;
use crate::core_modules::gaze_event_type::GazeEventType;
use crate::core_modules::saccade_event::SaccadeEvent;
use crate::core_modules::screen_monitor::ViewingGeometry;
use crate::core_modules::signal;
use crate::core_modules::visual_angle::{self, Point};
use crate::error::{GazeError, GazeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MINIMUM_SAMPLES_PER_EVENT: usize = 2;

/// Which eye a sample stream was recorded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eye {
    Left,
    Right,
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Eye::Left => "left",
            Eye::Right => "right",
        })
    }
}

impl FromStr for Eye {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" | "l" => Ok(Eye::Left),
            "right" | "r" => Ok(Eye::Right),
            _ => Err(GazeError::invalid_argument(format!("unknown eye `{s}`"))),
        }
    }
}

/// The duration range, in milliseconds, of a plausible event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationBounds {
    pub min_ms: f64,
    pub max_ms: f64,
}

impl DurationBounds {
    pub const GENERIC: Self = Self::new(5.0, 2500.0);
    pub const BLINK: Self = Self::new(50.0, 2500.0);
    pub const FIXATION: Self = Self::new(50.0, 2000.0);
    pub const SACCADE: Self = Self::new(5.0, 500.0);

    pub const fn new(min_ms: f64, max_ms: f64) -> Self {
        Self { min_ms, max_ms }
    }
}

impl Default for DurationBounds {
    fn default() -> Self {
        Self::GENERIC
    }
}

/// Duration bounds for each kind of event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDurationBounds {
    pub blink: DurationBounds,
    pub fixation: DurationBounds,
    pub saccade: DurationBounds,
}

impl Default for EventDurationBounds {
    fn default() -> Self {
        Self {
            blink: DurationBounds::BLINK,
            fixation: DurationBounds::FIXATION,
            saccade: DurationBounds::SACCADE,
        }
    }
}

/// Why an event was flagged as an outlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierReason {
    MinDuration,
    MaxDuration,
}

/// Timestamps and duration bounds shared by every event.
#[derive(Debug, Clone)]
pub struct EventCore {
    timestamps: Vec<f64>,
    bounds: DurationBounds,
}

impl EventCore {
    pub fn new(timestamps: Vec<f64>, bounds: DurationBounds) -> GazeResult<Self> {
        if timestamps.len() < MINIMUM_SAMPLES_PER_EVENT {
            return Err(GazeError::invalid_input(format!(
                "an event needs at least {MINIMUM_SAMPLES_PER_EVENT} samples, got {}",
                timestamps.len()
            )));
        }
        if timestamps.iter().any(|t| !t.is_finite()) {
            return Err(GazeError::invalid_input("event timestamps must be finite"));
        }
        if timestamps.iter().any(|t| *t < 0.0) {
            return Err(GazeError::invalid_input("event timestamps must not be negative"));
        }
        Ok(Self { timestamps, bounds })
    }

    pub fn start_time(&self) -> f64 {
        self.timestamps[0]
    }

    pub fn end_time(&self) -> f64 {
        self.timestamps[self.timestamps.len() - 1]
    }

    pub fn duration(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    pub fn bounds(&self) -> DurationBounds {
        self.bounds
    }

    pub fn raw_timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    /// Timestamps rounded to `round_decimals`, optionally shifted to start at zero.
    pub fn timestamps(&self, round_decimals: u32, zero_corrected: bool) -> Vec<f64> {
        let origin = if zero_corrected { self.start_time() } else { 0.0 };
        let scale = 10f64.powi(round_decimals as i32);
        self.timestamps
            .iter()
            .map(|t| ((t - origin) * scale).round() / scale)
            .collect()
    }

    pub fn outlier_reasons(&self) -> Vec<OutlierReason> {
        let mut reasons = Vec::new();
        let duration = self.duration();
        if duration < self.bounds.min_ms {
            reasons.push(OutlierReason::MinDuration);
        }
        if duration > self.bounds.max_ms {
            reasons.push(OutlierReason::MaxDuration);
        }
        reasons
    }
}

impl PartialEq for EventCore {
    fn eq(&self, other: &Self) -> bool {
        self.timestamps.len() == other.timestamps.len()
            && self
                .timestamps
                .iter()
                .zip(&other.timestamps)
                .all(|(a, b)| (a - b).abs() <= 1e-8 + 1e-5 * b.abs())
    }
}

/// Gaze coordinates of an event with their per-sample velocities.
#[derive(Debug, Clone)]
pub struct GazeTrace {
    x: Vec<f64>,
    y: Vec<f64>,
    geometry: ViewingGeometry,
    /// Pixels per second, relative to the previous sample; the first is NaN.
    velocities: Vec<f64>,
}

impl GazeTrace {
    pub fn new(core: &EventCore, x: Vec<f64>, y: Vec<f64>, geometry: ViewingGeometry) -> GazeResult<Self> {
        if !geometry.viewer_distance_cm.is_finite() || geometry.viewer_distance_cm <= 0.0 {
            return Err(GazeError::invalid_input(format!(
                "viewer distance must be a positive finite number, got {}",
                geometry.viewer_distance_cm
            )));
        }
        let n = core.raw_timestamps().len();
        if x.len() != n || y.len() != n {
            return Err(GazeError::invalid_input(format!(
                "timestamps ({n}), x ({}) and y ({}) must have the same length",
                x.len(),
                y.len()
            )));
        }
        let velocities = visual_angle::velocities(&x, &y, core.raw_timestamps())?;
        Ok(Self {
            x,
            y,
            geometry,
            velocities,
        })
    }

    pub fn x(&self) -> &[f64] {
        &self.x
    }

    pub fn y(&self) -> &[f64] {
        &self.y
    }

    pub fn geometry(&self) -> ViewingGeometry {
        self.geometry
    }

    pub fn velocities(&self) -> &[f64] {
        &self.velocities
    }

    pub fn max_velocity(&self) -> f64 {
        signal::nan_max(&self.velocities)
    }

    pub fn mean_velocity(&self) -> f64 {
        signal::nan_mean(&self.velocities)
    }

    pub fn first_point(&self) -> Point {
        (self.x[0], self.y[0])
    }

    pub fn last_point(&self) -> Point {
        (self.x[self.x.len() - 1], self.y[self.y.len() - 1])
    }
}

/// Element-wise equality where two NaNs compare equal.
pub(crate) fn same_values(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| a == b || (a.is_nan() && b.is_nan()))
}

impl PartialEq for GazeTrace {
    fn eq(&self, other: &Self) -> bool {
        self.geometry.viewer_distance_cm == other.geometry.viewer_distance_cm
            && same_values(&self.x, &other.x)
            && same_values(&self.y, &other.y)
    }
}

/// A detected oculomotor event.
#[derive(Debug, Clone, PartialEq)]
pub enum GazeEvent {
    Blink(BlinkEvent),
    Fixation(FixationEvent),
    Saccade(SaccadeEvent),
}

impl GazeEvent {
    pub fn core(&self) -> &EventCore {
        match self {
            GazeEvent::Blink(event) => event.core(),
            GazeEvent::Fixation(event) => event.core(),
            GazeEvent::Saccade(event) => event.core(),
        }
    }

    /// Gaze coordinates, for events that carry them.
    pub fn trace(&self) -> Option<&GazeTrace> {
        match self {
            GazeEvent::Blink(_) => None,
            GazeEvent::Fixation(event) => Some(event.trace()),
            GazeEvent::Saccade(event) => Some(event.trace()),
        }
    }

    pub fn event_type(&self) -> GazeEventType {
        match self {
            GazeEvent::Blink(_) => GazeEventType::Blink,
            GazeEvent::Fixation(_) => GazeEventType::Fixation,
            GazeEvent::Saccade(_) => GazeEventType::Saccade,
        }
    }

    pub fn start_time(&self) -> f64 {
        self.core().start_time()
    }

    pub fn end_time(&self) -> f64 {
        self.core().end_time()
    }

    pub fn duration(&self) -> f64 {
        self.core().duration()
    }

    pub fn outlier_reasons(&self) -> Vec<OutlierReason> {
        self.core().outlier_reasons()
    }

    pub fn is_outlier(&self) -> bool {
        !self.outlier_reasons().is_empty()
    }

    pub fn timestamps(&self, round_decimals: u32, zero_corrected: bool) -> Vec<f64> {
        self.core().timestamps(round_decimals, zero_corrected)
    }

    /// Flat record of the event's properties.
    pub fn summary(&self) -> EventSummary {
        let mut summary = EventSummary {
            event_type: self.event_type(),
            start_time: self.start_time(),
            end_time: self.end_time(),
            duration: self.duration(),
            is_outlier: self.is_outlier(),
            outlier_reasons: self.outlier_reasons(),
            ..EventSummary::default()
        };
        if let Some(trace) = self.trace() {
            summary.max_velocity = Some(trace.max_velocity());
            summary.mean_velocity = Some(trace.mean_velocity());
        }
        match self {
            GazeEvent::Blink(_) => {}
            GazeEvent::Fixation(fixation) => {
                summary.center_of_mass = Some(fixation.center_of_mass());
                summary.standard_deviation = Some(fixation.standard_deviation());
                summary.dispersion = Some(fixation.dispersion());
                summary.mean_pupil_size = Some(fixation.mean_pupil_size());
                summary.std_pupil_size = Some(fixation.std_pupil_size());
            }
            GazeEvent::Saccade(saccade) => {
                summary.start_point = Some(saccade.start_point());
                summary.end_point = Some(saccade.end_point());
                summary.distance = Some(saccade.distance());
                summary.amplitude = Some(saccade.amplitude());
                summary.azimuth = Some(saccade.azimuth());
            }
        }
        summary
    }
}

impl fmt::Display for GazeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            GazeEvent::Blink(_) => "Blink",
            GazeEvent::Fixation(_) => "Fixation",
            GazeEvent::Saccade(_) => "Saccade",
        };
        write!(f, "{kind} ({:.1} ms)", self.duration())
    }
}

/// Serializable summary of one event. Type-specific fields are `None` for other kinds.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_type: GazeEventType,
    pub start_time: f64,
    pub end_time: f64,
    pub duration: f64,
    pub is_outlier: bool,
    pub outlier_reasons: Vec<OutlierReason>,
    /// Pixels per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_velocity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center_of_mass: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_deviation: Option<(f64, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dispersion: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_pupil_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std_pupil_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_point: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_point: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    /// Degrees of visual angle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amplitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub azimuth: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn core_validates_timestamps() {
        let bounds = DurationBounds::GENERIC;
        assert!(matches!(EventCore::new(vec![1.0], bounds), Err(GazeError::InvalidInput(_))));
        assert!(EventCore::new(vec![0.0, f64::NAN], bounds).is_err());
        assert!(EventCore::new(vec![0.0, f64::INFINITY], bounds).is_err());
        assert!(EventCore::new(vec![-2.0, 0.0], bounds).is_err());
        assert!(EventCore::new(vec![0.0, 2.0], bounds).is_ok());
    }

    #[test]
    fn core_timing_and_outliers() {
        let core = EventCore::new(vec![10.04, 12.0, 14.0, 16.0], DurationBounds::new(1.0, 5.0)).unwrap();
        assert_relative_eq!(core.start_time(), 10.04);
        assert_relative_eq!(core.end_time(), 16.0);
        assert_relative_eq!(core.duration(), 5.96, epsilon = 1e-12);
        assert_eq!(core.outlier_reasons(), vec![OutlierReason::MaxDuration]);
        assert_eq!(core.timestamps(1, true), vec![0.0, 2.0, 4.0, 6.0]);
        assert_eq!(core.timestamps(0, false), vec![10.0, 12.0, 14.0, 16.0]);

        let short = EventCore::new(vec![0.0, 2.0], DurationBounds::new(5.0, 10.0)).unwrap();
        assert_eq!(short.outlier_reasons(), vec![OutlierReason::MinDuration]);
    }

    #[test]
    fn trace_validates_geometry_and_lengths() {
        let core = EventCore::new(vec![0.0, 2.0, 4.0], DurationBounds::GENERIC).unwrap();
        let geometry = ViewingGeometry::default();
        let bad = ViewingGeometry::new(0.0, geometry.pixel_size_cm);
        assert!(GazeTrace::new(&core, vec![0.0; 3], vec![0.0; 3], bad).is_err());
        assert!(GazeTrace::new(&core, vec![0.0; 2], vec![0.0; 3], geometry).is_err());

        let trace = GazeTrace::new(&core, vec![0.0, 2.0, 6.0], vec![0.0; 3], geometry).unwrap();
        assert!(trace.velocities()[0].is_nan());
        assert_relative_eq!(trace.max_velocity(), 2000.0);
        assert_relative_eq!(trace.mean_velocity(), 1500.0);
    }

    #[test]
    fn outlier_reasons_serialize_in_snake_case() {
        let json = serde_json::to_string(&vec![OutlierReason::MinDuration, OutlierReason::MaxDuration]).unwrap();
        assert_eq!(json, r#"["min_duration","max_duration"]"#);
    }

    #[test]
    fn eyes_parse_leniently() {
        assert_eq!("L".parse::<Eye>().unwrap(), Eye::Left);
        assert_eq!(" Right ".parse::<Eye>().unwrap(), Eye::Right);
        assert!(matches!("both".parse::<Eye>(), Err(GazeError::InvalidArgument(_))));
    }
}
