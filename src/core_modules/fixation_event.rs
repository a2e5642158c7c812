use crate::core_modules::gaze_event::{same_values, DurationBounds, EventCore, GazeTrace};
use crate::core_modules::screen_monitor::ViewingGeometry;
use crate::core_modules::signal;
use crate::core_modules::visual_angle::Point;
use crate::error::{GazeError, GazeResult};

/// A period during which gaze stayed on one location.
#[derive(Debug, Clone)]
pub struct FixationEvent {
    core: EventCore,
    trace: GazeTrace,
    /// Pupil size per sample (mm). `None` when the recording has no pupil channel.
    pupil: Option<Vec<f64>>,
}

impl FixationEvent {
    pub fn new(
        timestamps: Vec<f64>,
        x: Vec<f64>,
        y: Vec<f64>,
        pupil: Option<Vec<f64>>,
        geometry: ViewingGeometry,
        bounds: DurationBounds,
    ) -> GazeResult<Self> {
        let core = EventCore::new(timestamps, bounds)?;
        let trace = GazeTrace::new(&core, x, y, geometry)?;
        if let Some(pupil) = &pupil {
            if pupil.len() != trace.x().len() {
                return Err(GazeError::invalid_input(format!(
                    "pupil sizes ({}) and gaze samples ({}) must have the same length",
                    pupil.len(),
                    trace.x().len()
                )));
            }
        }
        Ok(Self { core, trace, pupil })
    }

    pub fn core(&self) -> &EventCore {
        &self.core
    }

    pub fn trace(&self) -> &GazeTrace {
        &self.trace
    }

    pub fn pupil_sizes(&self) -> Option<&[f64]> {
        self.pupil.as_deref()
    }

    /// Mean gaze position, ignoring missing samples.
    pub fn center_of_mass(&self) -> Point {
        (signal::nan_mean(self.trace.x()), signal::nan_mean(self.trace.y()))
    }

    pub fn standard_deviation(&self) -> (f64, f64) {
        (signal::nan_std(self.trace.x()), signal::nan_std(self.trace.y()))
    }

    /// Largest distance in pixels between any two samples of the fixation.
    pub fn dispersion(&self) -> f64 {
        let points: Vec<Point> = self
            .trace
            .x()
            .iter()
            .zip(self.trace.y())
            .map(|(x, y)| (*x, *y))
            .filter(|(x, y)| !x.is_nan() && !y.is_nan())
            .collect();
        let mut max_distance = f64::NAN;
        for (i, a) in points.iter().enumerate() {
            for b in &points[i..] {
                let distance = (a.0 - b.0).hypot(a.1 - b.1);
                if max_distance.is_nan() || distance > max_distance {
                    max_distance = distance;
                }
            }
        }
        max_distance
    }

    pub fn mean_pupil_size(&self) -> f64 {
        self.pupil.as_deref().map_or(f64::NAN, signal::nan_mean)
    }

    pub fn std_pupil_size(&self) -> f64 {
        self.pupil.as_deref().map_or(f64::NAN, signal::nan_std)
    }
}

impl PartialEq for FixationEvent {
    fn eq(&self, other: &Self) -> bool {
        let pupils_match = match (&self.pupil, &other.pupil) {
            (Some(a), Some(b)) => same_values(a, b),
            (None, None) => true,
            _ => false,
        };
        self.core == other.core && self.trace == other.trace && pupils_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::gaze_event::GazeEvent;
    use approx::assert_relative_eq;

    fn fixation(pupil: Option<Vec<f64>>) -> FixationEvent {
        let ts: Vec<f64> = (0..5).map(|i| 100.0 + i as f64 * 2.0).collect();
        let x = vec![10.0, 12.0, f64::NAN, 14.0, 13.0];
        let y = vec![20.0, 20.0, f64::NAN, 23.0, 21.0];
        FixationEvent::new(ts, x, y, pupil, ViewingGeometry::default(), DurationBounds::FIXATION).unwrap()
    }

    #[test]
    fn spatial_statistics_ignore_missing_samples() {
        let event = fixation(None);
        let (cx, cy) = event.center_of_mass();
        assert_relative_eq!(cx, 12.25);
        assert_relative_eq!(cy, 21.0);
        let (sx, _) = event.standard_deviation();
        assert_relative_eq!(sx, 1.479_019_945_774_904, epsilon = 1e-12);
        // (10, 20) to (14, 23)
        assert_relative_eq!(event.dispersion(), 5.0);
    }

    #[test]
    fn pupil_statistics() {
        assert!(fixation(None).mean_pupil_size().is_nan());
        let event = fixation(Some(vec![3.0, 3.2, f64::NAN, 3.4, 3.0]));
        assert_relative_eq!(event.mean_pupil_size(), 3.15, epsilon = 1e-12);
        assert!(event.std_pupil_size() > 0.0);

        let ts = vec![0.0, 2.0];
        let result = FixationEvent::new(
            ts,
            vec![0.0; 2],
            vec![0.0; 2],
            Some(vec![3.0]),
            ViewingGeometry::default(),
            DurationBounds::FIXATION,
        );
        assert!(result.is_err());
    }

    #[test]
    fn summary_and_display() {
        let event = GazeEvent::Fixation(fixation(Some(vec![3.0; 5])));
        assert_eq!(event.to_string(), "Fixation (8.0 ms)");
        let summary = event.summary();
        assert_eq!(summary.center_of_mass, Some((12.25, 21.0)));
        assert_eq!(summary.mean_pupil_size, Some(3.0));
        assert!(summary.amplitude.is_none());
        assert!(summary.is_outlier);
    }

    #[test]
    fn equality_treats_missing_samples_as_equal() {
        assert_eq!(fixation(None), fixation(None));
        assert_ne!(fixation(None), fixation(Some(vec![3.0; 5])));
    }
}
