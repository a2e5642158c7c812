// THEORY:
// The `event_builder` turns a labelled trial into its narrative of events, the
// same way a scene manager turns tracked objects into moments. Every chunk of
// identically labelled samples becomes at most one event.
//
// Key architectural principles:
// 1.  **Chunk-to-Event**: the label of a chunk selects the event kind through one
//     exhaustive match. UNDEFINED chunks, and labels without an event kind (PSO,
//     smooth pursuit), produce nothing.
// 2.  **Failure Isolation**: a chunk that cannot form a valid event (a single
//     sample, a corrupt timestamp) is logged and skipped. Aggregation as a whole
//     only fails when the trial's own arrays do not line up.
// 3.  **Chronology**: events come out ordered by start time. The sort is stable,
//     so ties keep their chunk order.

use crate::core_modules::blink_event::BlinkEvent;
use crate::core_modules::chunk::chunk_indices;
use crate::core_modules::fixation_event::FixationEvent;
use crate::core_modules::gaze_event::{Eye, EventDurationBounds, GazeEvent};
use crate::core_modules::gaze_event_type::GazeEventType;
use crate::core_modules::saccade_event::SaccadeEvent;
use crate::core_modules::screen_monitor::ViewingGeometry;
use crate::error::{GazeError, GazeResult};
use std::ops::Range;
use tracing::{debug, warn};

/// One eye's samples, borrowed from a trial.
#[derive(Debug, Clone, Copy)]
pub struct EventSamples<'a> {
    pub timestamps: &'a [f64],
    pub x: &'a [f64],
    pub y: &'a [f64],
    pub pupil: Option<&'a [f64]>,
}

impl EventSamples<'_> {
    fn validate(&self, labels: usize) -> GazeResult<()> {
        let n = self.timestamps.len();
        let pupil = self.pupil.map_or(n, <[f64]>::len);
        if self.x.len() != n || self.y.len() != n || pupil != n || labels != n {
            return Err(GazeError::invalid_input(format!(
                "timestamps ({n}), x ({}), y ({}), pupil ({pupil}) and labels ({labels}) must have the same length",
                self.x.len(),
                self.y.len()
            )));
        }
        Ok(())
    }
}

/// How `aggregate_events` turns chunks into events.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventBuilder {
    pub geometry: ViewingGeometry,
    pub bounds: EventDurationBounds,
}

impl EventBuilder {
    pub fn new(geometry: ViewingGeometry, bounds: EventDurationBounds) -> Self {
        Self { geometry, bounds }
    }

    /// Builds the event for one chunk, or `None` when its label has no event kind.
    pub fn build(
        &self,
        label: GazeEventType,
        samples: &EventSamples<'_>,
        range: Range<usize>,
    ) -> Option<GazeResult<GazeEvent>> {
        let timestamps = samples.timestamps[range.clone()].to_vec();
        let x = || samples.x[range.clone()].to_vec();
        let y = || samples.y[range.clone()].to_vec();
        let event = match label {
            GazeEventType::Undefined | GazeEventType::Pso | GazeEventType::SmoothPursuit => return None,
            GazeEventType::Blink => BlinkEvent::new(timestamps, self.bounds.blink).map(GazeEvent::Blink),
            GazeEventType::Fixation => FixationEvent::new(
                timestamps,
                x(),
                y(),
                samples.pupil.map(|p| p[range.clone()].to_vec()),
                self.geometry,
                self.bounds.fixation,
            )
            .map(GazeEvent::Fixation),
            GazeEventType::Saccade => {
                SaccadeEvent::new(timestamps, x(), y(), self.geometry, self.bounds.saccade).map(GazeEvent::Saccade)
            }
        };
        Some(event)
    }

    /// Builds one event per labelled chunk, ordered by start time.
    pub fn aggregate_events(
        &self,
        samples: &EventSamples<'_>,
        labels: &[GazeEventType],
        eye: Option<Eye>,
    ) -> GazeResult<Vec<GazeEvent>> {
        samples.validate(labels.len())?;

        let mut events = Vec::new();
        for chunk in chunk_indices(labels) {
            let label = labels[chunk.start];
            match self.build(label, samples, chunk.clone()) {
                None if label.is_undefined() => {}
                None => {
                    debug!(
                        event_type = %label,
                        eye = ?eye,
                        start = chunk.start,
                        end = chunk.end,
                        "no event kind for chunk"
                    );
                }
                Some(Ok(event)) => events.push(event),
                Some(Err(error)) => {
                    warn!(
                        event_type = %label,
                        eye = ?eye,
                        start = chunk.start,
                        end = chunk.end,
                        %error,
                        "skipping chunk that does not form a valid event"
                    );
                }
            }
        }
        events.sort_by(|a, b| a.start_time().total_cmp(&b.start_time()));
        Ok(events)
    }
}

/// Aggregates with the given geometry and default duration bounds.
pub fn aggregate_events(
    samples: &EventSamples<'_>,
    labels: &[GazeEventType],
    geometry: ViewingGeometry,
    eye: Option<Eye>,
) -> GazeResult<Vec<GazeEvent>> {
    EventBuilder::new(geometry, EventDurationBounds::default()).aggregate_events(samples, labels, eye)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::gaze_event_type::GazeEventType::*;

    fn samples<'a>(ts: &'a [f64], x: &'a [f64], y: &'a [f64]) -> EventSamples<'a> {
        EventSamples {
            timestamps: ts,
            x,
            y,
            pupil: None,
        }
    }

    #[test]
    fn one_event_per_defined_chunk() {
        let ts: Vec<f64> = (0..12).map(|i| i as f64 * 2.0).collect();
        let x: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let y = vec![0.0; 12];
        let labels = [
            Undefined, Fixation, Fixation, Fixation, Saccade, Saccade, Pso, Pso, Blink, Blink, Fixation, Fixation,
        ];
        let events = aggregate_events(&samples(&ts, &x, &y), &labels, ViewingGeometry::default(), None).unwrap();
        let kinds: Vec<GazeEventType> = events.iter().map(GazeEvent::event_type).collect();
        assert_eq!(kinds, vec![Fixation, Saccade, Blink, Fixation]);
        assert_eq!(events[0].start_time(), 2.0);
        assert_eq!(events[3].end_time(), 22.0);
    }

    #[test]
    fn glissade_and_pursuit_chunks_have_no_event() {
        let ts: Vec<f64> = (0..9).map(|i| i as f64 * 2.0).collect();
        let x = vec![3.0; 9];
        let samples = samples(&ts, &x, &x);
        let builder = EventBuilder::default();
        assert!(builder.build(Pso, &samples, 3..5).is_none());
        assert!(builder.build(SmoothPursuit, &samples, 3..5).is_none());

        let labels = [Fixation, Fixation, Fixation, SmoothPursuit, SmoothPursuit, Pso, Fixation, Fixation, Fixation];
        let events = builder.aggregate_events(&samples, &labels, Some(Eye::Right)).unwrap();
        let spans: Vec<(f64, f64)> = events.iter().map(|e| (e.start_time(), e.end_time())).collect();
        assert_eq!(spans, vec![(0.0, 4.0), (12.0, 16.0)]);
    }

    #[test]
    fn invalid_chunks_are_skipped() {
        let ts = [0.0, 2.0, 4.0, 6.0, 8.0];
        let x = [1.0; 5];
        let y = [1.0; 5];
        // the lone saccade sample cannot form an event
        let labels = [Fixation, Fixation, Saccade, Fixation, Fixation];
        let events = aggregate_events(&samples(&ts, &x, &y), &labels, ViewingGeometry::default(), Some(Eye::Left)).unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type() == Fixation));
    }

    #[test]
    fn bad_geometry_skips_gaze_events_but_keeps_blinks() {
        let ts = [0.0, 2.0, 4.0, 6.0];
        let x = [1.0; 4];
        let labels = [Blink, Blink, Fixation, Fixation];
        let geometry = ViewingGeometry::new(-1.0, 0.03);
        let events = aggregate_events(&samples(&ts, &x, &x), &labels, geometry, None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), Blink);
    }

    #[test]
    fn mismatched_arrays_fail() {
        let ts = [0.0, 2.0, 4.0];
        let x = [1.0; 3];
        let result = aggregate_events(&samples(&ts, &x, &x), &[Fixation; 2], ViewingGeometry::default(), None);
        assert!(matches!(result, Err(GazeError::InvalidInput(_))));
    }

    #[test]
    fn custom_bounds_flag_outliers() {
        let ts: Vec<f64> = (0..10).map(|i| i as f64 * 2.0).collect();
        let x = vec![5.0; 10];
        let bounds = EventDurationBounds {
            fixation: crate::core_modules::gaze_event::DurationBounds::new(1.0, 10.0),
            ..EventDurationBounds::default()
        };
        let builder = EventBuilder::new(ViewingGeometry::default(), bounds);
        let events = builder
            .aggregate_events(&samples(&ts, &x, &x), &[Fixation; 10], None)
            .unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_outlier());
    }
}
