// THEORY:
// The `pipeline` module is the top-level API for the entire engine. It wraps the
// full stack, from blink masking to event aggregation, behind a single per-trial
// call. A trial goes in; its per-sample labels and the events of each recorded eye
// come out.
//
// The pipeline is built once from a `PipelineConfig` and is read-only afterwards,
// so one instance can serve many trials concurrently (see `parallel_pipeline`).

use crate::core_modules::detector::{BinocularPolicy, DetectionEngine, DetectorConfig, GazeEventDetector};
use crate::core_modules::engbert_detector::{EngbertConfig, EngbertDetector};
use crate::core_modules::event_builder::{EventBuilder, EventSamples};
use crate::core_modules::idt_detector::{IdtConfig, IdtDetector};
use crate::core_modules::ivt_detector::{IvtConfig, IvtDetector};
use crate::core_modules::nh_detector::{NhConfig, NhDetector};
use crate::core_modules::screen_monitor::ViewingGeometry;
use crate::error::{GazeError, GazeResult};
use serde::{Deserialize, Serialize};
use tracing::instrument;

// Re-export key data structures for the public API.
pub use crate::core_modules::gaze_event::{EventDurationBounds, EventSummary, Eye, GazeEvent};
pub use crate::core_modules::gaze_event_type::GazeEventType;

/// The classification algorithm and its parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum DetectorKind {
    Ivt(IvtConfig),
    Idt(IdtConfig),
    Engbert(EngbertConfig),
    Nh(NhConfig),
}

impl Default for DetectorKind {
    fn default() -> Self {
        DetectorKind::Ivt(IvtConfig::default())
    }
}

impl DetectorKind {
    pub fn build(&self) -> GazeResult<Box<dyn GazeEventDetector>> {
        Ok(match self {
            DetectorKind::Ivt(config) => Box::new(IvtDetector::new(config.clone())?),
            DetectorKind::Idt(config) => Box::new(IdtDetector::new(config.clone())?),
            DetectorKind::Engbert(config) => Box::new(EngbertDetector::new(config.clone())?),
            DetectorKind::Nh(config) => Box::new(NhDetector::new(config.clone())?),
        })
    }
}

/// Configuration for the GazePipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub detector: DetectorKind,
    pub detection: DetectorConfig,
    /// Geometry used to derive event properties such as saccade amplitude.
    pub geometry: ViewingGeometry,
    /// How the two eyes' labels are combined when a trial has both.
    pub policy: BinocularPolicy,
    pub event_bounds: EventDurationBounds,
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> GazeResult<Self> {
        serde_json::from_str(json).map_err(|e| GazeError::invalid_input(format!("invalid pipeline config: {e}")))
    }
}

/// One eye's gaze samples, aligned with the trial's timestamps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EyeSamples {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    /// Pupil size in millimeters, when the tracker reports it.
    #[serde(default)]
    pub pupil: Option<Vec<f64>>,
}

impl EyeSamples {
    pub fn new(x: Vec<f64>, y: Vec<f64>, pupil: Option<Vec<f64>>) -> Self {
        Self { x, y, pupil }
    }

    fn event_samples<'a>(&'a self, timestamps: &'a [f64]) -> EventSamples<'a> {
        EventSamples {
            timestamps,
            x: &self.x,
            y: &self.y,
            pupil: self.pupil.as_deref(),
        }
    }

    fn validate(&self, eye: Eye, samples: usize) -> GazeResult<()> {
        let pupil = self.pupil.as_ref().map_or(samples, Vec::len);
        if self.x.len() != samples || self.y.len() != samples || pupil != samples {
            return Err(GazeError::invalid_input(format!(
                "{eye} eye has x ({}), y ({}) and pupil ({pupil}) samples for {samples} timestamps",
                self.x.len(),
                self.y.len()
            )));
        }
        Ok(())
    }
}

/// A single recording: shared timestamps (ms) and the samples of one or both eyes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trial {
    pub id: u64,
    pub timestamps: Vec<f64>,
    #[serde(default)]
    pub left: Option<EyeSamples>,
    #[serde(default)]
    pub right: Option<EyeSamples>,
}

impl Trial {
    fn eyes(&self) -> impl Iterator<Item = (Eye, &EyeSamples)> {
        [(Eye::Left, self.left.as_ref()), (Eye::Right, self.right.as_ref())]
            .into_iter()
            .filter_map(|(eye, samples)| samples.map(|s| (eye, s)))
    }
}

/// The primary output of the pipeline for a single trial.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialReport {
    pub trial_id: u64,
    /// One label per timestamp, fused across eyes when both were recorded.
    pub labels: Vec<GazeEventType>,
    pub events: Vec<(Eye, Vec<GazeEvent>)>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EyeSummary {
    pub eye: Eye,
    pub events: Vec<EventSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub trial_id: u64,
    pub labels: Vec<GazeEventType>,
    pub eyes: Vec<EyeSummary>,
}

impl TrialReport {
    pub fn summaries(&self) -> TrialSummary {
        TrialSummary {
            trial_id: self.trial_id,
            labels: self.labels.clone(),
            eyes: self
                .events
                .iter()
                .map(|(eye, events)| EyeSummary {
                    eye: *eye,
                    events: events.iter().map(GazeEvent::summary).collect(),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> GazeResult<String> {
        serde_json::to_string(&self.summaries())
            .map_err(|e| GazeError::computation(format!("failed to serialize trial {}: {e}", self.trial_id)))
    }

    pub fn events_for(&self, eye: Eye) -> Option<&[GazeEvent]> {
        self.events.iter().find(|(e, _)| *e == eye).map(|(_, events)| events.as_slice())
    }
}

/// The main, top-level struct for the engine.
pub struct GazePipeline {
    engine: DetectionEngine,
    builder: EventBuilder,
    policy: BinocularPolicy,
}

impl GazePipeline {
    pub fn new(config: PipelineConfig) -> GazeResult<Self> {
        let detector = config.detector.build()?;
        Ok(Self {
            engine: DetectionEngine::from_boxed(detector, config.detection),
            builder: EventBuilder::new(config.geometry, config.event_bounds),
            policy: config.policy,
        })
    }

    pub fn engine(&self) -> &DetectionEngine {
        &self.engine
    }

    /// Labels a trial and builds the events of every recorded eye.
    ///
    /// Classification failures degrade to UNDEFINED labels; only a trial with no
    /// eyes or misaligned arrays is an error.
    #[instrument(skip(self, trial), fields(trial_id = trial.id, detector = self.engine.detector_name()))]
    pub fn process_trial(&self, trial: &Trial) -> GazeResult<TrialReport> {
        let samples = trial.timestamps.len();
        for (eye, eye_samples) in trial.eyes() {
            eye_samples.validate(eye, samples)?;
        }

        // Stage 1: Labelling
        let ts = &trial.timestamps;
        let labels = match (&trial.left, &trial.right) {
            (Some(left), Some(right)) => {
                self.engine
                    .detect_binocular(ts, (&left.x, &left.y), (&right.x, &right.y), self.policy)
            }
            (Some(eye), None) | (None, Some(eye)) => self.engine.detect_monocular(ts, &eye.x, &eye.y),
            (None, None) => {
                return Err(GazeError::invalid_input(format!("trial {} has no eye samples", trial.id)));
            }
        };

        // Stage 2: Event Aggregation
        let events = trial
            .eyes()
            .map(|(eye, eye_samples)| {
                let events = self
                    .builder
                    .aggregate_events(&eye_samples.event_samples(ts), &labels, Some(eye))?;
                Ok((eye, events))
            })
            .collect::<GazeResult<Vec<_>>>()?;

        Ok(TrialReport {
            trial_id: trial.id,
            labels,
            events,
        })
    }
}
