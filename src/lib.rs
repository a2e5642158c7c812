// THEORY:
// `gaze_vision` labels eye-tracker recordings. A trial goes in as timestamps and
// per-eye pixel coordinates; out comes one label per sample (blink, fixation,
// saccade, glissade) and the list of events those labels form.
//
// Most callers only need `GazePipeline`: build it from a `PipelineConfig` (one of
// four detection algorithms plus geometry and fusion settings, loadable from JSON),
// hand it a `Trial`, read the `TrialReport`. `ParallelPipeline` does the same for
// whole batches on a worker pool. Everything under `core_modules` stays public, so
// a single detector, the event types, or the pixel/degree conversions can be used
// on their own.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use error::{GazeError, GazeResult};
pub use parallel_pipeline::ParallelPipeline;
pub use pipeline::{
    DetectorKind, EventSummary, Eye, EyeSamples, GazeEvent, GazeEventType, GazePipeline, PipelineConfig, Trial,
    TrialReport,
};
