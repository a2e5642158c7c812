use crate::core_modules::gaze_event::{DurationBounds, EventCore};
use crate::error::GazeResult;

/// A period during which the eye was closed or not tracked.
#[derive(Debug, Clone, PartialEq)]
pub struct BlinkEvent {
    core: EventCore,
}

impl BlinkEvent {
    pub fn new(timestamps: Vec<f64>, bounds: DurationBounds) -> GazeResult<Self> {
        Ok(Self {
            core: EventCore::new(timestamps, bounds)?,
        })
    }

    pub fn core(&self) -> &EventCore {
        &self.core
    }
}
