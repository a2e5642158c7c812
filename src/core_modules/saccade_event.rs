use crate::core_modules::gaze_event::{DurationBounds, EventCore, GazeTrace};
use crate::core_modules::screen_monitor::ViewingGeometry;
use crate::core_modules::visual_angle::{self, Point, ZeroDirection};
use crate::error::GazeResult;

/// A rapid movement of gaze between two locations.
#[derive(Debug, Clone, PartialEq)]
pub struct SaccadeEvent {
    core: EventCore,
    trace: GazeTrace,
}

impl SaccadeEvent {
    pub fn new(
        timestamps: Vec<f64>,
        x: Vec<f64>,
        y: Vec<f64>,
        geometry: ViewingGeometry,
        bounds: DurationBounds,
    ) -> GazeResult<Self> {
        let core = EventCore::new(timestamps, bounds)?;
        let trace = GazeTrace::new(&core, x, y, geometry)?;
        Ok(Self { core, trace })
    }

    pub fn core(&self) -> &EventCore {
        &self.core
    }

    pub fn trace(&self) -> &GazeTrace {
        &self.trace
    }

    pub fn start_point(&self) -> Point {
        self.trace.first_point()
    }

    pub fn end_point(&self) -> Point {
        self.trace.last_point()
    }

    /// Straight-line distance in pixels from start to end point.
    pub fn distance(&self) -> f64 {
        let (start, end) = (self.start_point(), self.end_point());
        (end.0 - start.0).hypot(end.1 - start.1)
    }

    /// Visual angle in degrees between start and end point.
    pub fn amplitude(&self) -> f64 {
        let geometry = self.trace.geometry();
        visual_angle::visual_angle_between_pixels(
            self.start_point(),
            self.end_point(),
            geometry.viewer_distance_cm,
            geometry.pixel_size_cm,
            false,
        )
    }

    /// Direction in degrees, counter-clockwise from East.
    pub fn azimuth(&self) -> f64 {
        visual_angle::azimuth(self.start_point(), self.end_point(), ZeroDirection::East, false)
    }
}
