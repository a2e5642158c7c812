// Analytical layers of the engine, from the lowest (numeric and geometric
// utilities) to the highest (event construction).

pub mod gaze_event_type;
pub mod signal;
pub mod visual_angle;
pub mod chunk;
pub mod screen_monitor;

pub mod detector;
pub mod ivt_detector;
pub mod idt_detector;
pub mod engbert_detector;
pub mod nh_detector;

pub mod gaze_event;
pub mod blink_event;
pub mod fixation_event;
pub mod saccade_event;
pub mod event_builder;
