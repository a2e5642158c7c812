// THEORY:
// `GazeEventType` is the single vocabulary shared by every layer of the engine.
// Detectors write it per sample, the run-length utilities compare it, and the
// event builder dispatches on it. It is a closed set: equality and membership
// matter, ordering does not.

use crate::error::GazeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The label assigned to a single gaze sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum GazeEventType {
    /// No event could be assigned to this sample.
    #[default]
    Undefined = 0,
    Fixation = 1,
    Saccade = 2,
    /// Post-saccadic oscillation (glissade).
    Pso = 3,
    SmoothPursuit = 4,
    Blink = 5,
}

impl GazeEventType {
    pub const ALL: [GazeEventType; 6] = [
        GazeEventType::Undefined,
        GazeEventType::Fixation,
        GazeEventType::Saccade,
        GazeEventType::Pso,
        GazeEventType::SmoothPursuit,
        GazeEventType::Blink,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GazeEventType::Undefined => "UNDEFINED",
            GazeEventType::Fixation => "FIXATION",
            GazeEventType::Saccade => "SACCADE",
            GazeEventType::Pso => "PSO",
            GazeEventType::SmoothPursuit => "SMOOTH_PURSUIT",
            GazeEventType::Blink => "BLINK",
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, GazeEventType::Undefined)
    }

    /// Parses a label, falling back to `Undefined` for anything unrecognized.
    pub fn parse_lenient(value: &str) -> Self {
        value.parse().unwrap_or(GazeEventType::Undefined)
    }
}

impl fmt::Display for GazeEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for GazeEventType {
    type Error = GazeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        GazeEventType::ALL
            .iter()
            .copied()
            .find(|t| *t as u8 == value)
            .ok_or_else(|| GazeError::invalid_argument(format!("no gaze event type with code {value}")))
    }
}

impl FromStr for GazeEventType {
    type Err = GazeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        GazeEventType::ALL
            .iter()
            .copied()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| GazeError::invalid_argument(format!("unknown gaze event type `{s}`")))
    }
}
