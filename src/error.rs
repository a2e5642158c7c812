// THEORY:
// Every failure the engine can report falls into one of three buckets, and the
// bucket decides how far the failure travels:
// 1.  **InvalidInput**: the data itself is malformed (mismatched lengths, too few
//     samples for a window, negative timestamps). Raised where it is noticed.
// 2.  **Computation**: the data is well-shaped but a derived quantity (sampling
//     rate, peak threshold) came out non-finite.
// 3.  **InvalidArgument**: a caller-chosen option (fusion policy, reference
//     direction, eye name) is not one we recognize.
//
// The detection engine and the event builder catch the first two at trial/chunk
// granularity so a single corrupt recording degrades instead of halting a batch.

use thiserror::Error;

/// An error raised by the gaze event detection engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GazeError {
    /// Malformed shapes, mismatched lengths, or values outside their contract.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A derived quantity could not be computed to a finite value.
    #[error("computation failed: {0}")]
    Computation(String),
    /// An enumerated option is not one of the recognized values.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl GazeError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    pub fn computation(message: impl Into<String>) -> Self {
        Self::Computation(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

pub type GazeResult<T> = Result<T, GazeError>;
