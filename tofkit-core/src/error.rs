//! Error types for tofkit-core.

use thiserror::Error;

/// Result type alias for tofkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for time-of-flight processing.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Per-item arrays that must share a length do not.
    #[error("length mismatch: `{field}` has {actual} entries, expected {expected}")]
    LengthMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Data does not have the expected layout.
    #[error("invalid data shape: {0}")]
    ShapeError(String),

    /// Lookup table violates one of its invariants.
    #[error("invalid lookup table: {0}")]
    InvalidTable(String),

    /// Frames at the detector overlap, the chopper phases are likely inconsistent.
    #[error(
        "frames are overlapping at Ltotal = {ltotal} m: arrival times span {span} us, \
         larger than the frame period of {frame_period} us"
    )]
    FrameOverlap {
        ltotal: f64,
        span: f64,
        frame_period: f64,
    },

    /// The pulse-stride offset could not be inferred from the data.
    #[error("cannot determine pulse stride offset: {0}")]
    PulseStrideOffsetUndetermined(String),

    /// Operation cannot propagate per-item variances.
    #[error("variances are not supported by {0}")]
    VariancesNotSupported(&'static str),

    /// Simulation results contain no neutrons.
    #[error("simulation results are empty")]
    EmptySimulation,
}

impl Error {
    /// Shorthand for a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
