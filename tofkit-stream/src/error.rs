//! Error types for tofkit-stream.

use crate::key::Key;
use thiserror::Error;

/// Result type alias for graph and streaming operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Errors raised while building or evaluating pipelines.
#[derive(Error, Debug)]
pub enum StreamError {
    /// A key was requested that no node provides.
    #[error("no provider or parameter for `{key}` (needed by {needed_by})")]
    MissingInput { key: Key, needed_by: String },

    /// A key exists in the graph but has no value.
    #[error("`{0}` has no value")]
    Unset(Key),

    /// The graph contains a cycle through this key.
    #[error("cycle detected at `{0}`")]
    Cycle(Key),

    /// A chunk contained keys that were not declared dynamic.
    #[error("can only update dynamic keys, got non-dynamic keys: {}", join(.0))]
    NonDynamicKeys(Vec<Key>),

    /// A chunk updated some, but not all, dynamic inputs of an accumulator.
    #[error("accumulator `{accumulator}` requires dynamic keys {} not provided in the current chunk", join(.missing))]
    MissingDynamicKeys { accumulator: Key, missing: Vec<Key> },

    /// A value has a different type than the provider expects.
    #[error("`{key}` holds {found}, expected {expected}")]
    TypeMismatch {
        key: Key,
        expected: &'static str,
        found: &'static str,
    },

    /// Values of this kind cannot be summed.
    #[error("cannot accumulate {0} values")]
    NotAccumulable(&'static str),

    /// A run or monitor kind required by a kept provider was filtered out.
    #[error("missing constraint: {0}")]
    MissingConstraint(String),

    /// Error from a time-of-flight computation.
    #[error(transparent)]
    Core(#[from] tofkit_core::Error),

    /// Error reading or writing a lookup table.
    #[error(transparent)]
    Io(#[from] tofkit_io::Error),
}

fn join(keys: &[Key]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
