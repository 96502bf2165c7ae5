//! Error taxonomy for problem construction, cost evaluation and fit execution.

use std::any::Any;

use thiserror::Error;

/// Failure reported by an objective for a single point.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{0}")]
pub struct CostError(pub String);

impl From<&str> for CostError {
    fn from(message: &str) -> Self {
        Self(message.into())
    }
}

impl From<String> for CostError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProblemError {
    #[error("parameter names cannot be empty")]
    EmptyName,

    #[error("duplicate parameter '{0}'")]
    DuplicateName(String),

    #[error("bounds of '{name}' must be finite and ordered, got [{lo}, {hi}]")]
    InvalidBounds { name: String, lo: f64, hi: f64 },

    #[error("value {value} of '{name}' lies outside [{lo}, {hi}]")]
    OutOfBounds {
        name: String,
        value: f64,
        lo: f64,
        hi: f64,
    },

    #[error("expected a point of {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("no parameter named '{0}'")]
    UnknownParameter(String),

    #[error("a problem must declare at least one parameter")]
    NoParameters,
}

/// A batch evaluation that could not be completed. No partial results survive one of these.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MapError {
    #[error("cost of point {index} failed: {source}")]
    Cost { index: usize, source: CostError },

    #[error("worker panicked while evaluating point {index}: {message}")]
    WorkerPanicked { index: usize, message: String },

    #[error("expected points of {expected} values, got {actual} at index {index}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum MapperError {
    #[error("worker count must be positive")]
    NoWorkers,

    #[error("failed to build worker pool: {0}")]
    PoolBuild(String),
}

/// Failure of an algorithm run. Surfaced to the caller only as an aborted result.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FitError {
    #[error("{0}")]
    Map(#[from] MapError),

    #[error("{0}")]
    Mapper(#[from] MapperError),

    #[error("{0}")]
    Problem(#[from] ProblemError),

    #[error("algorithm panicked: {0}")]
    Panicked(String),

    #[error("{0}")]
    Algorithm(String),
}

/// Rejected configuration. Always raised before a fit thread is started.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown fitter '{0}'")]
    UnknownFitter(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("{0}")]
    Problem(#[from] ProblemError),

    #[error("failed to spawn fit thread: {0}")]
    Spawn(String),
}

/// Extracts a readable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".into()
    }
}
