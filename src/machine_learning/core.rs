//! Core error types for classifier training and circuit execution

use thiserror::Error;

use crate::quantum::error::CircuitError;

/// Malformed constructor arguments or training inputs
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// Values of incompatible kinds were mixed, e.g. integer and binary bitstrings
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// The training set has more distinct labels than the model has classes
    #[error("Too many labels: expected at most {declared}, found {observed} in training targets")]
    CardinalityMismatch { declared: usize, observed: usize },

    /// An option is outside its valid range
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

/// Failures raised by an execution backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// A recipe could not be turned into a circuit
    #[error("Circuit construction failed: {0}")]
    Circuit(#[from] CircuitError),

    /// Input matrix or parameter vector has the wrong shape
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Job partitioning request cannot be honoured
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// The backend failed while executing circuits
    #[error("Execution failed: {0}")]
    Execution(String),
}

/// Top-level error returned by classifier construction, training and persistence
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The minimizer failed; parameters committed before the failure are kept
    #[error("Optimizer error: {0}")]
    Optimizer(String),

    /// Attempt to bind a circuit built from a different recipe
    #[error("Circuit identity error: {0}")]
    Identity(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = ClassifierError> = std::result::Result<T, E>;
