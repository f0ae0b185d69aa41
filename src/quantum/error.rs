//! Errors raised while building or simulating circuits

use thiserror::Error;

/// Errors produced by gate placement and state evolution
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CircuitError {
    /// A gate referenced a qubit outside `[0, qubit_count)`
    #[error("Qubit index {index} out of range for a {qubit_count}-qubit register")]
    QubitOutOfRange { index: usize, qubit_count: usize },

    /// A multi-qubit gate was placed twice on the same qubit
    #[error("Gate placed on qubit {0} more than once")]
    DuplicateQubit(usize),

    /// Mismatched vector or matrix dimensions
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// The state vector cannot represent a physical state
    #[error("Invalid quantum state: {0}")]
    InvalidState(String),
}
