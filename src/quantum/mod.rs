// src/quantum/mod.rs
//! Quantum computing primitives
//!
//! This module implements gates, state vectors, circuits and the
//! gate-sequence builder contract that circuit recipes are written against.

pub mod error;
pub mod state;
pub mod gate;
pub mod circuit;

pub use error::CircuitError;
pub use state::StateVector;
pub use gate::{QuantumGate, StandardGate, ParametrizedGate};
pub use circuit::{QuantumCircuit, CircuitBuilder, GateSequenceBuilder, GatePlacement};

/// Re-export commonly used types and traits
pub mod prelude {
    pub use super::{StateVector, CircuitError};
    pub use super::{QuantumGate, StandardGate, ParametrizedGate};
    pub use super::{QuantumCircuit, CircuitBuilder, GateSequenceBuilder, GatePlacement};
}
