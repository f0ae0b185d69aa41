//! Quantum circuit simulators
//!
//! This module provides the state-vector simulator and the execution backend
//! built on it.

pub mod statevector;

pub use statevector::{
    StatevectorSimulator,
    StatevectorCircuitML,
};
