//! Variational Quantum Classifier Framework
//!
//! This crate trains variational quantum classifiers independently of the
//! execution backend. Circuits are described once as recipes against a
//! gate-level builder, executed through the `CircuitML` contract, and their
//! outcome distributions are turned into class probabilities that a
//! minimizer optimizes under an adaptive shot budget.

pub mod quantum;
pub mod simulators;
pub mod machine_learning;

// Create a prelude module for convenient imports
pub mod prelude {
    pub use crate::machine_learning::prelude::*;
    pub use crate::quantum::prelude::*;
    pub use crate::simulators::{StatevectorCircuitML, StatevectorSimulator};
}

// Version and crate information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
