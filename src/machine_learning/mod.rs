//! Machine learning module for variational quantum classifiers
//!
//! This module turns backend circuits into trainable classifiers: outcome
//! bitstrings become class probabilities, a loss scores them, and a
//! minimizer tunes the circuit parameters over noisy minibatch evaluations.

pub mod core;
pub mod bitstring;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod loss;
pub mod optimizer;
pub mod shots;
pub mod quantum;

/// Re-exports of commonly used components
pub mod prelude {
    // Errors
    pub use super::core::{BackendError, ClassifierError, ConfigurationError};

    // Training configuration
    pub use super::bitstring::{Bitstring, BitstringLabels};
    pub use super::checkpoint::{Checkpoint, JobSize, ModelInfo, OutputTrace};
    pub use super::config::{ClassifierConfig, FitOptions};
    pub use super::loss::{ClassificationLoss, CrossEntropy};
    pub use super::optimizer::{
        Adam, Bfgs, BoundedBfgs, FirstOrder, GradientDescent, MinimizeOptions, MinimizeResult, Minimizer,
        Objective, PatternSearch,
    };
    pub use super::shots::ShotPolicy;

    // Quantum ML components
    pub use super::quantum::circuit_model::{CircuitML, Recipe};
    pub use super::quantum::training::FitReport;
    pub use super::quantum::variational::Classifier;
}
