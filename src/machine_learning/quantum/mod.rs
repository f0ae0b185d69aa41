//! Quantum machine learning module

pub mod circuit_model;
pub mod training;
pub mod variational;

// Re-exports for convenience
pub use circuit_model::{CircuitML, Recipe};
pub use training::{FitReport, TrainingState};
pub use variational::Classifier;
