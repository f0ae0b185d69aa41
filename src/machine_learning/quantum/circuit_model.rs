//! Backend-agnostic circuit execution contract
//!
//! A [`Recipe`] describes how to build the circuit for one input row and one
//! parameter vector using the [`GateSequenceBuilder`] interface. A backend
//! wraps a recipe into a [`CircuitML`], which runs the recipe for every row of
//! an input matrix and returns the outcome distribution of each circuit.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::{Rng, RngCore};

use crate::machine_learning::core::BackendError;
use crate::quantum::circuit::GateSequenceBuilder;
use crate::quantum::error::CircuitError;

/// Signature of a circuit recipe: `(builder, input row, parameters, shots)`.
///
/// `shots` is `Some(k)` when the circuit will be sampled, which recipes
/// typically use to decide whether to call `measure_all`.
pub type RecipeFn = dyn Fn(&mut dyn GateSequenceBuilder, ArrayView1<f64>, ArrayView1<f64>, Option<usize>) -> Result<(), CircuitError>
    + Send
    + Sync;

/// Shared, immutable circuit construction function.
///
/// Clones share the same function object. Two recipes are the same recipe
/// only if they share it, regardless of what the functions compute.
#[derive(Clone)]
pub struct Recipe {
    build: Arc<RecipeFn>,
    name: String,
}

impl Recipe {
    /// Wrap a construction function
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&mut dyn GateSequenceBuilder, ArrayView1<f64>, ArrayView1<f64>, Option<usize>) -> Result<(), CircuitError>
            + Send
            + Sync
            + 'static,
    {
        Self::named("make_circuit", build)
    }

    /// Wrap a construction function under a descriptive name
    pub fn named<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&mut dyn GateSequenceBuilder, ArrayView1<f64>, ArrayView1<f64>, Option<usize>) -> Result<(), CircuitError>
            + Send
            + Sync
            + 'static,
    {
        Recipe {
            build: Arc::new(build),
            name: name.into(),
        }
    }

    /// Run the recipe against a builder
    pub fn build(
        &self,
        builder: &mut dyn GateSequenceBuilder,
        x: ArrayView1<f64>,
        params: ArrayView1<f64>,
        shots: Option<usize>,
    ) -> Result<(), CircuitError> {
        (self.build)(builder, x, params, shots)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether both recipes share the same function object
    pub fn same_as(&self, other: &Recipe) -> bool {
        // Compare data pointers only; vtable pointers of the same closure may
        // differ across codegen units.
        std::ptr::eq(
            Arc::as_ptr(&self.build) as *const u8,
            Arc::as_ptr(&other.build) as *const u8,
        )
    }
}

impl fmt::Debug for Recipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recipe")
            .field("name", &self.name)
            .field("function", &Arc::as_ptr(&self.build))
            .finish()
    }
}

/// A recipe bound to an execution backend
pub trait CircuitML: Send + Sync {
    /// The recipe this circuit was built from
    fn recipe(&self) -> &Recipe;

    /// Number of qubits of every circuit instance
    fn qubit_count(&self) -> usize;

    /// Number of variational parameters the recipe consumes
    fn param_count(&self) -> usize;

    /// Draw an initial parameter vector, uniform over `[0, 2π)`
    fn random_params(&self, rng: &mut dyn RngCore) -> Array1<f64> {
        (0..self.param_count())
            .map(|_| rng.gen_range(0.0..2.0 * PI))
            .collect()
    }

    /// Run one circuit per row of `x`.
    ///
    /// Returns an `(n_samples × 2^qubit_count)` matrix whose columns are
    /// ordered by outcome integer. With `shots = Some(k)`, `k > 0`, each row
    /// holds integer counts summing to `k`; otherwise each row holds exact
    /// probabilities. `job_size` caps how many circuits are submitted per
    /// backend job (`None` submits all rows at once).
    fn run(
        &self,
        x: ArrayView2<f64>,
        params: ArrayView1<f64>,
        shots: Option<usize>,
        job_size: Option<usize>,
    ) -> Result<Array2<f64>, BackendError>;

    /// Human-readable description recorded in checkpoints
    fn description(&self) -> String {
        format!(
            "CircuitML(recipe={}, nbqbits={}, nbparams={})",
            self.recipe().name(),
            self.qubit_count(),
            self.param_count()
        )
    }

    /// Whether `other` was built from the same recipe
    fn same_circuit(&self, other: &dyn CircuitML) -> bool {
        self.recipe().same_as(other.recipe())
    }
}

/// Parameter-count check shared by backends before executing a batch.
///
/// An input matrix without rows is a valid, empty batch.
pub fn check_run_inputs(circuit: &dyn CircuitML, params: &ArrayView1<f64>) -> Result<(), BackendError> {
    if params.len() != circuit.param_count() {
        return Err(BackendError::DimensionMismatch(format!(
            "expected {} parameters, got {}",
            circuit.param_count(),
            params.len()
        )));
    }
    Ok(())
}

/// Row ranges of successive backend jobs
pub fn job_ranges(n_samples: usize, job_size: Option<usize>) -> Result<Vec<std::ops::Range<usize>>, BackendError> {
    let size = match job_size {
        None => n_samples.max(1),
        Some(0) => return Err(BackendError::InvalidJob("job size must be positive".to_string())),
        Some(size) => size,
    };

    Ok((0..n_samples)
        .step_by(size)
        .map(|start| start..(start + size).min(n_samples))
        .collect())
}

/// `None` and `Some(0)` both request exact probabilities
pub fn effective_shots(shots: Option<usize>) -> Option<usize> {
    shots.filter(|&k| k > 0)
}
