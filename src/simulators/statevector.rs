//! Statevector simulator and the reference execution backend
//!
//! [`StatevectorSimulator`] evolves a single state vector exactly.
//! [`StatevectorCircuitML`] binds a [`Recipe`] to it: every input row becomes
//! one circuit, the rows of a job are simulated in parallel, and outcomes are
//! returned either as exact probabilities or as multinomial shot counts.

use std::sync::Mutex;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use tracing::trace;

use crate::machine_learning::core::BackendError;
use crate::machine_learning::quantum::circuit_model::{
    check_run_inputs, effective_shots, job_ranges, CircuitML, Recipe,
};
use crate::quantum::circuit::{CircuitBuilder, QuantumCircuit};
use crate::quantum::error::CircuitError;
use crate::quantum::state::StateVector;

/// A statevector simulator for quantum circuits
#[derive(Clone, Debug)]
pub struct StatevectorSimulator {
    /// The current state of the simulator
    state: StateVector,
}

impl StatevectorSimulator {
    /// Create a new statevector simulator with the specified number of qubits
    pub fn new(qubit_count: usize) -> Self {
        StatevectorSimulator {
            state: StateVector::zero_state(qubit_count),
        }
    }

    /// Get the number of qubits in the simulator
    pub fn qubit_count(&self) -> usize {
        self.state.qubit_count()
    }

    /// Apply a quantum circuit to the current state
    pub fn run_circuit(&mut self, circuit: &QuantumCircuit) -> Result<(), CircuitError> {
        if circuit.qubit_count > self.qubit_count() {
            return Err(CircuitError::DimensionMismatch(format!(
                "circuit has {} qubits, but simulator has only {} qubits",
                circuit.qubit_count,
                self.qubit_count()
            )));
        }

        for (gate, qubits) in &circuit.gates {
            self.state.apply_gate(gate.as_ref(), qubits)?;
        }

        Ok(())
    }

    /// Exact outcome probabilities, ordered by outcome integer
    pub fn probabilities(&self) -> Array1<f64> {
        self.state.probabilities()
    }

    /// Sample `shots` full-register measurements without collapsing the state.
    ///
    /// Returns one count per outcome integer; the counts sum to `shots`.
    pub fn sample_counts<R: Rng + ?Sized>(&self, shots: usize, rng: &mut R) -> Result<Array1<f64>, CircuitError> {
        let probabilities = self.probabilities();
        let distribution = WeightedIndex::new(probabilities.iter())
            .map_err(|e| CircuitError::InvalidState(e.to_string()))?;

        let mut counts = Array1::zeros(probabilities.len());
        for _ in 0..shots {
            counts[distribution.sample(rng)] += 1.0;
        }

        Ok(counts)
    }
}

/// Reference backend: exact state-vector simulation of a recipe
#[derive(Debug)]
pub struct StatevectorCircuitML {
    recipe: Recipe,
    nbqbits: usize,
    nbparams: usize,
    /// Seeds the per-circuit samplers so that shot noise is reproducible
    rng: Mutex<StdRng>,
}

impl StatevectorCircuitML {
    pub fn new(recipe: Recipe, nbqbits: usize, nbparams: usize) -> Self {
        Self::with_rng(recipe, nbqbits, nbparams, StdRng::from_entropy())
    }

    /// Same as [`StatevectorCircuitML::new`] with deterministic shot sampling
    pub fn with_seed(recipe: Recipe, nbqbits: usize, nbparams: usize, seed: u64) -> Self {
        Self::with_rng(recipe, nbqbits, nbparams, StdRng::seed_from_u64(seed))
    }

    fn with_rng(recipe: Recipe, nbqbits: usize, nbparams: usize, rng: StdRng) -> Self {
        StatevectorCircuitML {
            recipe,
            nbqbits,
            nbparams,
            rng: Mutex::new(rng),
        }
    }

    /// Build the circuit for one input row
    pub fn make_circuit(
        &self,
        x: ArrayView1<f64>,
        params: ArrayView1<f64>,
        shots: Option<usize>,
    ) -> Result<QuantumCircuit, CircuitError> {
        let mut builder = CircuitBuilder::new(self.nbqbits);
        self.recipe.build(&mut builder, x, params, shots)?;
        Ok(builder.build())
    }

    fn run_row(
        &self,
        x: ArrayView1<f64>,
        params: ArrayView1<f64>,
        shots: Option<usize>,
        seed: u64,
    ) -> Result<Array1<f64>, BackendError> {
        let circuit = self.make_circuit(x, params, shots)?;
        let mut simulator = StatevectorSimulator::new(self.nbqbits);
        simulator.run_circuit(&circuit)?;

        match shots {
            Some(k) => {
                let mut rng = StdRng::seed_from_u64(seed);
                Ok(simulator.sample_counts(k, &mut rng)?)
            }
            None => Ok(simulator.probabilities()),
        }
    }

    fn draw_seeds(&self, n: usize) -> Result<Vec<u64>, BackendError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| BackendError::Execution("sampler state poisoned".to_string()))?;
        Ok((0..n).map(|_| rng.gen()).collect())
    }
}

impl CircuitML for StatevectorCircuitML {
    fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    fn qubit_count(&self) -> usize {
        self.nbqbits
    }

    fn param_count(&self) -> usize {
        self.nbparams
    }

    fn run(
        &self,
        x: ArrayView2<f64>,
        params: ArrayView1<f64>,
        shots: Option<usize>,
        job_size: Option<usize>,
    ) -> Result<Array2<f64>, BackendError> {
        check_run_inputs(self, &params)?;
        let shots = effective_shots(shots);
        let n_samples = x.nrows();
        let mut out = Array2::zeros((n_samples, 1 << self.nbqbits));

        for range in job_ranges(n_samples, job_size)? {
            trace!(start = range.start, end = range.end, ?shots, "submitting statevector job");
            let seeds = self.draw_seeds(range.len())?;

            let rows: Vec<Array1<f64>> = range
                .clone()
                .into_par_iter()
                .zip(seeds.into_par_iter())
                .map(|(i, seed)| self.run_row(x.row(i), params, shots, seed))
                .collect::<Result<_, _>>()?;

            for (i, row) in range.zip(rows) {
                out.row_mut(i).assign(&row);
            }
        }

        Ok(out)
    }

    fn description(&self) -> String {
        format!(
            "StatevectorCircuitML(recipe={}, nbqbits={}, nbparams={})",
            self.recipe.name(),
            self.nbqbits,
            self.nbparams
        )
    }
}
