// src/quantum/state.rs
//! Quantum state representations
//!
//! Basis states are indexed big-endian: qubit 0 is the most significant bit of
//! the basis index, so `|q0 q1 ... q(n-1)>` has index `q0·2^(n-1) + ... + q(n-1)`.

use ndarray::Array1;
use num_complex::Complex64;

use crate::quantum::error::CircuitError;
use crate::quantum::gate::QuantumGate;

/// State vector representation of a quantum state
#[derive(Clone, Debug)]
pub struct StateVector {
    /// Number of qubits
    pub qubit_count: usize,

    /// The state vector as an array of complex amplitudes
    amplitudes: Array1<Complex64>,
}

impl StateVector {
    /// Create a new state vector with the given amplitudes
    pub fn new(qubit_count: usize, amplitudes: Array1<Complex64>) -> Result<Self, CircuitError> {
        let expected_dim = 1 << qubit_count;

        if amplitudes.len() != expected_dim {
            return Err(CircuitError::DimensionMismatch(format!(
                "state vector: expected {} amplitudes, got {}",
                expected_dim,
                amplitudes.len()
            )));
        }

        let state = StateVector {
            qubit_count,
            amplitudes,
        };

        if !state.is_valid() {
            return Err(CircuitError::InvalidState("state vector is not normalized".to_string()));
        }

        Ok(state)
    }

    /// Create the zero state |00...0⟩
    pub fn zero_state(qubit_count: usize) -> Self {
        let mut amplitudes = Array1::zeros(1 << qubit_count);
        amplitudes[0] = Complex64::new(1.0, 0.0);

        StateVector {
            qubit_count,
            amplitudes,
        }
    }

    /// Returns the number of qubits in this state
    pub fn qubit_count(&self) -> usize {
        self.qubit_count
    }

    /// Returns the dimension of the Hilbert space (2^n for n qubits)
    pub fn dimension(&self) -> usize {
        1 << self.qubit_count
    }

    /// Get the amplitudes of the state vector
    pub fn amplitudes(&self) -> &Array1<Complex64> {
        &self.amplitudes
    }

    /// Probability of observing basis state `index`
    pub fn probability(&self, index: usize) -> f64 {
        self.amplitudes[index].norm_sqr()
    }

    /// Probabilities of every basis state, ordered by basis index
    pub fn probabilities(&self) -> Array1<f64> {
        self.amplitudes.mapv(|a| a.norm_sqr())
    }

    /// Check that the state is normalized
    pub fn is_valid(&self) -> bool {
        let norm: f64 = self.amplitudes.iter().map(|a| a.norm_sqr()).sum();
        (norm - 1.0).abs() < 1e-10
    }

    /// Apply a gate in place to the given target qubits.
    ///
    /// Only the `2^k` amplitudes sharing the non-target bits are mixed, so the
    /// cost is `O(2^n · 2^k)` instead of building the full `2^n × 2^n` operator.
    pub fn apply_gate(&mut self, gate: &dyn QuantumGate, qubits: &[usize]) -> Result<(), CircuitError> {
        if qubits.len() != gate.qubit_count() {
            return Err(CircuitError::DimensionMismatch(format!(
                "gate {} acts on {} qubits, but {} target qubits were specified",
                gate.name(),
                gate.qubit_count(),
                qubits.len()
            )));
        }

        let mut target_mask = 0usize;
        for &q in qubits {
            if q >= self.qubit_count {
                return Err(CircuitError::QubitOutOfRange {
                    index: q,
                    qubit_count: self.qubit_count,
                });
            }
            let bit = 1 << (self.qubit_count - 1 - q);
            if target_mask & bit != 0 {
                return Err(CircuitError::DuplicateQubit(q));
            }
            target_mask |= bit;
        }

        let matrix = gate.matrix();
        let k = qubits.len();
        let sub_dim = 1 << k;

        // Offset of every sub-basis state relative to a base index whose
        // target bits are all zero.
        let offsets: Vec<usize> = (0..sub_dim)
            .map(|s| {
                qubits.iter().enumerate().fold(0, |acc, (t, &q)| {
                    if (s >> (k - 1 - t)) & 1 == 1 {
                        acc | (1 << (self.qubit_count - 1 - q))
                    } else {
                        acc
                    }
                })
            })
            .collect();

        let mut local = vec![Complex64::new(0.0, 0.0); sub_dim];
        for base in 0..self.dimension() {
            if base & target_mask != 0 {
                continue;
            }

            for (s, &offset) in offsets.iter().enumerate() {
                local[s] = self.amplitudes[base | offset];
            }

            for (r, &offset) in offsets.iter().enumerate() {
                let mut value = Complex64::new(0.0, 0.0);
                for (c, amplitude) in local.iter().enumerate() {
                    value += matrix[[r, c]] * amplitude;
                }
                self.amplitudes[base | offset] = value;
            }
        }

        Ok(())
    }
}
