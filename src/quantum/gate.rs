//! Quantum gates
//!
//! Gates are unitary matrices acting on one or two qubits. The matrix index of
//! a multi-qubit gate is big-endian in the order the qubits were given: the
//! first target qubit is the most significant bit.

use std::fmt::Debug;

use ndarray::{array, Array2};
use num_complex::Complex64;

/// Trait for quantum gates
pub trait QuantumGate: Debug + Send + Sync {
    /// Returns the number of qubits this gate acts on
    fn qubit_count(&self) -> usize;

    /// Returns the matrix representation of this gate
    fn matrix(&self) -> Array2<Complex64>;

    /// Returns a display name for this gate
    fn name(&self) -> String;

    /// Create a clone of this gate
    fn clone_box(&self) -> Box<dyn QuantumGate>;

    /// Compares this gate with another gate for equality
    fn equals(&self, other: &dyn QuantumGate) -> bool {
        let m1 = self.matrix();
        let m2 = other.matrix();

        if m1.shape() != m2.shape() {
            return false;
        }

        m1.iter()
            .zip(m2.iter())
            .all(|(a, b)| (a - b).norm() < 1e-10)
    }
}

impl Clone for Box<dyn QuantumGate> {
    fn clone(&self) -> Box<dyn QuantumGate> {
        self.clone_box()
    }
}

impl PartialEq for Box<dyn QuantumGate> {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other.as_ref())
    }
}

const ZERO: Complex64 = Complex64 { re: 0.0, im: 0.0 };
const ONE: Complex64 = Complex64 { re: 1.0, im: 0.0 };

/// Fixed (parameter-free) gates
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StandardGate {
    /// Square root of X
    SX,

    /// Controlled-Z gate
    CZ,
}

impl QuantumGate for StandardGate {
    fn qubit_count(&self) -> usize {
        match self {
            StandardGate::SX => 1,
            StandardGate::CZ => 2,
        }
    }

    fn matrix(&self) -> Array2<Complex64> {
        match self {
            StandardGate::SX => {
                let p = Complex64::new(0.5, 0.5);
                let m = Complex64::new(0.5, -0.5);
                array![[p, m], [m, p]]
            }
            StandardGate::CZ => {
                array![
                    [ONE, ZERO, ZERO, ZERO],
                    [ZERO, ONE, ZERO, ZERO],
                    [ZERO, ZERO, ONE, ZERO],
                    [ZERO, ZERO, ZERO, -ONE]
                ]
            }
        }
    }

    fn name(&self) -> String {
        match self {
            StandardGate::SX => "SX".to_string(),
            StandardGate::CZ => "CZ".to_string(),
        }
    }

    fn clone_box(&self) -> Box<dyn QuantumGate> {
        Box::new(self.clone())
    }
}

/// Parametrized quantum gates
#[derive(Clone, Debug, PartialEq)]
pub enum ParametrizedGate {
    /// Rotation around Z-axis
    Rz(f64),

    /// Fermionic simulation gate: iSWAP-like rotation by `theta` on the
    /// `|01>`/`|10>` subspace and a conditional phase `phi` on `|11>`
    FSim(f64, f64),
}

impl QuantumGate for ParametrizedGate {
    fn qubit_count(&self) -> usize {
        match self {
            ParametrizedGate::Rz(_) => 1,
            ParametrizedGate::FSim(_, _) => 2,
        }
    }

    fn matrix(&self) -> Array2<Complex64> {
        match self {
            ParametrizedGate::Rz(theta) => {
                let phase_pos = Complex64::new(0.0, theta / 2.0).exp();
                let phase_neg = Complex64::new(0.0, -theta / 2.0).exp();
                array![[phase_neg, ZERO], [ZERO, phase_pos]]
            }
            ParametrizedGate::FSim(theta, phi) => {
                let cos = Complex64::new(theta.cos(), 0.0);
                let isin = Complex64::new(0.0, -theta.sin());
                let phase = Complex64::new(0.0, -phi).exp();
                array![
                    [ONE, ZERO, ZERO, ZERO],
                    [ZERO, cos, isin, ZERO],
                    [ZERO, isin, cos, ZERO],
                    [ZERO, ZERO, ZERO, phase]
                ]
            }
        }
    }

    fn name(&self) -> String {
        match self {
            ParametrizedGate::Rz(theta) => format!("Rz({:.2})", theta),
            ParametrizedGate::FSim(theta, phi) => format!("fSim({:.2}, {:.2})", theta, phi),
        }
    }

    fn clone_box(&self) -> Box<dyn QuantumGate> {
        Box::new(self.clone())
    }
}
