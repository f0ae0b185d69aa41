//! Quantum circuits and the gate-sequence builder contract used by recipes

use std::fmt;

use crate::quantum::error::CircuitError;
use crate::quantum::gate::{ParametrizedGate, QuantumGate, StandardGate};
use crate::quantum::state::StateVector;

/// A quantum circuit consisting of a sequence of gates
#[derive(Debug)]
pub struct QuantumCircuit {
    pub gates: Vec<(Box<dyn QuantumGate>, Vec<usize>)>,
    pub qubit_count: usize,
    /// Whether every qubit is marked for measurement
    pub measured: bool,
}

impl QuantumCircuit {
    /// Create a new empty quantum circuit
    pub fn new(qubit_count: usize) -> Self {
        QuantumCircuit {
            gates: Vec::new(),
            qubit_count,
            measured: false,
        }
    }

    pub fn add_gate(&mut self, gate: Box<dyn QuantumGate>, qubits: &[usize]) -> Result<(), CircuitError> {
        for &q in qubits {
            if q >= self.qubit_count {
                return Err(CircuitError::QubitOutOfRange {
                    index: q,
                    qubit_count: self.qubit_count,
                });
            }
        }

        if gate.qubit_count() != qubits.len() {
            return Err(CircuitError::DimensionMismatch(format!(
                "gate {} acts on {} qubits, but {} qubits were specified",
                gate.name(),
                gate.qubit_count(),
                qubits.len()
            )));
        }

        self.gates.push((gate, qubits.to_vec()));
        Ok(())
    }

    /// Get the number of gates in the circuit
    pub fn gate_count(&self) -> usize {
        self.gates.len()
    }

    /// Apply the circuit to a quantum state
    pub fn apply(&self, state: &StateVector) -> Result<StateVector, CircuitError> {
        if state.qubit_count() < self.qubit_count {
            return Err(CircuitError::DimensionMismatch(format!(
                "state has {} qubits, but circuit requires at least {} qubits",
                state.qubit_count(),
                self.qubit_count
            )));
        }

        let mut current_state = state.clone();
        for (gate, qubits) in &self.gates {
            current_state.apply_gate(gate.as_ref(), qubits)?;
        }

        Ok(current_state)
    }
}

impl PartialEq for QuantumCircuit {
    fn eq(&self, other: &Self) -> bool {
        self.qubit_count == other.qubit_count
            && self.measured == other.measured
            && self.gates.len() == other.gates.len()
            && self
                .gates
                .iter()
                .zip(other.gates.iter())
                .all(|((g1, q1), (g2, q2))| q1 == q2 && g1 == g2)
    }
}

impl Clone for QuantumCircuit {
    fn clone(&self) -> Self {
        QuantumCircuit {
            gates: self
                .gates
                .iter()
                .map(|(gate, qubits)| (gate.clone_box(), qubits.clone()))
                .collect(),
            qubit_count: self.qubit_count,
            measured: self.measured,
        }
    }
}

/// One gate placement requested by a recipe.
///
/// The placement log records what was asked for, independently of how a
/// backend decomposes it.
#[derive(Debug, Clone, PartialEq)]
pub enum GatePlacement {
    /// Parametrized single-qubit input gate
    Input { qubit: usize, theta: f64 },
    /// Controlled-Z entangler
    CZ { a: usize, b: usize },
    /// Two-parameter two-qubit gate
    FSim { a: usize, b: usize, theta: f64, phi: f64 },
    /// All qubits marked for measurement
    MeasureAll,
}

impl fmt::Display for GatePlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatePlacement::Input { qubit, theta } => write!(f, "IN({},{:.4})", qubit, theta),
            GatePlacement::CZ { a, b } => write!(f, "CZ({},{})", a, b),
            GatePlacement::FSim { a, b, theta, phi } => {
                write!(f, "fSIM({},{},{:.4},{:.4})", a, b, theta, phi)
            }
            GatePlacement::MeasureAll => write!(f, "measure_all()"),
        }
    }
}

/// Gate-level construction interface handed to circuit recipes.
///
/// Implementations are backend specific; every placement validates its qubit
/// indices against [`GateSequenceBuilder::qubit_count`].
pub trait GateSequenceBuilder {
    /// Number of qubits of the register being built
    fn qubit_count(&self) -> usize;

    /// Place the parametrized input gate on one qubit
    fn input(&mut self, qubit: usize, theta: f64) -> Result<(), CircuitError>;

    /// Place the fixed controlled-Z entangler between two qubits
    fn cz(&mut self, a: usize, b: usize) -> Result<(), CircuitError>;

    /// Place the two-parameter fSim gate between two qubits
    fn fsim(&mut self, a: usize, b: usize, theta: f64, phi: f64) -> Result<(), CircuitError>;

    /// Mark all qubits for measurement
    fn measure_all(&mut self) -> Result<(), CircuitError>;

    /// Ordered log of the placements made since the last reset
    fn placements(&self) -> &[GatePlacement];

    /// Discard everything placed so far
    fn reset(&mut self);

    fn verify_index(&self, qubit: usize) -> Result<(), CircuitError> {
        if qubit >= self.qubit_count() {
            return Err(CircuitError::QubitOutOfRange {
                index: qubit,
                qubit_count: self.qubit_count(),
            });
        }
        Ok(())
    }

    /// Place one input gate per `(qubit, theta)` pair
    fn input_many(&mut self, qubits: &[usize], thetas: &[f64]) -> Result<(), CircuitError> {
        if qubits.len() != thetas.len() {
            return Err(CircuitError::DimensionMismatch(format!(
                "{} qubits but {} input angles",
                qubits.len(),
                thetas.len()
            )));
        }
        for &q in qubits {
            self.verify_index(q)?;
        }
        for (&q, &theta) in qubits.iter().zip(thetas) {
            self.input(q, theta)?;
        }
        Ok(())
    }

    /// Place the input gate on every qubit, `thetas[i]` on qubit `i`
    fn allin(&mut self, thetas: &[f64]) -> Result<(), CircuitError> {
        if thetas.len() != self.qubit_count() {
            return Err(CircuitError::DimensionMismatch(format!(
                "allin expects {} angles, got {}",
                self.qubit_count(),
                thetas.len()
            )));
        }
        for (q, &theta) in thetas.iter().enumerate() {
            self.input(q, theta)?;
        }
        Ok(())
    }
}

/// Builder producing [`QuantumCircuit`]s for the state-vector simulator.
///
/// The input gate decomposes as `SX · RZ(theta) · SX`.
pub struct CircuitBuilder {
    circuit: QuantumCircuit,
    placements: Vec<GatePlacement>,
}

impl CircuitBuilder {
    /// Create a new circuit builder
    pub fn new(qubit_count: usize) -> Self {
        CircuitBuilder {
            circuit: QuantumCircuit::new(qubit_count),
            placements: Vec::new(),
        }
    }

    /// Build the quantum circuit
    pub fn build(self) -> QuantumCircuit {
        self.circuit
    }

    /// Take the finished circuit and leave the builder empty for the next one
    pub fn finish(&mut self) -> QuantumCircuit {
        let qubit_count = self.circuit.qubit_count;
        self.placements.clear();
        std::mem::replace(&mut self.circuit, QuantumCircuit::new(qubit_count))
    }

    fn verify_pair(&self, a: usize, b: usize) -> Result<(), CircuitError> {
        self.verify_index(a)?;
        self.verify_index(b)?;
        if a == b {
            return Err(CircuitError::DuplicateQubit(a));
        }
        Ok(())
    }
}

impl GateSequenceBuilder for CircuitBuilder {
    fn qubit_count(&self) -> usize {
        self.circuit.qubit_count
    }

    fn input(&mut self, qubit: usize, theta: f64) -> Result<(), CircuitError> {
        self.verify_index(qubit)?;
        self.circuit.add_gate(Box::new(StandardGate::SX), &[qubit])?;
        self.circuit.add_gate(Box::new(ParametrizedGate::Rz(theta)), &[qubit])?;
        self.circuit.add_gate(Box::new(StandardGate::SX), &[qubit])?;
        self.placements.push(GatePlacement::Input { qubit, theta });
        Ok(())
    }

    fn cz(&mut self, a: usize, b: usize) -> Result<(), CircuitError> {
        self.verify_pair(a, b)?;
        self.circuit.add_gate(Box::new(StandardGate::CZ), &[a, b])?;
        self.placements.push(GatePlacement::CZ { a, b });
        Ok(())
    }

    fn fsim(&mut self, a: usize, b: usize, theta: f64, phi: f64) -> Result<(), CircuitError> {
        self.verify_pair(a, b)?;
        self.circuit.add_gate(Box::new(ParametrizedGate::FSim(theta, phi)), &[a, b])?;
        self.placements.push(GatePlacement::FSim { a, b, theta, phi });
        Ok(())
    }

    fn measure_all(&mut self) -> Result<(), CircuitError> {
        self.circuit.measured = true;
        self.placements.push(GatePlacement::MeasureAll);
        Ok(())
    }

    fn placements(&self) -> &[GatePlacement] {
        &self.placements
    }

    fn reset(&mut self) {
        self.circuit = QuantumCircuit::new(self.circuit.qubit_count);
        self.placements.clear();
    }
}

impl fmt::Display for CircuitBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for placement in &self.placements {
            write!(f, "{}", placement)?;
        }
        Ok(())
    }
}
