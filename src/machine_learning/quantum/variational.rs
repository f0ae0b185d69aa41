//! Variational quantum classifier
//!
//! A [`Classifier`] binds a [`CircuitML`] to an ordered list of class
//! outcomes. Class probabilities are the (normalized) outcome frequencies of
//! those bitstrings, and training tunes the circuit parameters against a
//! classification loss with a pluggable [`Minimizer`](crate::machine_learning::optimizer::Minimizer).

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

use crate::machine_learning::bitstring::{Bitstring, BitstringLabels};
use crate::machine_learning::checkpoint::{Checkpoint, JobSize, ModelInfo};
use crate::machine_learning::config::{ClassifierConfig, FitOptions};
use crate::machine_learning::core::{ClassifierError, ConfigurationError, Result};
use crate::machine_learning::dataset::{LabelSet, MinibatchSampler};
use crate::machine_learning::loss::ClassificationLoss;
use crate::machine_learning::optimizer::{default_bounds, MinimizeOptions};
use crate::machine_learning::quantum::circuit_model::{effective_shots, CircuitML};
use crate::machine_learning::quantum::training::{FitReport, TrainingRun, TrainingState};
use crate::machine_learning::shots::ShotPolicy;

/// Variational quantum classifier over a backend-agnostic circuit
pub struct Classifier {
    pub(super) circuit: Box<dyn CircuitML>,
    pub(super) bitstr: BitstringLabels,
    pub(super) params: Array1<f64>,
    /// Current shot budget, `None` for exact probabilities
    pub(super) nbshots: Option<usize>,
    pub(super) shot_policy: ShotPolicy,
    pub(super) shot_delay: usize,
    pub(super) loss: Arc<dyn ClassificationLoss>,
    pub(super) job_size: Option<usize>,
    pub(super) budget: usize,
    pub(super) name: String,
    pub(super) save_path: Option<PathBuf>,
    /// Loss history of every tracked `fit`, persisted in checkpoints
    pub(super) loss_progress: Vec<f64>,
    /// Circuit evaluations, counting every batch execution
    nfev: AtomicUsize,
    /// Iterations of the last completed `fit`
    n_iter: Option<usize>,
}

impl Classifier {
    /// Creates a classifier whose class `j` is measured as outcome `bitstr[j]`
    pub fn new<C: CircuitML + 'static>(circuit: C, bitstr: &[Bitstring], config: ClassifierConfig) -> Result<Self> {
        config.validate()?;
        let bitstr = BitstringLabels::parse(bitstr, circuit.qubit_count())?;
        let nbshots = config.shots();

        let params = match config.params {
            Some(params) => params,
            None => {
                let mut rng = match config.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                circuit.random_params(&mut rng)
            }
        };
        check_param_count(&circuit, params.len())?;

        Ok(Classifier {
            circuit: Box::new(circuit),
            bitstr,
            params,
            nbshots,
            shot_policy: config.shot_policy,
            shot_delay: config.shot_delay,
            loss: config.loss,
            job_size: config.job_size,
            budget: config.budget,
            name: config.name,
            save_path: config.save_path,
            loss_progress: Vec::new(),
            nfev: AtomicUsize::new(0),
            n_iter: None,
        })
    }

    pub fn circuit(&self) -> &dyn CircuitML {
        self.circuit.as_ref()
    }

    /// Replace the backend; the new circuit must come from the same recipe
    pub fn set_circuit<C: CircuitML + 'static>(&mut self, circuit: C) -> Result<()> {
        if !self.circuit.same_circuit(&circuit) {
            return Err(ClassifierError::Identity(format!(
                "recipe {:?} differs from the bound recipe {:?}",
                circuit.recipe().name(),
                self.circuit.recipe().name()
            )));
        }
        if circuit.qubit_count() != self.circuit.qubit_count() {
            return Err(ConfigurationError::InvalidValue(format!(
                "circuit has {} qubits, classifier expects {}",
                circuit.qubit_count(),
                self.circuit.qubit_count()
            ))
            .into());
        }
        check_param_count(&circuit, self.params.len())?;

        self.circuit = Box::new(circuit);
        Ok(())
    }

    pub fn params(&self) -> ArrayView1<f64> {
        self.params.view()
    }

    pub fn set_params(&mut self, params: Array1<f64>) -> Result<()> {
        check_param_count(self.circuit.as_ref(), params.len())?;
        self.params = params;
        Ok(())
    }

    /// Current shot budget, `None` for exact probabilities
    pub fn nbshots(&self) -> Option<usize> {
        self.nbshots
    }

    /// Non-positive or absent budgets select exact probabilities
    pub fn set_nbshots(&mut self, nbshots: Option<i64>) {
        self.nbshots = nbshots.filter(|&k| k > 0).map(|k| k as usize);
    }

    /// Replace the loss used by subsequent `fit` calls
    pub fn set_loss(&mut self, loss: impl ClassificationLoss + 'static) {
        self.loss = Arc::new(loss);
    }

    pub fn bitstr(&self) -> &BitstringLabels {
        &self.bitstr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn loss_progress(&self) -> &[f64] {
        &self.loss_progress
    }

    /// Number of circuit evaluations so far
    pub fn nfev(&self) -> usize {
        self.nfev.load(Ordering::Relaxed)
    }

    /// Iterations performed by the last `fit`, if any
    pub fn n_iter(&self) -> Option<usize> {
        self.n_iter
    }

    /// Raw outcome matrix of the circuit, at `params` or the model parameters
    pub fn run_circuit(&self, x: ArrayView2<f64>, params: Option<ArrayView1<f64>>) -> Result<Array2<f64>> {
        let out = match params {
            Some(params) => self.circuit.run(x, params, self.nbshots, self.job_size)?,
            None => self.circuit.run(x, self.params.view(), self.nbshots, self.job_size)?,
        };
        self.nfev.fetch_add(1, Ordering::Relaxed);
        Ok(out)
    }

    /// Class probabilities, one column per bitstring in declared order
    pub fn predict_proba(&self, x: ArrayView2<f64>, params: Option<ArrayView1<f64>>) -> Result<Array2<f64>> {
        let mut out = self.run_circuit(x, params)?;
        if let Some(shots) = effective_shots(self.nbshots) {
            out /= shots as f64;
        }
        Ok(out.select(Axis(1), self.bitstr.codes()))
    }

    /// Arg-max class of every row; ties go to the lowest class
    pub fn proba_to_label(proba: ArrayView2<f64>) -> Array1<usize> {
        proba
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |(best, best_p), (j, &p)| {
                        if p > best_p {
                            (j, p)
                        } else {
                            (best, best_p)
                        }
                    })
                    .0
            })
            .collect()
    }

    /// Predicted class index of every row
    pub fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x, None)?;
        Ok(Self::proba_to_label(proba.view()))
    }

    /// Train on `x` with class labels `y`.
    ///
    /// The model parameters end at the minimizer's final iterate. The shot
    /// budget in force before the call is restored whatever the outcome.
    pub fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], options: &FitOptions) -> Result<FitReport> {
        if x.nrows() != y.len() {
            return Err(ConfigurationError::InvalidValue(format!(
                "{} input rows for {} targets",
                x.nrows(),
                y.len()
            ))
            .into());
        }

        let labels = LabelSet::from_targets(y);
        if labels.len() > self.bitstr.len() {
            return Err(ConfigurationError::CardinalityMismatch {
                declared: self.bitstr.len(),
                observed: labels.len(),
            }
            .into());
        }

        let sampler = MinibatchSampler::new(y.len(), options.batch_size)?;
        let bounds = self.resolve_bounds(options)?;
        let minimize_options = options
            .options
            .unwrap_or_else(|| MinimizeOptions::default().with_max_iter(self.budget));

        info!(
            name = %self.name,
            method = options.method.name(),
            max_iter = minimize_options.max_iter,
            shots = ?self.nbshots,
            samples = y.len(),
            batch_size = sampler.batch_size(),
            "starting training"
        );

        let original_shots = self.nbshots;
        let outcome = self.optimize(x, y, &labels, sampler, bounds, minimize_options, options);
        self.nbshots = original_shots;
        let report = outcome?;

        info!(
            name = %self.name,
            n_iter = report.n_iter,
            nfev = report.nfev,
            loss = report.final_loss,
            converged = report.converged,
            "training finished"
        );
        Ok(report)
    }

    fn resolve_bounds(&self, options: &FitOptions) -> Result<Option<Vec<(f64, f64)>>> {
        match &options.bounds {
            Some(bounds) if bounds.len() != self.params.len() => Err(ConfigurationError::InvalidValue(format!(
                "{} bounds for {} parameters",
                bounds.len(),
                self.params.len()
            ))
            .into()),
            Some(bounds) => Ok(Some(bounds.clone())),
            None if options.method.is_bounded() => Ok(Some(default_bounds(self.params.len()))),
            None => Ok(None),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn optimize(
        &mut self,
        x: ArrayView2<f64>,
        y: &[usize],
        labels: &LabelSet,
        sampler: MinibatchSampler,
        bounds: Option<Vec<(f64, f64)>>,
        minimize_options: MinimizeOptions,
        options: &FitOptions,
    ) -> Result<FitReport> {
        let rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let method = Arc::clone(&options.method);
        let x0 = self.params.clone();

        let mut run = TrainingRun::new(
            self,
            x.view(),
            y,
            labels,
            sampler,
            rng,
            options.save_loss_progress,
            options.save_output_progress.is_some(),
            !method.supports_iteration_callback(),
        );
        let result = method.minimize(&mut run, x0.view(), bounds.as_deref(), &minimize_options);
        let state = run.into_state();
        let result = result?;

        self.params = result.x.clone();
        self.n_iter = Some(state.n_iter);
        self.finish_artifacts(&state, y, options)?;

        Ok(FitReport {
            method: method.name().to_string(),
            params: result.x,
            final_loss: result.fun,
            best_params: state.best_params,
            best_loss: state.min_loss,
            n_iter: state.n_iter,
            nfev: state.n_calls,
            converged: result.converged,
            message: result.message,
        })
    }

    fn finish_artifacts(&self, state: &TrainingState, y: &[usize], options: &FitOptions) -> Result<()> {
        if let Some(path) = &options.save_output_progress {
            state.output_trace(y).save(path)?;
            info!(path = %path.display(), "training trace written");
        }
        if self.save_path.is_some() {
            self.save(None)?;
        }
        Ok(())
    }

    /// Snapshot of the parameters and metadata
    pub fn checkpoint(&self) -> Checkpoint {
        let fitted = self.n_iter.is_some();
        Checkpoint {
            name: self.name.clone(),
            parameters: self.params.to_vec(),
            loss_progress: (!self.loss_progress.is_empty()).then(|| self.loss_progress.clone()),
            info: ModelInfo {
                circuit: self.circuit.description(),
                nbshots: self.nbshots,
                nbshots_increment: self.shot_policy.to_string(),
                nbshots_incr_delay: self.shot_delay,
                bitstr: self.bitstr.to_binary_strings(),
                job_size: JobSize::from_option(self.job_size),
                nfev: fitted.then(|| self.nfev()),
                n_iter: self.n_iter,
            },
        }
    }

    /// Model information keyed by model name
    pub fn info(&self) -> BTreeMap<String, Checkpoint> {
        let mut out = BTreeMap::new();
        out.insert(self.name.clone(), self.checkpoint());
        out
    }

    /// Write a checkpoint to `path`, or to the configured save path
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = path.or(self.save_path.as_deref()).ok_or_else(|| {
            ConfigurationError::InvalidValue("no checkpoint path given or configured".to_string())
        })?;
        self.checkpoint().save(path)
    }
}

fn check_param_count(circuit: &dyn CircuitML, count: usize) -> Result<()> {
    if count != circuit.param_count() {
        return Err(ConfigurationError::InvalidValue(format!(
            "expected {} parameters, got {}",
            circuit.param_count(),
            count
        ))
        .into());
    }
    Ok(())
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("name", &self.name)
            .field("circuit", &self.circuit.description())
            .field("bitstr", &self.bitstr)
            .field("params", &self.params)
            .field("nbshots", &self.nbshots)
            .field("shot_policy", &self.shot_policy)
            .field("nfev", &self.nfev())
            .finish_non_exhaustive()
    }
}
