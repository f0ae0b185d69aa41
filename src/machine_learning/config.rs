//! Classifier and training configuration

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use ndarray::Array1;
use tracing::warn;

use crate::machine_learning::checkpoint::Checkpoint;
use crate::machine_learning::core::ConfigurationError;
use crate::machine_learning::loss::{ClassificationLoss, CrossEntropy};
use crate::machine_learning::optimizer::{Bfgs, MinimizeOptions, Minimizer};
use crate::machine_learning::shots::ShotPolicy;

/// Default number of objective calls between two shot-budget changes
pub const DEFAULT_SHOT_DELAY: usize = 20;
/// Default iteration budget of a `fit`
pub const DEFAULT_BUDGET: usize = 100;
pub const DEFAULT_NAME: &str = "quantumClassifier";

/// Construction options of a [`Classifier`](crate::machine_learning::quantum::variational::Classifier)
#[derive(Clone)]
pub struct ClassifierConfig {
    /// Initial parameters; drawn by the circuit when absent
    pub params: Option<Array1<f64>>,
    /// Shot budget; absent or non-positive means exact probabilities
    pub nbshots: Option<i64>,
    pub shot_policy: ShotPolicy,
    /// Objective calls between two shot-budget changes
    pub shot_delay: usize,
    pub loss: Arc<dyn ClassificationLoss>,
    /// Rows per backend job; all rows at once when absent
    pub job_size: Option<usize>,
    /// Default iteration cap of `fit`
    pub budget: usize,
    pub name: String,
    /// Checkpoint target during and after training
    pub save_path: Option<PathBuf>,
    /// Seeds parameter initialization
    pub seed: Option<u64>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            params: None,
            nbshots: None,
            shot_policy: ShotPolicy::Constant,
            shot_delay: DEFAULT_SHOT_DELAY,
            loss: Arc::new(CrossEntropy),
            job_size: None,
            budget: DEFAULT_BUDGET,
            name: DEFAULT_NAME.to_string(),
            save_path: None,
            seed: None,
        }
    }
}

impl ClassifierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a checkpoint: parameters, shots, job size and name are restored
    pub fn from_checkpoint(checkpoint: &Checkpoint) -> Self {
        let shot_policy = checkpoint.info.nbshots_increment.parse().unwrap_or_else(|e| {
            warn!(error = %e, "shot policy cannot be restored from checkpoint, using constant shots");
            ShotPolicy::Constant
        });

        ClassifierConfig {
            params: Some(Array1::from(checkpoint.parameters.clone())),
            nbshots: checkpoint.info.nbshots.map(|shots| shots as i64),
            shot_policy,
            shot_delay: checkpoint.info.nbshots_incr_delay,
            job_size: checkpoint.info.job_size.as_option(),
            name: checkpoint.name.clone(),
            ..Self::default()
        }
    }

    pub fn with_params(mut self, params: Array1<f64>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_nbshots(mut self, nbshots: i64) -> Self {
        self.nbshots = Some(nbshots);
        self
    }

    pub fn with_shot_policy(mut self, policy: ShotPolicy) -> Self {
        self.shot_policy = policy;
        self
    }

    pub fn with_shot_delay(mut self, delay: usize) -> Self {
        self.shot_delay = delay;
        self
    }

    pub fn with_loss(mut self, loss: impl ClassificationLoss + 'static) -> Self {
        self.loss = Arc::new(loss);
        self
    }

    pub fn with_job_size(mut self, job_size: usize) -> Self {
        self.job_size = Some(job_size);
        self
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_save_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Shot budget after normalization of non-positive values
    pub fn shots(&self) -> Option<usize> {
        self.nbshots.filter(|&k| k > 0).map(|k| k as usize)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.shot_delay == 0 {
            return Err(ConfigurationError::InvalidValue(
                "shot increment delay must be positive".to_string(),
            ));
        }
        if self.job_size == Some(0) {
            return Err(ConfigurationError::InvalidValue("job size must be positive".to_string()));
        }
        if let ShotPolicy::Multiplicative(factor) = self.shot_policy {
            if !factor.is_finite() || factor < 0.0 {
                return Err(ConfigurationError::InvalidValue(format!(
                    "multiplicative shot increment {} is not a non-negative factor",
                    factor
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ClassifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifierConfig")
            .field("params", &self.params)
            .field("nbshots", &self.nbshots)
            .field("shot_policy", &self.shot_policy)
            .field("shot_delay", &self.shot_delay)
            .field("job_size", &self.job_size)
            .field("budget", &self.budget)
            .field("name", &self.name)
            .field("save_path", &self.save_path)
            .field("seed", &self.seed)
            .finish_non_exhaustive()
    }
}

/// Options of one `fit` call
#[derive(Debug, Clone)]
pub struct FitOptions {
    /// Minibatch size; the full training set when absent or zero
    pub batch_size: Option<usize>,
    pub method: Arc<dyn Minimizer>,
    /// Box constraints, one pair per parameter
    pub bounds: Option<Vec<(f64, f64)>>,
    /// Stopping criteria; `max_iter` defaults to the classifier budget
    pub options: Option<MinimizeOptions>,
    /// Record the loss of every iteration
    pub save_loss_progress: bool,
    /// Record outputs and parameters of every iteration and write them here
    pub save_output_progress: Option<PathBuf>,
    /// Seeds minibatch sampling
    pub seed: Option<u64>,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            batch_size: None,
            method: Arc::new(Bfgs),
            bounds: None,
            options: None,
            save_loss_progress: false,
            save_output_progress: None,
            seed: None,
        }
    }
}

impl FitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn with_method(mut self, method: impl Minimizer + 'static) -> Self {
        self.method = Arc::new(method);
        self
    }

    pub fn with_bounds(mut self, bounds: Vec<(f64, f64)>) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_options(mut self, options: MinimizeOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn with_loss_progress(mut self, save: bool) -> Self {
        self.save_loss_progress = save;
        self
    }

    pub fn with_output_progress(mut self, path: impl Into<PathBuf>) -> Self {
        self.save_output_progress = Some(path.into());
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}
