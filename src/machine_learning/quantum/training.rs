//! State and objective of a single `fit` call

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use tracing::debug;

use crate::machine_learning::checkpoint::OutputTrace;
use crate::machine_learning::core::Result;
use crate::machine_learning::dataset::{LabelSet, MinibatchSampler};
use crate::machine_learning::optimizer::Objective;
use crate::machine_learning::quantum::variational::Classifier;

/// Iterations between two periodic checkpoints
pub const CHECKPOINT_INTERVAL: usize = 10;

/// Progress of one training call
#[derive(Debug, Clone)]
pub struct TrainingState {
    /// Completed iterations
    pub n_iter: usize,
    /// Objective evaluations so far
    pub n_calls: usize,
    pub min_loss: f64,
    pub best_params: Option<Array1<f64>>,
    pub last_loss: Option<f64>,
    /// Class probabilities of the last minibatch, rows in ascending sample order
    pub last_output: Option<Array2<f64>>,
    pub last_params: Option<Array1<f64>>,
    pub loss_progress: Vec<f64>,
    pub output_progress: Vec<Array2<f64>>,
    pub params_progress: Vec<Array1<f64>>,
}

impl Default for TrainingState {
    fn default() -> Self {
        TrainingState {
            n_iter: 0,
            n_calls: 0,
            min_loss: f64::INFINITY,
            best_params: None,
            last_loss: None,
            last_output: None,
            last_params: None,
            loss_progress: Vec::new(),
            output_progress: Vec::new(),
            params_progress: Vec::new(),
        }
    }
}

impl TrainingState {
    /// Recorded history in artifact form
    pub fn output_trace(&self, labels: &[usize]) -> OutputTrace {
        OutputTrace {
            output: self
                .output_progress
                .iter()
                .map(|output| output.rows().into_iter().map(|row| row.to_vec()).collect())
                .collect(),
            labels: labels.to_vec(),
            loss_value: self.loss_progress.clone(),
            params: self.params_progress.iter().map(|p| p.to_vec()).collect(),
        }
    }
}

/// Summary returned by `fit`
#[derive(Debug, Clone, PartialEq)]
pub struct FitReport {
    /// Name of the minimizer
    pub method: String,
    /// Final iterate reported by the minimizer, now the model parameters
    pub params: Array1<f64>,
    pub final_loss: f64,
    /// Parameters with the lowest loss seen during the call
    pub best_params: Option<Array1<f64>>,
    pub best_loss: f64,
    pub n_iter: usize,
    /// Objective evaluations during the call
    pub nfev: usize,
    pub converged: bool,
    pub message: String,
}

/// Minibatch objective bound to a classifier for the duration of a `fit`
pub(crate) struct TrainingRun<'c, 'a> {
    classifier: &'c mut Classifier,
    x: ArrayView2<'a, f64>,
    y: &'a [usize],
    labels: &'a LabelSet,
    sampler: MinibatchSampler,
    rng: StdRng,
    track_loss: bool,
    track_output: bool,
    /// Run the end-of-iteration bookkeeping after every evaluation
    callback_in_objective: bool,
    state: TrainingState,
}

impl<'c, 'a> TrainingRun<'c, 'a> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        classifier: &'c mut Classifier,
        x: ArrayView2<'a, f64>,
        y: &'a [usize],
        labels: &'a LabelSet,
        sampler: MinibatchSampler,
        rng: StdRng,
        track_loss: bool,
        track_output: bool,
        callback_in_objective: bool,
    ) -> Self {
        TrainingRun {
            classifier,
            x,
            y,
            labels,
            sampler,
            rng,
            track_loss,
            track_output,
            callback_in_objective,
            state: TrainingState::default(),
        }
    }

    pub(crate) fn into_state(self) -> TrainingState {
        self.state
    }

    fn adapt_shots(&mut self) {
        let classifier = &mut *self.classifier;
        let shots = classifier.shot_policy.next_budget(
            classifier.nbshots,
            self.state.n_calls,
            self.state.min_loss,
            classifier.shot_delay,
        );

        if shots != classifier.nbshots {
            debug!(call = self.state.n_calls, from = ?classifier.nbshots, to = ?shots, "shot budget changed");
            classifier.nbshots = shots;
        }
    }
}

/// Rows of `output` sorted by the sample index they were computed for
fn reorder_rows(output: &Array2<f64>, indices: &[usize]) -> Array2<f64> {
    let mut order: Vec<usize> = (0..indices.len()).collect();
    order.sort_by_key(|&k| indices[k]);
    output.select(Axis(0), &order)
}

impl Objective for TrainingRun<'_, '_> {
    fn evaluate(&mut self, params: ArrayView1<f64>) -> Result<f64> {
        let indices = self.sampler.sample(&mut self.rng);
        self.adapt_shots();
        self.state.n_calls += 1;

        let x_batch = self.x.select(Axis(0), &indices);
        let y_batch: Vec<usize> = indices.iter().map(|&i| self.y[i]).collect();

        let proba = self.classifier.predict_proba(x_batch.view(), Some(params))?;
        let loss = self.classifier.loss.loss(&y_batch, proba.view(), self.labels.labels())?;

        self.state.last_loss = Some(loss);
        self.state.last_output = Some(reorder_rows(&proba, &indices));
        self.state.last_params = Some(params.to_owned());

        if loss < self.state.min_loss {
            self.state.min_loss = loss;
            self.state.best_params = Some(params.to_owned());
            self.classifier.params = params.to_owned();
        }

        if self.callback_in_objective {
            self.end_iteration(params)?;
        }

        Ok(loss)
    }

    fn end_iteration(&mut self, params: ArrayView1<f64>) -> Result<()> {
        if let Some(loss) = self.state.last_loss {
            if self.track_loss || self.track_output {
                self.state.loss_progress.push(loss);
                self.classifier.loss_progress.push(loss);
            }
        }
        if self.track_output {
            if let Some(output) = &self.state.last_output {
                self.state.output_progress.push(output.clone());
            }
            self.state.params_progress.push(params.to_owned());
        }

        self.state.n_iter += 1;
        debug!(
            iteration = self.state.n_iter,
            loss = ?self.state.last_loss,
            shots = ?self.classifier.nbshots,
            "iteration complete"
        );

        if self.classifier.save_path.is_some() && self.state.n_iter % CHECKPOINT_INTERVAL == 0 {
            self.classifier.save(None)?;
            debug!(iteration = self.state.n_iter, "checkpoint written");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_rows_follow_sample_order() {
        let output = array![[0.3, 0.7], [0.9, 0.1], [0.5, 0.5]];
        let reordered = reorder_rows(&output, &[4, 0, 2]);
        assert_eq!(reordered, array![[0.9, 0.1], [0.5, 0.5], [0.3, 0.7]]);
    }

    #[test]
    fn test_output_trace_layout() {
        let state = TrainingState {
            loss_progress: vec![0.4],
            output_progress: vec![array![[0.6, 0.4]]],
            params_progress: vec![array![1.0, 2.0]],
            ..TrainingState::default()
        };

        let trace = state.output_trace(&[1]);
        assert_eq!(trace.output, vec![vec![vec![0.6, 0.4]]]);
        assert_eq!(trace.labels, vec![1]);
        assert_eq!(trace.params, vec![vec![1.0, 2.0]]);
    }
}
