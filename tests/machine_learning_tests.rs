// tests/machine_learning_tests.rs
//! Tests for the classifier training engine

use ndarray::{array, Array1, Array2, ArrayView1, ArrayView2};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use polyq::machine_learning::core::{BackendError, ClassifierError, ConfigurationError};
use polyq::machine_learning::prelude::*;
use polyq::machine_learning::quantum::circuit_model::{check_run_inputs, effective_shots};

/// Deterministic two-qubit backend whose outcome `0` has probability
/// `(1 + cos(x - a) cos(b)) / 2` and outcome `1` the rest
struct MockCircuit {
    recipe: Recipe,
    calls: Arc<AtomicUsize>,
    shots_seen: Arc<Mutex<Vec<Option<usize>>>>,
    fail_after: Option<usize>,
}

impl MockCircuit {
    fn new(recipe: Recipe) -> Self {
        MockCircuit {
            recipe,
            calls: Arc::new(AtomicUsize::new(0)),
            shots_seen: Arc::new(Mutex::new(Vec::new())),
            fail_after: None,
        }
    }

    fn failing_after(recipe: Recipe, calls: usize) -> Self {
        MockCircuit {
            fail_after: Some(calls),
            ..MockCircuit::new(recipe)
        }
    }
}

impl CircuitML for MockCircuit {
    fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    fn qubit_count(&self) -> usize {
        2
    }

    fn param_count(&self) -> usize {
        2
    }

    fn run(
        &self,
        x: ArrayView2<f64>,
        params: ArrayView1<f64>,
        shots: Option<usize>,
        _job_size: Option<usize>,
    ) -> Result<Array2<f64>, BackendError> {
        check_run_inputs(self, &params)?;
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.map_or(false, |limit| call >= limit) {
            return Err(BackendError::Execution("device offline".to_string()));
        }
        self.shots_seen.lock().unwrap().push(shots);

        let mut out = Array2::zeros((x.nrows(), 4));
        for (i, row) in x.rows().into_iter().enumerate() {
            let p0 = (1.0 + (row[0] - params[0]).cos() * params[1].cos()) / 2.0;
            match effective_shots(shots) {
                Some(k) => {
                    let c0 = (p0 * k as f64).round();
                    out[[i, 0]] = c0;
                    out[[i, 1]] = k as f64 - c0;
                }
                None => {
                    out[[i, 0]] = p0;
                    out[[i, 1]] = 1.0 - p0;
                }
            }
        }
        Ok(out)
    }
}

fn noop_recipe() -> Recipe {
    Recipe::new(|_bdr, _x, _params, _shots| Ok(()))
}

fn training_data() -> (Array2<f64>, Vec<usize>) {
    (array![[0.0], [0.2], [3.0], [2.8]], vec![0, 0, 1, 1])
}

fn classifier(config: ClassifierConfig) -> Classifier {
    let config = config.with_params(array![1.0, 0.3]);
    Classifier::new(MockCircuit::new(noop_recipe()), &["00".into(), "01".into()], config).unwrap()
}

#[test]
fn test_shot_budget_restored_after_training() {
    let circuit = MockCircuit::new(noop_recipe());
    let shots_seen = Arc::clone(&circuit.shots_seen);
    let config = ClassifierConfig::new()
        .with_params(array![1.0, 0.3])
        .with_nbshots(100)
        .with_shot_policy(ShotPolicy::Multiplicative(2.0))
        .with_shot_delay(1)
        .with_budget(5);
    let mut model = Classifier::new(circuit, &["00".into(), "01".into()], config).unwrap();

    let (x, y) = training_data();
    model.fit(x.view(), &y, &FitOptions::new().with_seed(1)).unwrap();

    let seen = shots_seen.lock().unwrap();
    assert_eq!(seen[0], Some(100));
    assert!(seen.iter().any(|&s| s.map_or(false, |k| k > 100)));
    assert_eq!(model.nbshots(), Some(100));
}

#[test]
fn test_shot_budget_restored_after_failure() {
    let config = ClassifierConfig::new()
        .with_params(array![1.0, 0.3])
        .with_nbshots(50)
        .with_shot_policy(ShotPolicy::Additive(10))
        .with_shot_delay(1);
    let circuit = MockCircuit::failing_after(noop_recipe(), 3);
    let mut model = Classifier::new(circuit, &[Bitstring::Code(0), Bitstring::Code(1)], config).unwrap();

    let (x, y) = training_data();
    let result = model.fit(x.view(), &y, &FitOptions::new());
    assert!(matches!(result, Err(ClassifierError::Backend(BackendError::Execution(_)))));
    assert_eq!(model.nbshots(), Some(50));
}

#[test]
fn test_loss_history_has_one_entry_per_iteration() {
    let (x, y) = training_data();

    let mut model = classifier(ClassifierConfig::new().with_budget(3));
    let report = model
        .fit(x.view(), &y, &FitOptions::new().with_loss_progress(true))
        .unwrap();
    assert!(report.n_iter >= 1 && report.n_iter <= 3);
    assert_eq!(model.loss_progress().len(), report.n_iter);

    let mut model = classifier(ClassifierConfig::new().with_budget(4));
    let report = model
        .fit(
            x.view(),
            &y,
            &FitOptions::new()
                .with_method(FirstOrder::gradient_descent(0.1))
                .with_loss_progress(true),
        )
        .unwrap();
    assert_eq!(model.loss_progress().len(), report.n_iter);
}

#[test]
fn test_single_point_method_logs_every_evaluation() {
    let (x, y) = training_data();
    let mut model = classifier(ClassifierConfig::new().with_budget(7));

    let report = model
        .fit(
            x.view(),
            &y,
            &FitOptions::new()
                .with_method(PatternSearch::default())
                .with_loss_progress(true),
        )
        .unwrap();

    assert!(report.nfev <= 7);
    assert_eq!(report.n_iter, report.nfev);
    assert_eq!(model.loss_progress().len(), report.nfev);
    assert_eq!(report.method, "PatternSearch");
}

#[test]
fn test_loss_history_off_by_default() {
    let (x, y) = training_data();
    let mut model = classifier(ClassifierConfig::new().with_budget(3));
    model.fit(x.view(), &y, &FitOptions::new()).unwrap();
    assert!(model.loss_progress().is_empty());
}

#[test]
fn test_final_iterate_becomes_model_parameters() {
    let (x, y) = training_data();
    let mut model = classifier(ClassifierConfig::new().with_budget(10));
    let report = model.fit(x.view(), &y, &FitOptions::new().with_seed(3)).unwrap();

    assert_eq!(model.params(), report.params.view());
    assert!(report.best_loss <= report.final_loss + 1e-12);
    assert!(report.best_params.is_some());
    assert_eq!(model.n_iter(), Some(report.n_iter));
}

#[test]
fn test_rebinding_requires_same_recipe() {
    let recipe = noop_recipe();
    let mut model = Classifier::new(
        MockCircuit::new(recipe.clone()),
        &["00".into(), "01".into()],
        ClassifierConfig::new().with_params(array![0.5, 0.5]),
    )
    .unwrap();

    let result = model.set_circuit(MockCircuit::new(noop_recipe()));
    assert!(matches!(result, Err(ClassifierError::Identity(_))));
    assert_eq!(model.params(), array![0.5, 0.5].view());

    assert!(model.set_circuit(MockCircuit::new(recipe)).is_ok());
}

#[test]
fn test_binary_and_integer_bitstrings_are_equivalent() {
    let x = array![[0.4], [2.0]];
    let params = array![0.3, 0.2];

    let binary = Classifier::new(
        MockCircuit::new(noop_recipe()),
        &["00".into(), "01".into()],
        ClassifierConfig::new().with_params(params.clone()),
    )
    .unwrap();
    let integer = Classifier::new(
        MockCircuit::new(noop_recipe()),
        &[Bitstring::Code(0), Bitstring::Code(1)],
        ClassifierConfig::new().with_params(params),
    )
    .unwrap();

    assert_eq!(
        binary.predict_proba(x.view(), None).unwrap(),
        integer.predict_proba(x.view(), None).unwrap()
    );
}

#[test]
fn test_columns_follow_bitstring_order() {
    let x = array![[0.4], [2.0]];
    let params = array![0.3, 0.2];
    let forward = Classifier::new(
        MockCircuit::new(noop_recipe()),
        &[Bitstring::Code(0), Bitstring::Code(1)],
        ClassifierConfig::new().with_params(params.clone()),
    )
    .unwrap();
    let reversed = Classifier::new(
        MockCircuit::new(noop_recipe()),
        &[Bitstring::Code(1), Bitstring::Code(0)],
        ClassifierConfig::new().with_params(params),
    )
    .unwrap();

    let a = forward.predict_proba(x.view(), None).unwrap();
    let b = reversed.predict_proba(x.view(), None).unwrap();
    assert_eq!(a.column(0), b.column(1));
    assert_eq!(a.column(1), b.column(0));
}

#[test]
fn test_shot_counts_are_normalized() {
    let model = classifier(ClassifierConfig::new().with_nbshots(1000));
    let proba = model.predict_proba(array![[0.4], [2.0]].view(), None).unwrap();
    for row in proba.rows() {
        assert!((row.sum() - 1.0).abs() < 1e-12);
    }
}

#[test]
fn test_predictions_count_circuit_evaluations() {
    let model = classifier(ClassifierConfig::new());
    let x = array![[0.1], [3.0]];
    model.predict(x.view()).unwrap();
    model.predict_proba(x.view(), Some(array![0.0, 0.0].view())).unwrap();
    assert_eq!(model.nfev(), 2);
    assert_eq!(model.predict(x.view()).unwrap().len(), 2);
}

#[test]
fn test_empty_input_predicts_nothing() {
    let model = classifier(ClassifierConfig::new());
    let x = Array2::<f64>::zeros((0, 1));

    let proba = model.predict_proba(x.view(), None).unwrap();
    assert_eq!(proba.dim(), (0, 2));
    assert!(model.predict(x.view()).unwrap().is_empty());
}

/// Cross entropy that turns into NaN after a fixed number of calls
struct ExpiringLoss {
    calls: AtomicUsize,
    limit: usize,
}

impl ClassificationLoss for ExpiringLoss {
    fn loss(&self, y_true: &[usize], proba: ArrayView2<f64>, labels: &[usize]) -> Result<f64, ConfigurationError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) >= self.limit {
            return Ok(f64::NAN);
        }
        CrossEntropy.loss(y_true, proba, labels)
    }
}

fn full_set_loss(model: &Classifier, x: ArrayView2<f64>, y: &[usize], params: ArrayView1<f64>) -> f64 {
    let proba = model.predict_proba(x, Some(params)).unwrap();
    CrossEntropy.loss(y, proba.view(), &[0, 1]).unwrap()
}

#[test]
fn test_failed_training_keeps_best_parameters() {
    let (x, y) = training_data();
    let x0 = array![1.0, 0.3];
    let mut model = classifier(ClassifierConfig::new().with_budget(50));
    model.set_loss(ExpiringLoss {
        calls: AtomicUsize::new(0),
        limit: 20,
    });

    let result = model.fit(x.view(), &y, &FitOptions::new().with_seed(3));
    assert!(matches!(result, Err(ClassifierError::Optimizer(_))));

    let kept = model.params().to_owned();
    assert_ne!(kept, x0);
    assert!(full_set_loss(&model, x.view(), &y, kept.view()) < full_set_loss(&model, x.view(), &y, x0.view()));
}

#[test]
fn test_replaced_loss_drives_training() {
    let (x, y) = training_data();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut model = classifier(ClassifierConfig::new().with_budget(2));

    let counter = Arc::clone(&calls);
    model.set_loss(CountingLoss(counter));
    let report = model.fit(x.view(), &y, &FitOptions::new()).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), report.nfev);
    assert!(report.nfev > 0);
}

/// Cross entropy counting its invocations
struct CountingLoss(Arc<AtomicUsize>);

impl ClassificationLoss for CountingLoss {
    fn loss(&self, y_true: &[usize], proba: ArrayView2<f64>, labels: &[usize]) -> Result<f64, ConfigurationError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        CrossEntropy.loss(y_true, proba, labels)
    }
}

#[test]
fn test_configuration_errors() {
    let (x, y) = training_data();

    let mixed = Classifier::new(
        MockCircuit::new(noop_recipe()),
        &[Bitstring::Code(0), "01".into()],
        ClassifierConfig::new(),
    );
    assert!(matches!(
        mixed,
        Err(ClassifierError::Configuration(ConfigurationError::TypeMismatch(_)))
    ));

    let wrong_params = Classifier::new(
        MockCircuit::new(noop_recipe()),
        &[Bitstring::Code(0), Bitstring::Code(1)],
        ClassifierConfig::new().with_params(Array1::zeros(3)),
    );
    assert!(wrong_params.is_err());

    let mut model = classifier(ClassifierConfig::new());
    let too_many_labels = model.fit(x.view(), &[0, 1, 2, 2], &FitOptions::new());
    assert!(matches!(
        too_many_labels,
        Err(ClassifierError::Configuration(ConfigurationError::CardinalityMismatch {
            declared: 2,
            observed: 3
        }))
    ));

    let bad_bounds = model.fit(x.view(), &y, &FitOptions::new().with_bounds(vec![(0.0, 1.0)]));
    assert!(matches!(bad_bounds, Err(ClassifierError::Configuration(_))));

    let big_batch = model.fit(x.view(), &y, &FitOptions::new().with_batch_size(5));
    assert!(matches!(big_batch, Err(ClassifierError::Configuration(_))));
    assert_eq!(model.nfev(), 0);
}

#[test]
fn test_bounded_method_keeps_parameters_in_box() {
    let (x, y) = training_data();
    let mut model = classifier(ClassifierConfig::new().with_budget(20));
    let report = model
        .fit(x.view(), &y, &FitOptions::new().with_method(BoundedBfgs).with_seed(2))
        .unwrap();
    assert!(report.params.iter().all(|p| p.abs() <= std::f64::consts::PI));
}

#[test]
fn test_checkpoint_and_trace_written_after_training() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint_path = dir.path().join("model.json");
    let trace_path = dir.path().join("trace.json");
    let (x, y) = training_data();

    let mut model = classifier(
        ClassifierConfig::new()
            .with_budget(5)
            .with_name("mock")
            .with_save_path(&checkpoint_path),
    );
    let report = model
        .fit(x.view(), &y, &FitOptions::new().with_output_progress(&trace_path))
        .unwrap();

    let checkpoint = Checkpoint::load(&checkpoint_path).unwrap();
    assert_eq!(checkpoint.name, "mock");
    assert_eq!(checkpoint.parameters, model.params().to_vec());
    assert_eq!(checkpoint.info.n_iter, Some(report.n_iter));
    assert_eq!(checkpoint.info.nfev, Some(model.nfev()));
    assert_eq!(checkpoint.info.bitstr, vec!["00", "01"]);
    assert_eq!(checkpoint.info.job_size, JobSize::Full);
    assert_eq!(checkpoint.loss_progress.map(|l| l.len()), Some(report.n_iter));

    let trace = OutputTrace::load(&trace_path).unwrap();
    assert_eq!(trace.labels, y);
    assert_eq!(trace.output.len(), report.n_iter);
    assert_eq!(trace.params.len(), report.n_iter);
    assert_eq!(trace.loss_value.len(), report.n_iter);
    assert!(trace.output.iter().all(|o| o.len() == 4));

    assert_eq!(model.info()["mock"], model.checkpoint());
}

#[test]
fn test_periodic_checkpoint_survives_failure() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    let (x, y) = training_data();

    let config = ClassifierConfig::new()
        .with_params(array![1.0, 0.3])
        .with_save_path(&path);
    let circuit = MockCircuit::failing_after(noop_recipe(), 15);
    let mut model = Classifier::new(circuit, &[Bitstring::Code(0), Bitstring::Code(1)], config).unwrap();

    let result = model.fit(x.view(), &y, &FitOptions::new().with_method(PatternSearch::default()));
    assert!(result.is_err());

    // Written at iteration 10, before the backend failed
    let checkpoint = Checkpoint::load(&path).unwrap();
    assert_eq!(checkpoint.info.n_iter, None);
    assert_eq!(checkpoint.parameters.len(), 2);
}

#[test]
fn test_resume_from_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");

    let model = classifier(ClassifierConfig::new().with_nbshots(64).with_job_size(2));
    model.save(Some(path.as_path())).unwrap();

    let checkpoint = Checkpoint::load(&path).unwrap();
    let resumed = Classifier::new(
        MockCircuit::new(noop_recipe()),
        &[Bitstring::Code(0), Bitstring::Code(1)],
        ClassifierConfig::from_checkpoint(&checkpoint),
    )
    .unwrap();

    assert_eq!(resumed.params(), model.params());
    assert_eq!(resumed.nbshots(), Some(64));
    assert!(model.save(None).is_err());
}
