//! Optimization algorithms for classifier training
//!
//! Minimizers drive an [`Objective`] through repeated evaluations. Methods
//! that support a per-iteration callback call [`Objective::end_iteration`]
//! after every accepted step; the others leave it to the objective.

use std::f64::consts::PI;
use std::fmt::Debug;

use ndarray::{Array1, Array2, ArrayView1};
use tracing::warn;

use crate::machine_learning::core::{ClassifierError, Result};

/// A scalar function being minimized
pub trait Objective {
    /// Value of the function at `x`
    fn evaluate(&mut self, x: ArrayView1<f64>) -> Result<f64>;

    /// Called once per completed iteration with the current iterate
    fn end_iteration(&mut self, x: ArrayView1<f64>) -> Result<()>;
}

/// Stopping criteria shared by all minimizers
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimizeOptions {
    /// Iteration cap; for single-point methods, the evaluation cap
    pub max_iter: usize,
    /// Tolerance on the infinity norm of the (projected) gradient
    pub gtol: f64,
    /// Relative finite-difference step
    pub step: f64,
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        MinimizeOptions {
            max_iter: 100,
            gtol: 1e-5,
            step: 1.49e-8,
        }
    }
}

impl MinimizeOptions {
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_gtol(mut self, gtol: f64) -> Self {
        self.gtol = gtol;
        self
    }

    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }
}

/// Outcome of a minimization
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeResult {
    /// Final iterate
    pub x: Array1<f64>,
    /// Objective value at `x`
    pub fun: f64,
    pub n_iter: usize,
    /// Number of objective evaluations
    pub nfev: usize,
    pub converged: bool,
    pub message: String,
}

/// Trait for minimization methods
pub trait Minimizer: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Whether the method calls [`Objective::end_iteration`] itself
    fn supports_iteration_callback(&self) -> bool {
        true
    }

    /// Whether the method honours box constraints
    fn is_bounded(&self) -> bool {
        false
    }

    fn minimize(
        &self,
        objective: &mut dyn Objective,
        x0: ArrayView1<f64>,
        bounds: Option<&[(f64, f64)]>,
        options: &MinimizeOptions,
    ) -> Result<MinimizeResult>;
}

/// Per-parameter `[-π, π]` box used by bounded methods when none is given
pub fn default_bounds(n: usize) -> Vec<(f64, f64)> {
    vec![(-PI, PI); n]
}

/// Counts evaluations and rejects non-finite values
struct Counted<'a> {
    objective: &'a mut dyn Objective,
    nfev: usize,
}

impl<'a> Counted<'a> {
    fn new(objective: &'a mut dyn Objective) -> Self {
        Counted { objective, nfev: 0 }
    }

    fn eval(&mut self, x: &Array1<f64>) -> Result<f64> {
        self.nfev += 1;
        let value = self.objective.evaluate(x.view())?;
        if !value.is_finite() {
            return Err(ClassifierError::Optimizer(format!(
                "objective returned {} at evaluation {}",
                value, self.nfev
            )));
        }
        Ok(value)
    }

    fn end_iteration(&mut self, x: &Array1<f64>) -> Result<()> {
        self.objective.end_iteration(x.view())
    }
}

/// Forward-difference gradient; steps backwards where a forward step would leave the box
fn gradient(
    f: &mut Counted<'_>,
    x: &Array1<f64>,
    fx: f64,
    step: f64,
    bounds: Option<&[(f64, f64)]>,
) -> Result<Array1<f64>> {
    let mut grad = Array1::zeros(x.len());
    let mut probe = x.clone();

    for i in 0..x.len() {
        let mut h = step * x[i].abs().max(1.0);
        if let Some(bounds) = bounds {
            if x[i] + h > bounds[i].1 {
                h = -h;
            }
        }

        probe[i] = x[i] + h;
        grad[i] = (f.eval(&probe)? - fx) / h;
        probe[i] = x[i];
    }

    Ok(grad)
}

fn project(x: &mut Array1<f64>, bounds: &[(f64, f64)]) {
    for (xi, &(lo, hi)) in x.iter_mut().zip(bounds) {
        *xi = xi.clamp(lo, hi);
    }
}

fn inf_norm(v: &Array1<f64>) -> f64 {
    v.iter().fold(0.0, |acc, x| acc.max(x.abs()))
}

/// Infinity norm of the gradient restricted to directions that stay inside the box
fn projected_inf_norm(x: &Array1<f64>, g: &Array1<f64>, bounds: &[(f64, f64)]) -> f64 {
    x.iter()
        .zip(g.iter())
        .zip(bounds)
        .map(|((&xi, &gi), &(lo, hi))| (xi - (xi - gi).clamp(lo, hi)).abs())
        .fold(0.0, f64::max)
}

/// Rank-two BFGS update of the inverse Hessian approximation
fn bfgs_update(h: &mut Array2<f64>, s: &Array1<f64>, y: &Array1<f64>) {
    let sy = s.dot(y);
    if sy <= 1e-10 {
        return;
    }

    let rho = 1.0 / sy;
    let hy = h.dot(y);
    let yhy = y.dot(&hy);
    let n = s.len();
    for i in 0..n {
        for j in 0..n {
            h[[i, j]] += (1.0 + rho * yhy) * rho * s[i] * s[j] - rho * (hy[i] * s[j] + s[i] * hy[j]);
        }
    }
}

const ARMIJO_C1: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 40;

/// Quasi-Newton BFGS with finite-difference gradients and Armijo backtracking
#[derive(Debug, Clone, Copy, Default)]
pub struct Bfgs;

impl Minimizer for Bfgs {
    fn name(&self) -> &str {
        "BFGS"
    }

    fn minimize(
        &self,
        objective: &mut dyn Objective,
        x0: ArrayView1<f64>,
        bounds: Option<&[(f64, f64)]>,
        options: &MinimizeOptions,
    ) -> Result<MinimizeResult> {
        if bounds.is_some() {
            warn!("BFGS does not support bounds; they are ignored");
        }
        quasi_newton(objective, x0, None, options)
    }
}

/// Projected BFGS honouring box constraints, `[-π, π]` per parameter by default.
///
/// Takes the place of scipy's L-BFGS-B as the bounded method.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoundedBfgs;

impl Minimizer for BoundedBfgs {
    fn name(&self) -> &str {
        "ProjectedBFGS"
    }

    fn is_bounded(&self) -> bool {
        true
    }

    fn minimize(
        &self,
        objective: &mut dyn Objective,
        x0: ArrayView1<f64>,
        bounds: Option<&[(f64, f64)]>,
        options: &MinimizeOptions,
    ) -> Result<MinimizeResult> {
        let bounds = match bounds {
            Some(bounds) => bounds.to_vec(),
            None => default_bounds(x0.len()),
        };
        if bounds.len() != x0.len() {
            return Err(ClassifierError::Optimizer(format!(
                "{} bounds for {} parameters",
                bounds.len(),
                x0.len()
            )));
        }
        quasi_newton(objective, x0, Some(&bounds), options)
    }
}

fn quasi_newton(
    objective: &mut dyn Objective,
    x0: ArrayView1<f64>,
    bounds: Option<&[(f64, f64)]>,
    options: &MinimizeOptions,
) -> Result<MinimizeResult> {
    let n = x0.len();
    let mut f = Counted::new(objective);

    let mut x = x0.to_owned();
    if let Some(bounds) = bounds {
        project(&mut x, bounds);
    }
    let mut fx = f.eval(&x)?;
    let mut g = gradient(&mut f, &x, fx, options.step, bounds)?;
    let mut h = Array2::<f64>::eye(n);

    let mut n_iter = 0;
    let mut converged = false;
    let mut message = String::from("maximum number of iterations reached");

    while n_iter < options.max_iter {
        let norm = match bounds {
            Some(bounds) => projected_inf_norm(&x, &g, bounds),
            None => inf_norm(&g),
        };
        if norm <= options.gtol {
            converged = true;
            message = String::from("gradient norm below tolerance");
            break;
        }

        let mut p = -h.dot(&g);
        if p.dot(&g) >= 0.0 {
            h = Array2::eye(n);
            p = -&g;
        }

        let mut alpha = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let mut candidate = &x + &(alpha * &p);
            if let Some(bounds) = bounds {
                project(&mut candidate, bounds);
            }
            let decrease = g.dot(&(&candidate - &x));
            if decrease < 0.0 {
                let f_candidate = f.eval(&candidate)?;
                if f_candidate <= fx + ARMIJO_C1 * decrease {
                    accepted = Some((candidate, f_candidate));
                    break;
                }
            } else if alpha == 1.0 && bounds.is_some() {
                // Projection killed the quasi-Newton step, fall back to steepest descent
                h = Array2::eye(n);
                p = -&g;
                continue;
            }
            alpha *= 0.5;
        }

        let Some((x_next, f_next)) = accepted else {
            message = String::from("line search could not find a lower value");
            break;
        };

        let g_next = gradient(&mut f, &x_next, f_next, options.step, bounds)?;
        let s = &x_next - &x;
        let y = &g_next - &g;
        bfgs_update(&mut h, &s, &y);

        x = x_next;
        fx = f_next;
        g = g_next;
        n_iter += 1;
        f.end_iteration(&x)?;
    }

    Ok(MinimizeResult {
        x,
        fun: fx,
        n_iter,
        nfev: f.nfev,
        converged,
        message,
    })
}

/// Derivative-free compass search evaluating one point at a time.
///
/// There is no notion of iteration beyond single evaluations, so the method
/// never calls [`Objective::end_iteration`] and `max_iter` caps evaluations.
/// Takes the place of scipy's COBYLA as the derivative-free method.
#[derive(Debug, Clone, Copy)]
pub struct PatternSearch {
    pub initial_radius: f64,
    pub final_radius: f64,
}

impl Default for PatternSearch {
    fn default() -> Self {
        PatternSearch {
            initial_radius: 1.0,
            final_radius: 1e-4,
        }
    }
}

impl Minimizer for PatternSearch {
    fn name(&self) -> &str {
        "PatternSearch"
    }

    fn supports_iteration_callback(&self) -> bool {
        false
    }

    fn minimize(
        &self,
        objective: &mut dyn Objective,
        x0: ArrayView1<f64>,
        bounds: Option<&[(f64, f64)]>,
        options: &MinimizeOptions,
    ) -> Result<MinimizeResult> {
        let mut f = Counted::new(objective);
        let mut x = x0.to_owned();
        if let Some(bounds) = bounds {
            project(&mut x, bounds);
        }
        let mut fx = f.eval(&x)?;
        let mut radius = self.initial_radius;

        'search: while radius > self.final_radius {
            let mut improved = false;

            'poll: for i in 0..x.len() {
                for sign in [1.0, -1.0] {
                    if f.nfev >= options.max_iter {
                        break 'search;
                    }

                    let mut candidate = x.clone();
                    candidate[i] += sign * radius;
                    if let Some(bounds) = bounds {
                        project(&mut candidate, bounds);
                    }
                    if candidate == x {
                        continue;
                    }

                    let f_candidate = f.eval(&candidate)?;
                    if f_candidate < fx {
                        x = candidate;
                        fx = f_candidate;
                        improved = true;
                        break 'poll;
                    }
                }
            }

            if !improved {
                radius *= 0.5;
            }
        }

        let converged = radius <= self.final_radius;
        Ok(MinimizeResult {
            x,
            fun: fx,
            n_iter: f.nfev,
            nfev: f.nfev,
            converged,
            message: if converged {
                String::from("search radius below tolerance")
            } else {
                String::from("maximum number of function evaluations reached")
            },
        })
    }
}

/// Trait for first-order update rules
pub trait Optimizer: Debug + Clone + Send + Sync {
    /// Update parameters using gradients
    fn update(&mut self, parameters: &mut [f64], gradients: &[f64]);

    /// Reset the optimizer's internal state
    fn reset(&mut self);
}

/// Gradient Descent optimizer
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f64,
}

impl GradientDescent {
    /// Creates a new Gradient Descent optimizer
    pub fn new(learning_rate: f64) -> Self {
        GradientDescent { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn update(&mut self, parameters: &mut [f64], gradients: &[f64]) {
        debug_assert_eq!(parameters.len(), gradients.len());

        for (param, grad) in parameters.iter_mut().zip(gradients.iter()) {
            *param -= self.learning_rate * grad;
        }
    }

    fn reset(&mut self) {}
}

/// Adaptive Moment Estimation (Adam) optimizer
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    epsilon: f64,
    m: Vec<f64>, // First moment estimate
    v: Vec<f64>, // Second moment estimate
    t: i32,
}

impl Adam {
    /// Creates a new Adam optimizer
    pub fn new(learning_rate: f64, beta1: f64, beta2: f64, epsilon: f64) -> Self {
        Adam {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }
}

impl Default for Adam {
    fn default() -> Self {
        Adam::new(0.001, 0.9, 0.999, 1e-8)
    }
}

impl Optimizer for Adam {
    fn update(&mut self, parameters: &mut [f64], gradients: &[f64]) {
        let n = parameters.len();
        debug_assert_eq!(n, gradients.len());

        if self.m.len() != n {
            self.m = vec![0.0; n];
            self.v = vec![0.0; n];
            self.t = 0;
        }

        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);

        for i in 0..n {
            self.m[i] = self.beta1 * self.m[i] + (1.0 - self.beta1) * gradients[i];
            self.v[i] = self.beta2 * self.v[i] + (1.0 - self.beta2) * gradients[i] * gradients[i];

            let m_hat = self.m[i] / bias1;
            let v_hat = self.v[i] / bias2;
            parameters[i] -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }
    }

    fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t = 0;
    }
}

/// Finite-difference gradient method driven by a first-order update rule.
///
/// Every iteration evaluates the objective and its gradient at the current
/// point, applies one update, then projects onto the bounds if any were given.
#[derive(Debug, Clone)]
pub struct FirstOrder<O: Optimizer> {
    name: String,
    rule: O,
}

impl<O: Optimizer> FirstOrder<O> {
    pub fn new(name: impl Into<String>, rule: O) -> Self {
        FirstOrder {
            name: name.into(),
            rule,
        }
    }
}

impl FirstOrder<GradientDescent> {
    pub fn gradient_descent(learning_rate: f64) -> Self {
        FirstOrder::new("GD", GradientDescent::new(learning_rate))
    }
}

impl FirstOrder<Adam> {
    pub fn adam(learning_rate: f64) -> Self {
        FirstOrder::new("Adam", Adam::new(learning_rate, 0.9, 0.999, 1e-8))
    }
}

impl<O: Optimizer> Minimizer for FirstOrder<O> {
    fn name(&self) -> &str {
        &self.name
    }

    fn minimize(
        &self,
        objective: &mut dyn Objective,
        x0: ArrayView1<f64>,
        bounds: Option<&[(f64, f64)]>,
        options: &MinimizeOptions,
    ) -> Result<MinimizeResult> {
        let mut rule = self.rule.clone();
        rule.reset();

        let mut f = Counted::new(objective);
        let mut x = x0.to_owned();
        if let Some(bounds) = bounds {
            project(&mut x, bounds);
        }

        let mut n_iter = 0;
        let mut converged = false;
        while n_iter < options.max_iter {
            let fx = f.eval(&x)?;
            let g = gradient(&mut f, &x, fx, options.step, bounds)?;
            if inf_norm(&g) <= options.gtol {
                converged = true;
                break;
            }

            if let (Some(params), Some(grads)) = (x.as_slice_mut(), g.as_slice()) {
                rule.update(params, grads);
            }
            if let Some(bounds) = bounds {
                project(&mut x, bounds);
            }

            n_iter += 1;
            f.end_iteration(&x)?;
        }

        let fun = f.eval(&x)?;
        Ok(MinimizeResult {
            x,
            fun,
            n_iter,
            nfev: f.nfev,
            converged,
            message: if converged {
                String::from("gradient norm below tolerance")
            } else {
                String::from("maximum number of iterations reached")
            },
        })
    }
}
