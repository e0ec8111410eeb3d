//! # Entropy Pooling
//!
//! $$
//! q^\* = \arg\min_{q} \sum_s q_s \ln\frac{q_s}{p_s}
//! \quad\text{s.t.}\quad Aq=b,\ Gq\le h
//! $$
//!
//! Solved in the dual. At the optimum $q_s = p_s\exp(-1-\ell_s^\top\lambda)$ where
//! $\ell_s$ is column $s$ of $[A;G]$, so only the $M+N$ multipliers are searched:
//!
//! $$
//! \min_{\lambda}\ \sum_s q_s(\lambda) + \lambda^\top r,\qquad
//! \nabla = r - [A;G]\,q(\lambda),\qquad
//! \nabla^2 = [A;G]\,\mathrm{diag}(q)\,[A;G]^\top
//! $$
//!
//! with $\lambda_G \ge 0$. Equality-only views use a damped Newton method on the
//! analytic Hessian; views with inequalities use bounded L-BFGS on the scaled dual.

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::concatenate;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::Axis;
use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::error::ScenarioError;
use crate::frame::validate_probabilities;
use crate::solvers::BoundedMinimizer;
use crate::solvers::SmoothObjective;

/// Linear views on the posterior: `A q = b` and `G q <= h`.
///
/// Rows are moment functions evaluated on each scenario. The simplex row
/// `1ᵀq = 1` is not added implicitly; start from [`Views::simplex`] to get it.
#[derive(Clone, Debug, PartialEq)]
pub struct Views {
  equality: Array2<f64>,
  equality_rhs: Array1<f64>,
  inequality: Array2<f64>,
  inequality_rhs: Array1<f64>,
}

impl Views {
  /// Equality views from an M×S matrix and its right-hand side.
  pub fn new(a: Array2<f64>, b: Array1<f64>) -> Result<Self> {
    if a.nrows() != b.len() {
      return Err(ScenarioError::dimension(
        "equality right-hand side",
        a.nrows(),
        b.len(),
      ));
    }
    if a.nrows() == 0 || a.ncols() == 0 {
      return Err(ScenarioError::config(
        "at least one equality view over at least one scenario is required",
      ));
    }

    let s = a.ncols();
    Ok(Self {
      equality: a,
      equality_rhs: b,
      inequality: Array2::zeros((0, s)),
      inequality_rhs: Array1::zeros(0),
    })
  }

  /// Only the simplex view `Σ q = 1` over `s` scenarios.
  pub fn simplex(s: usize) -> Result<Self> {
    Self::new(Array2::ones((1, s)), Array1::ones(1))
  }

  /// Add the view `Σ_s q_s row_s = target`.
  pub fn equality_row(mut self, row: ArrayView1<'_, f64>, target: f64) -> Result<Self> {
    self.check_row(row)?;
    self
      .equality
      .push_row(row)
      .map_err(|_| ScenarioError::dimension("equality view", self.n_scenarios(), row.len()))?;
    self.equality_rhs = append(&self.equality_rhs, target);
    Ok(self)
  }

  /// Add the view `Σ_s q_s row_s <= bound`.
  pub fn inequality_row(mut self, row: ArrayView1<'_, f64>, bound: f64) -> Result<Self> {
    self.check_row(row)?;
    self
      .inequality
      .push_row(row)
      .map_err(|_| ScenarioError::dimension("inequality view", self.n_scenarios(), row.len()))?;
    self.inequality_rhs = append(&self.inequality_rhs, bound);
    Ok(self)
  }

  /// Add an N×S block of inequality views.
  pub fn with_inequality(mut self, g: Array2<f64>, h: Array1<f64>) -> Result<Self> {
    if g.nrows() != h.len() {
      return Err(ScenarioError::dimension(
        "inequality right-hand side",
        g.nrows(),
        h.len(),
      ));
    }
    for (row, &bound) in g.outer_iter().zip(h.iter()) {
      self = self.inequality_row(row, bound)?;
    }
    Ok(self)
  }

  pub fn n_scenarios(&self) -> usize {
    self.equality.ncols()
  }

  pub fn n_equalities(&self) -> usize {
    self.equality.nrows()
  }

  pub fn n_inequalities(&self) -> usize {
    self.inequality.nrows()
  }

  /// Largest violation of any view by `q` (zero when all hold).
  pub fn max_violation(&self, q: &Array1<f64>) -> f64 {
    let eq = (&self.equality.dot(q) - &self.equality_rhs)
      .iter()
      .fold(0.0_f64, |acc, r| acc.max(r.abs()));
    let ineq = (&self.inequality.dot(q) - &self.inequality_rhs)
      .iter()
      .fold(0.0_f64, |acc, &r| acc.max(r));
    eq.max(ineq)
  }

  fn check_row(&self, row: ArrayView1<'_, f64>) -> Result<()> {
    if row.len() != self.n_scenarios() {
      return Err(ScenarioError::dimension(
        "view row",
        self.n_scenarios(),
        row.len(),
      ));
    }
    Ok(())
  }

  /// Stacked `[A; G]` and `[b; h]`.
  fn stacked(&self) -> Result<(Array2<f64>, Array1<f64>)> {
    let rows = self.n_equalities() + self.n_inequalities();
    let lhs = concatenate(Axis(0), &[self.equality.view(), self.inequality.view()])
      .map_err(|_| ScenarioError::dimension("stacked views", self.n_scenarios(), rows))?;
    let rhs = concatenate(
      Axis(0),
      &[self.equality_rhs.view(), self.inequality_rhs.view()],
    )
    .map_err(|_| ScenarioError::dimension("stacked right-hand side", rows, rows))?;
    Ok((lhs, rhs))
  }
}

fn append(v: &Array1<f64>, x: f64) -> Array1<f64> {
  let mut out = v.to_vec();
  out.push(x);
  Array1::from_vec(out)
}

/// Numerical settings for [`EntropyPooling`].
#[derive(Clone, Debug)]
pub struct EntropyPoolingConfig {
  /// Multiplier on the dual objective and gradient handed to L-BFGS.
  pub objective_scale: f64,
  /// Iteration cap of the equality-only Newton method.
  pub newton_max_iters: usize,
  /// Iteration cap of L-BFGS when inequality views are present.
  pub lbfgs_max_iters: u64,
  /// Stopping tolerance of both dual solvers.
  ///
  /// Newton stops once the largest view residual is at most `tolerance`.
  /// L-BFGS stops once the gradient norm of the scaled dual is at most
  /// `tolerance * objective_scale`, or once the scaled dual stops changing,
  /// so its [`Posterior::converged`] does not bound the residual by
  /// `tolerance`. Check [`Posterior::max_violation`] for that.
  pub tolerance: f64,
}

impl Default for EntropyPoolingConfig {
  fn default() -> Self {
    Self {
      objective_scale: 1000.0,
      newton_max_iters: 500,
      lbfgs_max_iters: 10_000,
      tolerance: 1e-10,
    }
  }
}

/// Posterior probabilities and dual diagnostics.
#[derive(Clone, Debug)]
pub struct Posterior {
  /// Posterior probability vector, strictly positive.
  pub probabilities: Array1<f64>,
  /// Multipliers ordered as equality rows then inequality rows.
  pub multipliers: Array1<f64>,
  pub iterations: u64,
  /// Whether the dual minimizer met its own stopping rule before the iteration cap.
  ///
  /// For equality-only views this means the residual is within the tolerance.
  pub converged: bool,
  /// Largest view violation of `probabilities`.
  pub max_violation: f64,
}

/// Entropy pooling solver.
#[derive(Clone, Debug, Default)]
pub struct EntropyPooling {
  config: EntropyPoolingConfig,
}

impl EntropyPooling {
  pub fn new(config: EntropyPoolingConfig) -> Self {
    Self { config }
  }

  pub fn config(&self) -> &EntropyPoolingConfig {
    &self.config
  }

  /// Posterior closest to `prior` in relative entropy that satisfies `views`.
  ///
  /// Non-convergence is reported through [`Posterior::converged`] and
  /// [`Posterior::max_violation`] rather than as an error.
  pub fn solve(&self, prior: &Array1<f64>, views: &Views) -> Result<Posterior> {
    validate_probabilities(prior, views.n_scenarios(), true)?;
    let log_p = prior.mapv(f64::ln);

    let posterior = if views.n_inequalities() == 0 {
      self.solve_equality(&log_p, views)?
    } else {
      self.solve_inequality(&log_p, views)?
    };

    if posterior.converged {
      debug!(
        iterations = posterior.iterations,
        max_violation = posterior.max_violation,
        "entropy pooling converged"
      );
    } else {
      warn!(
        iterations = posterior.iterations,
        max_violation = posterior.max_violation,
        "entropy pooling dual did not converge, check the view residuals"
      );
    }

    Ok(posterior)
  }

  fn solve_equality(&self, log_p: &Array1<f64>, views: &Views) -> Result<Posterior> {
    let a = &views.equality;
    let b = &views.equality_rhs;
    let m = a.nrows();

    let dual = |lambda: &Array1<f64>| -> (f64, Array1<f64>) {
      let q = tilt(log_p, a, lambda);
      let value = q.sum() + lambda.dot(b);
      (value, q)
    };

    let residual_of = |q: &Array1<f64>| -> f64 {
      (b - &a.dot(q)).iter().fold(0.0_f64, |acc, g| acc.max(g.abs()))
    };

    let mut lambda = Array1::<f64>::zeros(m);
    let (mut value, mut q) = dual(&lambda);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < self.config.newton_max_iters {
      let grad = b - &a.dot(&q);
      let residual = grad.iter().fold(0.0_f64, |acc, g| acc.max(g.abs()));
      if residual <= self.config.tolerance {
        converged = true;
        break;
      }

      let hessian = a.dot(&(a * &q).t());
      let step = newton_direction(&hessian, &grad);
      let slope = grad.dot(&step);

      // Armijo backtracking on the dual; near the optimum the dual value is
      // flat to rounding, so a step that shrinks the residual is also taken
      let mut t = 1.0;
      let mut accepted = false;
      while t > 1e-12 {
        let candidate = &lambda + &(&step * t);
        let (cand_value, cand_q) = dual(&candidate);
        let armijo = cand_value <= value + 1e-4 * t * slope;
        if cand_value.is_finite() && (armijo || residual_of(&cand_q) < residual) {
          lambda = candidate;
          value = cand_value;
          q = cand_q;
          accepted = true;
          break;
        }
        t *= 0.5;
      }

      iterations += 1;
      if !accepted {
        break;
      }
    }

    if !converged {
      converged = residual_of(&q) <= self.config.tolerance;
    }

    Ok(Posterior {
      max_violation: views.max_violation(&q),
      probabilities: q,
      multipliers: lambda,
      iterations: iterations as u64,
      converged,
    })
  }

  fn solve_inequality(&self, log_p: &Array1<f64>, views: &Views) -> Result<Posterior> {
    let (lhs, rhs) = views.stacked()?;
    let n_eq = views.n_equalities();
    let dim = lhs.nrows();

    let lower: Vec<Option<f64>> = (0..dim)
      .map(|k| if k < n_eq { None } else { Some(0.0) })
      .collect();

    let dual = ScaledDual {
      log_p: log_p.clone(),
      lhs: lhs.clone(),
      rhs,
      scale: self.config.objective_scale,
    };
    let minimizer = BoundedMinimizer {
      max_iters: self.config.lbfgs_max_iters,
      tol_grad: self.config.tolerance * self.config.objective_scale,
      ..BoundedMinimizer::default()
    };
    let min = minimizer.minimize(dual, &vec![0.0; dim], &lower)?;

    let lambda = Array1::from_vec(min.x);
    let q = tilt(log_p, &lhs, &lambda);
    Ok(Posterior {
      max_violation: views.max_violation(&q),
      probabilities: q,
      multipliers: lambda,
      iterations: min.iterations,
      converged: min.converged,
    })
  }
}

/// `q_s = exp(ln p_s - 1 - lhs[:, s]ᵀ λ)`
fn tilt(log_p: &Array1<f64>, lhs: &Array2<f64>, lambda: &Array1<f64>) -> Array1<f64> {
  let shift = lhs.t().dot(lambda);
  (log_p - &shift).mapv(|x| (x - 1.0).exp())
}

/// Solve `H d = -∇`, adding a growing ridge when `H` is numerically singular.
fn newton_direction(hessian: &Array2<f64>, grad: &Array1<f64>) -> Array1<f64> {
  let m = grad.len();
  let rhs = DVector::from_iterator(m, grad.iter().map(|g| -g));
  let scale = (0..m).map(|i| hessian[[i, i]].abs()).fold(0.0, f64::max).max(1.0);

  let mut ridge = 0.0;
  for _ in 0..12 {
    let h = DMatrix::from_fn(m, m, |i, j| {
      hessian[[i, j]] + if i == j { ridge } else { 0.0 }
    });
    if let Some(chol) = h.cholesky() {
      let d = chol.solve(&rhs);
      return Array1::from_iter(d.iter().copied());
    }
    ridge = if ridge == 0.0 { 1e-12 * scale } else { ridge * 100.0 };
  }

  // gradient descent direction when even the ridged system fails
  grad.mapv(|g| -g)
}

#[derive(Clone)]
struct ScaledDual {
  log_p: Array1<f64>,
  lhs: Array2<f64>,
  rhs: Array1<f64>,
  scale: f64,
}

impl SmoothObjective for ScaledDual {
  fn dim(&self) -> usize {
    self.lhs.nrows()
  }

  fn evaluate(&self, x: &[f64]) -> (f64, Vec<f64>) {
    let lambda = ArrayView1::from(x).to_owned();
    let q = tilt(&self.log_p, &self.lhs, &lambda);
    let value = q.sum() + lambda.dot(&self.rhs);
    let grad = &self.rhs - &self.lhs.dot(&q);
    (
      self.scale * value,
      grad.iter().map(|g| self.scale * g).collect(),
    )
  }
}

/// Posterior probabilities for `A q = b` and, optionally, `G q <= h`.
///
/// `g` and `h` must be given together.
pub fn entropy_pooling(
  p: &Array1<f64>,
  a: &Array2<f64>,
  b: &Array1<f64>,
  g: Option<&Array2<f64>>,
  h: Option<&Array1<f64>>,
) -> Result<Array1<f64>> {
  let mut views = Views::new(a.clone(), b.clone())?;
  match (g, h) {
    (Some(g), Some(h)) => views = views.with_inequality(g.clone(), h.clone())?,
    (None, None) => {}
    _ => {
      return Err(ScenarioError::config(
        "inequality matrix and vector must be given together",
      ))
    }
  }

  Ok(EntropyPooling::default().solve(p, &views)?.probabilities)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;
  use tracing_test::traced_test;

  use super::*;
  use crate::testing::random_prior;
  use crate::testing::synthetic_scenarios;

  const TOL: f64 = 1e-5;

  fn mean_views(r: &Array2<f64>) -> Views {
    Views::simplex(r.nrows())
      .unwrap()
      .equality_row(r.column(0), 0.075)
      .unwrap()
  }

  fn check_valid(q: &Array1<f64>) {
    assert_abs_diff_eq!(q.sum(), 1.0, epsilon = TOL);
    assert!(q.iter().all(|&x| x > 0.0));
  }

  #[test]
  fn equality_view_on_mean() {
    let r = synthetic_scenarios(1000, 10, 7);
    let views = mean_views(&r);

    for prior in [crate::frame::uniform_probabilities(1000), random_prior(1000, 3)] {
      let post = EntropyPooling::default().solve(&prior, &views).unwrap();
      let q = &post.probabilities;
      check_valid(q);
      assert!(post.converged);
      assert_abs_diff_eq!(q.dot(&r.column(0)), 0.075, epsilon = TOL);
      assert!(post.max_violation <= TOL);
    }
  }

  #[test]
  fn inequality_view_only() {
    let r = synthetic_scenarios(1000, 10, 11);
    let views = Views::simplex(1000)
      .unwrap()
      .inequality_row((-&r.column(1)).view(), -0.075)
      .unwrap();

    for prior in [crate::frame::uniform_probabilities(1000), random_prior(1000, 5)] {
      let q = EntropyPooling::default()
        .solve(&prior, &views)
        .unwrap()
        .probabilities;
      check_valid(&q);
      assert!(q.dot(&r.column(1)) >= 0.075 - TOL);
    }
  }

  #[test]
  fn equality_and_inequality_views() {
    let r = synthetic_scenarios(1000, 10, 13);
    let prior = crate::frame::uniform_probabilities(1000);
    let mut a = Array2::<f64>::ones((1, 1000));
    a.push_row(r.column(0)).unwrap();
    let b = array![1.0, 0.075];
    let g = (-&r.column(1)).insert_axis(Axis(0)).to_owned();
    let h = array![-0.075];

    let q = entropy_pooling(&prior, &a, &b, Some(&g), Some(&h)).unwrap();
    check_valid(&q);
    assert_abs_diff_eq!(q.dot(&r.column(0)), 0.075, epsilon = TOL);
    assert!(q.dot(&r.column(1)) >= 0.075 - TOL);
  }

  #[test]
  fn simplex_only_reproduces_prior() {
    let prior = random_prior(200, 17);
    let views = Views::simplex(200).unwrap();
    let post = EntropyPooling::default().solve(&prior, &views).unwrap();
    for (q, p) in post.probabilities.iter().zip(prior.iter()) {
      assert_abs_diff_eq!(q, p, epsilon = 1e-10);
    }
  }

  #[test]
  fn slack_inequality_leaves_prior_untouched() {
    let r = synthetic_scenarios(300, 3, 19);
    let prior = crate::frame::uniform_probabilities(300);
    // E[x] <= 10 already holds under the prior
    let views = Views::simplex(300)
      .unwrap()
      .inequality_row(r.column(0), 10.0)
      .unwrap();
    let post = EntropyPooling::default().solve(&prior, &views).unwrap();
    assert!(post.multipliers[1].abs() < 1e-6);
    for (q, p) in post.probabilities.iter().zip(prior.iter()) {
      assert_abs_diff_eq!(q, p, epsilon = 1e-6);
    }
  }

  #[test]
  fn unpaired_inequality_is_rejected() {
    let prior = crate::frame::uniform_probabilities(3);
    let a = Array2::ones((1, 3));
    let b = array![1.0];
    let g = array![[1.0, 0.0, 0.0]];
    let err = entropy_pooling(&prior, &a, &b, Some(&g), None).unwrap_err();
    assert!(matches!(err, ScenarioError::Configuration(_)));
  }

  #[test]
  fn mismatched_view_row_is_rejected() {
    let err = Views::simplex(4)
      .unwrap()
      .equality_row(array![1.0, 2.0].view(), 0.0)
      .unwrap_err();
    assert!(matches!(err, ScenarioError::Dimension { .. }));
  }

  #[test]
  fn prior_with_zero_entry_is_rejected() {
    let views = Views::simplex(2).unwrap();
    let err = EntropyPooling::default()
      .solve(&array![1.0, 0.0], &views)
      .unwrap_err();
    assert!(matches!(err, ScenarioError::Configuration(_)));
  }

  #[test]
  #[traced_test]
  fn capped_newton_logs_a_warning() {
    let r = synthetic_scenarios(500, 2, 23);
    let solver = EntropyPooling::new(EntropyPoolingConfig {
      newton_max_iters: 1,
      ..EntropyPoolingConfig::default()
    });
    let post = solver
      .solve(&crate::frame::uniform_probabilities(500), &mean_views(&r))
      .unwrap();
    assert!(!post.converged);
    assert!(logs_contain("did not converge"));
  }

  #[test]
  fn lbfgs_path_reports_residual_of_its_posterior() {
    let r = synthetic_scenarios(1000, 10, 11);
    let views = Views::simplex(1000)
      .unwrap()
      .inequality_row((-&r.column(1)).view(), -0.075)
      .unwrap();
    let solver = EntropyPooling::default();
    assert_eq!(solver.config().objective_scale, 1000.0);
    assert_eq!(solver.config().tolerance, 1e-10);

    let post = solver
      .solve(&crate::frame::uniform_probabilities(1000), &views)
      .unwrap();
    assert_eq!(post.max_violation, views.max_violation(&post.probabilities));
    assert!(post.max_violation <= TOL);
  }
}
