//! # Bounded Minimization
//!
//! $$
//! \min_{x}\ f(x)\quad\text{s.t.}\quad x_i \ge \ell_i,\ i \in \mathcal{B}
//! $$
//!
//! L-BFGS with a More-Thuente line search. Coordinates with a lower bound are
//! reparametrized as $x_i = \ell_i + \theta_i^2$ so the line search runs unconstrained.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::core::Gradient;
use argmin::core::State;
use argmin::core::TerminationReason;
use argmin::core::TerminationStatus;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::error::ScenarioError;

/// A smooth objective with an analytic gradient.
pub trait SmoothObjective {
  /// Number of free variables.
  fn dim(&self) -> usize;

  /// Objective value and gradient at `x`.
  fn evaluate(&self, x: &[f64]) -> (f64, Vec<f64>);
}

/// Result of a bounded minimization.
#[derive(Clone, Debug)]
pub struct Minimum {
  /// Best point found, in the original coordinates.
  pub x: Vec<f64>,
  /// Objective at `x`.
  pub cost: f64,
  pub iterations: u64,
  /// Whether L-BFGS stopped on its own convergence test rather than the iteration cap.
  pub converged: bool,
}

type Lbfgs = LBFGS<MoreThuenteLineSearch<Vec<f64>, Vec<f64>, f64>, Vec<f64>, Vec<f64>, f64>;

/// Iterations per L-BFGS round; each round restarts from the best point of the previous one.
const ROUND_ITERS: u64 = 250;

/// Lower-bounded L-BFGS minimizer.
#[derive(Clone, Debug)]
pub struct BoundedMinimizer {
  pub max_iters: u64,
  /// Gradient norm below which L-BFGS stops.
  pub tol_grad: f64,
  /// Absolute change in cost below which L-BFGS stops.
  pub tol_cost: f64,
  /// Number of correction pairs kept by L-BFGS.
  pub memory: usize,
}

impl Default for BoundedMinimizer {
  fn default() -> Self {
    Self {
      max_iters: 10_000,
      tol_grad: 1e-10,
      tol_cost: 1e-12,
      memory: 10,
    }
  }
}

impl BoundedMinimizer {
  pub fn new(max_iters: u64, tol_grad: f64, tol_cost: f64, memory: usize) -> Self {
    Self {
      max_iters,
      tol_grad,
      tol_cost,
      memory,
    }
  }

  /// Minimize `objective` from `x0`, keeping `x[i] >= lower[i]` wherever a bound is given.
  ///
  /// A failed L-BFGS round ends the search at the best point of the rounds
  /// before it, or at `x0` when the first round fails, reported as not
  /// converged. Only invalid solver settings are returned as errors.
  pub fn minimize<O: SmoothObjective + Clone>(
    &self,
    objective: O,
    x0: &[f64],
    lower: &[Option<f64>],
  ) -> Result<Minimum> {
    let n = objective.dim();
    if x0.len() != n {
      return Err(ScenarioError::dimension("initial point", n, x0.len()));
    }
    if lower.len() != n {
      return Err(ScenarioError::dimension("lower bounds", n, lower.len()));
    }

    let problem = Reparametrized {
      objective,
      lower: lower.to_vec(),
    };
    let solver = self.solver()?;
    let mut theta = problem.to_theta(x0);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < self.max_iters && !converged {
      let budget = (self.max_iters - iterations).min(ROUND_ITERS);
      let round = self.round(&problem, solver.clone(), theta.clone(), budget);
      let (best, done, used) = match round {
        Ok(round) => round,
        Err(err) if iterations > 0 => {
          debug!(iterations, %err, "lbfgs stopped on a failed round");
          break;
        }
        Err(err) => {
          warn!(%err, "lbfgs stopped in its first round, returning the start point");
          break;
        }
      };
      theta = best;
      converged = done;
      // a round that makes no progress will not make any on restart either
      if used == 0 {
        break;
      }
      iterations += used;
    }

    let x = problem.to_x(&theta);
    let (cost, _) = problem.objective.evaluate(&x);
    debug!(n, iterations, cost, converged, "lbfgs finished");

    Ok(Minimum {
      x,
      cost,
      iterations,
      converged,
    })
  }

  /// L-BFGS configured from the settings; fails on invalid tolerances.
  fn solver(&self) -> Result<Lbfgs> {
    let linesearch = MoreThuenteLineSearch::new()
      .with_c(1e-4, 0.9)
      .map_err(solver_error)?;
    LBFGS::new(linesearch, self.memory)
      .with_tolerance_grad(self.tol_grad)
      .map_err(solver_error)?
      .with_tolerance_cost(self.tol_cost)
      .map_err(solver_error)
  }

  /// One L-BFGS run: best point, whether it converged, iterations used.
  fn round<O: SmoothObjective + Clone>(
    &self,
    problem: &Reparametrized<O>,
    solver: Lbfgs,
    theta: Vec<f64>,
    budget: u64,
  ) -> Result<(Vec<f64>, bool, u64)> {
    let res = Executor::new(problem.clone(), solver)
      .configure(|state| state.param(theta).max_iters(budget))
      .run()
      .map_err(solver_error)?;

    let state = res.state();
    let best = state
      .get_best_param()
      .or_else(|| state.get_param())
      .cloned()
      .ok_or_else(|| ScenarioError::Solver {
        solver: "lbfgs",
        status: "no parameter vector returned".into(),
      })?;
    let converged = matches!(
      state.get_termination_status(),
      TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );
    Ok((best, converged, state.get_iter()))
  }
}

fn solver_error(err: argmin::core::Error) -> ScenarioError {
  ScenarioError::Solver {
    solver: "lbfgs",
    status: err.to_string(),
  }
}

#[derive(Clone)]
struct Reparametrized<O> {
  objective: O,
  lower: Vec<Option<f64>>,
}

impl<O> Reparametrized<O> {
  fn to_x(&self, theta: &[f64]) -> Vec<f64> {
    theta
      .iter()
      .zip(&self.lower)
      .map(|(&t, lo)| match lo {
        Some(lo) => lo + t * t,
        None => t,
      })
      .collect()
  }

  /// A coordinate sitting exactly on its bound has zero gradient in θ, so start it at θ = 1.
  fn to_theta(&self, x: &[f64]) -> Vec<f64> {
    x.iter()
      .zip(&self.lower)
      .map(|(&xi, lo)| match lo {
        Some(lo) => {
          let gap = (xi - lo).max(0.0);
          if gap > 0.0 {
            gap.sqrt()
          } else {
            1.0
          }
        }
        None => xi,
      })
      .collect()
  }
}

impl<O: SmoothObjective> CostFunction for Reparametrized<O> {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, theta: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let (f, _) = self.objective.evaluate(&self.to_x(theta));
    if f.is_nan() {
      return Err(argmin::core::Error::msg("objective is NaN"));
    }
    Ok(f)
  }
}

impl<O: SmoothObjective> Gradient for Reparametrized<O> {
  type Param = Vec<f64>;
  type Gradient = Vec<f64>;

  fn gradient(
    &self,
    theta: &Self::Param,
  ) -> std::result::Result<Self::Gradient, argmin::core::Error> {
    let (_, grad) = self.objective.evaluate(&self.to_x(theta));
    Ok(
      grad
        .iter()
        .zip(theta)
        .zip(&self.lower)
        .map(|((&g, &t), lo)| if lo.is_some() { 2.0 * t * g } else { g })
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use tracing_test::traced_test;

  use super::*;

  /// (x0 - a)² + (x1 - b)²
  #[derive(Clone)]
  struct Bowl {
    a: f64,
    b: f64,
  }

  impl SmoothObjective for Bowl {
    fn dim(&self) -> usize {
      2
    }

    fn evaluate(&self, x: &[f64]) -> (f64, Vec<f64>) {
      let dx = x[0] - self.a;
      let dy = x[1] - self.b;
      (dx * dx + dy * dy, vec![2.0 * dx, 2.0 * dy])
    }
  }

  #[test]
  fn unconstrained_bowl_reaches_center() {
    let min = BoundedMinimizer::default()
      .minimize(Bowl { a: 1.5, b: -2.0 }, &[0.0, 0.0], &[None, None])
      .unwrap();
    assert!((min.x[0] - 1.5).abs() < 1e-5);
    assert!((min.x[1] + 2.0).abs() < 1e-5);
  }

  #[test]
  fn lower_bound_is_respected_when_active() {
    // center of x1 lies below its bound of zero
    let min = BoundedMinimizer::default()
      .minimize(Bowl { a: 1.0, b: -3.0 }, &[0.0, 0.0], &[None, Some(0.0)])
      .unwrap();
    assert!(min.x[1] >= 0.0);
    assert!(min.x[1] < 1e-3);
    assert!((min.x[0] - 1.0).abs() < 1e-4);
  }

  #[test]
  fn rejects_mismatched_initial_point() {
    let err = BoundedMinimizer::default()
      .minimize(Bowl { a: 0.0, b: 0.0 }, &[0.0], &[None, None])
      .unwrap_err();
    assert!(matches!(err, ScenarioError::Dimension { .. }));
  }

  /// Undefined everywhere.
  #[derive(Clone)]
  struct Undefined;

  impl SmoothObjective for Undefined {
    fn dim(&self) -> usize {
      2
    }

    fn evaluate(&self, _x: &[f64]) -> (f64, Vec<f64>) {
      (f64::NAN, vec![f64::NAN; 2])
    }
  }

  #[test]
  #[traced_test]
  fn failed_first_round_returns_start_point() {
    let min = BoundedMinimizer::default()
      .minimize(Undefined, &[0.5, 2.0], &[None, Some(1.0)])
      .unwrap();
    assert!(!min.converged);
    assert_eq!(min.iterations, 0);
    assert_eq!(min.x, vec![0.5, 2.0]);
    assert!(logs_contain("stopped in its first round"));
  }

  #[test]
  fn negative_gradient_tolerance_is_rejected() {
    let minimizer = BoundedMinimizer {
      tol_grad: -1.0,
      ..BoundedMinimizer::default()
    };
    let err = minimizer
      .minimize(Bowl { a: 0.0, b: 0.0 }, &[1.0, 1.0], &[None, None])
      .unwrap_err();
    assert!(matches!(err, ScenarioError::Solver { .. }));
  }
}
