//! # Mean-CVaR
//!
//! $$
//! \min_{w,t,z}\ t + \frac{z}{1-\alpha}
//! \quad\text{s.t.}\quad z \ge \sum_{s\in K} p_s (L_s w - t)\ \ \forall K,\ z \ge 0,\ w \in \mathcal W
//! $$
//!
//! Solved by Benders decomposition: the master LP carries one aggregated cut per
//! iteration, built from the scenarios whose loss reaches the current VaR candidate.

use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use tracing::debug;
use tracing::warn;

use super::constraints::pad_columns;
use super::constraints::FeasibleRegion;
use super::constraints::PortfolioConstraints;
use super::frontier::EfficientPortfolio;
use crate::error::Result;
use crate::error::ScenarioError;
use crate::frame::resolve_probabilities;
use crate::frame::ScenarioFrame;
use crate::solvers::conic::solve_lp;
use crate::stats::risk::conditional_value_at_risk;

/// Auxiliary master variables appended after the exposures: VaR `t` and tail excess `z`.
const AUX: usize = 2;

/// Algorithm parameters of [`MeanCVaR`].
#[derive(Clone, Debug, PartialEq)]
pub struct MeanCVaRConfig {
  /// Confidence level of VaR and CVaR, in (0, 1).
  pub alpha: f64,
  /// Subtract the probability-weighted mean before forming losses.
  pub demean: bool,
  /// Positive multiplier applied to losses inside the master LP.
  pub loss_scale: f64,
  /// Benders iteration cap, at least 100.
  pub max_iter: usize,
  /// Relative gap tolerance in [1e-8, 1e-4].
  pub reltol: f64,
  /// Absolute gap tolerance in [1e-8, 1e-4], used when the lower bound is near zero.
  pub abstol: f64,
}

impl Default for MeanCVaRConfig {
  fn default() -> Self {
    Self {
      alpha: 0.95,
      demean: true,
      loss_scale: 1000.0,
      max_iter: 500,
      reltol: 1e-8,
      abstol: 1e-8,
    }
  }
}

impl MeanCVaRConfig {
  pub fn validate(&self) -> Result<()> {
    if !(self.alpha > 0.0 && self.alpha < 1.0) {
      return Err(ScenarioError::config(format!(
        "alpha must be in the interval (0, 1), got {}",
        self.alpha
      )));
    }
    if !(self.loss_scale.is_finite() && self.loss_scale > 0.0) {
      return Err(ScenarioError::config("loss_scale must be a positive number"));
    }
    if self.max_iter < 100 {
      return Err(ScenarioError::config(
        "max_iter must be greater than or equal to 100",
      ));
    }
    if !(1e-8..=1e-4).contains(&self.reltol) {
      return Err(ScenarioError::config("reltol must be in [1e-8, 1e-4]"));
    }
    if !(1e-8..=1e-4).contains(&self.abstol) {
      return Err(ScenarioError::config("abstol must be in [1e-8, 1e-4]"));
    }
    Ok(())
  }
}

/// Aggregated cut `η w - mass·t - z <= 0` over a scenario subset.
#[derive(Clone, Debug, PartialEq)]
pub struct BendersCut {
  /// Probability-weighted sum of the subset's scaled losses.
  pub eta: Array1<f64>,
  /// Total probability of the subset.
  pub mass: f64,
}

impl BendersCut {
  fn row(&self) -> Array1<f64> {
    let n = self.eta.len();
    let mut row = Array1::zeros(n + AUX);
    row.slice_mut(s![..n]).assign(&self.eta);
    row[n] = -self.mass;
    row[n + 1] = -1.0;
    row
  }

  /// Tail excess `η w - mass·t` the cut predicts at `(w, t)`.
  fn tail_value(&self, w: ArrayView1<'_, f64>, t: f64) -> f64 {
    self.eta.dot(&w) - self.mass * t
  }
}

/// Outcome of one Benders run.
#[derive(Clone, Debug)]
pub struct BendersReport {
  pub exposures: Array1<f64>,
  /// Whether the gap closed before `max_iter`.
  pub converged: bool,
  /// Master LP solves performed.
  pub iterations: usize,
  /// Last master objective, in unscaled loss units.
  pub lower_bound: f64,
  /// Best upper bound found, in unscaled loss units.
  pub upper_bound: f64,
  pub n_cuts: usize,
}

impl BendersReport {
  pub fn gap(&self) -> f64 {
    self.upper_bound - self.lower_bound
  }
}

/// Mean-CVaR optimizer over discrete scenarios.
#[derive(Clone, Debug)]
pub struct MeanCVaR {
  names: Vec<String>,
  p: Array1<f64>,
  mean: Array1<f64>,
  /// Scaled S×I loss matrix.
  losses: Array2<f64>,
  region: FeasibleRegion,
  config: MeanCVaRConfig,
  cost: Array1<f64>,
  a: Array2<f64>,
  b: Array1<f64>,
}

impl MeanCVaR {
  /// Set up the optimizer; fails eagerly on bad options or infeasible constraints.
  pub fn new(
    frame: &ScenarioFrame,
    p: Option<&Array1<f64>>,
    constraints: &PortfolioConstraints,
    config: MeanCVaRConfig,
  ) -> Result<Self> {
    config.validate()?;
    let n = frame.n_instruments();
    let region = FeasibleRegion::new(constraints, n)?;
    let p = resolve_probabilities(p, frame.n_scenarios())?;

    let mean = frame.weighted_mean(&p);
    let losses = if config.demean {
      (&frame.values() - &mean) * -config.loss_scale
    } else {
      frame.values().mapv(|x| -config.loss_scale * x)
    };

    let mut cost = Array1::zeros(n + AUX);
    cost[n] = 1.0;
    cost[n + 1] = 1.0 / (1.0 - config.alpha);
    let (a, b) = region.padded_equality(AUX);

    Ok(Self {
      names: frame.names().to_vec(),
      p,
      mean,
      losses,
      region,
      config,
      cost,
      a,
      b,
    })
  }

  pub fn config(&self) -> &MeanCVaRConfig {
    &self.config
  }

  pub fn probabilities(&self) -> &Array1<f64> {
    &self.p
  }

  /// Run Benders decomposition and return the exposures with convergence diagnostics.
  pub fn efficient_portfolio_report(&self, return_target: Option<f64>) -> Result<BendersReport> {
    let n = self.mean.len();
    let (g_user, h_user) = self.region.with_return_target(&self.mean, return_target);

    // user rows padded for (t, z), then z >= 0
    let mut g_base = pad_columns(&g_user, AUX);
    let mut z_row = Array1::zeros(n + AUX);
    z_row[n + 1] = -1.0;
    g_base
      .push_row(z_row.view())
      .map_err(|_| ScenarioError::dimension("master inequality", n + AUX, z_row.len()))?;
    let mut h_base = h_user.to_vec();
    h_base.push(0.0);

    let c_z = self.cost[n + 1];
    let mut cuts = vec![BendersCut {
      eta: self.p.dot(&self.losses),
      mass: 1.0,
    }];
    let mut iterations = 0;
    let mut converged = false;
    let mut f_star = f64::INFINITY;
    let mut f_lower;
    let mut x;

    loop {
      let (g, h) = master_block(&g_base, &h_base, &cuts)?;
      let master = solve_lp(&self.cost, &g, &h, &self.a, &self.b)?.into_optimal("benders master")?;
      iterations += 1;

      x = master.x;
      f_lower = self.cost.dot(&x);
      let w = x.slice(s![..n]);
      let (t, z) = (x[n], x[n + 1]);

      let cut = self.cut_at(w, t);
      f_star = f_star.min(f_lower + c_z * (cut.tail_value(w, t) - z));
      cuts.push(cut);

      debug!(iterations, f_lower, f_star, "benders iteration");

      if !self.gap_open(f_star, f_lower) {
        converged = true;
        break;
      }
      if iterations > self.config.max_iter {
        break;
      }
    }

    let scale = self.config.loss_scale;
    let report = BendersReport {
      exposures: x.slice(s![..n]).to_owned(),
      converged,
      iterations,
      lower_bound: f_lower / scale,
      upper_bound: f_star / scale,
      n_cuts: cuts.len(),
    };

    if !converged {
      warn!(
        iterations,
        gap = report.gap(),
        "benders decomposition hit max_iter before closing the gap"
      );
    }

    Ok(report)
  }

  /// Next cut from the scenarios whose loss at `w` reaches `t`.
  fn cut_at(&self, w: ArrayView1<'_, f64>, t: f64) -> BendersCut {
    let portfolio_losses = self.losses.dot(&w);
    let mut eta = Array1::zeros(w.len());
    let mut mass = 0.0;
    for (s, &loss) in portfolio_losses.iter().enumerate() {
      if loss >= t {
        eta.scaled_add(self.p[s], &self.losses.row(s));
        mass += self.p[s];
      }
    }
    BendersCut { eta, mass }
  }

  fn gap_open(&self, f_star: f64, f_lower: f64) -> bool {
    let scale = f_lower.abs();
    if scale > 1e-10 {
      (f_star - f_lower) / scale > self.config.reltol
    } else {
      f_star - f_lower > self.config.abstol
    }
  }
}

/// Base rows followed by one row per cut, all with zero right-hand side.
fn master_block(
  g_base: &Array2<f64>,
  h_base: &[f64],
  cuts: &[BendersCut],
) -> Result<(Array2<f64>, Array1<f64>)> {
  let mut g = g_base.clone();
  let mut h = h_base.to_vec();
  for cut in cuts {
    let row = cut.row();
    g.push_row(row.view())
      .map_err(|_| ScenarioError::dimension("benders cut", g_base.ncols(), row.len()))?;
    h.push(0.0);
  }
  Ok((g, Array1::from_vec(h)))
}

impl EfficientPortfolio for MeanCVaR {
  fn expected_returns(&self) -> &Array1<f64> {
    &self.mean
  }

  fn region(&self) -> &FeasibleRegion {
    &self.region
  }

  fn efficient_portfolio(&self, return_target: Option<f64>) -> Result<Array1<f64>> {
    Ok(self.efficient_portfolio_report(return_target)?.exposures)
  }

  /// CVaR of the losses the optimizer minimizes, in unscaled units.
  fn risk(&self, exposures: &Array1<f64>) -> f64 {
    let losses = self.losses.dot(exposures) / self.config.loss_scale;
    conditional_value_at_risk(losses.view(), self.p.view(), self.config.alpha)
  }

  fn instrument_names(&self) -> Vec<String> {
    self.names.clone()
  }
}
