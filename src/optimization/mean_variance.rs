//! # Mean-Variance
//!
//! $$
//! \min_{w \in \mathcal W}\ \tfrac12 w^\top \Sigma w
//! \quad\text{s.t.}\quad \mu^\top w \ge \mu^\*
//! $$
//!
//! One convex QP per return target.

use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;

use super::constraints::FeasibleRegion;
use super::constraints::PortfolioConstraints;
use super::frontier::EfficientPortfolio;
use crate::error::Result;
use crate::error::ScenarioError;
use crate::frame::ScenarioFrame;
use crate::solvers::conic::solve_qp;
use crate::stats::moments::covariance_matrix;

/// Mean-variance optimizer on a mean vector and covariance matrix.
#[derive(Clone, Debug)]
pub struct MeanVariance {
  mean: Array1<f64>,
  covariance: Array2<f64>,
  region: FeasibleRegion,
  names: Option<Vec<String>>,
}

impl MeanVariance {
  /// Set up the optimizer; the feasibility LP runs here.
  pub fn new(
    mean: Array1<f64>,
    covariance: Array2<f64>,
    constraints: &PortfolioConstraints,
  ) -> Result<Self> {
    let n = mean.len();
    if covariance.dim() != (n, n) {
      return Err(ScenarioError::dimension(
        "covariance matrix",
        n,
        covariance.nrows(),
      ));
    }
    if mean.iter().chain(covariance.iter()).any(|v| !v.is_finite()) {
      return Err(ScenarioError::config(
        "mean and covariance must be finite",
      ));
    }
    let scale = covariance.iter().fold(1.0_f64, |acc, v| acc.max(v.abs()));
    let asymmetric = (0..n).any(|i| {
      (0..i).any(|j| (covariance[[i, j]] - covariance[[j, i]]).abs() > 1e-10 * scale)
    });
    if asymmetric {
      return Err(ScenarioError::config("covariance matrix must be symmetric"));
    }

    let region = FeasibleRegion::new(constraints, n)?;
    Ok(Self {
      mean,
      covariance,
      region,
      names: None,
    })
  }

  /// Mean and covariance estimated from scenarios under `p`.
  pub fn from_frame(
    frame: &ScenarioFrame,
    p: Option<&Array1<f64>>,
    constraints: &PortfolioConstraints,
  ) -> Result<Self> {
    let covariance = covariance_matrix(frame, p)?;
    let p = crate::frame::resolve_probabilities(p, frame.n_scenarios())?;
    let mut opt = Self::new(frame.weighted_mean(&p), covariance, constraints)?;
    opt.names = Some(frame.names().to_vec());
    Ok(opt)
  }

  pub fn covariance(&self) -> &Array2<f64> {
    &self.covariance
  }
}

impl EfficientPortfolio for MeanVariance {
  fn expected_returns(&self) -> &Array1<f64> {
    &self.mean
  }

  fn region(&self) -> &FeasibleRegion {
    &self.region
  }

  fn efficient_portfolio(&self, return_target: Option<f64>) -> Result<Array1<f64>> {
    let (g, h) = self.region.with_return_target(&self.mean, return_target);
    let (a, b) = self.region.equality();
    let q = Array1::zeros(self.mean.len());
    let sol = solve_qp(Some(&self.covariance), &q, &g, &h, a, b)?.into_optimal("mean-variance")?;
    debug!(iterations = sol.iterations, ?return_target, "mean-variance QP solved");
    Ok(sol.x)
  }

  /// Portfolio volatility `sqrt(wᵀΣw)`.
  fn risk(&self, exposures: &Array1<f64>) -> f64 {
    exposures.dot(&self.covariance.dot(exposures)).max(0.0).sqrt()
  }

  fn instrument_names(&self) -> Vec<String> {
    match &self.names {
      Some(names) => names.clone(),
      None => (0..self.mean.len()).map(|i| i.to_string()).collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;
  use crate::testing::synthetic_scenarios;

  const TOL: f64 = 1e-7;

  fn optimizer(constraints: &PortfolioConstraints) -> MeanVariance {
    let frame = ScenarioFrame::from_array(synthetic_scenarios(1000, 10, 5)).unwrap();
    MeanVariance::from_frame(&frame, None, constraints).unwrap()
  }

  #[test]
  fn long_short_portfolios() {
    let opt = optimizer(&PortfolioConstraints::new());
    let min_risk = opt.efficient_portfolio(None).unwrap();
    let targeted = opt.efficient_portfolio(Some(0.06)).unwrap();
    assert_abs_diff_eq!(min_risk.sum(), 1.0, epsilon = TOL);
    assert_abs_diff_eq!(targeted.sum(), 1.0, epsilon = TOL);
    assert_abs_diff_eq!(opt.expected_returns().dot(&targeted), 0.06, epsilon = TOL);
    assert_eq!(
      opt.efficient_frontier(9).unwrap_err(),
      ScenarioError::Unbounded
    );
  }

  #[test]
  fn long_only_frontier_starts_at_min_risk() {
    let opt = optimizer(&PortfolioConstraints::long_only(10));
    let min_risk = opt.efficient_portfolio(None).unwrap();
    let frontier = opt.efficient_frontier(4).unwrap();
    assert_eq!(frontier.dim(), (10, 4));
    for (a, b) in frontier.column(0).iter().zip(min_risk.iter()) {
      assert_abs_diff_eq!(a, b, epsilon = TOL);
    }
    let vols: Vec<f64> = frontier
      .columns()
      .into_iter()
      .map(|w| opt.risk(&w.to_owned()))
      .collect();
    for k in 1..vols.len() {
      assert!(vols[k] >= vols[k - 1] - 1e-9);
    }
  }

  #[test]
  fn equality_pins_an_exposure() {
    let mut pin = Array2::zeros((1, 10));
    pin[[0, 6]] = 1.0;
    let constraints = PortfolioConstraints::long_only(10).with_equality(pin, array![0.1]);
    let opt = optimizer(&constraints);
    let targeted = opt.efficient_portfolio(Some(0.06)).unwrap();
    assert_abs_diff_eq!(targeted[6], 0.1, epsilon = TOL);
    assert_abs_diff_eq!(targeted.sum(), 1.0, epsilon = TOL);
    assert_eq!(opt.efficient_frontier(9).unwrap().dim(), (10, 9));
  }

  #[test]
  fn two_uncorrelated_assets() {
    let opt = MeanVariance::new(
      array![0.05, 0.08],
      array![[0.04, 0.0], [0.0, 0.09]],
      &PortfolioConstraints::new(),
    )
    .unwrap();
    let w = opt.efficient_portfolio(None).unwrap();
    assert_abs_diff_eq!(w[0], 0.09 / 0.13, epsilon = 1e-6);
    assert_abs_diff_eq!(opt.risk(&w), (0.0036_f64 / 0.13).sqrt(), epsilon = 1e-6);
  }

  #[test]
  fn covariance_is_kept_as_given() {
    let cov = array![[0.04, 0.01], [0.01, 0.09]];
    let opt =
      MeanVariance::new(array![0.05, 0.08], cov.clone(), &PortfolioConstraints::new()).unwrap();
    assert_eq!(opt.covariance(), &cov);
  }

  #[test]
  fn asymmetric_covariance_is_rejected() {
    let err = MeanVariance::new(
      array![0.05, 0.08],
      array![[0.04, 0.01], [0.0, 0.09]],
      &PortfolioConstraints::new(),
    )
    .unwrap_err();
    assert!(matches!(err, ScenarioError::Configuration(_)));
  }

  #[test]
  fn covariance_shape_must_match_mean() {
    let err = MeanVariance::new(
      array![0.05, 0.08, 0.1],
      array![[0.04, 0.0], [0.0, 0.09]],
      &PortfolioConstraints::new(),
    )
    .unwrap_err();
    assert!(matches!(err, ScenarioError::Dimension { .. }));
  }
}
