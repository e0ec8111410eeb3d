//! # Efficient Frontier
//!
//! $$
//! \mu_k = \mu_{\min} + k\,\frac{\mu_{\max} - \mu_{\min}}{n - 1},\qquad
//! w_k = \arg\min_{w \in \mathcal W,\ \mu^\top w \ge \mu_k} \rho(w)
//! $$
//!
//! Frontier scanning shared by every optimizer that can produce a minimum-risk
//! portfolio for a given return target.

use std::fmt::Display;

use impl_new_derive::ImplNew;
use ndarray::Array1;
use ndarray::Array2;
use prettytable::Cell;
use prettytable::Row;
use prettytable::Table;
use rayon::prelude::*;
use tracing::info;

use super::constraints::FeasibleRegion;
use crate::error::Result;
use crate::error::ScenarioError;

/// Number of frontier portfolios when the caller does not choose one.
pub const DEFAULT_NUM_PORTFOLIOS: usize = 9;

/// Relative distance kept between the top frontier target and the LP maximum.
const TOP_TARGET_BACKOFF: f64 = 1e-8;

/// An optimizer that returns the minimum-risk portfolio for an optional return target.
pub trait EfficientPortfolio: Send + Sync {
  /// Expected return per instrument.
  fn expected_returns(&self) -> &Array1<f64>;

  /// Constraint set the portfolios live in.
  fn region(&self) -> &FeasibleRegion;

  /// Minimum-risk exposures, with `meanᵀw >= return_target` when a target is given.
  fn efficient_portfolio(&self, return_target: Option<f64>) -> Result<Array1<f64>>;

  /// Risk of `exposures` in the measure this optimizer minimizes.
  fn risk(&self, exposures: &Array1<f64>) -> f64;

  /// Labels used when printing a frontier.
  fn instrument_names(&self) -> Vec<String> {
    (0..self.expected_returns().len())
      .map(|i| i.to_string())
      .collect()
  }

  /// I×n matrix of frontier exposures, one column per portfolio.
  fn efficient_frontier(&self, num_portfolios: usize) -> Result<Array2<f64>>
  where
    Self: Sized,
  {
    Ok(FrontierScanner::new(num_portfolios).scan(self)?.weights())
  }

  /// [`EfficientPortfolio::efficient_frontier`] with the targets solved in parallel.
  fn efficient_frontier_par(&self, num_portfolios: usize) -> Result<Array2<f64>>
  where
    Self: Sized,
  {
    Ok(FrontierScanner::new(num_portfolios).scan_par(self)?.weights())
  }
}

/// One portfolio on the frontier.
#[derive(Clone, Debug, ImplNew)]
pub struct FrontierPoint {
  pub expected_return: f64,
  pub risk: f64,
  pub exposures: Array1<f64>,
}

/// Frontier portfolios ordered by increasing return target.
#[derive(Clone, Debug)]
pub struct EfficientFrontier {
  names: Vec<String>,
  points: Vec<FrontierPoint>,
}

impl EfficientFrontier {
  pub fn points(&self) -> &[FrontierPoint] {
    &self.points
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  /// I×n exposure matrix.
  pub fn weights(&self) -> Array2<f64> {
    let n_instruments = self.names.len();
    let mut w = Array2::zeros((n_instruments, self.points.len()));
    for (mut col, point) in w.columns_mut().into_iter().zip(&self.points) {
      col.assign(&point.exposures);
    }
    w
  }

  pub fn expected_returns(&self) -> Array1<f64> {
    self.points.iter().map(|p| p.expected_return).collect()
  }

  pub fn risks(&self) -> Array1<f64> {
    self.points.iter().map(|p| p.risk).collect()
  }
}

impl Display for EfficientFrontier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut table = Table::new();

    let mut titles = vec![Cell::new("")];
    titles.extend((1..=self.points.len()).map(|k| Cell::new(&format!("pf {k}"))));
    table.set_titles(Row::new(titles));

    for (i, name) in self.names.iter().enumerate() {
      let mut cells = vec![Cell::new(name)];
      cells.extend(
        self
          .points
          .iter()
          .map(|p| Cell::new(&format!("{:.4}", p.exposures[i]))),
      );
      table.add_row(Row::new(cells));
    }

    let mut ret = vec![Cell::new("Expected return")];
    ret.extend(
      self
        .points
        .iter()
        .map(|p| Cell::new(&format!("{:.6}", p.expected_return))),
    );
    table.add_row(Row::new(ret));

    let mut risk = vec![Cell::new("Risk")];
    risk.extend(
      self
        .points
        .iter()
        .map(|p| Cell::new(&format!("{:.6}", p.risk))),
    );
    table.add_row(Row::new(risk));

    write!(f, "{table}")
  }
}

/// Spans the frontier between the minimum-risk portfolio and the largest feasible return.
#[derive(Clone, Copy, Debug)]
pub struct FrontierScanner {
  num_portfolios: usize,
}

impl Default for FrontierScanner {
  fn default() -> Self {
    Self {
      num_portfolios: DEFAULT_NUM_PORTFOLIOS,
    }
  }
}

impl FrontierScanner {
  pub fn new(num_portfolios: usize) -> Self {
    Self { num_portfolios }
  }

  pub fn scan<O: EfficientPortfolio>(&self, optimizer: &O) -> Result<EfficientFrontier> {
    let (first, targets) = self.prepare(optimizer)?;
    let mut points = Vec::with_capacity(self.num_portfolios);
    points.push(first);
    for target in targets {
      points.push(point_at(optimizer, target)?);
    }
    Ok(EfficientFrontier {
      names: optimizer.instrument_names(),
      points,
    })
  }

  /// Same as [`FrontierScanner::scan`], solving the return targets in parallel.
  pub fn scan_par<O: EfficientPortfolio>(&self, optimizer: &O) -> Result<EfficientFrontier> {
    let (first, targets) = self.prepare(optimizer)?;
    let rest = targets
      .into_par_iter()
      .map(|target| point_at(optimizer, target))
      .collect::<Result<Vec<_>>>()?;

    let mut points = Vec::with_capacity(self.num_portfolios);
    points.push(first);
    points.extend(rest);
    Ok(EfficientFrontier {
      names: optimizer.instrument_names(),
      points,
    })
  }

  /// Minimum-risk point and the remaining `n - 1` return targets.
  fn prepare<O: EfficientPortfolio>(&self, optimizer: &O) -> Result<(FrontierPoint, Vec<f64>)> {
    if self.num_portfolios == 0 {
      return Err(ScenarioError::config(
        "number of frontier portfolios must be positive",
      ));
    }

    // the boundary LP is cheap and fails fast when returns are unbounded
    let mean = optimizer.expected_returns();
    let max_return = optimizer.region().max_expected_return(mean)?;
    let min_risk = optimizer.efficient_portfolio(None)?;
    let min_return = mean.dot(&min_risk);
    let top = (max_return - TOP_TARGET_BACKOFF * max_return.abs().max(1.0)).max(min_return);

    let n = self.num_portfolios;
    let targets: Vec<f64> = if n > 1 {
      let delta = (top - min_return) / (n - 1) as f64;
      (1..n).map(|k| min_return + delta * k as f64).collect()
    } else {
      Vec::new()
    };

    info!(
      num_portfolios = n,
      min_return, max_return, "scanning efficient frontier"
    );

    let risk = optimizer.risk(&min_risk);
    Ok((FrontierPoint::new(min_return, risk, min_risk), targets))
  }
}

fn point_at<O: EfficientPortfolio>(optimizer: &O, target: f64) -> Result<FrontierPoint> {
  let w = optimizer.efficient_portfolio(Some(target))?;
  let expected_return = optimizer.expected_returns().dot(&w);
  let risk = optimizer.risk(&w);
  Ok(FrontierPoint::new(expected_return, risk, w))
}

#[cfg(test)]
mod tests {
  use ndarray::array;

  use super::*;
  use crate::optimization::constraints::PortfolioConstraints;

  /// Risk = squared distance from equal weights, solved in closed form on two assets.
  struct TwoAssets {
    mean: Array1<f64>,
    region: FeasibleRegion,
  }

  impl EfficientPortfolio for TwoAssets {
    fn expected_returns(&self) -> &Array1<f64> {
      &self.mean
    }

    fn region(&self) -> &FeasibleRegion {
      &self.region
    }

    fn efficient_portfolio(&self, return_target: Option<f64>) -> Result<Array1<f64>> {
      let (m0, m1) = (self.mean[0], self.mean[1]);
      let w1 = match return_target {
        Some(t) if t > 0.5 * (m0 + m1) => (t - m0) / (m1 - m0),
        _ => 0.5,
      };
      Ok(array![1.0 - w1, w1])
    }

    fn risk(&self, exposures: &Array1<f64>) -> f64 {
      exposures.mapv(|w| (w - 0.5).powi(2)).sum()
    }
  }

  fn two_assets() -> TwoAssets {
    TwoAssets {
      mean: array![0.01, 0.03],
      region: FeasibleRegion::new(&PortfolioConstraints::long_only(2), 2).unwrap(),
    }
  }

  #[test]
  fn frontier_spans_min_risk_to_max_return() {
    let frontier = FrontierScanner::new(5).scan(&two_assets()).unwrap();
    let rets = frontier.expected_returns();
    assert_eq!(frontier.len(), 5);
    assert!((rets[0] - 0.02).abs() < 1e-12);
    assert!((rets[4] - 0.03).abs() < 1e-7);
    assert!(frontier.risks().windows(2).into_iter().all(|w| w[1] >= w[0]));
    assert_eq!(frontier.weights().dim(), (2, 5));
  }

  #[test]
  fn parallel_scan_matches_sequential() {
    let opt = two_assets();
    let seq = opt.efficient_frontier(4).unwrap();
    let par = opt.efficient_frontier_par(4).unwrap();
    assert_eq!(seq, par);
  }

  #[test]
  fn single_portfolio_is_min_risk() {
    let w = two_assets().efficient_frontier(1).unwrap();
    assert_eq!(w, array![[0.5], [0.5]]);
  }

  #[test]
  fn zero_portfolios_is_rejected() {
    let err = two_assets().efficient_frontier(0).unwrap_err();
    assert!(matches!(err, ScenarioError::Configuration(_)));
  }

  #[test]
  fn frontier_renders_as_table() {
    let frontier = FrontierScanner::new(2).scan(&two_assets()).unwrap();
    let text = frontier.to_string();
    assert!(text.contains("Expected return"));
    assert!(text.contains("pf 2"));
  }
}
