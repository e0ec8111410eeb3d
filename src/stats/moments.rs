//! # Simulation Moments
//!
//! $$
//! \Sigma = \frac{\sum_s p_s (x_s - m)(x_s - m)^\top}{1 - \sum_s p_s^2},\qquad
//! \rho_{ij} = \frac{\Sigma_{ij}}{\sigma_i \sigma_j}
//! $$
//!
//! Probability-weighted moments of a scenario frame.

use std::fmt::Display;

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Axis;
use prettytable::Cell;
use prettytable::Row;
use prettytable::Table;

use crate::error::Result;
use crate::frame::resolve_probabilities;
use crate::frame::ScenarioFrame;

/// Mean, volatility, skewness and kurtosis per instrument.
#[derive(Clone, Debug)]
pub struct MomentsTable {
  pub names: Vec<String>,
  pub mean: Array1<f64>,
  pub volatility: Array1<f64>,
  pub skewness: Array1<f64>,
  pub kurtosis: Array1<f64>,
}

impl Display for MomentsTable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut table = Table::new();
    table.set_titles(Row::new(
      ["", "Mean", "Volatility", "Skewness", "Kurtosis"]
        .iter()
        .map(|t| Cell::new(t))
        .collect(),
    ));
    for (i, name) in self.names.iter().enumerate() {
      table.add_row(Row::new(vec![
        Cell::new(name),
        Cell::new(&format!("{:.6}", self.mean[i])),
        Cell::new(&format!("{:.6}", self.volatility[i])),
        Cell::new(&format!("{:.4}", self.skewness[i])),
        Cell::new(&format!("{:.4}", self.kurtosis[i])),
      ]));
    }
    write!(f, "{table}")
  }
}

/// Probability-weighted moments of every column; `p` defaults to uniform.
pub fn simulation_moments(frame: &ScenarioFrame, p: Option<&Array1<f64>>) -> Result<MomentsTable> {
  let p = resolve_probabilities(p, frame.n_scenarios())?;
  let mean = frame.weighted_mean(&p);
  let demeaned = &frame.values() - &mean;
  let volatility = p.dot(&demeaned.mapv(|x| x * x)).mapv(f64::sqrt);

  let standardized = &demeaned / &volatility;
  let skewness = p.dot(&standardized.mapv(|x| x.powi(3)));
  let kurtosis = p.dot(&standardized.mapv(|x| x.powi(4)));

  Ok(MomentsTable {
    names: frame.names().to_vec(),
    mean,
    volatility,
    skewness,
    kurtosis,
  })
}

/// Covariance with analytic weights `p`, unbiased by `1 - Σp²`.
pub fn covariance_matrix(frame: &ScenarioFrame, p: Option<&Array1<f64>>) -> Result<Array2<f64>> {
  let p = resolve_probabilities(p, frame.n_scenarios())?;
  let mean = frame.weighted_mean(&p);
  let demeaned = &frame.values() - &mean;
  let weighted = &demeaned * &p.view().insert_axis(Axis(1));

  let norm = 1.0 - p.dot(&p);
  let cov = weighted.t().dot(&demeaned);
  // a single scenario carrying all the mass has no dispersion to unbias
  Ok(if norm > 0.0 { cov / norm } else { cov })
}

/// Correlation matrix derived from [`covariance_matrix`].
pub fn correlation_matrix(frame: &ScenarioFrame, p: Option<&Array1<f64>>) -> Result<Array2<f64>> {
  Ok(corr_from_cov(&covariance_matrix(frame, p)?))
}

pub(crate) fn corr_from_cov(cov: &Array2<f64>) -> Array2<f64> {
  let n = cov.nrows();
  let sd = cov.diag().mapv(|v| v.max(0.0).sqrt());
  Array2::from_shape_fn((n, n), |(i, j)| {
    let denom = sd[i] * sd[j];
    if i == j {
      1.0
    } else if denom > 1e-15 {
      (cov[[i, j]] / denom).clamp(-1.0, 1.0)
    } else {
      0.0
    }
  })
}
