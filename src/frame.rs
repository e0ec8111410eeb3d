//! # Scenario Frame
//!
//! $$
//! R \in \mathbb{R}^{S \times I},\quad p \in \Delta^{S-1}
//! $$
//!
//! Named scenario matrices and probability vector checks.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;
use ndarray::ArrayView2;

use crate::error::Result;
use crate::error::ScenarioError;

/// Tolerance used when checking that a probability vector sums to one.
pub const PROBABILITY_SUM_TOL: f64 = 1e-6;

/// An S×I matrix of scenario outcomes with one name per instrument column.
///
/// Every engine consumes this single container, so callers never have to care
/// whether their data came with column labels or not.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioFrame {
  names: Vec<String>,
  values: Array2<f64>,
}

impl ScenarioFrame {
  /// Build a frame from column names and an S×I value matrix.
  pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self> {
    if names.len() != values.ncols() {
      return Err(ScenarioError::dimension(
        "column names",
        values.ncols(),
        names.len(),
      ));
    }
    if values.nrows() == 0 || values.ncols() == 0 {
      return Err(ScenarioError::config(
        "scenario matrix must have at least one row and one column",
      ));
    }
    if values.iter().any(|v| !v.is_finite()) {
      return Err(ScenarioError::config(
        "scenario matrix contains non-finite values",
      ));
    }

    Ok(Self { names, values })
  }

  /// Build a frame whose columns are named by their index.
  pub fn from_array(values: Array2<f64>) -> Result<Self> {
    let names = (0..values.ncols()).map(|i| i.to_string()).collect();
    Self::new(names, values)
  }

  /// Number of scenarios S.
  pub fn n_scenarios(&self) -> usize {
    self.values.nrows()
  }

  /// Number of instruments I.
  pub fn n_instruments(&self) -> usize {
    self.values.ncols()
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn values(&self) -> ArrayView2<'_, f64> {
    self.values.view()
  }

  /// Column `j` as a view of length S.
  pub fn column(&self, j: usize) -> ArrayView1<'_, f64> {
    self.values.column(j)
  }

  /// Position of the column called `name`.
  pub fn position(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|n| n == name)
  }

  /// Probability-weighted column means `pᵀR`.
  pub fn weighted_mean(&self, p: &Array1<f64>) -> Array1<f64> {
    p.dot(&self.values)
  }
}

/// Uniform probability vector of length `s`.
pub fn uniform_probabilities(s: usize) -> Array1<f64> {
  Array1::from_elem(s, 1.0 / s as f64)
}

/// Validate a probability vector of length `s`.
///
/// With `strictly_positive` every entry must be `> 0`; otherwise `>= 0` is enough.
pub fn validate_probabilities(p: &Array1<f64>, s: usize, strictly_positive: bool) -> Result<()> {
  if p.len() != s {
    return Err(ScenarioError::dimension("probability vector", s, p.len()));
  }

  if p.iter().any(|v| !v.is_finite()) {
    return Err(ScenarioError::config(
      "probability vector contains non-finite values",
    ));
  }

  if strictly_positive {
    if p.iter().any(|&v| v <= 0.0) {
      return Err(ScenarioError::config(
        "probability vector must be strictly positive",
      ));
    }
  } else if p.iter().any(|&v| v < 0.0) {
    return Err(ScenarioError::config(
      "probability vector must be nonnegative",
    ));
  }

  let total = p.sum();
  if (total - 1.0).abs() > PROBABILITY_SUM_TOL {
    return Err(ScenarioError::config(format!(
      "probability vector must sum to one, sums to {total}"
    )));
  }

  Ok(())
}

/// Resolve an optional probability vector to a validated one, defaulting to uniform.
pub(crate) fn resolve_probabilities(p: Option<&Array1<f64>>, s: usize) -> Result<Array1<f64>> {
  match p {
    Some(p) => {
      validate_probabilities(p, s, false)?;
      Ok(p.clone())
    }
    None => Ok(uniform_probabilities(s)),
  }
}
