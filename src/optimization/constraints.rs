//! # Portfolio Constraints
//!
//! $$
//! \mathcal{W} = \{ w : Gw \le h,\ Aw = b,\ v^\top w = 1 \}
//! $$
//!
//! Linear constraint sets on the exposures and the LPs run over them.

use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use tracing::debug;

use crate::error::Result;
use crate::error::ScenarioError;
use crate::solvers::conic::solve_lp;
use crate::solvers::SolveStatus;

/// User constraints on an I-vector of exposures.
///
/// Inequality and equality blocks are always given as `(matrix, vector)` pairs.
/// The budget `vᵀw = 1` is appended automatically, with `v = 1` unless
/// relative market values are supplied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PortfolioConstraints {
  inequalities: Vec<(Array2<f64>, Array1<f64>)>,
  equalities: Vec<(Array2<f64>, Array1<f64>)>,
  market_values: Option<Array1<f64>>,
}

impl PortfolioConstraints {
  /// Only the budget constraint.
  pub fn new() -> Self {
    Self::default()
  }

  /// `w >= 0` on all `n` instruments.
  pub fn long_only(n: usize) -> Self {
    Self::new().with_inequality(-Array2::<f64>::eye(n), Array1::zeros(n))
  }

  /// Add `G w <= h` below any existing inequality rows.
  pub fn with_inequality(mut self, g: Array2<f64>, h: Array1<f64>) -> Self {
    self.inequalities.push((g, h));
    self
  }

  /// Add `A w = b` below any existing equality rows.
  pub fn with_equality(mut self, a: Array2<f64>, b: Array1<f64>) -> Self {
    self.equalities.push((a, b));
    self
  }

  /// Relative market values `v` used in the budget `vᵀw = 1`.
  pub fn with_market_values(mut self, v: Array1<f64>) -> Self {
    self.market_values = Some(v);
    self
  }

  pub fn market_values(&self) -> Option<&Array1<f64>> {
    self.market_values.as_ref()
  }

  /// All inequality blocks stacked for `n` instruments.
  pub fn inequality(&self, n: usize) -> Result<(Array2<f64>, Array1<f64>)> {
    stack_blocks("inequality", &self.inequalities, n)
  }

  /// All equality blocks stacked for `n` instruments, without the budget row.
  pub fn equality(&self, n: usize) -> Result<(Array2<f64>, Array1<f64>)> {
    stack_blocks("equality", &self.equalities, n)
  }
}

fn stack_blocks(
  what: &'static str,
  blocks: &[(Array2<f64>, Array1<f64>)],
  n: usize,
) -> Result<(Array2<f64>, Array1<f64>)> {
  let mut m = Array2::zeros((0, n));
  let mut v = Vec::new();
  for (block, rhs) in blocks {
    if block.ncols() != n {
      return Err(ScenarioError::dimension(what, n, block.ncols()));
    }
    if block.nrows() != rhs.len() {
      return Err(ScenarioError::dimension(what, block.nrows(), rhs.len()));
    }
    for row in block.outer_iter() {
      m.push_row(row)
        .map_err(|_| ScenarioError::dimension(what, n, row.len()))?;
    }
    v.extend(rhs.iter().copied());
  }
  Ok((m, Array1::from_vec(v)))
}

/// The constraint set `{Gw <= h, Aw = b}` with the budget row appended to `A`.
///
/// Construction runs a feasibility LP, so an existing region is never empty.
#[derive(Clone, Debug)]
pub struct FeasibleRegion {
  g: Array2<f64>,
  h: Array1<f64>,
  a: Array2<f64>,
  b: Array1<f64>,
}

impl FeasibleRegion {
  /// Assemble and check the region for `n` instruments.
  pub fn new(constraints: &PortfolioConstraints, n: usize) -> Result<Self> {
    if n == 0 {
      return Err(ScenarioError::config("at least one instrument is required"));
    }
    let (g, h) = constraints.inequality(n)?;
    let (mut a, b) = constraints.equality(n)?;

    let budget = constraints
      .market_values()
      .cloned()
      .unwrap_or_else(|| Array1::ones(n));
    a.push_row(budget.view())
      .map_err(|_| ScenarioError::dimension("market values", n, budget.len()))?;
    let mut b = b.to_vec();
    b.push(1.0);

    let region = Self {
      g,
      h,
      a,
      b: Array1::from_vec(b),
    };
    region.check_feasibility()?;
    Ok(region)
  }

  pub fn n_instruments(&self) -> usize {
    self.a.ncols()
  }

  /// Inequality block `(G, h)`.
  pub fn inequality(&self) -> (&Array2<f64>, &Array1<f64>) {
    (&self.g, &self.h)
  }

  /// Equality block `(A, b)`, budget row last.
  pub fn equality(&self) -> (&Array2<f64>, &Array1<f64>) {
    (&self.a, &self.b)
  }

  /// Solve a zero-cost LP over the region.
  pub fn check_feasibility(&self) -> Result<()> {
    let c = Array1::zeros(self.n_instruments());
    let sol = solve_lp(&c, &self.g, &self.h, &self.a, &self.b)?;
    match sol.status {
      SolveStatus::Optimal => Ok(()),
      SolveStatus::Infeasible => Err(ScenarioError::Infeasible),
      status => Err(ScenarioError::Solver {
        solver: "feasibility",
        status: status.to_string(),
      }),
    }
  }

  /// Largest `meanᵀw` over the region.
  pub fn max_expected_return(&self, mean: &Array1<f64>) -> Result<f64> {
    if mean.len() != self.n_instruments() {
      return Err(ScenarioError::dimension(
        "expected returns",
        self.n_instruments(),
        mean.len(),
      ));
    }

    let c = -mean;
    let sol = solve_lp(&c, &self.g, &self.h, &self.a, &self.b)?;
    debug!(status = %sol.status, objective = sol.objective, "max expected return LP");
    match sol.status {
      SolveStatus::Optimal => Ok(-sol.objective),
      SolveStatus::Unbounded => Err(ScenarioError::Unbounded),
      SolveStatus::Infeasible => Err(ScenarioError::Infeasible),
      status => Err(ScenarioError::Solver {
        solver: "max expected return",
        status: status.to_string(),
      }),
    }
  }

  /// Inequality block with `meanᵀw >= target` appended, or the plain block when no target is set.
  pub fn with_return_target(
    &self,
    mean: &Array1<f64>,
    target: Option<f64>,
  ) -> (Array2<f64>, Array1<f64>) {
    let mut g = self.g.clone();
    let mut h = self.h.to_vec();
    if let Some(target) = target {
      let row = -mean;
      if g.push_row(row.view()).is_ok() {
        h.push(-target);
      }
    }
    (g, Array1::from_vec(h))
  }

  /// `(A, b)` with `extra` zero columns appended to `A` for auxiliary variables.
  pub fn padded_equality(&self, extra: usize) -> (Array2<f64>, Array1<f64>) {
    (pad_columns(&self.a, extra), self.b.clone())
  }
}

/// Copy of `m` with `extra` zero columns on the right.
pub(crate) fn pad_columns(m: &Array2<f64>, extra: usize) -> Array2<f64> {
  let (rows, cols) = m.dim();
  let mut out = Array2::zeros((rows, cols + extra));
  if rows > 0 {
    out.slice_mut(s![.., ..cols]).assign(m);
  }
  out
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use ndarray::array;

  use super::*;

  #[test]
  fn budget_row_is_appended_last() {
    let constraints = PortfolioConstraints::new()
      .with_equality(array![[1.0, 0.0, 0.0]], array![0.2])
      .with_market_values(array![1.0, 2.0, 1.0]);
    let region = FeasibleRegion::new(&constraints, 3).unwrap();
    let (a, b) = region.equality();
    assert_eq!(a.nrows(), 2);
    assert_eq!(a.row(1), array![1.0, 2.0, 1.0]);
    assert_eq!(b, &array![0.2, 1.0]);
  }

  #[test]
  fn long_only_max_return_is_best_instrument() {
    let region = FeasibleRegion::new(&PortfolioConstraints::long_only(3), 3).unwrap();
    let max = region
      .max_expected_return(&array![0.01, 0.05, 0.03])
      .unwrap();
    assert_abs_diff_eq!(max, 0.05, epsilon = 1e-7);
  }

  #[test]
  fn unconstrained_max_return_is_unbounded() {
    let region = FeasibleRegion::new(&PortfolioConstraints::new(), 2).unwrap();
    let err = region.max_expected_return(&array![0.01, 0.02]).unwrap_err();
    assert_eq!(err, ScenarioError::Unbounded);
  }

  #[test]
  fn contradictory_constraints_are_infeasible() {
    // long only with w0 + w1 = 1 and w0 = 2
    let constraints =
      PortfolioConstraints::long_only(2).with_equality(array![[1.0, 0.0]], array![2.0]);
    let err = FeasibleRegion::new(&constraints, 2).unwrap_err();
    assert_eq!(err, ScenarioError::Infeasible);
  }

  #[test]
  fn mismatched_pair_is_a_dimension_error() {
    let constraints =
      PortfolioConstraints::new().with_inequality(array![[1.0, 0.0]], array![0.0, 1.0]);
    let err = FeasibleRegion::new(&constraints, 2).unwrap_err();
    assert!(matches!(err, ScenarioError::Dimension { .. }));
  }

  #[test]
  fn stacked_inequalities_keep_both_blocks() {
    let constraints = PortfolioConstraints::long_only(2)
      .with_inequality(array![[1.0, 0.0]], array![0.7]);
    let (g, h) = constraints.inequality(2).unwrap();
    assert_eq!(g.nrows(), 3);
    assert_eq!(h[2], 0.7);
  }

  #[test]
  fn region_inequality_matches_stacked_blocks() {
    let constraints = PortfolioConstraints::long_only(3)
      .with_inequality(array![[1.0, 1.0, 0.0]], array![0.8]);
    let region = FeasibleRegion::new(&constraints, 3).unwrap();
    let (g, h) = region.inequality();
    assert_eq!(g.dim(), (4, 3));
    assert_eq!(g.row(0), array![-1.0, 0.0, 0.0]);
    assert_eq!(h, &array![0.0, 0.0, 0.0, 0.8]);
  }

  #[test]
  fn return_target_row_is_negated_mean() {
    let region = FeasibleRegion::new(&PortfolioConstraints::long_only(2), 2).unwrap();
    let (g, h) = region.with_return_target(&array![0.1, 0.2], Some(0.15));
    assert_eq!(g.row(2), array![-0.1, -0.2]);
    assert_eq!(h[2], -0.15);
  }

  #[test]
  fn padding_adds_zero_columns() {
    let padded = pad_columns(&array![[1.0, 2.0]], 2);
    assert_eq!(padded, array![[1.0, 2.0, 0.0, 0.0]]);
  }
}
