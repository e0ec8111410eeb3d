//! # Conic Solves
//!
//! $$
//! \min_x \tfrac12 x^\top P x + c^\top x \quad \text{s.t.}\quad
//! \begin{bmatrix} A \\ G \end{bmatrix} x + s = \begin{bmatrix} b \\ h \end{bmatrix},\
//! s \in \{0\}^{M} \times \mathbb{R}_+^{N}
//! $$
//!
//! Dense LP/QP front end for Clarabel. Only `Optimal` counts as success; Clarabel's
//! reduced-accuracy `AlmostSolved` is folded into it.

use std::fmt::Display;

use clarabel::algebra::CscMatrix;
use clarabel::solver::DefaultSettings;
use clarabel::solver::DefaultSolver;
use clarabel::solver::IPSolver;
use clarabel::solver::SolverStatus;
use clarabel::solver::SupportedConeT;
use ndarray::s;
use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView2;
use tracing::debug;

use crate::error::Result;
use crate::error::ScenarioError;

/// Gap and feasibility tolerance requested from the interior-point solver.
const TOLERANCE: f64 = 1e-10;

/// Outcome of a conic solve.
#[derive(Clone, Debug, PartialEq)]
pub enum SolveStatus {
  /// Solved to the default tolerances.
  Optimal,
  /// Primal infeasible.
  Infeasible,
  /// Dual infeasible, i.e. the objective is unbounded below.
  Unbounded,
  /// Anything else reported by the solver.
  Failed(String),
}

impl Display for SolveStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      SolveStatus::Optimal => write!(f, "optimal"),
      SolveStatus::Infeasible => write!(f, "infeasible"),
      SolveStatus::Unbounded => write!(f, "unbounded"),
      SolveStatus::Failed(status) => write!(f, "{status}"),
    }
  }
}

impl From<SolverStatus> for SolveStatus {
  fn from(status: SolverStatus) -> Self {
    match status {
      SolverStatus::Solved | SolverStatus::AlmostSolved => SolveStatus::Optimal,
      SolverStatus::PrimalInfeasible | SolverStatus::AlmostPrimalInfeasible => {
        SolveStatus::Infeasible
      }
      SolverStatus::DualInfeasible | SolverStatus::AlmostDualInfeasible => SolveStatus::Unbounded,
      other => SolveStatus::Failed(format!("{other:?}")),
    }
  }
}

/// Primal solution and status of a conic solve.
#[derive(Clone, Debug)]
pub struct ConicSolution {
  /// Primal point (meaningful only when `status` is optimal).
  pub x: Array1<f64>,
  /// Primal objective value.
  pub objective: f64,
  pub status: SolveStatus,
  pub iterations: u32,
}

impl ConicSolution {
  /// Keep optimal solutions, turn everything else into an error attributed to `solver`.
  pub fn into_optimal(self, solver: &'static str) -> Result<Self> {
    match self.status {
      SolveStatus::Optimal => Ok(self),
      SolveStatus::Infeasible => Err(ScenarioError::Infeasible),
      ref status => Err(ScenarioError::Solver {
        solver,
        status: status.to_string(),
      }),
    }
  }
}

/// Solve `min cᵀx` subject to `Ax = b`, `Gx <= h`.
pub fn solve_lp(
  c: &Array1<f64>,
  g: &Array2<f64>,
  h: &Array1<f64>,
  a: &Array2<f64>,
  b: &Array1<f64>,
) -> Result<ConicSolution> {
  solve_qp(None, c, g, h, a, b)
}

/// Solve `min ½xᵀPx + cᵀx` subject to `Ax = b`, `Gx <= h`.
///
/// `P` must be symmetric positive semidefinite; only its upper triangle is read.
pub fn solve_qp(
  p: Option<&Array2<f64>>,
  c: &Array1<f64>,
  g: &Array2<f64>,
  h: &Array1<f64>,
  a: &Array2<f64>,
  b: &Array1<f64>,
) -> Result<ConicSolution> {
  let n = c.len();
  check_block("inequality matrix", g, h.len(), n)?;
  check_block("equality matrix", a, b.len(), n)?;
  if let Some(p) = p {
    if p.dim() != (n, n) {
      return Err(ScenarioError::dimension("quadratic term", n, p.nrows()));
    }
  }

  let n_eq = a.nrows();
  let n_ineq = g.nrows();

  let mut stacked = Array2::<f64>::zeros((n_eq + n_ineq, n));
  if n_eq > 0 {
    stacked.slice_mut(s![..n_eq, ..]).assign(a);
  }
  if n_ineq > 0 {
    stacked.slice_mut(s![n_eq.., ..]).assign(g);
  }
  let rhs: Vec<f64> = b.iter().chain(h.iter()).copied().collect();

  let mut cones = Vec::with_capacity(2);
  if n_eq > 0 {
    cones.push(SupportedConeT::ZeroConeT(n_eq));
  }
  if n_ineq > 0 {
    cones.push(SupportedConeT::NonnegativeConeT(n_ineq));
  }

  let quadratic = match p {
    Some(p) => to_csc(p.view(), true),
    None => to_csc(Array2::<f64>::zeros((n, n)).view(), true),
  };
  let constraints = to_csc(stacked.view(), false);
  let cost = c.to_vec();

  let mut settings = DefaultSettings::<f64>::default();
  settings.verbose = false;
  settings.tol_gap_abs = TOLERANCE;
  settings.tol_gap_rel = TOLERANCE;
  settings.tol_feas = TOLERANCE;

  let mut solver = DefaultSolver::new(&quadratic, &cost, &constraints, &rhs, &cones, settings);
  solver.solve();

  let status = SolveStatus::from(solver.solution.status.clone());
  debug!(
    n,
    n_eq,
    n_ineq,
    %status,
    iterations = solver.solution.iterations,
    "conic solve finished"
  );

  Ok(ConicSolution {
    x: Array1::from_vec(solver.solution.x.clone()),
    objective: solver.solution.obj_val,
    status,
    iterations: solver.solution.iterations,
  })
}

fn check_block(what: &'static str, m: &Array2<f64>, rows: usize, cols: usize) -> Result<()> {
  if m.nrows() != rows {
    return Err(ScenarioError::dimension(what, rows, m.nrows()));
  }
  if m.nrows() > 0 && m.ncols() != cols {
    return Err(ScenarioError::dimension(what, cols, m.ncols()));
  }
  Ok(())
}

/// Compressed sparse column copy of a dense matrix, optionally keeping only the upper triangle.
fn to_csc(m: ArrayView2<'_, f64>, upper_triangle: bool) -> CscMatrix<f64> {
  let (nrows, ncols) = m.dim();
  let mut colptr = Vec::with_capacity(ncols + 1);
  let mut rowval = Vec::new();
  let mut nzval = Vec::new();

  colptr.push(0);
  for j in 0..ncols {
    let last = if upper_triangle {
      (j + 1).min(nrows)
    } else {
      nrows
    };
    for i in 0..last {
      let v = m[[i, j]];
      if v != 0.0 {
        rowval.push(i);
        nzval.push(v);
      }
    }
    colptr.push(rowval.len());
  }

  CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}
