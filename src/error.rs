//! # Errors
//!
//! $$
//! \mathcal{E} = \{\text{configuration}, \text{dimension}, \text{infeasible}, \text{unbounded}, \text{solver}\}
//! $$
//!
//! Error taxonomy shared by the entropy pooling, optimization and simulation modules.
//! All errors are raised synchronously to the immediate caller and are never retried.

use thiserror::Error;

/// Errors raised by the scenario engines.
///
/// Non-convergence of the Benders loop or of the dual minimizer is not an error:
/// it is reported through [`crate::entropy_pooling::Posterior`] and
/// [`crate::optimization::BendersReport`] and logged with `tracing::warn!`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScenarioError {
  /// Malformed option values or inputs, raised eagerly at construction.
  #[error("invalid configuration: {0}")]
  Configuration(String),

  /// Paired inputs whose shapes do not agree.
  #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
  Dimension {
    /// Which input was malformed
    what: &'static str,
    /// Expected length or row/column count
    expected: usize,
    /// Provided length or row/column count
    actual: usize,
  },

  /// The portfolio constraints admit no feasible point.
  #[error("constraints are infeasible, please specify feasible constraints")]
  Infeasible,

  /// The expected return is unbounded over the feasible region.
  #[error("expected return is unbounded, unable to compute efficient frontier")]
  Unbounded,

  /// An underlying solver returned a non-optimal status.
  #[error("{solver} solver failed with status {status}")]
  Solver {
    /// Solver that failed
    solver: &'static str,
    /// Reported status
    status: String,
  },
}

impl ScenarioError {
  pub(crate) fn config(msg: impl Into<String>) -> Self {
    Self::Configuration(msg.into())
  }

  pub(crate) fn dimension(what: &'static str, expected: usize, actual: usize) -> Self {
    Self::Dimension {
      what,
      expected,
      actual,
    }
  }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ScenarioError>;
