//! # Solvers
//!
//! $$
//! \min_x \tfrac12 x^\top P x + c^\top x \ \text{s.t.}\ Ax=b,\ Gx\le h
//! \qquad
//! \min_{x \ge \ell} f(x)
//! $$
//!
//! Black-box numerical capabilities used by the engines.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`conic`] | LP/QP solves through the Clarabel interior-point solver. |
//! | [`bounded`] | Bound-constrained smooth minimization through argmin L-BFGS. |

pub mod bounded;
pub mod conic;

pub use bounded::BoundedMinimizer;
pub use bounded::Minimum;
pub use bounded::SmoothObjective;
pub use conic::ConicSolution;
pub use conic::SolveStatus;
