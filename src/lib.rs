//! # scenario-rs
//!
//! $$
//! q^\* = \arg\min_{q \in \Delta} \sum_s q_s \ln\frac{q_s}{p_s}
//! \quad\text{s.t.}\quad Aq = b,\ Gq \le h
//! $$
//!
//! Scenario-based portfolio construction on an S×I matrix of simulated or
//! historical outcomes with a probability vector over the rows.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`entropy_pooling`] | Minimum relative entropy posteriors under linear views. |
//! | [`error`] | Error taxonomy shared by every engine. |
//! | [`frame`] | Named scenario matrices and probability checks. |
//! | [`optimization`] | Mean-CVaR and mean-variance efficient frontiers. |
//! | [`pricing`] | Black-76 European option prices. |
//! | [`simulation`] | Time-decayed probabilities and Fully Flexible Resampling. |
//! | [`solvers`] | LP/QP and bound-constrained smooth minimization backends. |
//! | [`stats`] | Moments, VaR, CVaR and volatility under scenario probabilities. |

pub mod entropy_pooling;
pub mod error;
pub mod frame;
pub mod optimization;
pub mod pricing;
pub mod simulation;
pub mod solvers;
pub mod stats;

#[cfg(test)]
mod testing;

pub mod prelude {
  pub use crate::entropy_pooling::entropy_pooling;
  pub use crate::entropy_pooling::EntropyPooling;
  pub use crate::entropy_pooling::EntropyPoolingConfig;
  pub use crate::entropy_pooling::Posterior;
  pub use crate::entropy_pooling::Views;
  pub use crate::error::Result;
  pub use crate::error::ScenarioError;
  pub use crate::frame::ScenarioFrame;
  pub use crate::optimization::EfficientFrontier;
  pub use crate::optimization::EfficientPortfolio;
  pub use crate::optimization::FrontierScanner;
  pub use crate::optimization::MeanCVaR;
  pub use crate::optimization::MeanCVaRConfig;
  pub use crate::optimization::MeanVariance;
  pub use crate::optimization::PortfolioConstraints;
  pub use crate::pricing::call_option;
  pub use crate::pricing::put_option;
  pub use crate::simulation::exp_decay_probs;
  pub use crate::simulation::FullyFlexibleResampling;
  pub use crate::stats::portfolio_cvar;
  pub use crate::stats::portfolio_var;
  pub use crate::stats::portfolio_vol;
  pub use crate::stats::simulation_moments;
}
