//! # Optimization
//!
//! $$
//! w^\*(\mu^\*) = \arg\min_{w \in \mathcal W,\ \mu^\top w \ge \mu^\*} \rho(w)
//! $$
//!
//! Portfolio optimizers sharing one efficient-frontier strategy.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`constraints`] | Constraint input and the feasible region LPs. |
//! | [`frontier`] | [`EfficientPortfolio`] trait and frontier scanning. |
//! | [`mean_cvar`] | Mean-CVaR through Benders decomposition. |
//! | [`mean_variance`] | Mean-variance through a single QP. |

pub mod constraints;
pub mod frontier;
pub mod mean_cvar;
pub mod mean_variance;

pub use constraints::FeasibleRegion;
pub use constraints::PortfolioConstraints;
pub use frontier::EfficientFrontier;
pub use frontier::EfficientPortfolio;
pub use frontier::FrontierPoint;
pub use frontier::FrontierScanner;
pub use frontier::DEFAULT_NUM_PORTFOLIOS;
pub use mean_cvar::BendersCut;
pub use mean_cvar::BendersReport;
pub use mean_cvar::MeanCVaR;
pub use mean_cvar::MeanCVaRConfig;
pub use mean_variance::MeanVariance;
