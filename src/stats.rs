//! # Stats
//!
//! $$
//! \mathrm{CVaR}_\alpha(L) = \min_t\ t + \frac{1}{1-\alpha}\,\mathbb E_p[(L-t)^+]
//! $$
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`moments`] | Probability-weighted moments, covariance and correlation. |
//! | [`risk`] | Portfolio VaR, CVaR and volatility under scenario probabilities. |

pub mod moments;
pub mod risk;

pub use moments::correlation_matrix;
pub use moments::covariance_matrix;
pub use moments::simulation_moments;
pub use moments::MomentsTable;
pub use risk::portfolio_cvar;
pub use risk::portfolio_var;
pub use risk::portfolio_vol;
pub use risk::DEFAULT_ALPHA;
