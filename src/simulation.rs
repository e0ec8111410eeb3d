//! # Simulation
//!
//! $$
//! p_t \propto e^{-\frac{\ln 2}{\tau_{1/2}}(T-t)},\qquad
//! X_{h+1} \sim q^{(s_h)}
//! $$
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`probabilities`] | Exponential decay probabilities and calibration. |
//! | [`resampling`] | Fully Flexible Resampling over crisp regimes. |

pub mod probabilities;
pub mod resampling;

pub use probabilities::exp_decay_probs;
pub use probabilities::normal_exp_decay_calib;
pub use resampling::crisp_regimes;
pub use resampling::FullyFlexibleResampling;
pub use resampling::RegimeProbabilities;
