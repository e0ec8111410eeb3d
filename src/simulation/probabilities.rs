//! # Time-Decayed Probabilities
//!
//! $$
//! p_t \propto \exp\!\Big(-\frac{\ln 2}{\tau_{1/2}}(T - t)\Big),\quad t = 1,\dots,T
//! $$
//!

use ndarray::Array1;
use ndarray::Array2;

use crate::error::Result;
use crate::error::ScenarioError;
use crate::frame::ScenarioFrame;
use crate::stats::moments::covariance_matrix;

/// Exponentially decaying probabilities over `t` observations, newest last.
pub fn exp_decay_probs(t: usize, half_life: f64) -> Result<Array1<f64>> {
  if t == 0 {
    return Err(ScenarioError::config("at least one observation is required"));
  }
  if !(half_life.is_finite() && half_life > 0.0) {
    return Err(ScenarioError::config(format!(
      "half life must be positive, got {half_life}"
    )));
  }

  let decay = std::f64::consts::LN_2 / half_life;
  let p = Array1::from_shape_fn(t, |k| (-decay * (t - 1 - k) as f64).exp());
  let total = p.sum();
  Ok(p / total)
}

/// Mean vector and covariance matrix under [`exp_decay_probs`].
pub fn normal_exp_decay_calib(
  frame: &ScenarioFrame,
  half_life: f64,
) -> Result<(Array1<f64>, Array2<f64>)> {
  let p = exp_decay_probs(frame.n_scenarios(), half_life)?;
  let mean = frame.weighted_mean(&p);
  let cov = covariance_matrix(frame, Some(&p))?;
  Ok((mean, cov))
}
