//! # Portfolio Risk
//!
//! $$
//! \mathrm{VaR}_\alpha = \inf\{\ell : P(L \le \ell) \ge \alpha\},\qquad
//! \mathrm{CVaR}_\alpha = \mathrm{VaR}_\alpha + \frac{\mathbb E[(L-\mathrm{VaR}_\alpha)^+]}{1-\alpha}
//! $$
//!
//! Scenario risk of exposure columns. Losses are `L = -(R w)`, optionally demeaned.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::ArrayView1;

use crate::error::Result;
use crate::error::ScenarioError;
use crate::frame::resolve_probabilities;
use crate::frame::ScenarioFrame;

/// Confidence level used when none is given.
pub const DEFAULT_ALPHA: f64 = 0.95;

/// Probability-weighted α-quantile of `losses`.
pub fn value_at_risk(losses: ArrayView1<'_, f64>, p: ArrayView1<'_, f64>, alpha: f64) -> f64 {
  let mut order: Vec<usize> = (0..losses.len()).collect();
  order.sort_by(|&i, &j| losses[i].total_cmp(&losses[j]));

  let mut cumulative = 0.0;
  for &s in &order {
    cumulative += p[s];
    if cumulative >= alpha - 1e-12 {
      return losses[s];
    }
  }
  order.last().map(|&s| losses[s]).unwrap_or(0.0)
}

/// Rockafellar-Uryasev CVaR of `losses`; never below [`value_at_risk`].
pub fn conditional_value_at_risk(
  losses: ArrayView1<'_, f64>,
  p: ArrayView1<'_, f64>,
  alpha: f64,
) -> f64 {
  let var = value_at_risk(losses, p, alpha);
  let excess: f64 = losses
    .iter()
    .zip(p.iter())
    .map(|(&l, &ps)| ps * (l - var).max(0.0))
    .sum();
  var + excess / (1.0 - alpha)
}

/// `-(R w)` for each exposure column, demeaned under `p` when asked.
pub fn portfolio_losses(
  frame: &ScenarioFrame,
  exposures: &Array2<f64>,
  p: &Array1<f64>,
  demean: bool,
) -> Result<Array2<f64>> {
  if exposures.nrows() != frame.n_instruments() {
    return Err(ScenarioError::dimension(
      "exposures",
      frame.n_instruments(),
      exposures.nrows(),
    ));
  }

  let mut pnl = frame.values().dot(exposures);
  if demean {
    let mean = p.dot(&pnl);
    pnl -= &mean;
  }
  Ok(-pnl)
}

fn check_alpha(alpha: f64) -> Result<f64> {
  if alpha > 0.0 && alpha < 1.0 {
    Ok(alpha)
  } else {
    Err(ScenarioError::config(format!(
      "alpha must be in the interval (0, 1), got {alpha}"
    )))
  }
}

/// α-VaR of each exposure column (I×P), reported as a positive loss.
pub fn portfolio_var(
  frame: &ScenarioFrame,
  exposures: &Array2<f64>,
  p: Option<&Array1<f64>>,
  alpha: Option<f64>,
  demean: Option<bool>,
) -> Result<Array1<f64>> {
  let alpha = check_alpha(alpha.unwrap_or(DEFAULT_ALPHA))?;
  let p = resolve_probabilities(p, frame.n_scenarios())?;
  let losses = portfolio_losses(frame, exposures, &p, demean.unwrap_or(true))?;
  Ok(
    losses
      .columns()
      .into_iter()
      .map(|l| value_at_risk(l, p.view(), alpha))
      .collect(),
  )
}

/// α-CVaR of each exposure column (I×P), reported as a positive loss.
pub fn portfolio_cvar(
  frame: &ScenarioFrame,
  exposures: &Array2<f64>,
  p: Option<&Array1<f64>>,
  alpha: Option<f64>,
  demean: Option<bool>,
) -> Result<Array1<f64>> {
  let alpha = check_alpha(alpha.unwrap_or(DEFAULT_ALPHA))?;
  let p = resolve_probabilities(p, frame.n_scenarios())?;
  let losses = portfolio_losses(frame, exposures, &p, demean.unwrap_or(true))?;
  Ok(
    losses
      .columns()
      .into_iter()
      .map(|l| conditional_value_at_risk(l, p.view(), alpha))
      .collect(),
  )
}

/// Probability-weighted volatility of each exposure column (I×P).
pub fn portfolio_vol(
  frame: &ScenarioFrame,
  exposures: &Array2<f64>,
  p: Option<&Array1<f64>>,
) -> Result<Array1<f64>> {
  let p = resolve_probabilities(p, frame.n_scenarios())?;
  let losses = portfolio_losses(frame, exposures, &p, true)?;
  Ok(
    losses
      .columns()
      .into_iter()
      .map(|l| p.dot(&l.mapv(|x| x * x)).sqrt())
      .collect(),
  )
}
