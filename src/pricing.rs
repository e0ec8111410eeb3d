//! # Black-76 Option Pricing
//!
//! $$
//! C = e^{-rT}\big(F N(d_1) - K N(d_2)\big),\qquad
//! P = e^{-rT}\big(K N(-d_2) - F N(-d_1)\big)
//! $$
//!
//! $$
//! d_1 = \frac{\ln(F/K) + \sigma^2 T / 2}{\sigma\sqrt T},\qquad d_2 = d_1 - \sigma\sqrt T
//! $$
//!
//! European options on a forward, used to turn simulated forwards and implied
//! volatilities into option scenario P&L.

use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;

use crate::error::Result;
use crate::error::ScenarioError;

/// `(d1, d2)` of Black's model for forward `f`, strike `k`, volatility `sigma` and maturity `t`.
pub fn d1_d2(f: f64, k: f64, sigma: f64, t: f64) -> Result<(f64, f64)> {
  for (name, value) in [("forward", f), ("strike", k), ("volatility", sigma), ("maturity", t)] {
    if !(value.is_finite() && value > 0.0) {
      return Err(ScenarioError::config(format!(
        "{name} must be positive, got {value}"
      )));
    }
  }

  let vol_sqrt_t = sigma * t.sqrt();
  let d1 = ((f / k).ln() + 0.5 * sigma.powi(2) * t) / vol_sqrt_t;
  Ok((d1, d1 - vol_sqrt_t))
}

/// European call price under Black's formula, discounted at rate `r`.
pub fn call_option(f: f64, k: f64, sigma: f64, r: f64, t: f64) -> Result<f64> {
  let (d1, d2) = d1_d2(f, k, sigma, t)?;
  let n = Normal::default();
  Ok((-r * t).exp() * (f * n.cdf(d1) - k * n.cdf(d2)))
}

/// European put price under Black's formula, discounted at rate `r`.
pub fn put_option(f: f64, k: f64, sigma: f64, r: f64, t: f64) -> Result<f64> {
  let (d1, d2) = d1_d2(f, k, sigma, t)?;
  let n = Normal::default();
  Ok((-r * t).exp() * (k * n.cdf(-d2) - f * n.cdf(-d1)))
}
