//! # Fully Flexible Resampling
//!
//! $$
//! q^{(k)} = \arg\min_q \mathrm{KL}(q\,\|\,p)\quad\text{s.t.}\quad
//! \mathbb E_q[x] = \mu_k,\ \mathbb E_q[(x-\mu_k)^2] = \sigma_k^2
//! $$
//!
//! Historical observations are reweighted once per crisp regime of a state
//! variable, then paths are bootstrapped by drawing an observation from the
//! current regime's distribution and jumping to the regime that observation
//! belonged to.

use ndarray::Array1;
use ndarray::Array2;
use ndarray::Array3;
use ndarray::Axis;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use tracing::debug;

use super::probabilities::exp_decay_probs;
use crate::entropy_pooling::EntropyPooling;
use crate::entropy_pooling::Views;
use crate::error::Result;
use crate::error::ScenarioError;
use crate::frame::uniform_probabilities;
use crate::frame::ScenarioFrame;

/// Regime-conditional probabilities and the regime of every observation.
#[derive(Clone, Debug)]
pub struct RegimeProbabilities {
  /// T×K matrix, one probability column per regime.
  pub probabilities: Array2<f64>,
  /// Regime index of every observation.
  pub states: Array1<usize>,
}

impl RegimeProbabilities {
  pub fn n_regimes(&self) -> usize {
    self.probabilities.ncols()
  }
}

/// Regime of every value of `x` for thresholds `c₁ < … < c_K`.
///
/// Regime `0` is `x < c₁`, regime `k` is `c_k <= x < c_{k+1}` and regime `K` is `x >= c_K`.
pub fn crisp_regimes(x: &Array1<f64>, thresholds: &[f64]) -> Result<Array1<usize>> {
  if thresholds.iter().any(|c| !c.is_finite()) {
    return Err(ScenarioError::config("conditioning values must be finite"));
  }
  if thresholds.windows(2).any(|w| w[1] <= w[0]) {
    return Err(ScenarioError::config(
      "conditioning values must be strictly increasing",
    ));
  }
  if x.iter().any(|v| !v.is_finite()) {
    return Err(ScenarioError::config("state variable must be finite"));
  }

  Ok(x.mapv(|v| thresholds.partition_point(|&c| c <= v)))
}

/// Regime-conditioned bootstrap over a T×I history.
#[derive(Clone, Debug)]
pub struct FullyFlexibleResampling {
  history: ScenarioFrame,
  solver: EntropyPooling,
}

impl FullyFlexibleResampling {
  pub fn new(history: ScenarioFrame) -> Self {
    Self::with_solver(history, EntropyPooling::default())
  }

  pub fn with_solver(history: ScenarioFrame, solver: EntropyPooling) -> Self {
    Self { history, solver }
  }

  pub fn history(&self) -> &ScenarioFrame {
    &self.history
  }

  /// One entropy pooling posterior per regime of `state_variable`.
  ///
  /// Every regime must hold observations with positive dispersion; this is
  /// checked for all regimes before any posterior is computed.
  pub fn compute_probabilities(
    &self,
    state_variable: &Array1<f64>,
    conditioning_values: &[f64],
    half_life: Option<f64>,
  ) -> Result<RegimeProbabilities> {
    let t = self.history.n_scenarios();
    if state_variable.len() != t {
      return Err(ScenarioError::dimension("state variable", t, state_variable.len()));
    }

    let states = crisp_regimes(state_variable, conditioning_values)?;
    let n_regimes = conditioning_values.len() + 1;
    let prior = match half_life {
      Some(hl) => exp_decay_probs(t, hl)?,
      None => uniform_probabilities(t),
    };

    let mut targets = Vec::with_capacity(n_regimes);
    for k in 0..n_regimes {
      let members: Vec<f64> = state_variable
        .iter()
        .zip(states.iter())
        .filter(|(_, &s)| s == k)
        .map(|(&x, _)| x)
        .collect();
      if members.is_empty() {
        return Err(ScenarioError::config(format!(
          "regime {k} contains no observations"
        )));
      }
      let n = members.len() as f64;
      let mean = members.iter().sum::<f64>() / n;
      let var = members.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
      if var <= 0.0 {
        return Err(ScenarioError::config(format!(
          "regime {k} has no dispersion in the state variable"
        )));
      }
      targets.push((mean, var));
    }

    let mut probabilities = Array2::zeros((t, n_regimes));
    for (k, &(mean, var)) in targets.iter().enumerate() {
      let squared = state_variable.mapv(|x| (x - mean).powi(2));
      let views = Views::simplex(t)?
        .equality_row(state_variable.view(), mean)?
        .equality_row(squared.view(), var)?;
      let posterior = self.solver.solve(&prior, &views)?;
      debug!(
        regime = k,
        mean,
        vol = var.sqrt(),
        converged = posterior.converged,
        max_violation = posterior.max_violation,
        "regime probabilities"
      );

      let q = &posterior.probabilities;
      let total = q.sum();
      probabilities.column_mut(k).assign(&(q / total));
    }

    Ok(RegimeProbabilities {
      probabilities,
      states,
    })
  }

  /// `S` paths of `H` steps; output shape is (S, I, H).
  pub fn simulate(
    &self,
    n_paths: usize,
    horizon: usize,
    probabilities: &Array2<f64>,
    states: &Array1<usize>,
    initial_state: Option<usize>,
  ) -> Result<Array3<f64>> {
    self.simulate_with_rng(
      n_paths,
      horizon,
      probabilities,
      states,
      initial_state,
      &mut rand::rng(),
    )
  }

  /// [`FullyFlexibleResampling::simulate`] drawing from `rng`.
  pub fn simulate_with_rng<R: Rng + ?Sized>(
    &self,
    n_paths: usize,
    horizon: usize,
    probabilities: &Array2<f64>,
    states: &Array1<usize>,
    initial_state: Option<usize>,
    rng: &mut R,
  ) -> Result<Array3<f64>> {
    let t = self.history.n_scenarios();
    let n_regimes = probabilities.ncols();
    if probabilities.nrows() != t {
      return Err(ScenarioError::dimension(
        "regime probabilities",
        t,
        probabilities.nrows(),
      ));
    }
    if states.len() != t {
      return Err(ScenarioError::dimension("states", t, states.len()));
    }
    if states.iter().any(|&s| s >= n_regimes) {
      return Err(ScenarioError::config(
        "states refer to a regime without a probability column",
      ));
    }

    let initial = match initial_state {
      Some(s) => s,
      None => states[t - 1],
    };
    if initial >= n_regimes {
      return Err(ScenarioError::config(format!(
        "initial state {initial} is not one of the {n_regimes} regimes"
      )));
    }

    let samplers = probabilities
      .columns()
      .into_iter()
      .map(|col| {
        WeightedIndex::new(col.iter().copied())
          .map_err(|e| ScenarioError::config(format!("invalid regime probabilities: {e}")))
      })
      .collect::<Result<Vec<_>>>()?;

    let values = self.history.values();
    let mut paths = Array3::zeros((n_paths, self.history.n_instruments(), horizon));
    for mut path in paths.axis_iter_mut(Axis(0)) {
      let mut state = initial;
      for mut step in path.axis_iter_mut(Axis(1)) {
        let idx = samplers[state].sample(rng);
        step.assign(&values.row(idx));
        state = states[idx];
      }
    }

    Ok(paths)
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  use super::*;
  use crate::testing::state_variable;
  use crate::testing::synthetic_scenarios;

  fn resampler(t: usize) -> FullyFlexibleResampling {
    FullyFlexibleResampling::new(ScenarioFrame::from_array(synthetic_scenarios(t, 4, 31)).unwrap())
  }

  #[test]
  fn crisp_regimes_partition_the_history() {
    let x = Array1::from(vec![-2.0, -0.5, 0.0, 0.3, 1.0, 2.5]);
    let states = crisp_regimes(&x, &[-0.5, 1.0]).unwrap();
    assert_eq!(states.to_vec(), vec![0, 1, 1, 1, 2, 2]);
  }

  #[test]
  fn thresholds_must_increase() {
    let x = Array1::from(vec![0.0, 1.0]);
    assert!(crisp_regimes(&x, &[1.0, 1.0]).is_err());
    assert!(crisp_regimes(&x, &[f64::NAN]).is_err());
  }

  #[test]
  fn regime_posteriors_match_regime_moments() {
    let ffr = resampler(400);
    let x = state_variable(400, 2);
    let regimes = ffr.compute_probabilities(&x, &[-0.67, 0.67], None).unwrap();
    assert_eq!(regimes.probabilities.dim(), (400, 3));

    for k in 0..3 {
      let q = regimes.probabilities.column(k);
      assert_abs_diff_eq!(q.sum(), 1.0, epsilon = 1e-10);
      assert!(q.iter().all(|&v| v > 0.0));

      let members: Vec<f64> = x
        .iter()
        .zip(regimes.states.iter())
        .filter(|(_, &s)| s == k)
        .map(|(&v, _)| v)
        .collect();
      let mean = members.iter().sum::<f64>() / members.len() as f64;
      assert_abs_diff_eq!(q.dot(&x), mean, epsilon = 1e-5);
    }
  }

  #[test]
  fn decayed_prior_is_accepted() -> anyhow::Result<()> {
    let ffr = resampler(300);
    let x = state_variable(300, 4);
    let regimes = ffr.compute_probabilities(&x, &[0.0], Some(150.0))?;
    assert_eq!(regimes.n_regimes(), 2);
    let sims = ffr.simulate(3, 4, &regimes.probabilities, &regimes.states, Some(0))?;
    assert_eq!(sims.dim(), (3, 4, 4));
    Ok(())
  }

  #[test]
  fn empty_regime_fails_before_solving() {
    let ffr = resampler(200);
    let x = state_variable(200, 6);
    // nothing lies above 100
    let err = ffr.compute_probabilities(&x, &[0.0, 100.0], None).unwrap_err();
    assert!(matches!(err, ScenarioError::Configuration(_)));
  }

  #[test]
  fn simulation_shape_and_values_come_from_history() {
    let ffr = resampler(300);
    let x = state_variable(300, 12);
    let regimes = ffr.compute_probabilities(&x, &[-0.5, 0.5], None).unwrap();
    let mut rng = StdRng::seed_from_u64(99);
    let sims = ffr
      .simulate_with_rng(10, 5, &regimes.probabilities, &regimes.states, None, &mut rng)
      .unwrap();
    assert_eq!(sims.dim(), (10, 4, 5));

    let history = ffr.history().values();
    for path in sims.axis_iter(Axis(0)) {
      for step in path.axis_iter(Axis(1)) {
        assert!(history.rows().into_iter().any(|row| row == step));
      }
    }
  }

  #[test]
  fn bad_initial_state_is_rejected() {
    let ffr = resampler(50);
    let probs = Array2::from_elem((50, 2), 1.0 / 50.0);
    let states = Array1::from_elem(50, 0);
    assert!(ffr.simulate(2, 2, &probs, &states, Some(2)).is_err());
  }
}
