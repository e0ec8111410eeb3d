use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::StandardNormal;
use scenario_rs::frame::uniform_probabilities;
use scenario_rs::prelude::*;

const N_SCENARIOS: usize = 10_000;
const N_INSTRUMENTS: usize = 6;

/// One-factor return scenarios with increasing mean and volatility per instrument.
fn simulate_returns(seed: u64) -> Array2<f64> {
  let mut rng = StdRng::seed_from_u64(seed);
  let mut r = Array2::zeros((N_SCENARIOS, N_INSTRUMENTS));
  for mut row in r.rows_mut() {
    let factor: f64 = StandardNormal.sample(&mut rng);
    for (i, x) in row.iter_mut().enumerate() {
      let idio: f64 = StandardNormal.sample(&mut rng);
      let vol = 0.06 + 0.03 * i as f64;
      *x = 0.02 + 0.012 * i as f64 + vol * (0.5 * factor + 0.85 * idio);
    }
  }
  r
}

fn main() -> anyhow::Result<()> {
  let names = ["Bonds", "Credit", "Equity", "EM", "Commodities", "Crypto"]
    .iter()
    .map(|s| s.to_string())
    .collect();
  let frame = ScenarioFrame::new(names, simulate_returns(42))?;
  let prior = uniform_probabilities(frame.n_scenarios());

  println!("Prior moments");
  println!("{}", simulation_moments(&frame, Some(&prior))?);

  // equity view: expected return cut to 2%, volatility capped
  let equity = frame.position("Equity").unwrap_or(2);
  let column = frame.column(equity);
  let squared = column.mapv(|x| x * x);
  let views = Views::simplex(frame.n_scenarios())?
    .equality_row(column, 0.02)?
    .inequality_row(squared.view(), 0.02 * 0.02 + 0.10 * 0.10)?;
  let posterior = EntropyPooling::default().solve(&prior, &views)?;
  println!(
    "Entropy pooling converged: {} after {} iterations (max violation {:.2e})",
    posterior.converged, posterior.iterations, posterior.max_violation
  );

  println!("Posterior moments");
  println!("{}", simulation_moments(&frame, Some(&posterior.probabilities))?);

  let constraints = PortfolioConstraints::long_only(frame.n_instruments());
  let cvar = MeanCVaR::new(
    &frame,
    Some(&posterior.probabilities),
    &constraints,
    MeanCVaRConfig::default(),
  )?;
  println!("Mean-CVaR efficient frontier");
  println!("{}", FrontierScanner::default().scan_par(&cvar)?);

  let variance = MeanVariance::from_frame(&frame, Some(&posterior.probabilities), &constraints)?;
  println!("Mean-variance efficient frontier");
  println!("{}", FrontierScanner::default().scan(&variance)?);

  let decayed = exp_decay_probs(frame.n_scenarios(), N_SCENARIOS as f64 / 2.0)?;
  let frontier = FrontierScanner::new(3).scan(&variance)?;
  let cvars = portfolio_cvar(&frame, &frontier.weights(), Some(&decayed), None, None)?;
  println!("Mean-variance frontier CVaR under decayed weights: {cvars:.4}");

  Ok(())
}
