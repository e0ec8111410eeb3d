//! Seeded synthetic scenario fixtures shared by the unit tests.

use ndarray::Array1;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;
use rand_distr::StandardNormal;

/// S×I returns where instrument `i` has mean `0.02 + 0.01 i` and volatility
/// `0.05 + 0.03 i`, plus a common factor.
pub(crate) fn synthetic_scenarios(s: usize, i: usize, seed: u64) -> Array2<f64> {
  let mut rng = StdRng::seed_from_u64(seed);
  let mut r = Array2::<f64>::zeros((s, i));

  for mut row in r.rows_mut() {
    let factor: f64 = StandardNormal.sample(&mut rng);
    for (j, x) in row.iter_mut().enumerate() {
      let mean = 0.02 + 0.01 * j as f64;
      let vol = 0.05 + 0.03 * j as f64;
      let idio: f64 = StandardNormal.sample(&mut rng);
      *x = mean + vol * (0.6 * factor + 0.8 * idio);
    }
  }

  r
}

/// Random strictly positive probability vector of length `s`.
pub(crate) fn random_prior(s: usize, seed: u64) -> Array1<f64> {
  let mut rng = StdRng::seed_from_u64(seed);
  let raw = Array1::from_shape_fn(s, |_| rng.random_range(1.0..s as f64));
  let total = raw.sum();
  raw / total
}

/// Gaussian state variable of length `t`.
pub(crate) fn state_variable(t: usize, seed: u64) -> Array1<f64> {
  let mut rng = StdRng::seed_from_u64(seed);
  let normal = Normal::new(0.0, 1.0).unwrap();
  Array1::from_shape_fn(t, |_| normal.sample(&mut rng))
}
