use std::hint::black_box;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::StandardNormal;
use scenario_rs::frame::ScenarioFrame;
use scenario_rs::optimization::EfficientPortfolio;
use scenario_rs::optimization::FrontierScanner;
use scenario_rs::optimization::MeanCVaR;
use scenario_rs::optimization::MeanCVaRConfig;
use scenario_rs::optimization::PortfolioConstraints;

const N_INSTRUMENTS: usize = 10;

fn scenarios(s: usize) -> ScenarioFrame {
  let mut rng = StdRng::seed_from_u64(11);
  let r = Array2::from_shape_fn((s, N_INSTRUMENTS), |(_, i)| {
    let z: f64 = StandardNormal.sample(&mut rng);
    0.02 + 0.01 * i as f64 + (0.05 + 0.03 * i as f64) * z
  });
  ScenarioFrame::from_array(r).expect("scenarios must be finite")
}

fn bench_mean_cvar(c: &mut Criterion) {
  let mut group = c.benchmark_group("MeanCVaR");
  group.sample_size(10);

  for &s in &[1_000usize, 10_000] {
    let frame = scenarios(s);
    let opt = MeanCVaR::new(
      &frame,
      None,
      &PortfolioConstraints::long_only(N_INSTRUMENTS),
      MeanCVaRConfig::default(),
    )
    .expect("optimizer must build");

    group.bench_with_input(BenchmarkId::new("min_risk", s), &s, |b, _| {
      b.iter(|| black_box(opt.efficient_portfolio(None).expect("solve must succeed")));
    });

    group.bench_with_input(BenchmarkId::new("frontier/seq", s), &s, |b, _| {
      b.iter(|| black_box(FrontierScanner::new(5).scan(&opt).expect("frontier")));
    });

    group.bench_with_input(BenchmarkId::new("frontier/par", s), &s, |b, _| {
      b.iter(|| black_box(FrontierScanner::new(5).scan_par(&opt).expect("frontier")));
    });
  }

  group.finish();
}

criterion_group!(benches, bench_mean_cvar);
criterion_main!(benches);
