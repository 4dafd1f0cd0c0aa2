// Permutation test throughput
//
// Every trial refits each fold of the observed estimate; this measures
// trials per second for field-sized designs (positions × buckets).
// Run with: cargo bench --bench permutation_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use env_selectivity::selectivity::{estimate, p_values, EstimateConfig, PermutationConfig};
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn design(n_positions: usize, n_buckets: usize) -> (DMatrix<f64>, DVector<f64>) {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let x = DMatrix::from_fn(n_positions, n_buckets, |_, _| rng.gen_range(0..60) as f64);
    let y = DVector::from_fn(n_positions, |i, _| 0.5 * x[(i, 0)] + rng.gen_range(-5.0..5.0));
    (x, y)
}

fn bench_permutations(c: &mut Criterion) {
    let mut group = c.benchmark_group("permutation_test");
    group.sample_size(10);

    for &(n_positions, n_buckets) in &[(12, 20), (24, 40), (48, 80)] {
        let (x, y) = design(n_positions, n_buckets);
        let resampling = EstimateConfig { n_folds: 20, seed: 1, ..Default::default() };
        let est = estimate(&x, &y, &resampling).expect("estimate");
        let config = PermutationConfig {
            n_permutations: 200,
            seed: 21,
            deadline: None,
            resampling,
        };

        group.bench_with_input(
            BenchmarkId::new("200_trials_20_folds", format!("{}x{}", n_positions, n_buckets)),
            &(n_positions, n_buckets),
            |b, _| {
                b.iter(|| {
                    let outcome = p_values(black_box(&x), black_box(&y), &est.signed, est.nlv, &config)
                        .expect("permutation test");
                    black_box(outcome.p_values);
                });
            },
        );
    }
    group.finish();
}

fn bench_estimate(c: &mut Criterion) {
    let (x, y) = design(24, 40);
    let config = EstimateConfig {
        n_folds: 100,
        seed: 3,
        ..Default::default()
    };
    c.bench_function("estimate_100_folds_24x40", |b| {
        b.iter(|| black_box(estimate(black_box(&x), black_box(&y), &config).expect("estimate")));
    });
}

criterion_group!(benches, bench_permutations, bench_estimate);
criterion_main!(benches);
