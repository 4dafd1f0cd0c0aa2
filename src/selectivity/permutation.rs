//! Permutation Significance Tester
//!
//! Null distribution of the selectivity ratio by shuffling y against a fixed
//! X and re-running the fold procedure of the observed estimate: the same
//! row subsets, feature masks and latent-variable count. Observed and
//! permuted ratios are then the same statistic, so they are exchangeable
//! under the null at any subsample fraction.
//!
//! This is the expensive part of a run (one PLS fit per fold per trial), so
//! trials fan out on rayon and fan back in through per-worker exceedance
//! counters merged with `reduce`.
//!
//! p-value per feature: fraction of completed trials with
//! `|ratio_perm| >= |ratio_observed|`.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use std::time::{Duration, Instant};

use super::ratio::{EstimateConfig, FoldPlan};
use crate::error::{Result, SelectivityError};
use crate::utils::normalization::{standardize_columns, standardize_vector};

/// Permutation test parameters
#[derive(Debug, Clone)]
pub struct PermutationConfig {
    pub n_permutations: usize,
    /// Trial `k` is seeded with `seed + k`
    pub seed: u64,
    /// Trials not started before this elapses are skipped
    pub deadline: Option<Duration>,
    /// Fold settings the observed ratios were estimated with
    pub resampling: EstimateConfig,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            n_permutations: 1000,
            seed: 0,
            deadline: None,
            resampling: EstimateConfig::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PermutationOutcome {
    /// One p-value per feature; NaN where the observed ratio is NaN
    pub p_values: Vec<f64>,
    pub completed: usize,
    pub requested: usize,
}

/// Per-worker accumulator
struct Tally {
    exceedances: Vec<u32>,
    completed: usize,
}

impl Tally {
    fn new(p: usize) -> Self {
        Self {
            exceedances: vec![0; p],
            completed: 0,
        }
    }

    fn merge(mut self, other: Tally) -> Tally {
        for (a, b) in self.exceedances.iter_mut().zip(other.exceedances) {
            *a += b;
        }
        self.completed += other.completed;
        self
    }
}

/// Empirical p-values for `observed` ratios
///
/// `observed` must come from `estimate` with `config.resampling`; `nlv` is the
/// latent-variable count that estimate used, and every fold must support it.
pub fn p_values(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    observed: &[f64],
    nlv: usize,
    config: &PermutationConfig,
) -> Result<PermutationOutcome> {
    let (n, p) = (x.nrows(), x.ncols());
    if y.len() != n {
        return Err(SelectivityError::ShapeMismatch {
            context: "feature rows vs response length".to_string(),
            expected: n,
            found: y.len(),
        });
    }
    if observed.len() != p {
        return Err(SelectivityError::ShapeMismatch {
            context: "observed ratios vs features".to_string(),
            expected: p,
            found: observed.len(),
        });
    }
    if config.n_permutations == 0 {
        return Err(SelectivityError::invalid_parameter("n_permutations", 0, "must be at least 1"));
    }

    let xs = standardize_columns(x);
    let ys = standardize_vector(y);
    let resampling = EstimateConfig {
        n_components: Some(nlv),
        ..config.resampling.clone()
    };
    let plan = FoldPlan::new(&xs, &resampling)?;

    let thresholds: Vec<f64> = observed.iter().map(|v| v.abs()).collect();

    let start = Instant::now();
    let tally = (0..config.n_permutations)
        .into_par_iter()
        .fold(
            || Tally::new(p),
            |mut tally, k| {
                if let Some(deadline) = config.deadline {
                    if start.elapsed() >= deadline {
                        return tally;
                    }
                }

                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(k as u64));
                let mut shuffled: Vec<f64> = ys.iter().copied().collect();
                shuffled.shuffle(&mut rng);
                let permuted = plan.signed_ratio(&DVector::from_vec(shuffled));

                // NaN never exceeds: such features only arise where the observed ratio is NaN too
                for j in 0..p {
                    if permuted[j].abs() >= thresholds[j] {
                        tally.exceedances[j] += 1;
                    }
                }
                tally.completed += 1;
                tally
            },
        )
        .reduce(|| Tally::new(p), Tally::merge);

    if tally.completed == 0 {
        return Err(SelectivityError::PermutationBudgetExhausted {
            requested: config.n_permutations,
            seconds: config.deadline.map(|d| d.as_secs_f64()).unwrap_or(0.0),
        });
    }
    if tally.completed < config.n_permutations {
        tracing::warn!(
            "Permutation deadline reached: {}/{} trials completed",
            tally.completed,
            config.n_permutations
        );
    }

    let p_values = observed
        .iter()
        .zip(&tally.exceedances)
        .map(|(obs, &count)| {
            if obs.is_nan() {
                f64::NAN
            } else {
                count as f64 / tally.completed as f64
            }
        })
        .collect();

    tracing::info!(
        "Permutation test: {} trials × {} folds, {} features, nlv {} in {:.2?}",
        tally.completed,
        plan.n_folds(),
        p,
        nlv,
        start.elapsed()
    );

    Ok(PermutationOutcome {
        p_values,
        completed: tally.completed,
        requested: config.n_permutations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selectivity::ratio::{estimate, EstimateConfig};
    use rand::Rng;

    fn noisy_design(n: usize, p: usize, seed: u64) -> (DMatrix<f64>, DVector<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = DMatrix::from_fn(n, p, |_, _| rng.gen_range(0.0..5.0));
        let y = DVector::from_fn(n, |i, _| 3.0 * x[(i, 0)] + rng.gen_range(-0.5..0.5));
        (x, y)
    }

    #[test]
    fn test_informative_feature_is_significant() {
        let (x, y) = noisy_design(30, 4, 21);
        let resampling = EstimateConfig { n_folds: 20, seed: 1, ..Default::default() };
        let est = estimate(&x, &y, &resampling).unwrap();
        let config = PermutationConfig { n_permutations: 200, seed: 500, deadline: None, resampling };
        let outcome = p_values(&x, &y, &est.signed, est.nlv, &config).unwrap();

        assert_eq!(outcome.completed, 200);
        assert!(outcome.p_values[0] < 0.05, "p = {}", outcome.p_values[0]);
        for p in &outcome.p_values {
            assert!((0.0..=1.0).contains(p));
        }
    }

    #[test]
    fn test_nan_observed_gives_nan_p_value() {
        let (x, y) = noisy_design(12, 2, 4);
        let observed = vec![f64::NAN, 0.5];
        let config = PermutationConfig { n_permutations: 20, ..Default::default() };
        let outcome = p_values(&x, &y, &observed, 2, &config).unwrap();
        assert!(outcome.p_values[0].is_nan());
        assert!(outcome.p_values[1].is_finite());
    }

    #[test]
    fn test_zero_observed_always_exceeded() {
        let (x, y) = noisy_design(10, 2, 8);
        let config = PermutationConfig { n_permutations: 15, ..Default::default() };
        let outcome = p_values(&x, &y, &[0.0, 0.0], 1, &config).unwrap();
        assert_eq!(outcome.p_values, vec![1.0, 1.0]);
    }

    #[test]
    fn test_expired_deadline_exhausts_budget() {
        let (x, y) = noisy_design(10, 2, 8);
        let config = PermutationConfig {
            n_permutations: 10,
            deadline: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(matches!(
            p_values(&x, &y, &[1.0, 1.0], 1, &config),
            Err(SelectivityError::PermutationBudgetExhausted { requested: 10, .. })
        ));
    }

    #[test]
    fn test_nlv_must_fit_every_fold() {
        // round(0.8 × 3) = 2 rows per fold
        let (x, y) = noisy_design(3, 2, 8);
        let config = PermutationConfig { n_permutations: 5, ..Default::default() };
        assert!(matches!(
            p_values(&x, &y, &[1.0, 1.0], 3, &config),
            Err(SelectivityError::InsufficientSamples { n_rows: 2, max_allowed: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_zero_permutations() {
        let (x, y) = noisy_design(10, 2, 8);
        let config = PermutationConfig { n_permutations: 0, ..Default::default() };
        assert!(matches!(
            p_values(&x, &y, &[1.0, 1.0], 1, &config),
            Err(SelectivityError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_null_p_values_calibrated_with_few_rows() {
        // Six rows, five-row folds: pure noise should be flagged near the nominal rate
        let alpha = 0.1;
        let (mut flagged, mut total) = (0usize, 0usize);
        for run in 0..30u64 {
            let mut rng = StdRng::seed_from_u64(700 + run);
            let x = DMatrix::from_fn(6, 4, |_, _| rng.gen_range(0.0..1.0));
            let y = DVector::from_fn(6, |_, _| rng.gen_range(0.0..1.0));

            let resampling = EstimateConfig { n_folds: 15, seed: run, ..Default::default() };
            let est = estimate(&x, &y, &resampling).unwrap();
            let config = PermutationConfig {
                n_permutations: 150,
                seed: 9_000 + run,
                deadline: None,
                resampling,
            };
            let outcome = p_values(&x, &y, &est.signed, est.nlv, &config).unwrap();
            flagged += outcome.p_values.iter().filter(|p| **p < alpha).count();
            total += outcome.p_values.len();
        }

        let rate = flagged as f64 / total as f64;
        assert!(rate <= 0.2, "false positive rate {}", rate);
    }

    #[test]
    fn test_reproducible_with_seed() {
        let (x, y) = noisy_design(15, 3, 2);
        let config = PermutationConfig {
            n_permutations: 50,
            seed: 9,
            resampling: EstimateConfig { n_folds: 10, ..Default::default() },
            ..Default::default()
        };
        let observed = vec![0.3, 0.1, 0.2];
        let a = p_values(&x, &y, &observed, 2, &config).unwrap();
        let b = p_values(&x, &y, &observed, 2, &config).unwrap();
        assert_eq!(a.p_values, b.p_values);
    }
}
