//! Bias-corrected per-step point estimates.
//!
//! For every step the weighted average of rewards is reweighted by the
//! closed-form Cressie-Read dual multipliers `(gamma, beta)`:
//!
//!   vhat = (-gamma * Σ c·W·r - beta * Σ c·W²·r) / (1 + n)
//!
//! and the probability mass the dual leaves unaccounted for is assigned the
//! plain empirical mean reward of that step.

use tracing::debug;

use crate::error::{OpeError, Result};
use crate::trajectory::{Accumulator, FakeWeight, TrajectoryStore, UpperBound};

use super::moments::{step_moments, StepMoments};
use super::{warn_out_of_range, RewardRange};

/// Accumulates trajectories and produces one point estimate per step.
#[derive(Debug, Clone, Default)]
pub struct Estimator {
    store: TrajectoryStore,
}

impl Estimator {
    /// Create an estimator with prior bounds on any per-step importance
    /// weight.
    ///
    /// The bounds should be the true smallest and largest possible ratios, not
    /// the empirical ones. Underestimating either side biases the correction
    /// toward it.
    pub fn new(wmin: f64, wmax: UpperBound) -> Result<Self> {
        Ok(Self {
            store: TrajectoryStore::new(wmin, wmax)?,
        })
    }

    /// Per-step estimates of the expected reward under the target policy.
    ///
    /// Recomputed from the stored trajectories on every call. `rewards` is
    /// validated but does not clip the estimates, which may leave the range
    /// when `wmax` is unbounded.
    ///
    /// # Errors
    ///
    /// Fails with [`OpeError::NoData`] before any trajectory with positive
    /// count was added, and with [`OpeError::DegenerateVariance`] when the
    /// fake-weight augmented weights have no variance.
    pub fn get_estimate(&self, rewards: RewardRange) -> Result<Vec<f64>> {
        rewards.validate()?;
        let moments = step_moments(&self.store)?;
        warn_out_of_range(&self.store, &rewards);

        moments
            .iter()
            .enumerate()
            .map(|(step, m)| {
                let wfake = m.deficient_fake_weight(&self.store, step);
                step_estimate(m, wfake, step)
            })
            .collect()
    }
}

impl Accumulator for Estimator {
    fn store(&self) -> &TrajectoryStore {
        &self.store
    }

    fn store_mut(&mut self) -> &mut TrajectoryStore {
        &mut self.store
    }
}

/// Dual multipliers `(gamma, beta)` for one step.
fn dual_multipliers(m: &StepMoments, wfake: FakeWeight, step: usize) -> Result<(f64, f64)> {
    let n = m.n;
    match wfake {
        FakeWeight::Unbounded => Ok((-(1.0 + n) / n, 0.0)),
        FakeWeight::Finite(w) => {
            let a = (w + m.sumw) / (1.0 + n);
            let b = (w.powi(2) + m.sumwsq) / (1.0 + n);
            let denom = a * a - b;
            if denom.is_nan() || denom >= 0.0 {
                return Err(OpeError::DegenerateVariance { step });
            }
            let gamma = (b - a) / denom;
            let beta = (1.0 - a) / denom;
            Ok((gamma, beta))
        }
    }
}

fn step_estimate(m: &StepMoments, wfake: FakeWeight, step: usize) -> Result<f64> {
    let n = m.n;
    let (gamma, beta) = dual_multipliers(m, wfake, step)?;

    let vhat = (-gamma * m.sumwr - beta * m.sumwsqr) / (1.0 + n);
    let missing = 0.0_f64.max(1.0 - (-gamma * m.sumw - beta * m.sumwsq) / (1.0 + n));
    let rhat_missing = m.sumr / n;

    debug!(
        step,
        n,
        sumw = m.sumw,
        ?wfake,
        gamma,
        beta,
        missing,
        "cressie-read step estimate"
    );

    Ok(vhat + missing * rhat_missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::golden_scenario;

    fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < tol, "expected {expected:?}, got {actual:?}");
        }
    }

    /// Three 3-step trajectories with `p_log = 1`, given as
    /// `(p_preds, rewards, count)`.
    fn mixed() -> Vec<(Vec<f64>, Vec<f64>, f64)> {
        vec![
            (vec![2.0, 0.5, 1.0], vec![0.2, 0.6, 1.0], 3.0),
            (vec![0.5, 1.5, 0.0], vec![0.9, 0.1, 0.4], 2.0),
            (vec![1.0, 0.25, 2.0], vec![0.0, 1.0, 0.5], 5.0),
        ]
    }

    fn estimator_with(data: &[(Vec<f64>, Vec<f64>, f64)], wmax: UpperBound) -> Estimator {
        let mut est = Estimator::new(0.0, wmax).unwrap();
        for (p_preds, rewards, count) in data {
            let p_logs = vec![1.0; p_preds.len()];
            est.add_example(&p_logs, p_preds, rewards, *count).unwrap();
        }
        est
    }

    #[test]
    fn test_no_data() {
        let est = Estimator::default();
        assert_eq!(
            est.get_estimate(RewardRange::default()).unwrap_err(),
            OpeError::NoData
        );

        let mut est = Estimator::default();
        est.add_example(&[1.0], &[1.0], &[1.0], 0.0).unwrap();
        assert_eq!(
            est.get_estimate(RewardRange::default()).unwrap_err(),
            OpeError::NoData
        );
    }

    #[test]
    fn test_invalid_reward_range() {
        let est = estimator_with(&mixed(), UpperBound::Unbounded);
        assert!(matches!(
            est.get_estimate(RewardRange { rmin: 1.0, rmax: 0.0 }),
            Err(OpeError::InvalidRewardRange { .. })
        ));
    }

    #[test]
    fn test_unit_ratios_recover_rewards() {
        for count in [1.0, 10.0, 1000.0, 1e6] {
            let mut est = Estimator::default();
            est.add_example(&[1.0; 3], &[1.0; 3], &[0.3, 0.7, 0.0], count)
                .unwrap();
            let vhat = est.get_estimate(RewardRange::default()).unwrap();
            assert_close(&vhat, &[0.3, 0.7, 0.0], 1e-9);
        }
    }

    #[test]
    fn test_output_length_is_maxstep() {
        let est = estimator_with(&mixed(), UpperBound::Unbounded);
        assert_eq!(est.store().maxstep(), 3);
        assert_eq!(est.get_estimate(RewardRange::default()).unwrap().len(), 3);
    }

    #[test]
    fn test_mixed_trajectories_pinned() {
        let est = estimator_with(&mixed(), UpperBound::Unbounded);
        let vhat = est.get_estimate(RewardRange::default()).unwrap();
        assert_close(
            &vhat,
            &[0.24000000000000005, 0.7340206185567009, 0.6902499999999999],
            1e-12,
        );

        let est = estimator_with(&mixed(), UpperBound::Finite(5.0));
        let vhat = est.get_estimate(RewardRange::default()).unwrap();
        assert_close(
            &vhat,
            &[0.24000000000000005, 0.7340206185567009, 0.6896847595642268],
            1e-12,
        );
    }

    #[test]
    fn test_step_zero_ignores_ratios() {
        // W(0) is the empty product, so step 0 is the plain mean reward.
        let est = estimator_with(&mixed(), UpperBound::Unbounded);
        let vhat = est.get_estimate(RewardRange::default()).unwrap();
        let mean = (3.0 * 0.2 + 2.0 * 0.9 + 5.0 * 0.0) / 10.0;
        assert!((vhat[0] - mean).abs() < 1e-12);
    }

    #[test]
    fn test_current_step_ratio_does_not_weight_its_reward() {
        // Only ratios strictly before a step weight its reward: changing the
        // final ratios leaves every estimate unchanged.
        let changed: Vec<_> = mixed()
            .into_iter()
            .map(|(mut p, r, c)| {
                p[2] = 0.9;
                (p, r, c)
            })
            .collect();

        let a = estimator_with(&mixed(), UpperBound::Unbounded)
            .get_estimate(RewardRange::default())
            .unwrap();
        let b = estimator_with(&changed, UpperBound::Unbounded)
            .get_estimate(RewardRange::default())
            .unwrap();
        assert_eq!(a, b);

        // Changing a step-1 ratio moves the step-2 estimate.
        let mut shifted = mixed();
        shifted[0].0[1] = 1.5;
        let c = estimator_with(&shifted, UpperBound::Unbounded)
            .get_estimate(RewardRange::default())
            .unwrap();
        assert_eq!(a[..2], c[..2]);
        assert!((a[2] - c[2]).abs() > 1e-3);
    }

    #[test]
    fn test_reads_are_idempotent() {
        let est = estimator_with(&mixed(), UpperBound::Finite(5.0));
        let first = est.get_estimate(RewardRange::default()).unwrap();
        let second = est.get_estimate(RewardRange::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_converges_to_weighted_average() {
        let data = |n: f64| {
            vec![
                (vec![0.5, 1.0], vec![0.2, 0.9], n),
                (vec![1.5, 0.5], vec![0.6, 0.3], n),
                (vec![1.0, 2.0], vec![0.4, 0.5], n),
            ]
        };
        let mut est = Estimator::new(0.5, UpperBound::Finite(2.0)).unwrap();
        for (p_preds, rewards, count) in data(1e6) {
            est.add_example(&[1.0, 1.0], &p_preds, &rewards, count)
                .unwrap();
        }
        let vhat = est.get_estimate(RewardRange::default()).unwrap();
        // Σ c·W·r / n at each step.
        let weighted = [0.4, (0.5 * 0.9 + 1.5 * 0.3 + 1.0 * 0.5) / 3.0];
        assert_close(&vhat, &weighted, 1e-6);
    }

    #[test]
    fn test_golden_scenario() {
        let log = golden_scenario();
        let mut est = Estimator::default();
        log.feed(&mut est).unwrap();
        let vhat = est.get_estimate(RewardRange::default()).unwrap();
        assert_close(&vhat, &[0.07909975486564877, 0.088211670451497], 1e-10);

        let mut est = Estimator::new(0.0, UpperBound::Finite(60.0)).unwrap();
        log.feed(&mut est).unwrap();
        let vhat = est.get_estimate(RewardRange::default()).unwrap();
        assert_close(&vhat, &[0.07909975486564877, 0.08815641112758829], 1e-10);
    }

    #[test]
    fn test_unbounded_multipliers() {
        let m = StepMoments {
            n: 4.0,
            sumw: 2.0,
            sumwsq: 3.0,
            sumwr: 1.0,
            sumwsqr: 1.0,
            sumwsqrsq: 1.0,
            sumr: 2.0,
        };
        let (gamma, beta) = dual_multipliers(&m, FakeWeight::Unbounded, 0).unwrap();
        assert_eq!(gamma, -1.25);
        assert_eq!(beta, 0.0);
    }

    #[test]
    fn test_degenerate_variance() {
        // Every weight, fake included, equals 0.5: a² == b.
        let m = StepMoments {
            n: 3.0,
            sumw: 1.5,
            sumwsq: 0.75,
            sumwr: 0.0,
            sumwsqr: 0.0,
            sumwsqrsq: 0.0,
            sumr: 0.0,
        };
        assert_eq!(
            dual_multipliers(&m, FakeWeight::Finite(0.5), 4).unwrap_err(),
            OpeError::DegenerateVariance { step: 4 }
        );
    }

    #[test]
    fn test_bounded_weights_keep_estimates_in_range() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let rewards = RewardRange::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let mut est = Estimator::new(0.0, UpperBound::Finite(2.0)).unwrap();
            let trajectories = rng.gen_range(1..30);
            for _ in 0..trajectories {
                // p_log >= 0.5 keeps every ratio inside the prior bound.
                let p_logs: Vec<f64> = (0..3).map(|_| rng.gen_range(0.5..1.0)).collect();
                let p_preds: Vec<f64> = (0..3).map(|_| rng.gen_range(0.0..1.0)).collect();
                let r: Vec<f64> = (0..3).map(|_| rng.gen_range(0.0..1.0)).collect();
                let count = rng.gen_range(1..5) as f64;
                est.add_example(&p_logs, &p_preds, &r, count).unwrap();
            }
            assert_eq!(est.store().wmax(), UpperBound::Finite(2.0));

            for v in est.get_estimate(rewards).unwrap() {
                assert!(
                    v >= rewards.rmin - 1e-12 && v <= rewards.rmax + 1e-12,
                    "estimate {v} outside the reward range"
                );
            }
        }
    }

    #[test]
    fn test_large_fake_weight_can_leave_range_on_small_samples() {
        // With wmax = 10 the step-2 fake weight is 1000, which dominates three
        // trajectories. Estimates are never clipped.
        let mut est = Estimator::new(0.0, UpperBound::Finite(10.0)).unwrap();
        est.add_example(&[0.27, 0.42, 0.99], &[0.67, 0.87, 0.56], &[0.43, 0.12, 0.39], 4.0)
            .unwrap();
        est.add_example(&[0.83, 0.42, 0.91], &[0.4, 0.08, 0.97], &[0.07, 0.25, 0.77], 1.0)
            .unwrap();
        est.add_example(&[0.34, 0.16, 0.31], &[0.54, 0.28, 0.64], &[0.25, 0.68, 0.91], 4.0)
            .unwrap();

        let vhat = est.get_estimate(RewardRange::default()).unwrap();
        assert_close(&vhat, &[0.31, 0.5201984893441477, 1.118506699923529], 1e-9);
    }
}
