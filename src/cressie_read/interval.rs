//! Finite-sample per-step confidence intervals.
//!
//! Each bound is the optimum of a Cressie-Read empirical-likelihood dual
//! whose constraint level is set by `Delta`, the upper-`alpha` quantile of
//! F(1, n):
//!
//!   phi = (-uncgstar - Delta) / (2 (1 + n))
//!
//! The dual is solved in closed form once per candidate fake weight
//! (`wmin^(s+1)` and `wmax^(s+1)`), and the bound is the minimum over the
//! feasible candidates. An unbounded candidate uses the limiting form of the
//! solution.

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::error::{OpeError, Result};
use crate::trajectory::{Accumulator, FakeWeight, TrajectoryStore, UpperBound};

use super::moments::{step_moments, StepMoments};
use super::quantile::f_upper_quantile;
use super::{warn_out_of_range, RewardRange};

/// `|y·z|` at or below this is treated as exactly zero before the square
/// roots are taken.
pub const ZERO_TOLERANCE: f64 = 1e-9;

/// Accumulates trajectories and produces one `(lower, upper)` pair per step.
#[derive(Debug, Clone, Default)]
pub struct Interval {
    store: TrajectoryStore,
}

impl Interval {
    /// Create an interval with prior bounds on any per-step importance
    /// weight. See [`Estimator::new`](super::Estimator::new).
    pub fn new(wmin: f64, wmax: UpperBound) -> Result<Self> {
        Ok(Self {
            store: TrajectoryStore::new(wmin, wmax)?,
        })
    }

    /// Per-step `(lower, upper)` bounds, each clipped into `rewards`.
    ///
    /// `alpha` is the one-sided miscoverage probability; a smaller `alpha`
    /// gives a wider interval.
    ///
    /// # Errors
    ///
    /// Fails on an invalid `alpha` or reward range, with no data, when the
    /// observed weights have no variance, or when neither dual candidate is
    /// feasible for some bound.
    pub fn get_interval(&self, alpha: f64, rewards: RewardRange) -> Result<Vec<(f64, f64)>> {
        if alpha.is_nan() || alpha <= 0.0 || alpha >= 1.0 {
            return Err(OpeError::InvalidAlpha(alpha));
        }
        rewards.validate()?;
        let moments = step_moments(&self.store)?;
        warn_out_of_range(&self.store, &rewards);

        let Some(n) = moments.first().map(|m| m.n) else {
            return Ok(Vec::new());
        };
        let delta = f_upper_quantile(alpha, 1.0, n)?;

        let mut bounds = Vec::with_capacity(moments.len());
        for (step, m) in moments.iter().enumerate() {
            let uncwfake = m.deficient_fake_weight(&self.store, step);
            let uncgstar = uncentered_statistic(m, uncwfake, step)?;
            let phi = (-uncgstar - delta) / (2.0 * (1.0 + n));

            let lower = self.bound(m, step, phi, Side::Lower, &rewards)?;
            let upper = self.bound(m, step, phi, Side::Upper, &rewards)?;

            debug!(step, n, delta, uncgstar, phi, lower, upper, "cressie-read step interval");
            bounds.push((lower, upper));
        }
        Ok(bounds)
    }

    /// One clipped bound: the minimum over the feasible candidates.
    fn bound(
        &self,
        m: &StepMoments,
        step: usize,
        phi: f64,
        side: Side,
        rewards: &RewardRange,
    ) -> Result<f64> {
        let r = side.reward(rewards);
        let sign = side.sign();
        let fake_weights = [
            FakeWeight::power(self.store.wmin(), step),
            self.store.wmax().fake_weight(step),
        ];

        let best = fake_weights
            .iter()
            .filter_map(|&wfake| match wfake {
                FakeWeight::Unbounded => unbounded_candidate(m, phi, r, sign),
                FakeWeight::Finite(w) => bounded_candidate(m, phi, w, r, sign),
            })
            .map(OrderedFloat)
            .min()
            .ok_or(OpeError::NoFeasibleBound {
                step,
                side: side.name(),
            })?;

        Ok(rewards.clamp(sign * best.into_inner()))
    }
}

impl Accumulator for Interval {
    fn store(&self) -> &TrajectoryStore {
        &self.store
    }

    fn store_mut(&mut self) -> &mut TrajectoryStore {
        &mut self.store
    }
}

// ---------------------------------------------------------------------------
// Dual solutions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Lower,
    Upper,
}

impl Side {
    fn sign(self) -> f64 {
        match self {
            Side::Lower => 1.0,
            Side::Upper => -1.0,
        }
    }

    fn reward(self, rewards: &RewardRange) -> f64 {
        match self {
            Side::Lower => rewards.rmin,
            Side::Upper => rewards.rmax,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Side::Lower => "lower",
            Side::Upper => "upper",
        }
    }
}

/// Divergence of the observed weights from their assumed support, ignoring
/// rewards.
fn uncentered_statistic(m: &StepMoments, wfake: FakeWeight, step: usize) -> Result<f64> {
    let n = m.n;
    match wfake {
        FakeWeight::Unbounded => Ok(1.0 + 1.0 / n),
        FakeWeight::Finite(w) => {
            let unca = (w + m.sumw) / (1.0 + n);
            let uncb = (w.powi(2) + m.sumwsq) / (1.0 + n);
            let spread = uncb - unca * unca;
            if spread.is_nan() || spread <= 0.0 {
                return Err(OpeError::DegenerateVariance { step });
            }
            Ok((1.0 + n) * (unca - 1.0).powi(2) / spread)
        }
    }
}

/// Limit of the dual solution as the fake weight grows without bound.
fn unbounded_candidate(m: &StepMoments, phi: f64, r: f64, sign: f64) -> Option<f64> {
    let n = m.n;
    let x = sign * (r + (m.sumwr - m.sumw * r) / n);
    let y = (r * m.sumw - m.sumwr).powi(2) / (n * (1.0 + n))
        - (r.powi(2) * m.sumwsq - 2.0 * r * m.sumwsqr + m.sumwsqrsq) / (1.0 + n);
    let z = phi + 1.0 / (2.0 * n);
    resolve(x, y, z, r, sign)
}

/// Dual solution with the fake weight `w` mixed into the sample.
fn bounded_candidate(m: &StepMoments, phi: f64, w: f64, r: f64, sign: f64) -> Option<f64> {
    let n = m.n;
    let barw = (w + m.sumw) / (1.0 + n);
    let barwsq = (w * w + m.sumwsq) / (1.0 + n);
    let barwr = sign * (w * r + m.sumwr) / (1.0 + n);
    let barwsqr = sign * (w * w * r + m.sumwsqr) / (1.0 + n);
    let barwsqrsq = (w * w * r * r + m.sumwsqrsq) / (1.0 + n);

    let var = barwsq - barw.powi(2);
    if var.is_nan() || var <= 0.0 {
        return None;
    }
    let x = barwr + ((1.0 - barw) * (barwsqr - barw * barwr) / var);
    let y = (barwsqr - barw * barwr).powi(2) / var - (barwsqrsq - barwr.powi(2));
    let z = phi + 0.5 * (1.0 - barw).powi(2) / var;
    resolve(x, y, z, r, sign)
}

/// Feasibility and curvature rule shared by both branches.
///
/// Returns `None` when the candidate is infeasible, `sign * r` when the
/// curvature vanishes, and `x - sqrt(2 y z)` otherwise.
fn resolve(x: f64, y: f64, z: f64, r: f64, sign: f64) -> Option<f64> {
    let y = if (y * z).abs() <= ZERO_TOLERANCE { 0.0 } else { y };
    let feasible = z <= 0.0 && y * z >= 0.0;
    if !feasible {
        return None;
    }
    let kappa = if y * z > 0.0 { (y / (2.0 * z)).sqrt() } else { 0.0 };
    if kappa == 0.0 {
        Some(sign * r)
    } else {
        Some(x - (2.0 * y * z).sqrt())
    }
}
