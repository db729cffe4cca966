//! Per-decision Cressie-Read (order -2) off-policy evaluation.
//!
//! Both accumulators take logged trajectories and, for every decision step,
//! solve the empirical-likelihood dual in closed form:
//!
//! - [`Estimator`] -- a bias-corrected point estimate of the expected reward.
//! - [`Interval`] -- a finite-sample confidence bound pair, with the
//!   threshold taken from the upper-`alpha` quantile of F(1, n).
//!
//! The step-`s` reward is weighted by the product of the ratios strictly
//! before step `s`. Unobserved probability mass is assigned a worst-case
//! "fake" weight `wmin^(s+1)` or `wmax^(s+1)`.

pub mod estimator;
pub mod interval;
pub mod moments;
pub mod quantile;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{OpeError, Result};
use crate::trajectory::TrajectoryStore;

pub use estimator::Estimator;
pub use interval::Interval;
pub use moments::{step_moments, StepMoments};
pub use quantile::f_upper_quantile;

/// Default one-sided miscoverage probability.
pub const DEFAULT_ALPHA: f64 = 0.05;

/// A-priori bounds on any single-step reward.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardRange {
    pub rmin: f64,
    pub rmax: f64,
}

impl RewardRange {
    pub fn new(rmin: f64, rmax: f64) -> Result<Self> {
        let range = Self { rmin, rmax };
        range.validate()?;
        Ok(range)
    }

    /// Both ends finite and `rmin < rmax`.
    pub fn validate(&self) -> Result<()> {
        if !self.rmin.is_finite() || !self.rmax.is_finite() || self.rmin >= self.rmax {
            return Err(OpeError::InvalidRewardRange {
                rmin: self.rmin,
                rmax: self.rmax,
            });
        }
        Ok(())
    }

    pub fn contains(&self, r: f64) -> bool {
        (self.rmin..=self.rmax).contains(&r)
    }

    /// Clip `v` into the range. A NaN clips to `rmin`.
    pub fn clamp(&self, v: f64) -> f64 {
        self.rmax.min(self.rmin.max(v))
    }
}

impl Default for RewardRange {
    fn default() -> Self {
        Self {
            rmin: 0.0,
            rmax: 1.0,
        }
    }
}

/// Warn once per read when stored rewards fall outside the declared range.
pub(crate) fn warn_out_of_range(store: &TrajectoryStore, rewards: &RewardRange) {
    let outside = store
        .examples()
        .iter()
        .flat_map(|e| e.rewards.iter())
        .filter(|&&r| !rewards.contains(r))
        .count();
    if outside > 0 {
        warn!(
            outside,
            rmin = rewards.rmin,
            rmax = rewards.rmax,
            "rewards outside the declared range"
        );
    }
}
