//! Core trajectory data types used by the estimator and the interval.
//!
//! These types capture what the Cressie-Read machinery needs to know about a
//! logged episode: how often it was observed, the per-step importance weights
//! and the per-step rewards.

use serde::{Deserialize, Serialize};

use crate::error::{OpeError, Result};

// ---------------------------------------------------------------------------
// Weight bounds
// ---------------------------------------------------------------------------

/// Upper bound on any per-step importance weight.
///
/// `Unbounded` is an explicit state rather than `f64::INFINITY`, so the closed
/// form limits of the estimator are selected by matching instead of by
/// floating-point infinity arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpperBound {
    Finite(f64),
    Unbounded,
}

impl UpperBound {
    /// `None` means unbounded.
    pub fn from_option(wmax: Option<f64>) -> Self {
        match wmax {
            Some(w) => Self::Finite(w),
            None => Self::Unbounded,
        }
    }

    pub fn as_option(&self) -> Option<f64> {
        match self {
            Self::Finite(w) => Some(*w),
            Self::Unbounded => None,
        }
    }

    /// Widen the bound so that it covers `ratio`.
    pub fn widen(self, ratio: f64) -> Self {
        match self {
            Self::Finite(w) => Self::Finite(w.max(ratio)),
            Self::Unbounded => Self::Unbounded,
        }
    }

    pub fn covers(&self, ratio: f64) -> bool {
        match self {
            Self::Finite(w) => ratio <= *w,
            Self::Unbounded => true,
        }
    }

    /// The worst-case cumulative weight `wmax^(step+1)` at a decision step.
    pub fn fake_weight(&self, step: usize) -> FakeWeight {
        match self {
            Self::Finite(w) => FakeWeight::power(*w, step),
            Self::Unbounded => FakeWeight::Unbounded,
        }
    }
}

impl Default for UpperBound {
    fn default() -> Self {
        Self::Unbounded
    }
}

impl std::fmt::Display for UpperBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Finite(w) => write!(f, "{w}"),
            Self::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// A hypothetical unobserved cumulative importance weight.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FakeWeight {
    Finite(f64),
    Unbounded,
}

impl FakeWeight {
    /// `base^(step+1)`.
    ///
    /// A power (or its square) that overflows is the same limiting case as an
    /// unbounded weight and is reported as such.
    pub fn power(base: f64, step: usize) -> Self {
        let w = base.powf((step + 1) as f64);
        if w.is_finite() && (w * w).is_finite() {
            Self::Finite(w)
        } else {
            Self::Unbounded
        }
    }
}

// ---------------------------------------------------------------------------
// Stored trajectory
// ---------------------------------------------------------------------------

/// One ingested trajectory: a count and parallel per-step weights and rewards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Example {
    /// How many times this trajectory was observed (always > 0 once stored).
    pub count: f64,
    /// Per-step importance weights `p_pred / p_log`.
    pub ratios: Vec<f64>,
    /// Per-step realised rewards.
    pub rewards: Vec<f64>,
}

impl Example {
    /// Build an example from logging-policy and target-policy probabilities.
    ///
    /// # Errors
    ///
    /// Fails when the sequences differ in length or are empty, when a ratio is
    /// negative or not finite, or when a reward is not finite.
    pub fn from_probabilities(
        p_logs: &[f64],
        p_preds: &[f64],
        rewards: &[f64],
        count: f64,
    ) -> Result<Self> {
        if p_logs.len() != p_preds.len() || p_logs.len() != rewards.len() {
            return Err(OpeError::LengthMismatch {
                p_logs: p_logs.len(),
                p_preds: p_preds.len(),
                rewards: rewards.len(),
            });
        }
        if p_logs.is_empty() {
            return Err(OpeError::EmptyTrajectory);
        }

        let mut ratios = Vec::with_capacity(p_logs.len());
        for (step, (&p_log, &p_pred)) in p_logs.iter().zip(p_preds).enumerate() {
            let ratio = p_pred / p_log;
            if ratio.is_nan() || ratio.is_infinite() {
                return Err(OpeError::NonFiniteWeight {
                    step,
                    p_log,
                    p_pred,
                });
            }
            if ratio < 0.0 {
                return Err(OpeError::NegativeWeight { step, ratio });
            }
            ratios.push(ratio);
        }

        if let Some((step, &reward)) = rewards.iter().enumerate().find(|(_, r)| !r.is_finite()) {
            return Err(OpeError::NonFiniteReward { step, reward });
        }

        Ok(Self {
            count,
            ratios,
            rewards: rewards.to_vec(),
        })
    }

    /// Number of decision steps.
    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }

    /// Smallest and largest importance weight in the trajectory.
    pub fn ratio_range(&self) -> (f64, f64) {
        self.ratios
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &w| {
                (lo.min(w), hi.max(w))
            })
    }
}

// ---------------------------------------------------------------------------
// Logged trajectory record
// ---------------------------------------------------------------------------

fn default_count() -> f64 {
    1.0
}

/// A trajectory as it appears in a log: raw probabilities rather than ratios.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedTrajectory {
    /// Probability of each logged action under the logging policy.
    pub p_logs: Vec<f64>,
    /// Probability of each logged action under the evaluated policy.
    pub p_preds: Vec<f64>,
    /// Reward observed at each step.
    pub rewards: Vec<f64>,
    /// Number of identical observations of this trajectory.
    #[serde(default = "default_count")]
    pub count: f64,
}

impl LoggedTrajectory {
    pub fn new(p_logs: Vec<f64>, p_preds: Vec<f64>, rewards: Vec<f64>, count: f64) -> Self {
        Self {
            p_logs,
            p_preds,
            rewards,
            count,
        }
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }
}
