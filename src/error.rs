//! Error type shared by the trajectory store, the estimator and the interval.
//!
//! Every variant describes input that is inconsistent with the declared weight
//! bounds, reward range or the accumulated data. None of them is recovered
//! inside the library; they surface to the caller as-is.

use thiserror::Error;

/// An invalid-input condition detected while ingesting or evaluating
/// trajectories.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpeError {
    #[error("wmin must lie in [0, 1), got {0}")]
    InvalidMinWeight(f64),

    #[error("wmax must be greater than 1, got {0}")]
    InvalidMaxWeight(f64),

    #[error("alpha must lie in (0, 1), got {0}")]
    InvalidAlpha(f64),

    #[error("invalid reward range [{rmin}, {rmax}]")]
    InvalidRewardRange { rmin: f64, rmax: f64 },

    #[error("invalid count {0}")]
    InvalidCount(f64),

    #[error("trajectory has no steps")]
    EmptyTrajectory,

    #[error(
        "trajectory sequences differ in length: {p_logs} logging probabilities, \
         {p_preds} target probabilities, {rewards} rewards"
    )]
    LengthMismatch {
        p_logs: usize,
        p_preds: usize,
        rewards: usize,
    },

    #[error("negative importance weight {ratio} at step {step}")]
    NegativeWeight { step: usize, ratio: f64 },

    #[error("non-finite importance weight at step {step} (p_log = {p_log}, p_pred = {p_pred})")]
    NonFiniteWeight { step: usize, p_log: f64, p_pred: f64 },

    #[error("non-finite reward {reward} at step {step}")]
    NonFiniteReward { step: usize, reward: f64 },

    #[error("no data point added")]
    NoData,

    #[error("trajectory {index} has {len} steps, step {step} is missing")]
    ShortTrajectory { index: usize, len: usize, step: usize },

    #[error("degenerate importance weight variance at step {step}")]
    DegenerateVariance { step: usize },

    #[error("no feasible dual solution for the {side} bound at step {step}")]
    NoFeasibleBound { step: usize, side: &'static str },

    #[error("F quantile unavailable: {0}")]
    Quantile(String),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, OpeError>;
