//! pdcr: Per-Decision Cressie-Read Off-Policy Evaluation
//!
//! Estimates the per-step expected reward of a target policy from trajectories
//! logged under a different policy, together with finite-sample confidence
//! bounds, using closed-form empirical-likelihood duals of the order -2
//! Cressie-Read divergence.

pub mod config;
pub mod cressie_read;
pub mod error;
pub mod evaluation;
pub mod trajectory;

pub use config::OpeConfig;
pub use cressie_read::{Estimator, Interval, RewardRange};
pub use error::{OpeError, Result};
pub use evaluation::{Evaluation, EvaluationReport};
pub use trajectory::{Accumulator, TrajectoryLog, UpperBound};
