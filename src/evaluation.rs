//! One-shot evaluation of a trajectory log.
//!
//! An [`Evaluation`] owns an independent [`Estimator`] and [`Interval`] built
//! from the same [`OpeConfig`], feeds both from a [`TrajectoryLog`], and
//! assembles an [`EvaluationReport`].

use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::OpeConfig;
use crate::cressie_read::{Estimator, Interval};
use crate::error::Result;
use crate::trajectory::{Accumulator, TrajectoryLog, UpperBound};

/// Point estimate and bounds at a single decision step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepReport {
    pub step: usize,
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
}

/// Estimated reward summed over the horizon.
///
/// The bounds are sums of per-step bounds computed at `step_alpha =
/// alpha / steps`, so by the union bound they hold jointly with probability at
/// least `1 - alpha`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CumulativeReward {
    pub estimate: f64,
    pub lower: f64,
    pub upper: f64,
    /// Miscoverage of the summed bounds.
    pub alpha: f64,
    /// Miscoverage used for each per-step bound in the sum.
    pub step_alpha: f64,
}

impl CumulativeReward {
    /// Sum `estimates` and `bounds`, the latter computed at `alpha / steps`.
    fn from_steps(estimates: &[f64], bounds: &[(f64, f64)], alpha: f64) -> Self {
        let steps = estimates.len().max(1) as f64;
        Self {
            estimate: estimates.iter().sum(),
            lower: bounds.iter().map(|b| b.0).sum(),
            upper: bounds.iter().map(|b| b.1).sum(),
            alpha,
            step_alpha: alpha / steps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// UTC timestamp of assembly.
    pub generated_at: DateTime<Utc>,
    /// Number of records ingested (including ones with a non-positive count).
    pub trajectories: usize,
    /// Total positive count `n`.
    pub total_count: f64,
    /// Weight bounds after widening by the observed ratios.
    pub wmin: f64,
    pub wmax: UpperBound,
    pub alpha: f64,
    pub rmin: f64,
    pub rmax: f64,
    /// Per-step rows; each bound holds with probability `1 - alpha` on its
    /// own.
    pub steps: Vec<StepReport>,
    pub cumulative: CumulativeReward,
}

impl EvaluationReport {
    /// Serialize the report to a JSON file at the given path.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize evaluation report to JSON")?;
        std::fs::write(path.as_ref(), json).with_context(|| {
            format!(
                "Failed to write evaluation report to {}",
                path.as_ref().display()
            )
        })?;
        tracing::info!(path = %path.as_ref().display(), "Saved evaluation report");
        Ok(())
    }
}

/// Paired estimator and interval sharing one configuration.
#[derive(Debug, Clone)]
pub struct Evaluation {
    config: OpeConfig,
    estimator: Estimator,
    interval: Interval,
    trajectories: usize,
}

impl Evaluation {
    /// Validate the configuration and build empty accumulators.
    pub fn new(config: OpeConfig) -> Result<Self> {
        config.validate()?;
        let wmax = config.weights.upper_bound();
        Ok(Self {
            estimator: Estimator::new(config.weights.wmin, wmax)?,
            interval: Interval::new(config.weights.wmin, wmax)?,
            config,
            trajectories: 0,
        })
    }

    /// Ingest every record of `log` into both accumulators.
    pub fn feed(&mut self, log: &TrajectoryLog) -> Result<()> {
        log.feed(&mut self.estimator)?;
        log.feed(&mut self.interval)?;
        self.trajectories += log.len();
        Ok(())
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    /// Compute estimates and bounds for every step.
    pub fn report(&self) -> Result<EvaluationReport> {
        let rewards = self.config.rewards;
        let alpha = self.config.interval.alpha;

        let estimates = self.estimator.get_estimate(rewards)?;
        let bounds = self.interval.get_interval(alpha, rewards)?;

        let steps: Vec<StepReport> = estimates
            .iter()
            .zip(&bounds)
            .enumerate()
            .map(|(step, (&estimate, &(lower, upper)))| StepReport {
                step,
                estimate,
                lower,
                upper,
            })
            .collect();

        // Simultaneous coverage over the horizon needs the per-step
        // miscoverage split across steps.
        let step_alpha = alpha / estimates.len().max(1) as f64;
        let joint_bounds = if estimates.len() > 1 {
            self.interval.get_interval(step_alpha, rewards)?
        } else {
            bounds.clone()
        };
        let cumulative = CumulativeReward::from_steps(&estimates, &joint_bounds, alpha);

        let store = self.estimator.store();
        let report = EvaluationReport {
            generated_at: Utc::now(),
            trajectories: self.trajectories,
            total_count: store.total_count(),
            wmin: store.wmin(),
            wmax: store.wmax(),
            alpha,
            rmin: rewards.rmin,
            rmax: rewards.rmax,
            steps,
            cumulative,
        };

        tracing::info!(
            trajectories = report.trajectories,
            total_count = report.total_count,
            steps = report.steps.len(),
            alpha,
            "Assembled evaluation report"
        );
        Ok(report)
    }

    /// Build, feed and report in one call.
    pub fn run(config: &OpeConfig, log: &TrajectoryLog) -> Result<EvaluationReport> {
        let mut evaluation = Self::new(config.clone())?;
        evaluation.feed(log)?;
        evaluation.report()
    }
}
