//! Append-only trajectory storage with running weight-bound bookkeeping.
//!
//! Each accumulator ([`Estimator`](crate::cressie_read::Estimator),
//! [`Interval`](crate::cressie_read::Interval)) owns its own
//! [`TrajectoryStore`]; stores are never shared.

use tracing::debug;

use crate::error::{OpeError, Result};

use super::types::{Example, UpperBound};

/// Ingested trajectories plus the bounds every observed ratio lies within.
///
/// Invariant: `wmin <= ratio <= wmax` for every stored ratio. The bounds start
/// at the caller's priors and widen whenever a trajectory falls outside them.
#[derive(Debug, Clone)]
pub struct TrajectoryStore {
    examples: Vec<Example>,
    wmin: f64,
    wmax: UpperBound,
    maxstep: usize,
}

impl TrajectoryStore {
    /// Create an empty store with prior weight bounds.
    ///
    /// # Errors
    ///
    /// `wmin` must lie in `[0, 1)` and a finite `wmax` must exceed 1.
    pub fn new(wmin: f64, wmax: UpperBound) -> Result<Self> {
        if !(0.0..1.0).contains(&wmin) {
            return Err(OpeError::InvalidMinWeight(wmin));
        }
        if let UpperBound::Finite(w) = wmax {
            if w.is_nan() || w <= 1.0 {
                return Err(OpeError::InvalidMaxWeight(w));
            }
        }
        Ok(Self {
            examples: Vec::new(),
            wmin,
            wmax,
            maxstep: 0,
        })
    }

    /// Convert probabilities to ratios and store the trajectory.
    ///
    /// A non-positive `count` is "no observation" and leaves the store
    /// untouched, whatever the sequences contain.
    pub fn add_example(
        &mut self,
        p_logs: &[f64],
        p_preds: &[f64],
        rewards: &[f64],
        count: f64,
    ) -> Result<()> {
        if count.is_nan() || count.is_infinite() {
            return Err(OpeError::InvalidCount(count));
        }
        if count <= 0.0 {
            debug!(count, "dropping trajectory with non-positive count");
            return Ok(());
        }
        let example = Example::from_probabilities(p_logs, p_preds, rewards, count)?;
        self.push(example);
        Ok(())
    }

    /// Append an already validated example, widening the bounds as needed.
    fn push(&mut self, example: Example) {
        let (lo, hi) = example.ratio_range();
        self.wmin = self.wmin.min(lo);
        self.wmax = self.wmax.widen(hi);
        self.maxstep = self.maxstep.max(example.len());
        self.examples.push(example);
    }

    /// Number of stored trajectories.
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    /// Total count `n` over all stored trajectories.
    pub fn total_count(&self) -> f64 {
        self.examples.iter().map(|e| e.count).sum()
    }

    pub fn wmin(&self) -> f64 {
        self.wmin
    }

    pub fn wmax(&self) -> UpperBound {
        self.wmax
    }

    /// Length of the longest stored trajectory.
    pub fn maxstep(&self) -> usize {
        self.maxstep
    }

    pub fn examples(&self) -> &[Example] {
        &self.examples
    }
}

impl Default for TrajectoryStore {
    fn default() -> Self {
        Self {
            examples: Vec::new(),
            wmin: 0.0,
            wmax: UpperBound::Unbounded,
            maxstep: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Accumulator trait
// ---------------------------------------------------------------------------

/// Anything that ingests trajectories into a [`TrajectoryStore`] it owns.
///
/// Lets a [`TrajectoryLog`](super::TrajectoryLog) feed estimators and
/// intervals uniformly.
pub trait Accumulator {
    fn store(&self) -> &TrajectoryStore;

    fn store_mut(&mut self) -> &mut TrajectoryStore;

    /// Ingest one trajectory. `count` defaults to 1 at the log level.
    fn add_example(
        &mut self,
        p_logs: &[f64],
        p_preds: &[f64],
        rewards: &[f64],
        count: f64,
    ) -> Result<()> {
        self.store_mut().add_example(p_logs, p_preds, rewards, count)
    }
}
