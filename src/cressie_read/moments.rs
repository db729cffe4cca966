//! Per-step weighted moments of the stored trajectories.
//!
//! The weight paired with the reward at step `s` is the product of the first
//! `s` ratios of the trajectory, i.e. the ratios strictly before the step.
//! At `s = 0` it is the empty product 1.

use crate::error::{OpeError, Result};
use crate::trajectory::{FakeWeight, TrajectoryStore};

/// Neumaier-compensated running sum.
#[derive(Debug, Clone, Copy, Default)]
struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    fn add(&mut self, x: f64) {
        let t = self.sum + x;
        if self.sum.abs() >= x.abs() {
            self.compensation += (self.sum - t) + x;
        } else {
            self.compensation += (x - t) + self.sum;
        }
        self.sum = t;
    }

    fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

/// Count-weighted sums at a single decision step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepMoments {
    /// Total count `n`.
    pub n: f64,
    /// `Σ c·W`
    pub sumw: f64,
    /// `Σ c·W²`
    pub sumwsq: f64,
    /// `Σ c·W·r`
    pub sumwr: f64,
    /// `Σ c·W²·r`
    pub sumwsqr: f64,
    /// `Σ c·W²·r²`
    pub sumwsqrsq: f64,
    /// `Σ c·r`
    pub sumr: f64,
}

impl StepMoments {
    /// The fake weight on the side where observed weight mass is deficient:
    /// `wmax^(step+1)` when `sumw < n`, otherwise `wmin^(step+1)`.
    pub fn deficient_fake_weight(&self, store: &TrajectoryStore, step: usize) -> FakeWeight {
        if self.sumw < self.n {
            store.wmax().fake_weight(step)
        } else {
            FakeWeight::power(store.wmin(), step)
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct StepSums {
    sumw: CompensatedSum,
    sumwsq: CompensatedSum,
    sumwr: CompensatedSum,
    sumwsqr: CompensatedSum,
    sumwsqrsq: CompensatedSum,
    sumr: CompensatedSum,
}

impl StepSums {
    fn push(&mut self, c: f64, w: f64, r: f64) {
        let wsq = w.powi(2);
        self.sumw.add(c * w);
        self.sumwsq.add(c * wsq);
        self.sumwr.add(c * w * r);
        self.sumwsqr.add(c * wsq * r);
        self.sumwsqrsq.add(c * wsq * r.powi(2));
        self.sumr.add(c * r);
    }

    fn finish(&self, n: f64) -> StepMoments {
        StepMoments {
            n,
            sumw: self.sumw.value(),
            sumwsq: self.sumwsq.value(),
            sumwr: self.sumwr.value(),
            sumwsqr: self.sumwsqr.value(),
            sumwsqrsq: self.sumwsqrsq.value(),
            sumr: self.sumr.value(),
        }
    }
}

/// Compute the moments of every step `0..maxstep` in one pass over the store.
///
/// # Errors
///
/// Fails with [`OpeError::NoData`] when the total count is zero, and with
/// [`OpeError::ShortTrajectory`] when a trajectory has no reward at some step
/// below `maxstep`.
pub fn step_moments(store: &TrajectoryStore) -> Result<Vec<StepMoments>> {
    let mut total = CompensatedSum::default();
    for ex in store.examples() {
        total.add(ex.count);
    }
    let n = total.value();
    if n.is_nan() || n <= 0.0 {
        return Err(OpeError::NoData);
    }

    let maxstep = store.maxstep();
    let mut sums = vec![StepSums::default(); maxstep];

    for (index, ex) in store.examples().iter().enumerate() {
        if ex.len() < maxstep {
            return Err(OpeError::ShortTrajectory {
                index,
                len: ex.len(),
                step: ex.len(),
            });
        }

        let mut w = 1.0;
        for (step, acc) in sums.iter_mut().enumerate() {
            acc.push(ex.count, w, ex.rewards[step]);
            w *= ex.ratios[step];
        }
    }

    Ok(sums.iter().map(|s| s.finish(n)).collect())
}
