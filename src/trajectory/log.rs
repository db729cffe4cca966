//! A list of logged trajectories that can be persisted and replayed into
//! accumulators.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::store::Accumulator;
use super::types::LoggedTrajectory;

/// Logged trajectories in ingestion order.
///
/// Serialized as a plain JSON array of [`LoggedTrajectory`] records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrajectoryLog {
    trajectories: Vec<LoggedTrajectory>,
}

impl TrajectoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, trajectory: LoggedTrajectory) {
        self.trajectories.push(trajectory);
    }

    pub fn len(&self) -> usize {
        self.trajectories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trajectories.is_empty()
    }

    pub fn as_slice(&self) -> &[LoggedTrajectory] {
        &self.trajectories
    }

    /// Sum of the counts of all records, including non-positive ones.
    pub fn raw_count(&self) -> f64 {
        self.trajectories.iter().map(|t| t.count).sum()
    }

    /// Ingest every record into `acc`, stopping at the first invalid one.
    pub fn feed<A: Accumulator>(&self, acc: &mut A) -> crate::error::Result<()> {
        for t in &self.trajectories {
            acc.add_example(&t.p_logs, &t.p_preds, &t.rewards, t.count)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Serialize the log to a JSON file at the given path.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize trajectory log to JSON")?;
        std::fs::write(path.as_ref(), json).with_context(|| {
            format!(
                "Failed to write trajectory log to {}",
                path.as_ref().display()
            )
        })?;
        tracing::info!(
            path = %path.as_ref().display(),
            trajectories = self.len(),
            "Saved trajectory log"
        );
        Ok(())
    }

    /// Deserialize a log from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "Failed to read trajectory log from {}",
                path.as_ref().display()
            )
        })?;
        let log: Self =
            serde_json::from_str(&data).context("Failed to deserialize trajectory log JSON")?;
        tracing::info!(
            path = %path.as_ref().display(),
            trajectories = log.len(),
            "Loaded trajectory log"
        );
        Ok(log)
    }
}

impl FromIterator<LoggedTrajectory> for TrajectoryLog {
    fn from_iter<I: IntoIterator<Item = LoggedTrajectory>>(iter: I) -> Self {
        Self {
            trajectories: iter.into_iter().collect(),
        }
    }
}

/// The twelve `(count, p_pred, reward)` groups of the reference scenario, each
/// logged as a two-step trajectory with `p_log = 1` and the same target
/// probability and reward at both steps.
pub fn golden_scenario() -> TrajectoryLog {
    const GROUPS: [(f64, f64, f64); 12] = [
        (41332.0, 0.0, 0.0),
        (1958.0, 0.0, 1.0),
        (17763.0, 1.0, 0.0),
        (1339.0, 1.0, 1.0),
        (30726.0, 1.0344828, 0.0),
        (3867.0, 1.0344828, 1.0),
        (2034.0, 1.0447762, 1.0),
        (16728.0, 1.0447762, 0.0),
        (40629.0, 1.0497237, 0.0),
        (3445.0, 1.0497237, 1.0),
        (85.0, 59.999996, 0.0),
        (6.0, 59.999996, 1.0),
    ];

    GROUPS
        .iter()
        .map(|&(count, p_pred, reward)| {
            LoggedTrajectory::new(vec![1.0; 2], vec![p_pred; 2], vec![reward; 2], count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TrajectoryStore;

    struct Plain(TrajectoryStore);

    impl Accumulator for Plain {
        fn store(&self) -> &TrajectoryStore {
            &self.0
        }

        fn store_mut(&mut self) -> &mut TrajectoryStore {
            &mut self.0
        }
    }

    #[test]
    fn test_golden_scenario_shape() {
        let log = golden_scenario();
        assert_eq!(log.len(), 12);
        assert_eq!(log.raw_count(), 159912.0);
        assert!(log.as_slice().iter().all(|t| t.len() == 2));
    }

    #[test]
    fn test_feed_ingests_every_record() {
        let log = golden_scenario();
        let mut acc = Plain(TrajectoryStore::default());
        log.feed(&mut acc).unwrap();
        assert_eq!(acc.store().len(), 12);
        assert_eq!(acc.store().maxstep(), 2);
        assert_eq!(acc.store().total_count(), 159912.0);
    }

    #[test]
    fn test_feed_stops_at_invalid_record() {
        let mut log = TrajectoryLog::new();
        log.push(LoggedTrajectory::new(vec![1.0], vec![1.0], vec![0.0], 1.0));
        log.push(LoggedTrajectory::new(vec![1.0], vec![-1.0], vec![0.0], 1.0));
        log.push(LoggedTrajectory::new(vec![1.0], vec![1.0], vec![0.0], 1.0));

        let mut acc = Plain(TrajectoryStore::default());
        assert!(log.feed(&mut acc).is_err());
        assert_eq!(acc.store().len(), 1);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let log = golden_scenario();
        let tmp = std::env::temp_dir().join("pdcr_test_log.json");
        log.save_to_file(&tmp).unwrap();
        let loaded = TrajectoryLog::load_from_file(&tmp).unwrap();
        assert_eq!(loaded, log);
        std::fs::remove_file(tmp).ok();
    }

    #[test]
    fn test_load_missing_file_has_context() {
        let err = TrajectoryLog::load_from_file("/nonexistent/pdcr/log.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read trajectory log"));
    }

    #[test]
    fn test_parses_plain_array() {
        let json = r#"[{"p_logs": [0.5], "p_preds": [0.25], "rewards": [1.0], "count": 4}]"#;
        let log: TrajectoryLog = serde_json::from_str(json).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.as_slice()[0].count, 4.0);
    }
}
