use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cressie_read::{RewardRange, DEFAULT_ALPHA};
use crate::error::OpeError;
use crate::trajectory::{TrajectoryStore, UpperBound};

/// Complete configuration for an off-policy evaluation run.
///
/// Every section may be omitted from a JSON file; missing fields take their
/// defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpeConfig {
    pub weights: WeightPriors,
    pub rewards: RewardRange,
    pub interval: IntervalConfig,
}

/// Prior bounds on any single-step importance ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightPriors {
    /// Lower bound, in `[0, 1)` (default: 0.0).
    pub wmin: f64,
    /// Upper bound, greater than 1; `None` means unbounded (default: None).
    pub wmax: Option<f64>,
}

/// Confidence interval configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntervalConfig {
    /// One-sided miscoverage probability, in `(0, 1)` (default: 0.05).
    pub alpha: f64,
}

impl Default for WeightPriors {
    fn default() -> Self {
        Self {
            wmin: 0.0,
            wmax: None,
        }
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_ALPHA,
        }
    }
}

impl WeightPriors {
    pub fn upper_bound(&self) -> UpperBound {
        UpperBound::from_option(self.wmax)
    }
}

impl OpeConfig {
    /// Read a JSON configuration file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Check every field against the rules the accumulators enforce.
    pub fn validate(&self) -> crate::error::Result<()> {
        TrajectoryStore::new(self.weights.wmin, self.weights.upper_bound())?;
        self.rewards.validate()?;
        let alpha = self.interval.alpha;
        if alpha.is_nan() || alpha <= 0.0 || alpha >= 1.0 {
            return Err(OpeError::InvalidAlpha(alpha));
        }
        Ok(())
    }
}
