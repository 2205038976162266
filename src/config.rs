//! Pipeline configuration
//!
//! Every field has a default, so `{}` is a valid config file.
//!
//! ```json
//! {
//!   "batch_count": 8,
//!   "threshold_grid": { "min": 40.0, "max": 120.0, "step": 5.0 },
//!   "true_positive_gain": 300.0,
//!   "outcome_overrides": ["ABCD"]
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::correlation::{AnalyzerBuilder, AnalyzerConfig, CorrelationAnalyzer};
use crate::params::{ThresholdGrid, MIN_SAMPLE, TRUE_POSITIVE_GAIN};
use crate::{io, BatchCount, PipelineError, Result};

/// Price history fetched after entry when recomputing a catalyst date
pub const DEFAULT_LOOKBACK_DAYS: u32 = 365;

fn default_lookback_days() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

fn default_min_sample() -> usize {
    MIN_SAMPLE.default as usize
}

fn default_true_positive_gain() -> f64 {
    TRUE_POSITIVE_GAIN.default
}

/// Settings for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub batch_count: BatchCount,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Explicit thresholds; mutually exclusive with `threshold_grid`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thresholds: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold_grid: Option<ThresholdGrid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<String>>,
    #[serde(default = "default_min_sample")]
    pub min_sample: usize,
    #[serde(default = "default_true_positive_gain")]
    pub true_positive_gain: f64,
    /// Tickers whose outcome was overridden by manual review
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub outcome_overrides: BTreeSet<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_count: BatchCount::default(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            thresholds: None,
            threshold_grid: None,
            components: None,
            min_sample: default_min_sample(),
            true_positive_gain: default_true_positive_gain(),
            outcome_overrides: BTreeSet::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let config: Self = io::read_json(path)?;
        log::info!("loaded pipeline config from {}", path.display());
        Ok(config)
    }

    /// Analyzer settings described by this config
    pub fn analyzer_config(&self) -> Result<AnalyzerConfig> {
        let defaults = AnalyzerConfig::default();
        let thresholds = match (&self.thresholds, &self.threshold_grid) {
            (Some(_), Some(_)) => {
                return Err(PipelineError::InvalidArgument(
                    "set either `thresholds` or `threshold_grid`, not both".into(),
                ))
            }
            (Some(list), None) => list.clone(),
            (None, Some(grid)) => {
                grid.validate()?;
                grid.values()
            }
            (None, None) => defaults.thresholds,
        };
        Ok(AnalyzerConfig {
            thresholds,
            components: self.components.clone().unwrap_or(defaults.components),
            min_sample: self.min_sample,
            true_positive_gain: self.true_positive_gain,
            excluded_tickers: self.outcome_overrides.clone(),
        })
    }

    /// Build the configured analyzer
    pub fn analyzer(&self) -> Result<CorrelationAnalyzer> {
        AnalyzerBuilder::from_config(self.analyzer_config()?).build()
    }
}

// ============================================================
// TESTS
// ============================================================
