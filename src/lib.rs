//! # Surgescan - explosive-stock backtest pipeline
//!
//! Offline batch analysis for a stock-screening backtest: cut a universe of
//! candidates into balanced batches, reconcile catalyst dates against price
//! history, merge the per-batch analysis results and measure which patterns
//! and score thresholds predict an explosive move.
//!
//! ## Quick Start
//!
//! ```rust
//! use surgescan::prelude::*;
//! use chrono::NaiveDate;
//!
//! let entry = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap();
//! let stocks: Vec<StockRecord> = ["AAA", "BBB", "CCC"]
//!     .iter()
//!     .map(|t| StockRecord::new(*t, entry))
//!     .collect();
//!
//! // Fan the universe out into independent work units
//! let batches = partition(&stocks, 2).unwrap();
//! assert_eq!(batches.len(), 2);
//!
//! // ... external jobs analyze each batch and produce BatchResults ...
//! let results: Vec<BatchResult> = batches
//!     .iter()
//!     .map(|b| BatchResult::new(b.batch_id, b.stocks.iter().cloned().map(AnalyzedStock::complete).collect()))
//!     .collect();
//!
//! let merged = merge(results).unwrap();
//! let matrix = analyze(&merged, &[50.0, 75.0, 100.0]).unwrap();
//! let report = render_report(&matrix);
//! assert!(report.contains("Executive Summary"));
//! ```

pub mod catalyst;
pub mod config;
pub mod correlation;
pub mod io;
pub mod merge;
pub mod params;
pub mod partition;
pub mod record;
pub mod report;
pub mod tally;

pub mod prelude {
    pub use crate::{
        // Catalyst reconciliation
        catalyst::{
            flag_integrity, needs_recompute, reconcile, reconcile_universe, repair, validate,
            ClosePrice, DailyBar, PriceSource, Reconciled, ReconcileReport, RecomputeReason,
        },
        // Configuration
        config::PipelineConfig,
        // Correlation analysis
        correlation::{
            analyze, AnalyzerBuilder, AnalyzerConfig, CorrelationAnalyzer, CorrelationMatrix,
            GainTier, KeyFindings, PatternCorrelation, ThresholdStat,
        },
        // Merge
        merge::{merge, BatchSummary, MergedDataset, Merger, MergerBuilder, PatternFrequency},
        // Parameters
        params::{ParamMeta, ThresholdGrid},
        // Partitioning
        partition::{
            partition, partition_with_metadata, split_balanced, Batch, BatchManifest, ManifestEntry,
        },
        // Records
        record::{
            AnalysisStatus, AnalyzedStock, BatchResult, CatalystStatus, PatternGroups, StockRecord,
        },
        // Report
        report::render as render_report,
        // Tallies
        tally::{BuiltinTally, TallyRule},
        // Types
        BatchCount,
        // Errors
        IntegrityError,
        PipelineError,
        Result,
    };
}

use chrono::NaiveDate;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline stage
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No batch results to merge")]
    NoInput,

    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Per-record data integrity violations.
///
/// These never abort a stage: the offending record is flagged and left out of
/// downstream statistics.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("catalyst date {catalyst} precedes entry date {entry}")]
    DateOrder { entry: NaiveDate, catalyst: NaiveDate },

    #[error("{field} {date} is later than run date {today}")]
    FutureDate {
        field: &'static str,
        date: NaiveDate,
        today: NaiveDate,
    },

    #[error("catalyst year {catalyst_year} does not match discovery year {year_discovered}")]
    YearMismatch {
        catalyst_year: i32,
        year_discovered: i32,
    },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Number of batches to cut (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BatchCount(usize);

impl BatchCount {
    /// Create a new BatchCount, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(PipelineError::InvalidArgument(
                "batch count must be > 0".to_string(),
            ));
        }
        Ok(Self(value))
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for BatchCount {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for BatchCount {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        BatchCount::new(value).map_err(serde::de::Error::custom)
    }
}

impl Default for BatchCount {
    fn default() -> Self {
        Self(4)
    }
}

// ============================================================
// NUMERIC HELPERS
// ============================================================

/// Round to one decimal place, the precision used for reported percentages.
#[inline]
pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Arithmetic mean, `None` for an empty input.
pub(crate) fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_count_validation() {
        assert!(BatchCount::new(1).is_ok());
        assert!(BatchCount::new(50).is_ok());
        assert!(matches!(
            BatchCount::new(0),
            Err(PipelineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_batch_count_serde() {
        let count: BatchCount = serde_json::from_str("8").unwrap();
        assert_eq!(count.get(), 8);
        assert!(serde_json::from_str::<BatchCount>("0").is_err());
    }

    #[test]
    fn test_round1() {
        assert_eq!(round1(33.333), 33.3);
        assert_eq!(round1(66.666), 66.7);
        assert_eq!(round1(0.0), 0.0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean([2.0, 4.0]), Some(3.0));
        assert_eq!(mean(std::iter::empty()), None);
    }

    #[test]
    fn test_integrity_error_display() {
        let err = IntegrityError::YearMismatch {
            catalyst_year: 2021,
            year_discovered: 2023,
        };
        assert_eq!(
            err.to_string(),
            "catalyst year 2021 does not match discovery year 2023"
        );
    }
}
