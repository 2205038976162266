//! Merge independently produced batch results into one dataset
//!
//! The merge is a pure reduction: results are sorted by `batch_id` and folded
//! into an accumulator that is consumed and returned at each step. Nothing is
//! shared between folds, so re-running a merge over the same results yields an
//! identical dataset regardless of the order the batch jobs finished in.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::record::{AnalyzedStock, BatchResult};
use crate::tally::{BuiltinTally, TallyRule};
use crate::{round1, PipelineError, Result};

// ============================================================
// OUTPUT TYPES
// ============================================================

/// Occurrence count of one pattern across complete analyses
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatternFrequency {
    pub count: usize,
    /// `count / successful_analyses * 100`, one decimal; 0 when nothing succeeded
    pub frequency_percent: f64,
}

/// Per-batch counts kept for auditability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_id: u32,
    pub stocks_count: usize,
    pub successful: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub missing: bool,
}

/// Canonical aggregate of all batch results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedDataset {
    pub total_stocks: usize,
    pub successful_analyses: usize,
    pub failed_analyses: usize,
    pub all_stocks: Vec<AnalyzedStock>,
    pub pattern_summary: BTreeMap<String, PatternFrequency>,
    pub batch_summaries: Vec<BatchSummary>,
}

impl MergedDataset {
    /// Both count invariants hold: success + failure == total, and the batch
    /// summaries add up to the total.
    pub fn is_consistent(&self) -> bool {
        let summed: usize = self.batch_summaries.iter().map(|b| b.stocks_count).sum();
        self.successful_analyses + self.failed_analyses == self.total_stocks
            && summed == self.total_stocks
            && self.all_stocks.len() == self.total_stocks
    }

    /// Ids of batches whose results never arrived
    pub fn missing_batches(&self) -> Vec<u32> {
        self.batch_summaries
            .iter()
            .filter(|b| b.missing)
            .map(|b| b.batch_id)
            .collect()
    }

    /// Complete analyses only
    pub fn complete_stocks(&self) -> impl Iterator<Item = &AnalyzedStock> {
        self.all_stocks.iter().filter(|s| s.is_complete())
    }
}

// ============================================================
// ACCUMULATOR
// ============================================================

struct MergeAccumulator {
    successful: usize,
    failed: usize,
    all_stocks: Vec<AnalyzedStock>,
    counts: Vec<usize>,
    summaries: Vec<BatchSummary>,
}

impl MergeAccumulator {
    fn new(rule_count: usize) -> Self {
        Self {
            successful: 0,
            failed: 0,
            all_stocks: Vec::new(),
            counts: vec![0; rule_count],
            summaries: Vec::new(),
        }
    }

    fn absorb(mut self, result: BatchResult, merger: &Merger) -> Self {
        let mut summary = BatchSummary {
            batch_id: result.batch_id,
            stocks_count: result.stocks_analyzed.len(),
            successful: 0,
            failed: 0,
            missing: result.missing,
        };

        for stock in &result.stocks_analyzed {
            if !stock.is_complete() {
                summary.failed += 1;
                continue;
            }
            summary.successful += 1;
            for (count, matched) in self.counts.iter_mut().zip(merger.matches(stock)) {
                if matched {
                    *count += 1;
                }
            }
        }

        if result.missing {
            log::warn!(
                "batch {} missing: {} stocks counted as failed",
                summary.batch_id,
                summary.failed
            );
        } else {
            log::debug!(
                "batch {}: {} complete, {} failed",
                summary.batch_id,
                summary.successful,
                summary.failed
            );
        }

        self.successful += summary.successful;
        self.failed += summary.failed;
        self.all_stocks.extend(result.stocks_analyzed);
        self.summaries.push(summary);
        self
    }

    fn finish(self, names: Vec<String>) -> MergedDataset {
        let successful = self.successful;
        let pattern_summary = names
            .into_iter()
            .zip(self.counts)
            .map(|(name, count)| {
                let frequency_percent = if successful == 0 {
                    0.0
                } else {
                    round1(count as f64 / successful as f64 * 100.0)
                };
                (
                    name,
                    PatternFrequency {
                        count,
                        frequency_percent,
                    },
                )
            })
            .collect();

        MergedDataset {
            total_stocks: self.successful + self.failed,
            successful_analyses: self.successful,
            failed_analyses: self.failed,
            all_stocks: self.all_stocks,
            pattern_summary,
            batch_summaries: self.summaries,
        }
    }
}

// ============================================================
// MERGER
// ============================================================

/// Batch merger with a configurable set of tally rules
pub struct Merger {
    builtin: Vec<BuiltinTally>,
    custom: Vec<Box<dyn TallyRule>>,
}

impl Default for Merger {
    fn default() -> Self {
        Self {
            builtin: BuiltinTally::ALL.to_vec(),
            custom: Vec::new(),
        }
    }
}

impl Merger {
    /// Rule names in counting order
    pub fn rule_names(&self) -> Vec<String> {
        self.builtin
            .iter()
            .map(|t| t.name().to_string())
            .chain(self.custom.iter().map(|t| t.name().to_string()))
            .collect()
    }

    fn matches<'a>(&'a self, stock: &'a AnalyzedStock) -> impl Iterator<Item = bool> + 'a {
        // Fast path: builtin rules (enum dispatch), then custom rules (vtable)
        self.builtin
            .iter()
            .map(move |t| t.matches(stock))
            .chain(self.custom.iter().map(move |t| t.matches(stock)))
    }

    /// Merge batch results into one dataset.
    ///
    /// Fails with [`PipelineError::NoInput`] on an empty input and with
    /// [`PipelineError::InvalidArgument`] if two results share a `batch_id`.
    pub fn merge(&self, mut results: Vec<BatchResult>) -> Result<MergedDataset> {
        if results.is_empty() {
            return Err(PipelineError::NoInput);
        }

        results.sort_by_key(|r| r.batch_id);
        if let Some(pair) = results.windows(2).find(|w| w[0].batch_id == w[1].batch_id) {
            return Err(PipelineError::InvalidArgument(format!(
                "duplicate result for batch {}",
                pair[0].batch_id
            )));
        }

        let merged = results
            .into_iter()
            .fold(MergeAccumulator::new(self.builtin.len() + self.custom.len()), |acc, r| {
                acc.absorb(r, self)
            })
            .finish(self.rule_names());

        log::info!(
            "merged {} batches: {} stocks, {} complete, {} failed",
            merged.batch_summaries.len(),
            merged.total_stocks,
            merged.successful_analyses,
            merged.failed_analyses
        );

        Ok(merged)
    }
}

/// Merge with the default tally rules
pub fn merge(results: Vec<BatchResult>) -> Result<MergedDataset> {
    Merger::default().merge(results)
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating Merger instances
#[derive(Default)]
pub struct MergerBuilder {
    builtin: Vec<BuiltinTally>,
    custom: Vec<Box<dyn TallyRule>>,
}

impl MergerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all builtin tally rules
    pub fn with_all_defaults(mut self) -> Self {
        self.builtin.extend_from_slice(BuiltinTally::ALL);
        self
    }

    /// Add a builtin rule
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, rule: BuiltinTally) -> Self {
        self.builtin.push(rule);
        self
    }

    /// Add a custom rule (slow path)
    pub fn add_custom<R: TallyRule + 'static>(mut self, rule: R) -> Self {
        self.custom.push(Box::new(rule));
        self
    }

    /// Build the merger, rejecting duplicate pattern names
    pub fn build(self) -> Result<Merger> {
        let merger = Merger {
            builtin: self.builtin,
            custom: self.custom,
        };
        let mut seen = BTreeSet::new();
        for name in merger.rule_names() {
            if !seen.insert(name.clone()) {
                return Err(PipelineError::InvalidArgument(format!(
                    "duplicate tally rule `{name}`"
                )));
            }
        }
        Ok(merger)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{PatternGroups, StockRecord, TechnicalPatterns, VolumePatterns};
    use chrono::NaiveDate;

    fn entry() -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 2, 1).unwrap()
    }

    fn spiking(ticker: &str) -> AnalyzedStock {
        AnalyzedStock::complete(StockRecord::new(ticker, entry())).with_patterns(PatternGroups {
            volume_patterns: Some(VolumePatterns {
                volume_spike: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn plain(ticker: &str) -> AnalyzedStock {
        AnalyzedStock::complete(StockRecord::new(ticker, entry()))
    }

    fn failed(ticker: &str) -> AnalyzedStock {
        AnalyzedStock::failed(StockRecord::new(ticker, entry()), "timeout")
    }

    struct BreakoutWithSpike;

    impl TallyRule for BreakoutWithSpike {
        fn name(&self) -> &str {
            "breakout_with_spike"
        }

        fn matches(&self, stock: &AnalyzedStock) -> bool {
            BuiltinTally::Breakout.matches(stock) && BuiltinTally::VolumeSpike.matches(stock)
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(merge(Vec::new()), Err(PipelineError::NoInput)));
    }

    #[test]
    fn test_duplicate_batch_ids() {
        let results = vec![
            BatchResult::new(1, vec![plain("A")]),
            BatchResult::new(1, vec![plain("B")]),
        ];
        assert!(matches!(
            merge(results),
            Err(PipelineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_counts_and_frequencies() {
        let results = vec![
            BatchResult::new(2, vec![spiking("C"), failed("D")]),
            BatchResult::new(1, vec![spiking("A"), plain("B")]),
        ];
        let merged = merge(results).unwrap();

        assert_eq!(merged.total_stocks, 4);
        assert_eq!(merged.successful_analyses, 3);
        assert_eq!(merged.failed_analyses, 1);
        assert!(merged.is_consistent());

        let spike = merged.pattern_summary["volume_spike"];
        assert_eq!(spike.count, 2);
        assert_eq!(spike.frequency_percent, 66.7);
        assert_eq!(merged.pattern_summary["breakout"].count, 0);

        let tickers: Vec<_> = merged.all_stocks.iter().map(|s| s.ticker()).collect();
        assert_eq!(tickers, ["A", "B", "C", "D"]);
        assert_eq!(merged.batch_summaries[0].batch_id, 1);
    }

    #[test]
    fn test_failed_records_not_tallied() {
        let mut bad = spiking("X");
        bad.analysis_status = crate::record::AnalysisStatus::Failed;
        let merged = merge(vec![BatchResult::new(1, vec![bad])]).unwrap();
        assert_eq!(merged.pattern_summary["volume_spike"].count, 0);
        assert_eq!(merged.pattern_summary["volume_spike"].frequency_percent, 0.0);
    }

    #[test]
    fn test_missing_batch_reported() {
        let results = vec![
            BatchResult::new(1, vec![plain("A")]),
            BatchResult::missing(2, vec![StockRecord::new("B", entry())], "no result file"),
        ];
        let merged = merge(results).unwrap();
        assert_eq!(merged.failed_analyses, 1);
        assert_eq!(merged.missing_batches(), vec![2]);
        assert!(merged.is_consistent());
    }

    #[test]
    fn test_custom_rule() {
        let merger = MergerBuilder::new()
            .add(BuiltinTally::VolumeSpike)
            .add_custom(BreakoutWithSpike)
            .build()
            .unwrap();

        let both = spiking("A").with_patterns(PatternGroups {
            volume_patterns: Some(VolumePatterns {
                volume_spike: Some(true),
                ..Default::default()
            }),
            technical_patterns: Some(TechnicalPatterns {
                breakout: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });
        let merged = merger
            .merge(vec![BatchResult::new(1, vec![both, spiking("B")])])
            .unwrap();

        assert_eq!(merged.pattern_summary.len(), 2);
        assert_eq!(merged.pattern_summary["volume_spike"].count, 2);
        assert_eq!(merged.pattern_summary["breakout_with_spike"].count, 1);
        assert_eq!(
            merged.pattern_summary["breakout_with_spike"].frequency_percent,
            50.0
        );
    }

    #[test]
    fn test_builder_rejects_duplicate_names() {
        let result = MergerBuilder::new()
            .with_all_defaults()
            .add(BuiltinTally::Breakout)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let results = vec![
            BatchResult::new(1, vec![spiking("A"), failed("B")]),
            BatchResult::new(2, vec![plain("C")]),
        ];
        let first = serde_json::to_string(&merge(results.clone()).unwrap()).unwrap();
        let second = serde_json::to_string(&merge(results).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
