//! Threshold and pattern correlation analysis
//!
//! "Correlation" here is the difference in true-positive rate between stocks
//! that show a signal and stocks that don't, not a Pearson coefficient.
//!
//! # Example
//!
//! ```rust
//! use surgescan::prelude::*;
//!
//! let analyzer = AnalyzerBuilder::new()
//!     .thresholds([60.0, 80.0, 100.0])
//!     .components(["volume_spike", "breakout"])
//!     .min_sample(5)
//!     .build()
//!     .unwrap();
//! ```

use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use serde::{Deserialize, Serialize, Serializer};

use crate::merge::MergedDataset;
use crate::params::{ThresholdGrid, MIN_SAMPLE, TRUE_POSITIVE_GAIN};
use crate::record::AnalyzedStock;
use crate::{mean, round1, PipelineError, Result};

/// Scoring components analyzed when none are configured
pub const DEFAULT_COMPONENTS: &[&str] = &[
    "volume_spike",
    "breakout",
    "rsi_extreme",
    "ma_cross",
    "relative_strength",
    "short_squeeze",
    "news_catalyst",
    "insider_buying",
];

// ============================================================
// CONFIG
// ============================================================

/// Analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Score thresholds to sweep; normalized to ascending, deduplicated
    pub thresholds: Vec<f64>,
    /// Scoring components, in tie-break order
    pub components: Vec<String>,
    /// Minimum stocks above a threshold for it to be reported as best
    pub min_sample: usize,
    /// Forward gain (percent) that makes a stock a true positive
    pub true_positive_gain: f64,
    /// Tickers excluded from the outcome statistics by manual review
    pub excluded_tickers: BTreeSet<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdGrid::default().values(),
            components: DEFAULT_COMPONENTS.iter().map(|c| c.to_string()).collect(),
            min_sample: MIN_SAMPLE.default as usize,
            true_positive_gain: TRUE_POSITIVE_GAIN.default,
            excluded_tickers: BTreeSet::new(),
        }
    }
}

impl AnalyzerConfig {
    /// Default config with numeric parameters taken from `params`.
    ///
    /// Missing parameters use their default values.
    pub fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_sample: MIN_SAMPLE.resolve(params)? as usize,
            true_positive_gain: TRUE_POSITIVE_GAIN.resolve(params)?,
            ..Self::default()
        })
    }

    fn validate(&self) -> Result<()> {
        if self.thresholds.is_empty() {
            return Err(PipelineError::InvalidArgument(
                "at least one score threshold is required".into(),
            ));
        }
        if self.thresholds.iter().any(|t| !t.is_finite()) {
            return Err(PipelineError::InvalidArgument(
                "score thresholds must be finite".into(),
            ));
        }
        MIN_SAMPLE.validate(self.min_sample as f64)?;
        TRUE_POSITIVE_GAIN.validate(self.true_positive_gain)?;

        let mut seen = BTreeSet::new();
        for c in &self.components {
            if !seen.insert(c.as_str()) {
                return Err(PipelineError::InvalidArgument(format!(
                    "duplicate component `{c}`"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================
// OUTPUT TYPES
// ============================================================

/// Selection statistics for one score threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ThresholdStat {
    #[serde(skip_serializing)]
    pub threshold: f64,
    pub stocks_above: usize,
    pub true_positives: usize,
    /// `true_positives / stocks_above`
    pub hit_rate: f64,
}

/// Effectiveness of one scoring component
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternCorrelation {
    #[serde(skip_serializing)]
    pub pattern: String,
    pub stocks_with_pattern: usize,
    pub stocks_without_pattern: usize,
    pub success_rate_with: f64,
    pub success_rate_without: f64,
    /// `success_rate_with - success_rate_without`
    pub correlation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPattern {
    pub pattern: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BestThreshold {
    pub threshold: f64,
    pub hit_rate: f64,
    pub stocks_above: usize,
}

/// Summaries derived from the matrix. A finding whose inputs are empty is
/// omitted, never zero-filled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeyFindings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_threshold: Option<BestThreshold>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_pattern: Option<RankedPattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_true_positive_gain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_days_to_peak: Option<f64>,
}

/// Forward-gain classification of analyzed stocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GainTier {
    /// At or above the true-positive gain
    Explosive,
    Strong,
    Moderate,
    Weak,
    Loss,
}

impl GainTier {
    pub const ALL: [GainTier; 5] = [
        GainTier::Explosive,
        GainTier::Strong,
        GainTier::Moderate,
        GainTier::Weak,
        GainTier::Loss,
    ];

    pub fn classify(gain_percent: f64, true_positive_gain: f64) -> Self {
        match gain_percent {
            g if g >= true_positive_gain => GainTier::Explosive,
            g if g >= 200.0 => GainTier::Strong,
            g if g >= 100.0 => GainTier::Moderate,
            g if g >= 0.0 => GainTier::Weak,
            _ => GainTier::Loss,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GainTier::Explosive => "Explosive",
            GainTier::Strong => "Strong (200%+)",
            GainTier::Moderate => "Moderate (100-200%)",
            GainTier::Weak => "Weak (0-100%)",
            GainTier::Loss => "Loss",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TierBreakdown {
    pub tier: GainTier,
    pub stocks: usize,
    pub percent: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean_score: Option<f64>,
}

/// Records left out of the statistics, by cause
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Exclusions {
    pub failed: usize,
    pub flagged: usize,
    pub overridden: usize,
}

/// Analysis output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationMatrix {
    pub stocks_considered: usize,
    pub true_positives: usize,
    pub true_positive_gain: f64,
    pub excluded: Exclusions,
    #[serde(serialize_with = "threshold_map")]
    pub score_correlations: Vec<ThresholdStat>,
    #[serde(serialize_with = "pattern_map")]
    pub pattern_correlations: Vec<PatternCorrelation>,
    pub top_patterns: Vec<RankedPattern>,
    pub key_findings: KeyFindings,
    pub classification: Vec<TierBreakdown>,
}

impl CorrelationMatrix {
    pub fn threshold(&self, threshold: f64) -> Option<&ThresholdStat> {
        self.score_correlations
            .iter()
            .find(|t| t.threshold == threshold)
    }

    pub fn pattern(&self, name: &str) -> Option<&PatternCorrelation> {
        self.pattern_correlations.iter().find(|p| p.pattern == name)
    }
}

/// Thresholds serialize as a map keyed by the threshold value, in sweep order
fn threshold_map<S: Serializer>(
    stats: &[ThresholdStat],
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_map(stats.iter().map(|t| (t.threshold.to_string(), t)))
}

fn pattern_map<S: Serializer>(
    stats: &[PatternCorrelation],
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.collect_map(stats.iter().map(|p| (p.pattern.as_str(), p)))
}

// ============================================================
// ANALYZER
// ============================================================

/// Correlation analyzer over a merged dataset
#[derive(Debug, Clone)]
pub struct CorrelationAnalyzer {
    config: AnalyzerConfig,
}

impl CorrelationAnalyzer {
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    #[inline]
    fn is_true_positive(&self, stock: &AnalyzedStock) -> bool {
        stock.stock.gain_percent >= self.config.true_positive_gain
    }

    /// Complete, unflagged, non-overridden analyses plus exclusion counts
    fn population<'a>(&self, merged: &'a MergedDataset) -> (Vec<&'a AnalyzedStock>, Exclusions) {
        let mut excluded = Exclusions::default();
        let stocks = merged
            .all_stocks
            .iter()
            .filter(|s| {
                if !s.is_complete() {
                    excluded.failed += 1;
                    false
                } else if s.stock.is_flagged() {
                    excluded.flagged += 1;
                    false
                } else if self.config.excluded_tickers.contains(s.ticker()) {
                    excluded.overridden += 1;
                    false
                } else {
                    true
                }
            })
            .collect();
        (stocks, excluded)
    }

    /// Threshold sweep; empty buckets produce no entry
    fn sweep(&self, stocks: &[&AnalyzedStock]) -> Vec<ThresholdStat> {
        self.config
            .thresholds
            .par_iter()
            .filter_map(|&threshold| {
                let (above, tp) = stocks
                    .iter()
                    .filter(|s| s.screening_score.is_some_and(|score| score >= threshold))
                    .fold((0usize, 0usize), |(a, t), s| {
                        (a + 1, t + usize::from(self.is_true_positive(s)))
                    });
                (above > 0).then(|| ThresholdStat {
                    threshold,
                    stocks_above: above,
                    true_positives: tp,
                    hit_rate: tp as f64 / above as f64,
                })
            })
            .collect()
    }

    fn pattern_effectiveness(&self, stocks: &[&AnalyzedStock]) -> Vec<PatternCorrelation> {
        self.config
            .components
            .par_iter()
            .map(|component| {
                let (mut with, mut with_tp, mut without, mut without_tp) = (0, 0, 0, 0);
                for s in stocks {
                    let tp = usize::from(self.is_true_positive(s));
                    if s.component(component) > 0.0 {
                        with += 1;
                        with_tp += tp;
                    } else {
                        without += 1;
                        without_tp += tp;
                    }
                }
                let success_rate_with = rate(with_tp, with);
                let success_rate_without = rate(without_tp, without);
                PatternCorrelation {
                    pattern: component.clone(),
                    stocks_with_pattern: with,
                    stocks_without_pattern: without,
                    success_rate_with,
                    success_rate_without,
                    correlation: success_rate_with - success_rate_without,
                }
            })
            .collect()
    }

    fn classify(&self, stocks: &[&AnalyzedStock]) -> Vec<TierBreakdown> {
        let total = stocks.len();
        GainTier::ALL
            .iter()
            .map(|&tier| {
                let members: Vec<_> = stocks
                    .iter()
                    .filter(|s| {
                        GainTier::classify(s.stock.gain_percent, self.config.true_positive_gain)
                            == tier
                    })
                    .collect();
                TierBreakdown {
                    tier,
                    stocks: members.len(),
                    percent: if total == 0 {
                        0.0
                    } else {
                        round1(members.len() as f64 / total as f64 * 100.0)
                    },
                    mean_score: mean(members.iter().filter_map(|s| s.screening_score)),
                }
            })
            .collect()
    }

    fn best_threshold(&self, sweep: &[ThresholdStat]) -> Option<BestThreshold> {
        // Ascending sweep + strict comparison: ties go to the lowest threshold
        sweep
            .iter()
            .filter(|t| t.stocks_above >= self.config.min_sample)
            .fold(None::<&ThresholdStat>, |best, t| match best {
                Some(b) if b.hit_rate >= t.hit_rate => Some(b),
                _ => Some(t),
            })
            .map(|t| BestThreshold {
                threshold: t.threshold,
                hit_rate: t.hit_rate,
                stocks_above: t.stocks_above,
            })
    }

    /// Run the full analysis.
    pub fn analyze(&self, merged: &MergedDataset) -> CorrelationMatrix {
        let (stocks, excluded) = self.population(merged);
        let true_positives: Vec<_> = stocks
            .iter()
            .copied()
            .filter(|s| self.is_true_positive(s))
            .collect();

        let score_correlations = self.sweep(&stocks);
        let pattern_correlations = self.pattern_effectiveness(&stocks);

        let mut top_patterns: Vec<RankedPattern> = pattern_correlations
            .iter()
            .map(|p| RankedPattern {
                pattern: p.pattern.clone(),
                correlation: p.correlation,
            })
            .collect();
        // stable: ties keep component order
        top_patterns.sort_by(|a, b| b.correlation.total_cmp(&a.correlation));

        let best_pattern = top_patterns
            .iter()
            .find(|r| {
                pattern_correlations
                    .iter()
                    .any(|p| p.pattern == r.pattern && p.stocks_with_pattern > 0)
            })
            .cloned();

        let key_findings = KeyFindings {
            best_threshold: self.best_threshold(&score_correlations),
            best_pattern,
            mean_true_positive_gain: mean(true_positives.iter().map(|s| s.stock.gain_percent)),
            mean_days_to_peak: mean(
                true_positives
                    .iter()
                    .filter_map(|s| s.stock.days_to_peak.map(f64::from)),
            ),
        };

        log::info!(
            "analyzed {} stocks ({} true positives, {} excluded): {} thresholds, {} components",
            stocks.len(),
            true_positives.len(),
            excluded.failed + excluded.flagged + excluded.overridden,
            score_correlations.len(),
            pattern_correlations.len()
        );
        if key_findings.best_threshold.is_none() {
            log::warn!(
                "no threshold reached the {}-stock sample floor",
                self.config.min_sample
            );
        }

        CorrelationMatrix {
            stocks_considered: stocks.len(),
            true_positives: true_positives.len(),
            true_positive_gain: self.config.true_positive_gain,
            excluded,
            classification: self.classify(&stocks),
            score_correlations,
            pattern_correlations,
            top_patterns,
            key_findings,
        }
    }
}

#[inline]
fn rate(hits: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        hits as f64 / total as f64
    }
}

/// Analyze with default settings and the given thresholds
pub fn analyze(merged: &MergedDataset, thresholds: &[f64]) -> Result<CorrelationMatrix> {
    Ok(AnalyzerBuilder::new()
        .thresholds(thresholds.iter().copied())
        .build()?
        .analyze(merged))
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating CorrelationAnalyzer instances
#[derive(Debug, Clone, Default)]
pub struct AnalyzerBuilder {
    config: AnalyzerConfig,
}

impl AnalyzerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing config
    pub fn from_config(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn thresholds(mut self, thresholds: impl IntoIterator<Item = f64>) -> Self {
        self.config.thresholds = thresholds.into_iter().collect();
        self
    }

    pub fn threshold_grid(mut self, grid: ThresholdGrid) -> Self {
        self.config.thresholds = grid.values();
        self
    }

    /// Replace the component list
    pub fn components<S: Into<String>>(mut self, components: impl IntoIterator<Item = S>) -> Self {
        self.config.components = components.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_component(mut self, component: impl Into<String>) -> Self {
        self.config.components.push(component.into());
        self
    }

    pub fn min_sample(mut self, min_sample: usize) -> Self {
        self.config.min_sample = min_sample;
        self
    }

    pub fn true_positive_gain(mut self, gain_percent: f64) -> Self {
        self.config.true_positive_gain = gain_percent;
        self
    }

    /// Exclude tickers from outcome statistics (manual "false miss" list)
    pub fn exclude<S: Into<String>>(mut self, tickers: impl IntoIterator<Item = S>) -> Self {
        self.config
            .excluded_tickers
            .extend(tickers.into_iter().map(Into::into));
        self
    }

    /// Build the analyzer
    pub fn build(mut self) -> Result<CorrelationAnalyzer> {
        self.config.validate()?;
        self.config.thresholds.sort_by(f64::total_cmp);
        self.config.thresholds.dedup();
        Ok(CorrelationAnalyzer {
            config: self.config,
        })
    }
}

// ============================================================
// TESTS
// ============================================================
