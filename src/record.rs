//! Stock records and batch-analysis results
//!
//! Records move through the pipeline by value: universe -> batch -> batch
//! result -> merged dataset. Each stage builds a new structure instead of
//! editing the previous one in place.
//!
//! Feature groups use a typed schema where every signal is optional. A
//! missing signal is `None`, never a silent default, and anything the
//! extractor emits outside the schema is kept verbatim in `extra`.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Generate a feature-group struct: every listed field is an optional signal,
/// unknown keys are collected into `extra`.
macro_rules! feature_group {
    (
        $(#[$meta:meta])*
        $name:ident {
            $($(#[$fmeta:meta])* $field:ident: $ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                #[serde(default, skip_serializing_if = "Option::is_none")]
                pub $field: Option<$ty>,
            )*
            /// Signals outside the typed schema
            #[serde(flatten)]
            pub extra: BTreeMap<String, serde_json::Value>,
        }

        impl $name {
            /// True when the group carries no signal at all
            pub fn is_empty(&self) -> bool {
                true $(&& self.$field.is_none())* && self.extra.is_empty()
            }
        }
    };
}

// ============================================================
// FEATURE GROUPS (produced by the external extractor)
// ============================================================

feature_group! {
    /// Company profile at entry
    Profile {
        sector: String,
        exchange: String,
        market_cap: f64,
        float_shares: f64,
        price: f64,
    }
}

feature_group! {
    /// Technical indicator snapshot
    Technicals {
        rsi_14: f64,
        sma_20: f64,
        sma_50: f64,
        atr_percent: f64,
        above_sma_50: bool,
    }
}

feature_group! {
    Fundamentals {
        revenue_growth_percent: f64,
        cash_runway_months: f64,
        debt_to_equity: f64,
        profitable: bool,
    }
}

feature_group! {
    /// Performance relative to the benchmark index
    RelativeStrength {
        vs_benchmark_percent: f64,
        rs_rank: f64,
    }
}

feature_group! {
    News {
        article_count: u32,
        sentiment: f64,
        has_catalyst_news: bool,
    }
}

feature_group! {
    /// Raw chart patterns reported by the extractor
    ChartPatterns {
        consolidation_days: u32,
        higher_lows: bool,
        bollinger_squeeze: bool,
    }
}

feature_group! {
    VolumeProfile {
        avg_volume_20d: f64,
        relative_volume: f64,
        accumulation_days: u32,
    }
}

feature_group! {
    ShortInterest {
        short_float_percent: f64,
        days_to_cover: f64,
    }
}

feature_group! {
    /// Regulatory filings in the observation window
    Filings {
        recent_8k: bool,
        insider_buys: u32,
        dilution_risk: bool,
    }
}

// ============================================================
// STOCK RECORD
// ============================================================

/// Where a catalyst date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalystStatus {
    /// First bar at or above 2x the baseline close
    DerivedFromPriceSeries,
    /// `entry_date + days_to_peak`, no price series available
    CalculatedFromEntryPlusDays,
    /// Price series never doubled inside the supplied window
    CatalystUnresolved,
}

/// One explosive-stock candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub ticker: String,
    pub entry_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalyst_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_to_peak: Option<u32>,
    #[serde(default, alias = "max_gain_percent")]
    pub gain_percent: f64,
    /// Required; a record without it loads but fails validation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_discovered: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalyst_status: Option<CatalystStatus>,
    /// Set when the record failed validation; flagged records stay in the
    /// dataset but are left out of statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity_issue: Option<String>,

    #[serde(default, skip_serializing_if = "Profile::is_empty")]
    pub profile: Profile,
    #[serde(default, skip_serializing_if = "Technicals::is_empty")]
    pub technicals: Technicals,
    #[serde(default, skip_serializing_if = "Fundamentals::is_empty")]
    pub fundamentals: Fundamentals,
    #[serde(default, skip_serializing_if = "RelativeStrength::is_empty")]
    pub relative_strength: RelativeStrength,
    #[serde(default, skip_serializing_if = "News::is_empty")]
    pub news: News,
    #[serde(default, skip_serializing_if = "ChartPatterns::is_empty")]
    pub patterns: ChartPatterns,
    #[serde(default, skip_serializing_if = "VolumeProfile::is_empty")]
    pub volume_profile: VolumeProfile,
    #[serde(default, skip_serializing_if = "ShortInterest::is_empty")]
    pub short_interest: ShortInterest,
    #[serde(default, skip_serializing_if = "Filings::is_empty")]
    pub filings: Filings,
}

impl StockRecord {
    /// Bare record observed from `entry_date`, discovered in the entry year.
    pub fn new(ticker: impl Into<String>, entry_date: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            entry_date,
            catalyst_date: None,
            days_to_peak: None,
            gain_percent: 0.0,
            year_discovered: Some(entry_date.year()),
            catalyst_status: None,
            integrity_issue: None,
            profile: Profile::default(),
            technicals: Technicals::default(),
            fundamentals: Fundamentals::default(),
            relative_strength: RelativeStrength::default(),
            news: News::default(),
            patterns: ChartPatterns::default(),
            volume_profile: VolumeProfile::default(),
            short_interest: ShortInterest::default(),
            filings: Filings::default(),
        }
    }

    pub fn with_catalyst(mut self, catalyst_date: NaiveDate, days_to_peak: u32) -> Self {
        self.catalyst_date = Some(catalyst_date);
        self.days_to_peak = Some(days_to_peak);
        self
    }

    pub fn with_gain(mut self, gain_percent: f64) -> Self {
        self.gain_percent = gain_percent;
        self
    }

    pub fn with_year_discovered(mut self, year: i32) -> Self {
        self.year_discovered = Some(year);
        self
    }

    /// Days between entry and catalyst, if the catalyst is known
    #[inline]
    pub fn day_gap(&self) -> Option<i64> {
        self.catalyst_date
            .map(|c| c.signed_duration_since(self.entry_date).num_days())
    }

    /// Whether `catalyst_date - entry_date == days_to_peak`
    pub fn is_day_count_consistent(&self) -> bool {
        match (self.day_gap(), self.days_to_peak) {
            (Some(gap), Some(days)) => gap == i64::from(days),
            _ => false,
        }
    }

    #[inline]
    pub fn is_flagged(&self) -> bool {
        self.integrity_issue.is_some()
    }
}

// ============================================================
// PATTERN GROUPS (complete analysis results)
// ============================================================

feature_group! {
    VolumePatterns {
        volume_spike: bool,
        spike_ratio: f64,
        accumulation: bool,
    }
}

feature_group! {
    TechnicalPatterns {
        breakout: bool,
        rsi_extreme: bool,
        rsi_value: f64,
        ma_cross: bool,
    }
}

feature_group! {
    MarketContextPatterns {
        /// Return relative to the benchmark over the lookback, in percent points
        relative_performance: f64,
        sector_strength: f64,
    }
}

/// Composite signal scores
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeScores {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_signal: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_signals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_score: Option<f64>,
}

/// Fixed schema of pattern-detection groups carried by complete results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternGroups {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_patterns: Option<VolumePatterns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_patterns: Option<TechnicalPatterns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_context: Option<MarketContextPatterns>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite: Option<CompositeScores>,
}

// ============================================================
// ANALYZED STOCK / BATCH RESULT
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Complete,
    Failed,
}

/// A stock as returned by one external analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedStock {
    #[serde(flatten)]
    pub stock: StockRecord,
    pub analysis_status: AnalysisStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screening_score: Option<f64>,
    /// Points each scoring component contributed to `screening_score`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub score_components: BTreeMap<String, f64>,
    #[serde(flatten)]
    pub detected: PatternGroups,
}

impl AnalyzedStock {
    /// A complete analysis with no scores or patterns attached yet
    pub fn complete(stock: StockRecord) -> Self {
        Self {
            stock,
            analysis_status: AnalysisStatus::Complete,
            error: None,
            screening_score: None,
            score_components: BTreeMap::new(),
            detected: PatternGroups::default(),
        }
    }

    /// A failed analysis; the record is counted but never tallied
    pub fn failed(stock: StockRecord, error: impl Into<String>) -> Self {
        Self {
            analysis_status: AnalysisStatus::Failed,
            error: Some(error.into()),
            ..Self::complete(stock)
        }
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.screening_score = Some(score);
        self
    }

    pub fn with_component(mut self, name: impl Into<String>, points: f64) -> Self {
        self.score_components.insert(name.into(), points);
        self
    }

    pub fn with_patterns(mut self, detected: PatternGroups) -> Self {
        self.detected = detected;
        self
    }

    #[inline]
    pub fn ticker(&self) -> &str {
        &self.stock.ticker
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.analysis_status == AnalysisStatus::Complete
    }

    /// Points contributed by `component`, zero when absent
    #[inline]
    pub fn component(&self, component: &str) -> f64 {
        self.score_components.get(component).copied().unwrap_or(0.0)
    }
}

/// Output of one external analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: u32,
    pub stocks_analyzed: Vec<AnalyzedStock>,
    /// Set by the loader when the result file was missing or unreadable
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub missing: bool,
}

impl BatchResult {
    pub fn new(batch_id: u32, stocks_analyzed: Vec<AnalyzedStock>) -> Self {
        Self {
            batch_id,
            stocks_analyzed,
            missing: false,
        }
    }

    /// Stand-in for a batch whose result never arrived: every stock failed.
    pub fn missing(batch_id: u32, stocks: Vec<StockRecord>, reason: &str) -> Self {
        Self {
            batch_id,
            stocks_analyzed: stocks
                .into_iter()
                .map(|s| AnalyzedStock::failed(s, reason))
                .collect(),
            missing: true,
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_gap_consistency() {
        let rec = StockRecord::new("ABC", date(2023, 1, 1)).with_catalyst(date(2023, 1, 31), 30);
        assert_eq!(rec.day_gap(), Some(30));
        assert!(rec.is_day_count_consistent());

        let rec = StockRecord::new("ABC", date(2023, 1, 1)).with_catalyst(date(2023, 2, 15), 30);
        assert!(!rec.is_day_count_consistent());
    }

    #[test]
    fn test_record_deserialize_with_unknown_signals() {
        let json = r#"{
            "ticker": "XYZ",
            "entry_date": "2022-05-02",
            "catalyst_date": "2022-05-20",
            "days_to_peak": 18,
            "max_gain_percent": 640.5,
            "year_discovered": 2022,
            "technicals": { "rsi_14": 28.5, "custom_osc": 1.7 },
            "short_interest": { "short_float_percent": 31.0 }
        }"#;
        let rec: StockRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.gain_percent, 640.5);
        assert_eq!(rec.technicals.rsi_14, Some(28.5));
        assert_eq!(rec.technicals.above_sma_50, None);
        assert_eq!(rec.technicals.extra["custom_osc"], serde_json::json!(1.7));
        assert!(rec.filings.is_empty());
        assert!(rec.is_day_count_consistent());
    }

    #[test]
    fn test_record_without_discovery_year_still_parses() {
        let json = r#"{ "ticker": "NOYEAR", "entry_date": "2022-05-02" }"#;
        let rec: StockRecord = serde_json::from_str(json).unwrap();
        assert_eq!(rec.year_discovered, None);
        assert_eq!(rec.gain_percent, 0.0);
    }

    #[test]
    fn test_empty_groups_are_not_serialized() {
        let rec = StockRecord::new("ABC", date(2023, 1, 1));
        let json = serde_json::to_value(&rec).unwrap();
        assert!(json.get("profile").is_none());
        assert!(json.get("catalyst_date").is_none());
    }

    #[test]
    fn test_analyzed_stock_roundtrip_shape() {
        let json = r#"{
            "ticker": "XYZ",
            "entry_date": "2022-05-02",
            "gain_percent": 12.0,
            "year_discovered": 2022,
            "analysis_status": "complete",
            "screening_score": 82.0,
            "score_components": { "volume": 20.0 },
            "volume_patterns": { "volume_spike": true },
            "composite": { "primary_signal": "squeeze", "secondary_signals": ["a", "b"] }
        }"#;
        let stock: AnalyzedStock = serde_json::from_str(json).unwrap();
        assert!(stock.is_complete());
        assert_eq!(stock.ticker(), "XYZ");
        assert_eq!(stock.component("volume"), 20.0);
        assert_eq!(stock.component("news"), 0.0);
        let volume = stock.detected.volume_patterns.as_ref().unwrap();
        assert_eq!(volume.volume_spike, Some(true));
        assert_eq!(
            stock.detected.composite.as_ref().unwrap().secondary_signals.len(),
            2
        );
    }

    #[test]
    fn test_missing_batch_marks_all_failed() {
        let stocks = vec![
            StockRecord::new("A", date(2023, 1, 1)),
            StockRecord::new("B", date(2023, 1, 1)),
        ];
        let result = BatchResult::missing(3, stocks, "result file not found");
        assert!(result.missing);
        assert!(result.stocks_analyzed.iter().all(|s| !s.is_complete()));
        assert_eq!(
            result.stocks_analyzed[0].error.as_deref(),
            Some("result file not found")
        );
    }
}
