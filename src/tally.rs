//! Pattern tally rules
//!
//! A tally rule decides whether a complete analysis exhibits a named pattern.
//! The merger counts every rule over every complete record. The default set is
//! fixed; callers can register additional [`TallyRule`] implementations.

use crate::record::AnalyzedStock;

/// Outperformance vs. benchmark, in percent points, for the first tier
pub const OUTPERFORMANCE_THRESHOLD: f64 = 0.0;
/// Outperformance vs. benchmark, in percent points, for the strong tier
pub const STRONG_OUTPERFORMANCE_THRESHOLD: f64 = 20.0;
/// Minimum number of secondary signals for the multi-signal pattern
pub const MIN_SECONDARY_SIGNALS: usize = 2;

/// A named boolean pattern counted by the merger
pub trait TallyRule: Send + Sync {
    fn name(&self) -> &str;
    fn matches(&self, stock: &AnalyzedStock) -> bool;
}

// ============================================================
// BUILTIN RULES - generated via macro
// ============================================================

/// Macro to generate the BuiltinTally enum from (variant, name, predicate)
macro_rules! define_builtin_tallies {
    (
        $(
            $(#[$meta:meta])*
            $variant:ident => $name:literal, |$stock:ident| $body:expr
        );* $(;)?
    ) => {
        /// All builtin tally rules, in counting order
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum BuiltinTally {
            $($(#[$meta])* $variant),*
        }

        impl BuiltinTally {
            pub const ALL: &'static [BuiltinTally] = &[$(BuiltinTally::$variant),*];

            #[inline]
            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $name),*
                }
            }

            pub fn matches(self, stock: &AnalyzedStock) -> bool {
                match self {
                    $(Self::$variant => {
                        let $stock = stock;
                        $body
                    }),*
                }
            }
        }
    };
}

define_builtin_tallies! {
    /// Volume spike flagged by the volume analysis
    VolumeSpike => "volume_spike", |s| s
        .detected
        .volume_patterns
        .as_ref()
        .and_then(|v| v.volume_spike)
        .unwrap_or(false);
    Breakout => "breakout", |s| s
        .detected
        .technical_patterns
        .as_ref()
        .and_then(|t| t.breakout)
        .unwrap_or(false);
    /// RSI in oversold or overbought territory
    RsiExtreme => "rsi_extreme", |s| s
        .detected
        .technical_patterns
        .as_ref()
        .and_then(|t| t.rsi_extreme)
        .unwrap_or(false);
    MaCross => "ma_cross", |s| s
        .detected
        .technical_patterns
        .as_ref()
        .and_then(|t| t.ma_cross)
        .unwrap_or(false);
    OutperformingBenchmark => "outperforming_benchmark", |s| relative_performance(s)
        .is_some_and(|p| p > OUTPERFORMANCE_THRESHOLD);
    StrongOutperformance => "strong_outperformance", |s| relative_performance(s)
        .is_some_and(|p| p >= STRONG_OUTPERFORMANCE_THRESHOLD);
    HasPrimarySignal => "has_primary_signal", |s| s
        .detected
        .composite
        .as_ref()
        .is_some_and(|c| c.primary_signal.is_some());
    MultipleSecondarySignals => "multiple_secondary_signals", |s| s
        .detected
        .composite
        .as_ref()
        .is_some_and(|c| c.secondary_signals.len() >= MIN_SECONDARY_SIGNALS);
}

fn relative_performance(stock: &AnalyzedStock) -> Option<f64> {
    stock
        .detected
        .market_context
        .as_ref()
        .and_then(|m| m.relative_performance)
}

impl TallyRule for BuiltinTally {
    fn name(&self) -> &str {
        BuiltinTally::name(*self)
    }

    fn matches(&self, stock: &AnalyzedStock) -> bool {
        BuiltinTally::matches(*self, stock)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{
        CompositeScores, MarketContextPatterns, PatternGroups, StockRecord, TechnicalPatterns,
        VolumePatterns,
    };
    use chrono::NaiveDate;

    fn stock(detected: PatternGroups) -> AnalyzedStock {
        let entry = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        AnalyzedStock::complete(StockRecord::new("T", entry)).with_patterns(detected)
    }

    #[test]
    fn test_builtin_names_are_unique() {
        let mut names: Vec<_> = BuiltinTally::ALL.iter().map(|t| t.name()).collect();
        let total = names.len();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 8);
    }

    #[test]
    fn test_empty_patterns_match_nothing() {
        let s = stock(PatternGroups::default());
        assert!(BuiltinTally::ALL.iter().all(|t| !t.matches(&s)));
    }

    #[test]
    fn test_flags() {
        let s = stock(PatternGroups {
            volume_patterns: Some(VolumePatterns {
                volume_spike: Some(true),
                ..Default::default()
            }),
            technical_patterns: Some(TechnicalPatterns {
                breakout: Some(true),
                rsi_extreme: Some(false),
                ma_cross: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert!(BuiltinTally::VolumeSpike.matches(&s));
        assert!(BuiltinTally::Breakout.matches(&s));
        assert!(!BuiltinTally::RsiExtreme.matches(&s));
        assert!(BuiltinTally::MaCross.matches(&s));
    }

    #[test]
    fn test_outperformance_tiers() {
        let with_perf = |p: f64| {
            stock(PatternGroups {
                market_context: Some(MarketContextPatterns {
                    relative_performance: Some(p),
                    ..Default::default()
                }),
                ..Default::default()
            })
        };
        let mild = with_perf(5.0);
        assert!(BuiltinTally::OutperformingBenchmark.matches(&mild));
        assert!(!BuiltinTally::StrongOutperformance.matches(&mild));

        let strong = with_perf(20.0);
        assert!(BuiltinTally::OutperformingBenchmark.matches(&strong));
        assert!(BuiltinTally::StrongOutperformance.matches(&strong));

        let lagging = with_perf(-3.0);
        assert!(!BuiltinTally::OutperformingBenchmark.matches(&lagging));
    }

    #[test]
    fn test_signals() {
        let s = stock(PatternGroups {
            composite: Some(CompositeScores {
                primary_signal: Some("short_squeeze".into()),
                secondary_signals: vec!["volume".into()],
                composite_score: None,
            }),
            ..Default::default()
        });
        assert!(BuiltinTally::HasPrimarySignal.matches(&s));
        assert!(!BuiltinTally::MultipleSecondarySignals.matches(&s));
    }
}
