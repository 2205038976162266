//! Markdown rendering of a correlation matrix

use std::fmt;

use crate::correlation::{CorrelationMatrix, PatternCorrelation};

/// Patterns listed as recommendations at most
const MAX_RECOMMENDED_PATTERNS: usize = 3;

/// Display adapter that renders a matrix as a markdown report
pub struct Report<'a>(pub &'a CorrelationMatrix);

/// Render `matrix` as markdown.
///
/// Sections, in order: Executive Summary, Key Findings, Classification
/// Breakdown, Pattern Effectiveness, Score Thresholds, Recommendations.
pub fn render(matrix: &CorrelationMatrix) -> String {
    Report(matrix).to_string()
}

#[inline]
fn pct(rate: f64) -> f64 {
    rate * 100.0
}

impl Report<'_> {
    fn executive_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        writeln!(f, "## Executive Summary")?;
        writeln!(f)?;
        writeln!(f, "- Stocks analyzed: {}", m.stocks_considered)?;
        writeln!(
            f,
            "- True positives (gain >= {}%): {}",
            m.true_positive_gain, m.true_positives
        )?;
        if m.stocks_considered > 0 {
            writeln!(
                f,
                "- Base rate: {:.1}%",
                pct(m.true_positives as f64 / m.stocks_considered as f64)
            )?;
        }
        let excluded = m.excluded;
        if excluded.failed + excluded.flagged + excluded.overridden > 0 {
            writeln!(
                f,
                "- Excluded: {} failed, {} flagged for integrity issues, {} overridden",
                excluded.failed, excluded.flagged, excluded.overridden
            )?;
        }
        writeln!(f)
    }

    fn key_findings(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let k = &self.0.key_findings;
        writeln!(f, "## Key Findings")?;
        writeln!(f)?;
        match &k.best_threshold {
            Some(b) => writeln!(
                f,
                "- Best score threshold: {} ({:.1}% hit rate over {} stocks)",
                b.threshold,
                pct(b.hit_rate),
                b.stocks_above
            )?,
            None => writeln!(f, "- Best score threshold: none with a sufficient sample")?,
        }
        match &k.best_pattern {
            Some(p) => writeln!(
                f,
                "- Most predictive pattern: {} ({:+.1} pts)",
                p.pattern,
                pct(p.correlation)
            )?,
            None => writeln!(f, "- Most predictive pattern: none observed")?,
        }
        if let Some(gain) = k.mean_true_positive_gain {
            writeln!(f, "- Mean gain of true positives: {gain:.1}%")?;
        }
        if let Some(days) = k.mean_days_to_peak {
            writeln!(f, "- Mean days to peak: {days:.1}")?;
        }
        writeln!(f)
    }

    fn classification(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Classification Breakdown")?;
        writeln!(f)?;
        writeln!(f, "| Tier | Stocks | Share | Mean score |")?;
        writeln!(f, "|------|-------:|------:|-----------:|")?;
        for tier in &self.0.classification {
            let mean = tier
                .mean_score
                .map_or_else(|| "-".to_string(), |s| format!("{s:.1}"));
            writeln!(
                f,
                "| {} | {} | {:.1}% | {} |",
                tier.tier.label(),
                tier.stocks,
                tier.percent,
                mean
            )?;
        }
        writeln!(f)
    }

    fn patterns(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Pattern Effectiveness")?;
        writeln!(f)?;
        writeln!(f, "| Pattern | With | Without | Rate with | Rate without | Delta |")?;
        writeln!(f, "|---------|-----:|--------:|----------:|-------------:|------:|")?;
        for ranked in &self.0.top_patterns {
            let Some(p) = self.0.pattern(&ranked.pattern) else {
                continue;
            };
            writeln!(
                f,
                "| {} | {} | {} | {:.1}% | {:.1}% | {:+.1} |",
                p.pattern,
                p.stocks_with_pattern,
                p.stocks_without_pattern,
                pct(p.success_rate_with),
                pct(p.success_rate_without),
                pct(p.correlation)
            )?;
        }
        writeln!(f)
    }

    fn thresholds(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## Score Thresholds")?;
        writeln!(f)?;
        if self.0.score_correlations.is_empty() {
            writeln!(f, "No scored stocks reached any threshold.")?;
            return writeln!(f);
        }
        writeln!(f, "| Threshold | Selected | True positives | Hit rate |")?;
        writeln!(f, "|----------:|---------:|---------------:|---------:|")?;
        for t in &self.0.score_correlations {
            writeln!(
                f,
                "| {} | {} | {} | {:.1}% |",
                t.threshold,
                t.stocks_above,
                t.true_positives,
                pct(t.hit_rate)
            )?;
        }
        writeln!(f)
    }

    fn recommendations(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        writeln!(f, "## Recommendations")?;
        writeln!(f)?;

        if m.stocks_considered == 0 {
            return writeln!(
                f,
                "- No complete analyses available; re-run the failed batches first."
            );
        }

        match &m.key_findings.best_threshold {
            Some(b) => writeln!(
                f,
                "- Screen at a score of {} or higher ({:.1}% hit rate).",
                b.threshold,
                pct(b.hit_rate)
            )?,
            None => writeln!(
                f,
                "- No threshold selected enough stocks; widen the universe before fixing a cutoff."
            )?,
        }

        let observed = move |want_positive: bool| {
            m.top_patterns
                .iter()
                .filter_map(move |r| m.pattern(&r.pattern))
                .filter(move |p| {
                    p.stocks_with_pattern > 0
                        && if want_positive {
                            p.correlation > 0.0
                        } else {
                            p.correlation < 0.0
                        }
                })
        };
        for p in observed(true).take(MAX_RECOMMENDED_PATTERNS) {
            writeln!(f, "- Weight `{}` higher ({:+.1} pts).", p.pattern, pct(p.correlation))?;
        }
        let weak: Vec<&PatternCorrelation> = observed(false).collect();
        for p in weak.iter().rev().take(MAX_RECOMMENDED_PATTERNS) {
            writeln!(
                f,
                "- Reconsider `{}`: stocks showing it underperform ({:+.1} pts).",
                p.pattern,
                pct(p.correlation)
            )?;
        }

        if m.excluded.flagged > 0 {
            writeln!(
                f,
                "- Repair {} records with integrity issues and re-run the analysis.",
                m.excluded.flagged
            )?;
        }
        if m.excluded.failed > 0 {
            writeln!(
                f,
                "- {} analyses failed; results are partial.",
                m.excluded.failed
            )?;
        }
        Ok(())
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "# Explosive Stock Backtest Report")?;
        writeln!(f)?;
        self.executive_summary(f)?;
        self.key_findings(f)?;
        self.classification(f)?;
        self.patterns(f)?;
        self.thresholds(f)?;
        self.recommendations(f)
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::AnalyzerBuilder;
    use crate::merge::merge;
    use crate::record::{AnalyzedStock, BatchResult, StockRecord};
    use chrono::NaiveDate;

    fn matrix() -> CorrelationMatrix {
        let entry = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let mut stocks = Vec::new();
        for i in 0..12 {
            stocks.push(
                AnalyzedStock::complete(StockRecord::new(format!("W{i}"), entry).with_gain(900.0))
                    .with_score(110.0)
                    .with_component("breakout", 10.0),
            );
            stocks.push(
                AnalyzedStock::complete(StockRecord::new(format!("L{i}"), entry).with_gain(30.0))
                    .with_score(45.0)
                    .with_component("news_catalyst", 5.0),
            );
        }
        let merged = merge(vec![BatchResult::new(1, stocks)]).unwrap();
        AnalyzerBuilder::new()
            .thresholds([40.0, 100.0])
            .components(["breakout", "news_catalyst", "ma_cross"])
            .build()
            .unwrap()
            .analyze(&merged)
    }

    #[test]
    fn test_section_order() {
        let report = render(&matrix());
        let sections = [
            "## Executive Summary",
            "## Key Findings",
            "## Classification Breakdown",
            "## Pattern Effectiveness",
            "## Score Thresholds",
            "## Recommendations",
        ];
        let positions: Vec<_> = sections
            .iter()
            .map(|s| report.find(s).expect(s))
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_findings_rendered() {
        let report = render(&matrix());
        assert!(report.contains("Best score threshold: 100 (100.0% hit rate over 12 stocks)"));
        assert!(report.contains("Most predictive pattern: breakout (+100.0 pts)"));
        assert!(report.contains("Weight `breakout` higher"));
        assert!(report.contains("Reconsider `news_catalyst`"));
        assert!(!report.contains("Reconsider `ma_cross`"));
    }

    #[test]
    fn test_deterministic() {
        let m = matrix();
        assert_eq!(render(&m), render(&m));
    }

    #[test]
    fn test_empty_matrix() {
        let merged = merge(vec![BatchResult::new(1, Vec::new())]).unwrap();
        let m = crate::correlation::analyze(&merged, &[50.0]).unwrap();
        let report = render(&m);
        assert!(report.contains("No scored stocks reached any threshold."));
        assert!(report.contains("No complete analyses available"));
    }
}
