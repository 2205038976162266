//! Catalyst-date reconciliation
//!
//! The catalyst is the first bar, strictly after the baseline bar, whose close
//! is at least twice the baseline close. Stored catalyst dates are checked
//! against that rule and against the calendar; anything missing, in the future
//! or inconsistent with `days_to_peak` is recomputed. Every correction records
//! its provenance in [`CatalystStatus`].
//!
//! All operations here are pure: they return a new record and never touch the
//! input, so running them twice gives the same answer.

use chrono::{DateTime, Datelike, Duration, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::record::{CatalystStatus, StockRecord};
use crate::{IntegrityError, Result};

/// Cumulative gain over the baseline close that marks the catalyst
pub const CATALYST_GAIN_PERCENT: f64 = 100.0;

/// Months of the year before `year_discovered` that still count as that
/// discovery year (late-year catalysts logged the following January)
const YEAR_BOUNDARY_MONTHS: std::ops::RangeInclusive<u32> = 10..=12;

// ============================================================
// PRICE BARS
// ============================================================

/// Daily close price at a calendar date
pub trait ClosePrice {
    /// `None` when the bar carries no representable date
    fn date(&self) -> Option<NaiveDate>;
    fn close(&self) -> f64;
}

/// Bar as returned by the price-data API
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    /// Milliseconds since the Unix epoch (UTC)
    pub timestamp: i64,
    pub close: f64,
}

impl ClosePrice for DailyBar {
    fn date(&self) -> Option<NaiveDate> {
        DateTime::from_timestamp_millis(self.timestamp).map(|t| t.date_naive())
    }

    fn close(&self) -> f64 {
        self.close
    }
}

impl ClosePrice for (NaiveDate, f64) {
    fn date(&self) -> Option<NaiveDate> {
        Some(self.0)
    }

    fn close(&self) -> f64 {
        self.1
    }
}

/// Read-only oracle for historical daily bars
pub trait PriceSource: Sync {
    /// Chronological bars for `ticker` between `from` and `to`, inclusive
    fn daily_bars(&self, ticker: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<DailyBar>>;
}

/// Index and gain of the first bar at least doubling the baseline close.
///
/// `None` for an empty series, a non-positive baseline, or a series that
/// never doubles. Bars without a date are never picked.
pub fn first_doubling<B: ClosePrice>(bars: &[B]) -> Option<(usize, f64)> {
    let baseline = bars.first()?.close();
    if !(baseline > 0.0) || !baseline.is_finite() {
        return None;
    }
    bars.iter()
        .enumerate()
        .skip(1)
        .filter(|(_, bar)| bar.date().is_some())
        .map(|(i, bar)| (i, (bar.close() - baseline) / baseline * 100.0))
        .find(|&(_, gain)| gain >= CATALYST_GAIN_PERCENT)
}

// ============================================================
// RECONCILE
// ============================================================

/// Why a stored catalyst date was not trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum RecomputeReason {
    Missing,
    FutureDate { date: NaiveDate },
    DayCountMismatch { days_to_peak: u32, actual_gap: i64 },
}

/// Result of reconciling one record
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub record: StockRecord,
    /// Set when the stored date failed a check and was recomputed
    pub reason: Option<RecomputeReason>,
}

impl Reconciled {
    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.record.catalyst_status != Some(CatalystStatus::CatalystUnresolved)
    }
}

/// Derive the catalyst date from a chronological price series.
///
/// Unresolved (no doubling inside the window) is reported through
/// `catalyst_status`, with `catalyst_date` cleared rather than left stale.
pub fn reconcile<B: ClosePrice>(record: &StockRecord, bars: &[B]) -> Reconciled {
    let mut out = record.clone();
    let found = first_doubling(bars)
        .and_then(|(index, gain)| bars[index].date().map(|date| (index, date, gain)));
    match found {
        Some((index, date, gain)) => {
            out.catalyst_date = Some(date);
            out.days_to_peak = u32::try_from(
                date.signed_duration_since(out.entry_date).num_days(),
            )
            .ok();
            out.catalyst_status = Some(CatalystStatus::DerivedFromPriceSeries);
            log::debug!(
                "{}: catalyst {} at bar {} (+{:.1}%)",
                out.ticker,
                date,
                index,
                gain
            );
        }
        None => {
            out.catalyst_date = None;
            out.catalyst_status = Some(CatalystStatus::CatalystUnresolved);
            log::warn!(
                "{}: price never doubled within {} bars, catalyst unresolved",
                out.ticker,
                bars.len()
            );
        }
    }
    Reconciled {
        record: out,
        reason: None,
    }
}

/// Whether the stored catalyst date must be recomputed, and why.
pub fn needs_recompute(record: &StockRecord, today: NaiveDate) -> Option<RecomputeReason> {
    let Some(catalyst) = record.catalyst_date else {
        return Some(RecomputeReason::Missing);
    };
    if catalyst > today {
        return Some(RecomputeReason::FutureDate { date: catalyst });
    }
    match (record.days_to_peak, record.day_gap()) {
        (Some(days), Some(gap)) if gap != i64::from(days) => {
            Some(RecomputeReason::DayCountMismatch {
                days_to_peak: days,
                actual_gap: gap,
            })
        }
        _ => None,
    }
}

/// Recompute the catalyst date if the stored one cannot be trusted.
///
/// Prefers the price series when one is supplied, cut off after `today`;
/// otherwise falls back to `entry_date + days_to_peak`. A fallback landing
/// after `today`, or a record without `days_to_peak`, ends up unresolved.
pub fn repair<B: ClosePrice>(
    record: &StockRecord,
    bars: Option<&[B]>,
    today: NaiveDate,
) -> Reconciled {
    let Some(reason) = needs_recompute(record, today) else {
        return Reconciled {
            record: record.clone(),
            reason: None,
        };
    };
    log::debug!("{}: recomputing catalyst ({:?})", record.ticker, reason);

    let mut reconciled = match bars {
        Some(bars) if !bars.is_empty() => {
            let visible = bars
                .iter()
                .take_while(|b| b.date().map_or(true, |d| d <= today))
                .count();
            reconcile(record, &bars[..visible])
        }
        _ => from_entry_plus_days(record, today),
    };
    reconciled.reason = Some(reason);
    reconciled
}

fn from_entry_plus_days(record: &StockRecord, today: NaiveDate) -> Reconciled {
    let mut out = record.clone();
    let candidate = record
        .days_to_peak
        .and_then(|days| record.entry_date.checked_add_signed(Duration::days(i64::from(days))))
        .filter(|date| *date <= today);

    match candidate {
        Some(date) => {
            out.catalyst_date = Some(date);
            out.catalyst_status = Some(CatalystStatus::CalculatedFromEntryPlusDays);
        }
        None => {
            out.catalyst_date = None;
            out.catalyst_status = Some(CatalystStatus::CatalystUnresolved);
            log::warn!("{}: no usable entry + days fallback, catalyst unresolved", out.ticker);
        }
    }
    Reconciled {
        record: out,
        reason: None,
    }
}

// ============================================================
// VALIDATE
// ============================================================

/// Check a record's dates against each other, the calendar and the
/// discovery year.
pub fn validate(record: &StockRecord, today: NaiveDate) -> std::result::Result<(), IntegrityError> {
    let catalyst = record
        .catalyst_date
        .ok_or(IntegrityError::MissingField("catalyst_date"))?;
    let year_discovered = record
        .year_discovered
        .ok_or(IntegrityError::MissingField("year_discovered"))?;

    if record.entry_date > today {
        return Err(IntegrityError::FutureDate {
            field: "entry_date",
            date: record.entry_date,
            today,
        });
    }
    if catalyst > today {
        return Err(IntegrityError::FutureDate {
            field: "catalyst_date",
            date: catalyst,
            today,
        });
    }
    if catalyst < record.entry_date {
        return Err(IntegrityError::DateOrder {
            entry: record.entry_date,
            catalyst,
        });
    }

    let year = catalyst.year();
    let boundary_exception =
        year + 1 == year_discovered && YEAR_BOUNDARY_MONTHS.contains(&catalyst.month());
    if year != year_discovered && !boundary_exception {
        return Err(IntegrityError::YearMismatch {
            catalyst_year: year,
            year_discovered,
        });
    }
    Ok(())
}

/// Copy of `record` with `integrity_issue` set from [`validate`].
///
/// A record that now validates has any previous flag cleared.
pub fn flag_integrity(record: &StockRecord, today: NaiveDate) -> StockRecord {
    let mut out = record.clone();
    out.integrity_issue = match validate(record, today) {
        Ok(()) => None,
        Err(e) => {
            log::warn!("{}: {}", record.ticker, e);
            Some(e.to_string())
        }
    };
    out
}

// ============================================================
// UNIVERSE
// ============================================================

/// Counts from reconciling a whole universe
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub total: usize,
    /// Stored date passed every check
    pub kept: usize,
    pub derived_from_price_series: usize,
    pub calculated_from_entry_plus_days: usize,
    pub unresolved: Vec<String>,
    /// Tickers whose price fetch failed (fallback rule applied)
    pub upstream_failures: Vec<String>,
    /// `(ticker, reason)` for records flagged after reconciliation
    pub integrity_failures: Vec<(String, String)>,
}

struct Outcome {
    record: StockRecord,
    recomputed: bool,
    upstream_failed: bool,
}

/// Reconcile and validate every record, fetching bars only for records whose
/// stored catalyst fails a check. Runs in parallel; output order matches input.
pub fn reconcile_universe<S: PriceSource>(
    records: &[StockRecord],
    source: &S,
    today: NaiveDate,
    lookback_days: u32,
) -> (Vec<StockRecord>, ReconcileReport) {
    let outcomes: Vec<Outcome> = records
        .par_iter()
        .map(|record| reconcile_one(record, source, today, lookback_days))
        .collect();

    let mut report = ReconcileReport {
        total: records.len(),
        ..ReconcileReport::default()
    };
    let mut out = Vec::with_capacity(outcomes.len());

    for outcome in outcomes {
        let record = outcome.record;
        if outcome.upstream_failed {
            report.upstream_failures.push(record.ticker.clone());
        }
        match (outcome.recomputed, record.catalyst_status) {
            (false, _) => report.kept += 1,
            (true, Some(CatalystStatus::DerivedFromPriceSeries)) => {
                report.derived_from_price_series += 1
            }
            (true, Some(CatalystStatus::CalculatedFromEntryPlusDays)) => {
                report.calculated_from_entry_plus_days += 1
            }
            (true, _) => report.unresolved.push(record.ticker.clone()),
        }
        if let Some(issue) = &record.integrity_issue {
            report
                .integrity_failures
                .push((record.ticker.clone(), issue.clone()));
        }
        out.push(record);
    }

    log::info!(
        "reconciled {} records: {} kept, {} from prices, {} from entry+days, {} unresolved, {} flagged",
        report.total,
        report.kept,
        report.derived_from_price_series,
        report.calculated_from_entry_plus_days,
        report.unresolved.len(),
        report.integrity_failures.len()
    );

    (out, report)
}

fn reconcile_one<S: PriceSource>(
    record: &StockRecord,
    source: &S,
    today: NaiveDate,
    lookback_days: u32,
) -> Outcome {
    if needs_recompute(record, today).is_none() {
        return Outcome {
            record: flag_integrity(record, today),
            recomputed: false,
            upstream_failed: false,
        };
    }

    let to = record
        .entry_date
        .checked_add_signed(Duration::days(i64::from(lookback_days)))
        .map_or(today, |end| end.min(today));

    let (bars, upstream_failed) = match source.daily_bars(&record.ticker, record.entry_date, to) {
        Ok(bars) => (Some(bars), false),
        Err(e) => {
            log::warn!("{}: price fetch failed, using entry + days: {}", record.ticker, e);
            (None, true)
        }
    };

    let reconciled = repair(record, bars.as_deref(), today);
    Outcome {
        record: flag_integrity(&reconciled.record, today),
        recomputed: true,
        upstream_failed,
    }
}

// ============================================================
// TESTS
// ============================================================
