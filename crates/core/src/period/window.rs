//! Posting window and on-demand monthly periods.

use chrono::{Datelike, Days, Months, NaiveDate};
use ledgerline_shared::LedgerConfig;

use super::types::AccountingPeriod;
use crate::ledger::LedgerError;

/// Sanity bounds for posting dates relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingWindow {
    /// Dates older than this many years are rejected.
    pub max_past_years: u32,
    /// Dates further than this many days ahead are rejected.
    pub max_future_days: u32,
}

impl PostingWindow {
    /// Window from ledger configuration.
    #[must_use]
    pub fn from_config(config: &LedgerConfig) -> Self {
        Self {
            max_past_years: config.max_past_years,
            max_future_days: config.max_future_days,
        }
    }

    /// Earliest and latest accepted dates.
    #[must_use]
    pub fn bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let earliest = today
            .checked_sub_months(Months::new(self.max_past_years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN);
        let latest = today
            .checked_add_days(Days::new(u64::from(self.max_future_days)))
            .unwrap_or(NaiveDate::MAX);
        (earliest, latest)
    }

    /// Rejects dates outside the window.
    pub fn check(&self, date: NaiveDate, today: NaiveDate) -> Result<(), LedgerError> {
        let (earliest, latest) = self.bounds(today);
        if date < earliest || date > latest {
            return Err(LedgerError::DateOutOfRange {
                date,
                earliest,
                latest,
            });
        }
        Ok(())
    }
}

impl Default for PostingWindow {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

/// First and last day of the calendar month containing `date`.
#[must_use]
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(NaiveDate::MAX);
    (first, last)
}

/// Range for a new period covering `date`: its calendar month, clipped so it
/// never overlaps an existing period.
///
/// `date` must not already be covered by one of `periods`.
#[must_use]
pub fn monthly_range_for(date: NaiveDate, periods: &[AccountingPeriod]) -> (NaiveDate, NaiveDate) {
    let (mut start, mut end) = month_bounds(date);
    for period in periods {
        if period.end_date < date && period.end_date >= start {
            start = period.end_date.succ_opt().unwrap_or(start);
        }
        if period.start_date > date && period.start_date <= end {
            end = period.start_date.pred_opt().unwrap_or(end);
        }
    }
    (start, end)
}

/// Description for a monthly period, e.g. "January 2026".
#[must_use]
pub fn month_description(start: NaiveDate) -> String {
    start.format("%B %Y").to_string()
}
