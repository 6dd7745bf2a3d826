//! Accounting period records and their state machine.

use chrono::{DateTime, NaiveDate, Utc};
use ledgerline_shared::types::{JournalEntryId, PeriodId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerError;

/// Status of an accounting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodStatus {
    /// Accepts postings.
    Open,
    /// Rejects postings inside its range.
    Closed,
    /// Closed, and the record itself rejects modification.
    Locked,
}

impl std::fmt::Display for PeriodStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Locked => write!(f, "locked"),
        }
    }
}

/// Validates a status transition.
///
/// Open → Closed → Locked moves forward; Closed or Locked → Open is the
/// privileged reopen path. Everything else is rejected.
pub fn validate_status_transition(
    id: PeriodId,
    from: PeriodStatus,
    to: PeriodStatus,
) -> Result<(), LedgerError> {
    match (from, to) {
        (PeriodStatus::Open, PeriodStatus::Closed)
        | (PeriodStatus::Closed, PeriodStatus::Locked)
        | (PeriodStatus::Closed | PeriodStatus::Locked, PeriodStatus::Open) => Ok(()),
        (PeriodStatus::Locked, _) => Err(LedgerError::PeriodLocked(id)),
        _ => Err(LedgerError::InvalidPeriodTransition { from, to }),
    }
}

/// Figures produced by a closing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingSnapshot {
    /// Revenue transferred.
    pub total_revenue: Decimal,
    /// Expense transferred.
    pub total_expense: Decimal,
    /// Revenue minus expense.
    pub net_income: Decimal,
    /// The posted closing entry, if anything needed closing.
    pub closing_entry_id: Option<JournalEntryId>,
}

/// An accounting period over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    /// Unique identifier.
    pub id: PeriodId,
    /// First day, inclusive.
    pub start_date: NaiveDate,
    /// Last day, inclusive.
    pub end_date: NaiveDate,
    /// Description, e.g. "January 2026".
    pub description: String,
    /// Postings inside the range are rejected.
    pub is_closed: bool,
    /// The record itself rejects modification.
    pub is_locked: bool,
    /// Who closed the period.
    pub closed_by: Option<UserId>,
    /// When the period was closed.
    pub closed_at: Option<DateTime<Utc>>,
    /// Who locked the period.
    pub locked_by: Option<UserId>,
    /// When the period was locked.
    pub locked_at: Option<DateTime<Utc>>,
    /// Revenue snapshot of the closing computation.
    pub total_revenue: Decimal,
    /// Expense snapshot of the closing computation.
    pub total_expense: Decimal,
    /// Net income snapshot of the closing computation.
    pub net_income: Decimal,
    /// Latest closing entry posted for this period.
    pub closing_entry_id: Option<JournalEntryId>,
    /// Who last reopened the period.
    pub reopened_by: Option<UserId>,
    /// When the period was last reopened.
    pub reopened_at: Option<DateTime<Utc>>,
    /// Why the period was last reopened.
    pub reopen_reason: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl AccountingPeriod {
    /// Creates an Open period.
    #[must_use]
    pub fn open(start_date: NaiveDate, end_date: NaiveDate, description: String) -> Self {
        let now = Utc::now();
        Self {
            id: PeriodId::new(),
            start_date,
            end_date,
            description,
            is_closed: false,
            is_locked: false,
            closed_by: None,
            closed_at: None,
            locked_by: None,
            locked_at: None,
            total_revenue: Decimal::ZERO,
            total_expense: Decimal::ZERO,
            net_income: Decimal::ZERO,
            closing_entry_id: None,
            reopened_by: None,
            reopened_at: None,
            reopen_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current status derived from the flags.
    #[must_use]
    pub const fn status(&self) -> PeriodStatus {
        match (self.is_closed, self.is_locked) {
            (_, true) => PeriodStatus::Locked,
            (true, false) => PeriodStatus::Closed,
            (false, false) => PeriodStatus::Open,
        }
    }

    /// Returns true if new postings may be dated inside this period.
    #[must_use]
    pub const fn accepts_postings(&self) -> bool {
        matches!(self.status(), PeriodStatus::Open)
    }

    /// Returns true if the given date falls within this period.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }

    /// Returns true if `[start, end]` shares at least one day with this period.
    #[must_use]
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && start <= self.end_date
    }

    /// Returns true if this period spans exactly `[start, end]`.
    #[must_use]
    pub fn spans(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date == start && self.end_date == end
    }

    /// Open → Closed.
    pub fn close(&mut self, by: UserId, at: DateTime<Utc>) -> Result<(), LedgerError> {
        validate_status_transition(self.id, self.status(), PeriodStatus::Closed)?;
        self.is_closed = true;
        self.closed_by = Some(by);
        self.closed_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Closed → Locked.
    pub fn lock(&mut self, by: UserId, at: DateTime<Utc>) -> Result<(), LedgerError> {
        validate_status_transition(self.id, self.status(), PeriodStatus::Locked)?;
        self.is_locked = true;
        self.locked_by = Some(by);
        self.locked_at = Some(at);
        self.updated_at = at;
        Ok(())
    }

    /// Closed or Locked → Open, recording who reopened it and why.
    pub fn reopen(&mut self, reason: &str, by: UserId, at: DateTime<Utc>) -> Result<(), LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::ReasonRequired);
        }
        validate_status_transition(self.id, self.status(), PeriodStatus::Open)?;
        self.is_closed = false;
        self.is_locked = false;
        self.reopened_by = Some(by);
        self.reopened_at = Some(at);
        self.reopen_reason = Some(reason.trim().to_string());
        self.updated_at = at;
        Ok(())
    }

    /// Records a closing run and moves the period to Locked.
    ///
    /// Snapshot figures accumulate across re-closings of a reopened period,
    /// since a re-closing only transfers the residual.
    pub fn record_closing(
        &mut self,
        snapshot: ClosingSnapshot,
        by: UserId,
        at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.status() == PeriodStatus::Open {
            self.close(by, at)?;
        }
        self.lock(by, at)?;
        self.total_revenue += snapshot.total_revenue;
        self.total_expense += snapshot.total_expense;
        self.net_income += snapshot.net_income;
        if snapshot.closing_entry_id.is_some() {
            self.closing_entry_id = snapshot.closing_entry_id;
        }
        Ok(())
    }
}
