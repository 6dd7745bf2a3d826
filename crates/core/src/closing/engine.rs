//! Period closing engine.
//!
//! Closing is cumulative: every non-header Revenue and Expense account is
//! driven to zero as of the closing date, and the net is transferred to
//! retained earnings. Running it again on the same state posts nothing new.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use ledgerline_shared::LedgerConfig;
use ledgerline_shared::types::{JournalEntryId, PeriodId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::plan::{ClosingLine, ClosingPlan, plan_closing, verify_closed};
use crate::auth::Actor;
use crate::deadline::with_deadline;
use crate::ledger::journal::{EntryHeader, accounts_for, assemble_entry, record_entry};
use crate::ledger::validation::validate_closing_lines;
use crate::ledger::{EntryStatus, LedgerError, SourceType};
use crate::period::registry::absorb_unlocked;
use crate::period::{
    AccountingPeriod, ClosingSnapshot, PeriodStatus, Postable, closed_period_for,
};
use crate::store::{LedgerStore, LedgerTx, LockMode};

/// What a closing of a range would post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingPreview {
    /// Start the caller asked for.
    pub requested_start: NaiveDate,
    /// Start actually covered.
    pub effective_start: NaiveDate,
    /// Closing date.
    pub end_date: NaiveDate,
    /// Revenue transferred to retained earnings.
    pub total_revenue: Decimal,
    /// Expense transferred to retained earnings.
    pub total_expense: Decimal,
    /// Revenue minus expense.
    pub net_income: Decimal,
    /// Revenue accounts to be zeroed.
    pub revenue_lines: Vec<ClosingLine>,
    /// Expense accounts to be zeroed.
    pub expense_lines: Vec<ClosingLine>,
    /// Code of the retained earnings account.
    pub retained_earnings_code: String,
    /// Whether execution would succeed on the current state.
    pub can_close: bool,
    /// Blocking reasons and non-blocking findings.
    pub warnings: Vec<String>,
}

impl ClosingPreview {
    fn from_plan(plan: ClosingPlan, retained_earnings_code: &str) -> Self {
        let net_income = plan.lines.net_income();
        let can_close = plan.can_close();
        Self {
            requested_start: plan.range.requested_start,
            effective_start: plan.range.effective_start,
            end_date: plan.range.end_date,
            total_revenue: plan.lines.total_revenue,
            total_expense: plan.lines.total_expense,
            net_income,
            revenue_lines: plan.lines.revenue_lines,
            expense_lines: plan.lines.expense_lines,
            retained_earnings_code: retained_earnings_code.to_string(),
            can_close,
            warnings: plan.warnings,
        }
    }
}

/// Outcome of an executed closing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingResult {
    /// The Locked period record.
    pub period_id: PeriodId,
    /// The posted closing entry; `None` when nothing needed closing.
    pub closing_entry_id: Option<JournalEntryId>,
    /// Start actually covered.
    pub effective_start: NaiveDate,
    /// Closing date.
    pub end_date: NaiveDate,
    /// Revenue transferred.
    pub total_revenue: Decimal,
    /// Expense transferred.
    pub total_expense: Decimal,
    /// Revenue minus expense.
    pub net_income: Decimal,
}

/// The most recent closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastClosingInfo {
    /// The Locked period.
    pub period_id: PeriodId,
    /// Its last day.
    pub last_end_date: NaiveDate,
    /// Where the next closing starts.
    pub next_start_date: Option<NaiveDate>,
}

/// Period closing engine.
pub struct ClosingEngine<S> {
    store: Arc<S>,
    retained_earnings_code: String,
    timeout: Duration,
}

impl<S: LedgerStore> ClosingEngine<S> {
    /// Creates an engine over the store.
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            store,
            retained_earnings_code: config.retained_earnings_code,
            timeout: Duration::from_secs(config.operation_timeout_secs),
        }
    }

    /// Computes what [`Self::execute`] would post, without writing.
    pub async fn preview(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ClosingPreview, LedgerError> {
        let mut tx = self.store.read().await?;
        let today = Utc::now().date_naive();
        let plan = plan_closing(&mut tx, start, end, &self.retained_earnings_code, today).await?;
        Ok(ClosingPreview::from_plan(plan, &self.retained_earnings_code))
    }

    /// Closes `[start, end]`: posts the closing entry and locks the period.
    ///
    /// Runs under the exclusive period lock, so concurrent closings and
    /// postings are serialized against it. Nothing is persisted on error.
    pub async fn execute(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        description: &str,
        actor: Actor,
    ) -> Result<ClosingResult, LedgerError> {
        if !actor.role.can_close_periods() {
            return Err(LedgerError::PrivilegeRequired { role: actor.role });
        }
        if end < start {
            return Err(LedgerError::InvalidDateRange { start, end });
        }
        with_deadline(self.timeout, self.execute_in_tx(start, end, description, actor)).await
    }

    async fn execute_in_tx(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        description: &str,
        actor: Actor,
    ) -> Result<ClosingResult, LedgerError> {
        let mut tx = self.store.begin().await?;
        tx.lock_periods(LockMode::Exclusive).await?;

        let today = Utc::now().date_naive();
        let plan = plan_closing(&mut tx, start, end, &self.retained_earnings_code, today).await?;
        if let Some(blocker) = plan.blockers.first() {
            tracing::warn!(%start, %end, error = %blocker, "Period closing rejected");
            return Err(blocker.clone());
        }

        let effective_start = plan.range.effective_start;
        let end_date = plan.range.end_date;
        let description = match description.trim() {
            "" => format!("Closing {effective_start} to {end_date}"),
            given => given.to_string(),
        };

        let closing_entry_id = match plan.entry_lines() {
            Some(lines) => {
                let accounts = accounts_for(&mut tx, &lines).await?;
                let balanced = validate_closing_lines(&lines, &accounts)?;
                let header = EntryHeader {
                    source_type: SourceType::Closing,
                    source_id: None,
                    reference: format!("CLOSING-{effective_start}-{end_date}"),
                    description: description.clone(),
                    created_by: actor.user_id,
                    reverses_entry_id: None,
                };
                let entry = assemble_entry(
                    JournalEntryId::new(),
                    header,
                    Postable::for_closing(end_date),
                    &balanced,
                    EntryStatus::Posted,
                );
                record_entry(&mut tx, &entry, &balanced, true).await?;
                Some(entry.id)
            }
            None => None,
        };

        let accounts = tx.list_accounts().await?;
        let totals = tx.posted_totals_by_account(Some(end_date)).await?;
        if let Err(error) = verify_closed(&accounts, &totals) {
            tracing::error!(%effective_start, %end_date, %error, "Closing entry left a residual");
            return Err(error);
        }

        let mut period =
            match absorb_unlocked(&mut tx, &plan.periods, effective_start, end_date).await? {
                Some(period) => period,
                None => {
                    let period = AccountingPeriod::open(effective_start, end_date, description);
                    if !tx.insert_period(&period).await? {
                        return Err(LedgerError::ConcurrentModification);
                    }
                    period
                }
            };

        let net_income = plan.lines.net_income();
        let snapshot = ClosingSnapshot {
            total_revenue: plan.lines.total_revenue,
            total_expense: plan.lines.total_expense,
            net_income,
            closing_entry_id,
        };
        period.record_closing(snapshot, actor.user_id, Utc::now())?;
        tx.update_period(&period).await?;
        tx.commit().await?;

        tracing::info!(
            period_id = %period.id,
            %effective_start,
            %end_date,
            %net_income,
            closing_entry_id = ?closing_entry_id,
            closed_by = %actor.user_id,
            "Period closed"
        );

        Ok(ClosingResult {
            period_id: period.id,
            closing_entry_id,
            effective_start,
            end_date,
            total_revenue: plan.lines.total_revenue,
            total_expense: plan.lines.total_expense,
            net_income,
        })
    }

    /// The most recent Locked period, if any.
    pub async fn last_closing_info(&self) -> Result<Option<LastClosingInfo>, LedgerError> {
        let mut tx = self.store.read().await?;
        let periods = tx.list_periods().await?;
        Ok(periods
            .into_iter()
            .filter(|p| p.status() == PeriodStatus::Locked)
            .max_by_key(|p| p.end_date)
            .map(|p| LastClosingInfo {
                period_id: p.id,
                last_end_date: p.end_date,
                next_start_date: p.end_date.succ_opt(),
            }))
    }

    /// Returns true if `date` falls in a Closed or Locked period, or on or
    /// before the latest closing date.
    pub async fn is_date_in_closed_period(&self, date: NaiveDate) -> Result<bool, LedgerError> {
        let mut tx = self.store.read().await?;
        let periods = tx.list_periods().await?;
        Ok(closed_period_for(&periods, date).is_some())
    }
}
