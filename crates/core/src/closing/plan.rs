//! Closing computation shared by preview and execution.
//!
//! [`plan_closing`] is the only place closing figures are computed. Preview
//! returns its result; execution posts exactly the lines it produces.

use std::collections::HashMap;

use chrono::NaiveDate;
use ledgerline_shared::types::{AccountId, BALANCE_EPSILON, PeriodId, is_effectively_zero};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::{Account, AccountType, BalanceTotals, EntryStatus, LedgerError, LineInput};
use crate::outbox;
use crate::period::{AccountingPeriod, PeriodStatus};
use crate::store::LedgerTx;

/// Range a closing actually covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingRange {
    /// Start the caller asked for.
    pub requested_start: NaiveDate,
    /// Day after the previous closing, or the requested start.
    pub effective_start: NaiveDate,
    /// Last day, inclusive. The closing entry is dated here.
    pub end_date: NaiveDate,
    /// The previous closing, if any.
    pub prior_period_id: Option<PeriodId>,
}

/// Resolves the range to close against the existing periods.
///
/// Only Locked periods count as closed here; Open and Closed periods inside
/// the range are absorbed by the closing record.
pub fn resolve_range(
    periods: &[AccountingPeriod],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<ClosingRange, LedgerError> {
    if end < start {
        return Err(LedgerError::InvalidDateRange { start, end });
    }

    let locked: Vec<&AccountingPeriod> = periods
        .iter()
        .filter(|p| p.status() == PeriodStatus::Locked)
        .collect();

    // A later cumulative closing already swept everything before it.
    if locked.iter().any(|p| p.end_date >= end) {
        return Err(LedgerError::AlreadyClosed { start, end });
    }
    if let Some(overlap) = locked.iter().find(|p| p.overlaps(start, end)) {
        return Err(LedgerError::OverlappingPeriod {
            start,
            end,
            existing_start: overlap.start_date,
            existing_end: overlap.end_date,
        });
    }

    let prior = locked.iter().max_by_key(|p| p.end_date);
    let effective_start = prior
        .and_then(|p| p.end_date.succ_opt())
        .unwrap_or(start);

    Ok(ClosingRange {
        requested_start: start,
        effective_start,
        end_date: end,
        prior_period_id: prior.map(|p| p.id),
    })
}

/// One temporary account driven to zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingLine {
    /// Account.
    pub account_id: AccountId,
    /// Account code.
    pub code: String,
    /// Account name.
    pub name: String,
    /// Revenue or Expense.
    pub account_type: AccountType,
    /// Normal-side balance before closing.
    pub balance: Decimal,
    /// Debit posted by the closing entry.
    pub debit: Decimal,
    /// Credit posted by the closing entry.
    pub credit: Decimal,
}

impl ClosingLine {
    fn to_input(&self) -> LineInput {
        let description = match self.account_type {
            AccountType::Revenue => format!("Close revenue account: {}", self.name),
            _ => format!("Close expense account: {}", self.name),
        };
        LineInput {
            account_id: self.account_id,
            debit: self.debit,
            credit: self.credit,
            description,
        }
    }
}

/// Closing lines and totals for the temporary accounts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingLines {
    /// Revenue accounts, ordered by code.
    pub revenue_lines: Vec<ClosingLine>,
    /// Expense accounts, ordered by code.
    pub expense_lines: Vec<ClosingLine>,
    /// Revenue transferred to retained earnings.
    pub total_revenue: Decimal,
    /// Expense transferred to retained earnings.
    pub total_expense: Decimal,
}

impl ClosingLines {
    /// Revenue minus expense.
    #[must_use]
    pub fn net_income(&self) -> Decimal {
        self.total_revenue - self.total_expense
    }

    /// True when no temporary account carries a balance.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.revenue_lines.is_empty() && self.expense_lines.is_empty()
    }
}

/// Computes the lines that drive every non-header temporary account to zero.
///
/// `totals` are cumulative to the closing date, so balances left by earlier
/// closings are already included. The closing delta of an account is the
/// negated debit-minus-credit balance: positive posts a debit, negative a
/// credit. Totals are the normal-side balances being transferred.
#[must_use]
pub fn compute_closing_lines(
    accounts: &[Account],
    totals: &HashMap<AccountId, BalanceTotals>,
) -> ClosingLines {
    let mut lines = ClosingLines::default();
    for account in accounts.iter().filter(|a| a.is_closable()) {
        let account_totals = totals.get(&account.id).copied().unwrap_or_default();
        let balance = account_totals.signed_for(account.account_type);
        if balance.abs() < BALANCE_EPSILON {
            continue;
        }

        let closing_delta = -account_totals.net_debit();
        let (debit, credit) = if closing_delta > Decimal::ZERO {
            (closing_delta, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -closing_delta)
        };
        let line = ClosingLine {
            account_id: account.id,
            code: account.code.clone(),
            name: account.name.clone(),
            account_type: account.account_type,
            balance,
            debit,
            credit,
        };
        if account.account_type == AccountType::Revenue {
            lines.total_revenue += balance;
            lines.revenue_lines.push(line);
        } else {
            lines.total_expense += balance;
            lines.expense_lines.push(line);
        }
    }
    lines.revenue_lines.sort_by(|a, b| a.code.cmp(&b.code));
    lines.expense_lines.sort_by(|a, b| a.code.cmp(&b.code));
    lines
}

/// Full line set of the closing entry: temporary accounts first, then the
/// retained earnings counter-lines for the non-zero totals.
#[must_use]
pub fn closing_entry_lines(lines: &ClosingLines, retained_earnings: AccountId) -> Vec<LineInput> {
    let mut inputs: Vec<LineInput> = lines
        .revenue_lines
        .iter()
        .chain(&lines.expense_lines)
        .map(ClosingLine::to_input)
        .collect();

    let revenue = lines.total_revenue;
    if !revenue.is_zero() {
        let description = "Transfer revenue to retained earnings";
        inputs.push(if revenue > Decimal::ZERO {
            LineInput::credit(retained_earnings, revenue, description)
        } else {
            LineInput::debit(retained_earnings, -revenue, description)
        });
    }
    let expense = lines.total_expense;
    if !expense.is_zero() {
        let description = "Transfer expenses to retained earnings";
        inputs.push(if expense > Decimal::ZERO {
            LineInput::debit(retained_earnings, expense, description)
        } else {
            LineInput::credit(retained_earnings, -expense, description)
        });
    }
    inputs
}

/// Checks that every non-header temporary account is zero after closing.
pub fn verify_closed(
    accounts: &[Account],
    totals: &HashMap<AccountId, BalanceTotals>,
) -> Result<(), LedgerError> {
    for account in accounts.iter().filter(|a| a.is_closable()) {
        let residual = totals
            .get(&account.id)
            .map_or(Decimal::ZERO, |t| t.signed_for(account.account_type));
        if !is_effectively_zero(residual) {
            return Err(LedgerError::ClosingDidNotBalance {
                account_id: account.id,
                residual,
            });
        }
    }
    Ok(())
}

/// Everything a closing would do, computed without side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosingPlan {
    /// Resolved range.
    pub range: ClosingRange,
    /// Lines and totals for the temporary accounts.
    pub lines: ClosingLines,
    /// The account receiving net income.
    pub retained_earnings: Option<Account>,
    /// Periods overlapping the range, as read at planning time.
    pub periods: Vec<AccountingPeriod>,
    /// Reasons the closing cannot run.
    pub blockers: Vec<LedgerError>,
    /// Findings that do not prevent the closing.
    pub warnings: Vec<String>,
}

impl ClosingPlan {
    /// True when nothing blocks execution.
    #[must_use]
    pub fn can_close(&self) -> bool {
        self.blockers.is_empty()
    }

    /// Lines of the closing entry, or `None` when nothing needs closing.
    #[must_use]
    pub fn entry_lines(&self) -> Option<Vec<LineInput>> {
        let retained_earnings = self.retained_earnings.as_ref()?;
        (!self.lines.is_empty()).then(|| closing_entry_lines(&self.lines, retained_earnings.id))
    }
}

/// Computes a closing of `[start, end]` inside `tx`.
///
/// Range errors that make the request meaningless are returned as errors;
/// conditions that only prevent execution become blockers.
pub async fn plan_closing<T: LedgerTx + ?Sized>(
    tx: &mut T,
    start: NaiveDate,
    end: NaiveDate,
    retained_earnings_code: &str,
    today: NaiveDate,
) -> Result<ClosingPlan, LedgerError> {
    if end < start {
        return Err(LedgerError::InvalidDateRange { start, end });
    }

    let periods = tx.list_periods().await?;
    let mut blockers = Vec::new();
    let range = match resolve_range(&periods, start, end) {
        Ok(range) => range,
        Err(error) => {
            blockers.push(error);
            ClosingRange {
                requested_start: start,
                effective_start: start,
                end_date: end,
                prior_period_id: None,
            }
        }
    };

    let retained_earnings = tx
        .find_account_by_code(retained_earnings_code)
        .await?
        .filter(|a| a.account_type == AccountType::Equity && a.is_active && !a.is_header);
    if retained_earnings.is_none() {
        blockers.push(LedgerError::RetainedEarningsNotFound(
            retained_earnings_code.to_string(),
        ));
    }

    let accounts = tx.list_accounts().await?;
    let totals = tx.posted_totals_by_account(Some(end)).await?;
    let lines = compute_closing_lines(&accounts, &totals);

    let entries = tx.entries_between(range.effective_start, end).await?;
    let unbalanced = entries
        .iter()
        .filter(|e| e.affects_balances() && e.total_debit != e.total_credit)
        .count();
    if unbalanced > 0 {
        blockers.push(LedgerError::UnbalancedEntriesInPeriod { count: unbalanced });
    }
    // The closing sweeps everything up to `end`, not just its own range.
    let pending = outbox::pending_through(tx, end).await?;
    if pending > 0 {
        blockers.push(LedgerError::PendingDeferredPostings { count: pending });
    }

    let mut warnings: Vec<String> = blockers.iter().map(ToString::to_string).collect();
    if range.effective_start != start {
        warnings.push(format!(
            "Closing starts on {} (day after the previous closing), not on {start}",
            range.effective_start
        ));
    }
    if end > today {
        warnings.push(format!("End date {end} is in the future"));
    }
    let drafts = entries
        .iter()
        .filter(|e| e.status == EntryStatus::Draft)
        .count();
    if drafts > 0 {
        warnings.push(format!(
            "{drafts} draft entries in the range will not be included"
        ));
    }
    if lines.is_empty() {
        warnings.push("No revenue or expense balance to close".to_string());
    }

    let periods = periods
        .into_iter()
        .filter(|p| p.overlaps(range.effective_start, end))
        .collect();

    Ok(ClosingPlan {
        range,
        lines,
        retained_earnings,
        periods,
        blockers,
        warnings,
    })
}
