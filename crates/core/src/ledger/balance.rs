//! Balance calculation.
//!
//! This is the single implementation of "balance as of a date" and "activity
//! for a range". Reports, trial balance, closing preview, closing execution,
//! and reconciliation all derive balances through these functions, always
//! from the journal lines and never from the cached column.

use chrono::NaiveDate;
use ledgerline_shared::types::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::{Account, AccountType};
use super::entry::JournalEntry;
use super::error::LedgerError;
use crate::store::LedgerTx;

/// Raw debit and credit sums for an account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceTotals {
    /// Sum of debits.
    pub debit: Decimal,
    /// Sum of credits.
    pub credit: Decimal,
}

impl BalanceTotals {
    /// Adds one line's amounts.
    pub fn add(&mut self, debit: Decimal, credit: Decimal) {
        self.debit += debit;
        self.credit += credit;
    }

    /// Debit minus credit.
    #[must_use]
    pub fn net_debit(&self) -> Decimal {
        self.debit - self.credit
    }

    /// Applies the account type's sign convention.
    ///
    /// Positive means a balance on the account's normal side.
    #[must_use]
    pub fn signed_for(&self, account_type: AccountType) -> Decimal {
        account_type.normal_side().signed(self.debit, self.credit)
    }
}

/// Balance of an account as of `date` (inclusive), normal-side signed.
///
/// Cumulative from the beginning of the ledger, so it includes the effect of
/// every closing entry already posted.
pub async fn balance_as_of<T: LedgerTx + ?Sized>(
    tx: &mut T,
    account: &Account,
    date: NaiveDate,
) -> Result<Decimal, LedgerError> {
    let totals = tx.posted_totals(account.id, None, date).await?;
    Ok(totals.signed_for(account.account_type))
}

/// Activity of an account within `[start, end]`, normal-side signed.
pub async fn balance_for_range<T: LedgerTx + ?Sized>(
    tx: &mut T,
    account: &Account,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Decimal, LedgerError> {
    if end < start {
        return Err(LedgerError::InvalidDateRange { start, end });
    }
    let totals = tx.posted_totals(account.id, Some(start), end).await?;
    Ok(totals.signed_for(account.account_type))
}

/// Folds balance-affecting lines of `entries` into per-account totals.
///
/// Storage backends without a query engine use this to answer
/// [`LedgerTx::posted_totals`].
pub fn fold_totals<'a, I>(
    entries: I,
    account: Option<AccountId>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> std::collections::HashMap<AccountId, BalanceTotals>
where
    I: IntoIterator<Item = &'a JournalEntry>,
{
    let mut totals: std::collections::HashMap<AccountId, BalanceTotals> =
        std::collections::HashMap::new();
    for entry in entries {
        if !entry.affects_balances()
            || from.is_some_and(|from| entry.entry_date < from)
            || to.is_some_and(|to| entry.entry_date > to)
        {
            continue;
        }
        for line in &entry.lines {
            if account.is_none_or(|id| id == line.account_id) {
                totals
                    .entry(line.account_id)
                    .or_default()
                    .add(line.debit, line.credit);
            }
        }
    }
    totals
}

/// One row of a trial balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    /// Account.
    pub account_id: AccountId,
    /// Account code.
    pub code: String,
    /// Account name.
    pub name: String,
    /// Account classification.
    pub account_type: AccountType,
    /// Debit column (net debit balance).
    pub debit: Decimal,
    /// Credit column (net credit balance).
    pub credit: Decimal,
}

/// Trial balance as of a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    /// As-of date.
    pub as_of: NaiveDate,
    /// Non-zero leaf accounts, ordered by code.
    pub rows: Vec<TrialBalanceRow>,
    /// Sum of the debit column.
    pub total_debit: Decimal,
    /// Sum of the credit column.
    pub total_credit: Decimal,
    /// True when both columns agree.
    pub is_balanced: bool,
}

impl TrialBalance {
    /// Builds a trial balance from accounts and their totals as of `as_of`.
    #[must_use]
    pub fn build(
        as_of: NaiveDate,
        accounts: &[Account],
        totals: &std::collections::HashMap<AccountId, BalanceTotals>,
    ) -> Self {
        let mut rows = Vec::new();
        let mut total_debit = Decimal::ZERO;
        let mut total_credit = Decimal::ZERO;

        for account in accounts.iter().filter(|a| !a.is_header) {
            let net = totals
                .get(&account.id)
                .map_or(Decimal::ZERO, BalanceTotals::net_debit);
            if net.is_zero() {
                continue;
            }
            let (debit, credit) = if net > Decimal::ZERO {
                (net, Decimal::ZERO)
            } else {
                (Decimal::ZERO, -net)
            };
            total_debit += debit;
            total_credit += credit;
            rows.push(TrialBalanceRow {
                account_id: account.id,
                code: account.code.clone(),
                name: account.name.clone(),
                account_type: account.account_type,
                debit,
                credit,
            });
        }
        rows.sort_by(|a, b| a.code.cmp(&b.code));

        Self {
            as_of,
            rows,
            total_debit,
            total_credit,
            is_balanced: total_debit == total_credit,
        }
    }
}
