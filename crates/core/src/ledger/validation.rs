//! Double-entry validation.
//!
//! [`validate_lines`] is the only way to obtain a [`Balanced`] proof, and the
//! journal store accepts nothing else. Validation never touches storage.

use std::collections::HashMap;

use ledgerline_shared::types::{AccountId, CURRENCY_SCALE, MAX_AMOUNT};
use rust_decimal::Decimal;

use super::account::{Account, AccountType};
use super::error::LedgerError;
use super::types::LineInput;

/// A line that passed validation, with the account facts needed to post it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedLine {
    /// Account posted to.
    pub account_id: AccountId,
    /// Classification of that account.
    pub account_type: AccountType,
    /// Line memo.
    pub description: String,
    /// Debit amount.
    pub debit: Decimal,
    /// Credit amount.
    pub credit: Decimal,
}

impl ValidatedLine {
    /// Normal-side balance effect of this line on its account.
    #[must_use]
    pub fn balance_delta(&self) -> Decimal {
        self.account_type.normal_side().signed(self.debit, self.credit)
    }
}

/// Proof that a set of lines is well-formed and balanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Balanced {
    lines: Vec<ValidatedLine>,
    total_debit: Decimal,
    total_credit: Decimal,
}

impl Balanced {
    /// The validated lines, in request order.
    #[must_use]
    pub fn lines(&self) -> &[ValidatedLine] {
        &self.lines
    }

    /// Sum of debits.
    #[must_use]
    pub const fn total_debit(&self) -> Decimal {
        self.total_debit
    }

    /// Sum of credits.
    #[must_use]
    pub const fn total_credit(&self) -> Decimal {
        self.total_credit
    }
}

/// Validates requested lines against the referenced accounts.
///
/// Rules, in order:
/// 1. At least one line
/// 2. Each line has exactly one non-zero, non-negative side at currency scale,
///    and neither a line nor the running totals exceed [`MAX_AMOUNT`]
/// 3. Each account exists, is a leaf, and is active
/// 4. Total debits equal total credits exactly
///
/// # Errors
///
/// Returns the first violated rule.
pub fn validate_lines(
    lines: &[LineInput],
    accounts: &HashMap<AccountId, Account>,
) -> Result<Balanced, LedgerError> {
    validate(lines, accounts, true)
}

/// Validates closing lines. Inactive temporary accounts must still be zeroed,
/// so the active check is skipped; every other rule applies.
pub(crate) fn validate_closing_lines(
    lines: &[LineInput],
    accounts: &HashMap<AccountId, Account>,
) -> Result<Balanced, LedgerError> {
    validate(lines, accounts, false)
}

fn validate(
    lines: &[LineInput],
    accounts: &HashMap<AccountId, Account>,
    require_active: bool,
) -> Result<Balanced, LedgerError> {
    if lines.is_empty() {
        return Err(LedgerError::EmptyEntry);
    }

    let mut validated = Vec::with_capacity(lines.len());
    let mut total_debit = Decimal::ZERO;
    let mut total_credit = Decimal::ZERO;

    for (index, line) in lines.iter().enumerate() {
        let line_number = u32::try_from(index + 1).unwrap_or(u32::MAX);
        check_amounts(line, line_number)?;

        let account = accounts
            .get(&line.account_id)
            .ok_or(LedgerError::AccountNotFound(line.account_id))?;
        if account.is_header {
            return Err(LedgerError::HeaderAccountPosting(account.id));
        }
        if require_active && !account.is_active {
            return Err(LedgerError::AccountInactive(account.id));
        }

        total_debit = add_within_limit(total_debit, line.debit, line_number)?;
        total_credit = add_within_limit(total_credit, line.credit, line_number)?;
        validated.push(ValidatedLine {
            account_id: account.id,
            account_type: account.account_type,
            description: line.description.clone(),
            debit: line.debit,
            credit: line.credit,
        });
    }

    if total_debit != total_credit {
        return Err(LedgerError::UnbalancedEntry {
            debit_total: total_debit,
            credit_total: total_credit,
        });
    }

    Ok(Balanced {
        lines: validated,
        total_debit,
        total_credit,
    })
}

fn check_amounts(line: &LineInput, line_number: u32) -> Result<(), LedgerError> {
    let invalid = |reason: &str| LedgerError::InvalidLine {
        line_number,
        reason: reason.to_string(),
    };

    if line.debit.is_sign_negative() || line.credit.is_sign_negative() {
        return Err(invalid("amounts cannot be negative"));
    }
    match (line.debit.is_zero(), line.credit.is_zero()) {
        (false, false) => return Err(invalid("line has both debit and credit")),
        (true, true) => return Err(invalid("line has neither debit nor credit")),
        _ => {}
    }
    if line.debit.normalize().scale() > CURRENCY_SCALE
        || line.credit.normalize().scale() > CURRENCY_SCALE
    {
        return Err(invalid("amount exceeds currency precision"));
    }
    if line.debit > MAX_AMOUNT || line.credit > MAX_AMOUNT {
        return Err(invalid("amount exceeds the maximum amount"));
    }
    Ok(())
}

fn add_within_limit(
    total: Decimal,
    amount: Decimal,
    line_number: u32,
) -> Result<Decimal, LedgerError> {
    total
        .checked_add(amount)
        .filter(|sum| *sum <= MAX_AMOUNT)
        .ok_or_else(|| LedgerError::InvalidLine {
            line_number,
            reason: "entry total exceeds the maximum amount".to_string(),
        })
}
