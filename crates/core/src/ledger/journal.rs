//! Journal store operations.
//!
//! An entry reaches storage only through [`record_entry`], which requires a
//! [`Balanced`] proof from validation and a [`Postable`] proof from the period
//! registry. Cached balances move in the same transaction as the lines.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use ledgerline_shared::types::{AccountId, JournalEntryId, JournalLineId, UserId};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::account::Account;
use super::entry::{EntryStatus, JournalEntry, JournalLine, SourceType};
use super::error::LedgerError;
use super::types::{LineInput, PostJournalEntryRequest};
use super::validation::{Balanced, ValidatedLine};
use crate::period::Postable;
use crate::store::LedgerTx;

/// Header fields of an entry about to be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    /// Originating collaborator.
    pub source_type: SourceType,
    /// Originator's identifier.
    pub source_id: Option<Uuid>,
    /// Human-readable reference.
    pub reference: String,
    /// Description.
    pub description: String,
    /// Author.
    pub created_by: UserId,
    /// The entry being compensated, for reversals.
    pub reverses_entry_id: Option<JournalEntryId>,
}

impl EntryHeader {
    /// Header of a regular posting request.
    #[must_use]
    pub fn from_request(request: &PostJournalEntryRequest) -> Self {
        Self {
            source_type: request.source_type,
            source_id: request.source_id,
            reference: request.reference.clone(),
            description: request.description.clone(),
            created_by: request.created_by,
            reverses_entry_id: None,
        }
    }
}

/// Builds the entry record from its two proofs.
///
/// The entry date is the postable date. Posted entries are stamped with the
/// author as poster.
#[must_use]
pub fn assemble_entry(
    id: JournalEntryId,
    header: EntryHeader,
    postable: Postable,
    balanced: &Balanced,
    status: EntryStatus,
) -> JournalEntry {
    let now = Utc::now();
    let lines = balanced
        .lines()
        .iter()
        .zip(1u32..)
        .map(|(line, line_number)| JournalLine {
            id: JournalLineId::new(),
            entry_id: id,
            account_id: line.account_id,
            line_number,
            description: line.description.clone(),
            debit: line.debit,
            credit: line.credit,
        })
        .collect();
    let posted = status.affects_balances();

    JournalEntry {
        id,
        source_type: header.source_type,
        source_id: header.source_id,
        reference: header.reference,
        entry_date: postable.date(),
        description: header.description,
        status,
        total_debit: balanced.total_debit(),
        total_credit: balanced.total_credit(),
        is_balanced: true,
        created_by: header.created_by,
        created_at: now,
        posted_by: posted.then_some(header.created_by),
        posted_at: posted.then_some(now),
        reversed_by_entry_id: None,
        reverses_entry_id: header.reverses_entry_id,
        lines,
    }
}

/// Rejects a business event that already has an entry.
///
/// With `include_pending`, a deferred posting still waiting in the outbox
/// counts as that entry.
pub async fn ensure_unique_source<T: LedgerTx + ?Sized>(
    tx: &mut T,
    source_type: SourceType,
    source_id: Option<Uuid>,
    include_pending: bool,
) -> Result<(), LedgerError> {
    let Some(source_id) = source_id else {
        return Ok(());
    };
    let recorded = tx.find_entry_by_source(source_type, source_id).await?.is_some();
    let queued = include_pending
        && tx
            .find_pending_outbox_by_source(source_type, source_id)
            .await?
            .is_some();
    if recorded || queued {
        return Err(LedgerError::DuplicateReference {
            source_type,
            source_id,
        });
    }
    Ok(())
}

/// Persists `entry` and, when `apply_deltas` is set and the entry affects
/// balances, moves the cached balances of its accounts.
///
/// Rejects a second entry for the same `(source_type, source_id)`. Entries
/// that move balances here also collide with pending deferred postings;
/// the relay writing a message's own entry passes `apply_deltas = false`.
pub async fn record_entry<T: LedgerTx + ?Sized>(
    tx: &mut T,
    entry: &JournalEntry,
    balanced: &Balanced,
    apply_deltas: bool,
) -> Result<(), LedgerError> {
    ensure_unique_source(tx, entry.source_type, entry.source_id, apply_deltas).await?;
    tx.insert_entry(entry).await?;

    if apply_deltas && entry.affects_balances() {
        apply_balance_deltas(tx, &aggregate_deltas(balanced.lines())).await?;
    }
    Ok(())
}

/// Loads the accounts referenced by `lines`. Unknown IDs are left out and
/// reported by validation.
pub async fn accounts_for<T: LedgerTx + ?Sized>(
    tx: &mut T,
    lines: &[LineInput],
) -> Result<HashMap<AccountId, Account>, LedgerError> {
    let mut accounts = HashMap::with_capacity(lines.len());
    for line in lines {
        if accounts.contains_key(&line.account_id) {
            continue;
        }
        if let Some(account) = tx.find_account(line.account_id).await? {
            accounts.insert(account.id, account);
        }
    }
    Ok(accounts)
}

/// Sums normal-side deltas per account, ordered by account ID so concurrent
/// writers touch rows in the same order.
#[must_use]
pub fn aggregate_deltas(lines: &[ValidatedLine]) -> BTreeMap<AccountId, Decimal> {
    let mut deltas = BTreeMap::new();
    for line in lines {
        *deltas.entry(line.account_id).or_insert(Decimal::ZERO) += line.balance_delta();
    }
    deltas
}

/// Adds each delta to its account's cached balance.
pub async fn apply_balance_deltas<T: LedgerTx + ?Sized>(
    tx: &mut T,
    deltas: &BTreeMap<AccountId, Decimal>,
) -> Result<(), LedgerError> {
    for (account_id, delta) in deltas {
        if !delta.is_zero() {
            tx.add_to_cached_balance(*account_id, *delta).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::account::AccountType;
    use crate::ledger::validation::validate_lines;
    use rust_decimal_macros::dec;

    #[test]
    fn test_aggregate_deltas_merges_lines() {
        let cash = Account::new("1101".into(), "Cash".into(), AccountType::Asset, false);
        let sales = Account::new("4101".into(), "Sales".into(), AccountType::Revenue, false);
        let accounts: HashMap<_, _> = [(cash.id, cash.clone()), (sales.id, sales.clone())].into();
        let balanced = validate_lines(
            &[
                LineInput::debit(cash.id, dec!(600), ""),
                LineInput::debit(cash.id, dec!(400), ""),
                LineInput::credit(sales.id, dec!(1000), ""),
            ],
            &accounts,
        )
        .unwrap();

        let deltas = aggregate_deltas(balanced.lines());
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[&cash.id], dec!(1000));
        assert_eq!(deltas[&sales.id], dec!(1000));
    }

    #[test]
    fn test_assemble_numbers_lines_and_stamps_poster() {
        let cash = Account::new("1101".into(), "Cash".into(), AccountType::Asset, false);
        let equity = Account::new("3101".into(), "Capital".into(), AccountType::Equity, false);
        let accounts: HashMap<_, _> = [(cash.id, cash.clone()), (equity.id, equity.clone())].into();
        let balanced = validate_lines(
            &[
                LineInput::debit(cash.id, dec!(50), "in"),
                LineInput::credit(equity.id, dec!(50), "in"),
            ],
            &accounts,
        )
        .unwrap();
        let author = UserId::new();
        let date = chrono::NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        let header = EntryHeader {
            source_type: SourceType::Opening,
            source_id: None,
            reference: "OB".into(),
            description: "Opening balance".into(),
            created_by: author,
            reverses_entry_id: None,
        };

        let entry = assemble_entry(
            JournalEntryId::new(),
            header.clone(),
            Postable::for_closing(date),
            &balanced,
            EntryStatus::Posted,
        );
        assert_eq!(entry.entry_date, date);
        assert_eq!(entry.lines[1].line_number, 2);
        assert_eq!(entry.posted_by, Some(author));
        assert!(entry.is_balanced);

        let draft = assemble_entry(
            JournalEntryId::new(),
            header,
            Postable::for_closing(date),
            &balanced,
            EntryStatus::Draft,
        );
        assert_eq!(draft.posted_by, None);
        assert_eq!(draft.posted_at, None);
    }
}
