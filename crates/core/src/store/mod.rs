//! Storage port for the ledger.
//!
//! Every mutating operation runs inside exactly one [`LedgerTx`]. Dropping a
//! transaction without calling [`LedgerTx::commit`] discards all of its
//! writes, which is how timeouts and failed post-conditions roll back.

mod memory;

pub use memory::MemoryStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use ledgerline_shared::types::{AccountId, JournalEntryId, PeriodId};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::ledger::{Account, BalanceTotals, JournalEntry, LedgerError, SourceType};
use crate::outbox::OutboxMessage;
use crate::period::AccountingPeriod;
use crate::reconciliation::BalanceCorrection;

/// How a transaction holds the period registry lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Held by postings; many may run at once.
    Shared,
    /// Held by closings and period transitions; excludes everything else.
    Exclusive,
}

/// Factory for units of work.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    /// Transaction type produced by this store.
    type Tx: LedgerTx;

    /// Starts a read-write transaction.
    async fn begin(&self) -> Result<Self::Tx, LedgerError>;

    /// Starts a read-only transaction over a consistent snapshot.
    ///
    /// Readers never wait for writers to finish.
    async fn read(&self) -> Result<Self::Tx, LedgerError>;
}

/// One atomic unit of work against the ledger tables.
#[async_trait]
pub trait LedgerTx: Send {
    /// Acquires the period registry lock until the transaction ends.
    async fn lock_periods(&mut self, mode: LockMode) -> Result<(), LedgerError>;

    /// Inserts a new account.
    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError>;

    /// Persists account metadata (name, header flag, active flag).
    ///
    /// Never touches the cached balance.
    async fn update_account(&mut self, account: &Account) -> Result<(), LedgerError>;

    /// Finds an account by ID.
    async fn find_account(&mut self, id: AccountId) -> Result<Option<Account>, LedgerError>;

    /// Finds an account by code.
    async fn find_account_by_code(&mut self, code: &str) -> Result<Option<Account>, LedgerError>;

    /// Lists all accounts ordered by code.
    async fn list_accounts(&mut self) -> Result<Vec<Account>, LedgerError>;

    /// Returns true if any journal line references the account.
    async fn account_has_lines(&mut self, id: AccountId) -> Result<bool, LedgerError>;

    /// Atomically adds `delta` to the cached balance.
    ///
    /// Must be a single read-modify-write at the storage layer.
    async fn add_to_cached_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<(), LedgerError>;

    /// Overwrites the cached balance. Only the audited reconciliation
    /// routine calls this.
    async fn set_cached_balance(&mut self, id: AccountId, value: Decimal)
    -> Result<(), LedgerError>;

    /// Inserts an entry with all of its lines.
    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), LedgerError>;

    /// Persists the header fields of an entry (status, posting, reversal links).
    ///
    /// Lines are immutable and never rewritten.
    async fn update_entry_header(&mut self, entry: &JournalEntry) -> Result<(), LedgerError>;

    /// Finds an entry with its lines.
    async fn find_entry(&mut self, id: JournalEntryId)
    -> Result<Option<JournalEntry>, LedgerError>;

    /// Finds the entry recorded for a business event.
    async fn find_entry_by_source(
        &mut self,
        source_type: SourceType,
        source_id: Uuid,
    ) -> Result<Option<JournalEntry>, LedgerError>;

    /// Lists entries of any status dated within `[start, end]`, with lines.
    async fn entries_between(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<JournalEntry>, LedgerError>;

    /// Sums debit and credit of balance-affecting lines for one account with
    /// `from <= entry_date <= to` (`from` unbounded when `None`).
    async fn posted_totals(
        &mut self,
        account: AccountId,
        from: Option<NaiveDate>,
        to: NaiveDate,
    ) -> Result<BalanceTotals, LedgerError>;

    /// Same as [`LedgerTx::posted_totals`] for every account at once
    /// (`to` unbounded when `None`).
    async fn posted_totals_by_account(
        &mut self,
        to: Option<NaiveDate>,
    ) -> Result<HashMap<AccountId, BalanceTotals>, LedgerError>;

    /// Lists all periods ordered by start date.
    async fn list_periods(&mut self) -> Result<Vec<AccountingPeriod>, LedgerError>;

    /// Finds a period by ID.
    async fn find_period(&mut self, id: PeriodId) -> Result<Option<AccountingPeriod>, LedgerError>;

    /// Inserts a period unless it would overlap an existing one.
    ///
    /// Returns false when nothing was inserted.
    async fn insert_period(&mut self, period: &AccountingPeriod) -> Result<bool, LedgerError>;

    /// Persists every field of an existing period.
    async fn update_period(&mut self, period: &AccountingPeriod) -> Result<(), LedgerError>;

    /// Removes an Open period absorbed by a closing.
    async fn delete_period(&mut self, id: PeriodId) -> Result<(), LedgerError>;

    /// Enqueues a deferred posting.
    async fn enqueue_outbox(&mut self, message: &OutboxMessage) -> Result<(), LedgerError>;

    /// Pending messages, oldest first (all of them when `limit` is `None`).
    async fn pending_outbox(&mut self, limit: Option<u64>)
    -> Result<Vec<OutboxMessage>, LedgerError>;

    /// Pending message carrying the entry for a business event.
    async fn find_pending_outbox_by_source(
        &mut self,
        source_type: SourceType,
        source_id: Uuid,
    ) -> Result<Option<OutboxMessage>, LedgerError>;

    /// Number of pending messages whose entry date lies within `[start, end]`.
    async fn count_pending_outbox(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, LedgerError>;

    /// Persists status, attempts, and error of a message.
    async fn update_outbox(&mut self, message: &OutboxMessage) -> Result<(), LedgerError>;

    /// Records an audited cached-balance correction.
    async fn insert_balance_correction(
        &mut self,
        correction: &BalanceCorrection,
    ) -> Result<(), LedgerError>;

    /// Lists audited corrections, oldest first.
    async fn list_balance_corrections(&mut self) -> Result<Vec<BalanceCorrection>, LedgerError>;

    /// Makes every write of this transaction durable.
    async fn commit(self) -> Result<(), LedgerError>;
}
