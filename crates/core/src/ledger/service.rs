//! Ledger service: the account registry, journal, and balance contracts.
//!
//! Every mutating operation runs in one store transaction under the
//! configured deadline. Reads go through snapshot transactions and never
//! wait for writers.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use ledgerline_shared::LedgerConfig;
use ledgerline_shared::types::{AccountId, JournalEntryId, UserId};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::account::{Account, validate_account_code};
use super::balance::{TrialBalance, balance_as_of, balance_for_range};
use super::entry::{EntryStatus, JournalEntry, SourceType};
use super::error::LedgerError;
use super::journal::{
    EntryHeader, accounts_for, aggregate_deltas, apply_balance_deltas, assemble_entry,
    ensure_unique_source, record_entry,
};
use super::reversal::{check_reversible, reversal_description, reversing_lines};
use super::types::{
    AccountUpdate, LineInput, NewAccount, PostJournalEntryRequest, PostingResult,
    ReverseEntryRequest,
};
use super::validation::validate_lines;
use crate::deadline::with_deadline;
use crate::outbox::{BalanceDelta, OutboxMessage};
use crate::period::{PostingWindow, ensure_postable};
use crate::store::{LedgerStore, LedgerTx, LockMode};

/// Ledger service over a storage backend.
pub struct LedgerService<S> {
    store: Arc<S>,
    window: PostingWindow,
    timeout: Duration,
}

impl<S: LedgerStore> LedgerService<S> {
    /// Creates a service over the store.
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            store,
            window: PostingWindow::from_config(&config),
            timeout: Duration::from_secs(config.operation_timeout_secs),
        }
    }

    /// Adds an account to the chart.
    pub async fn create_account(&self, new: NewAccount) -> Result<Account, LedgerError> {
        validate_account_code(&new.code)?;
        let name = new.name.trim().to_string();

        let mut tx = self.store.begin().await?;
        if tx.find_account_by_code(&new.code).await?.is_some() {
            return Err(LedgerError::DuplicateAccountCode(new.code));
        }

        let mut account = Account::new(new.code, name, new.account_type, new.is_header);
        if let Some(parent_code) = new.parent_code {
            let invalid = |reason: &str| LedgerError::InvalidParentAccount {
                code: parent_code.clone(),
                reason: reason.to_string(),
            };
            let parent = tx
                .find_account_by_code(&parent_code)
                .await?
                .ok_or_else(|| invalid("does not exist"))?;
            if !parent.is_header {
                return Err(invalid("is not a header account"));
            }
            if parent.account_type != account.account_type {
                return Err(invalid("has a different account type"));
            }
            account.parent_id = Some(parent.id);
        }

        tx.insert_account(&account).await?;
        tx.commit().await?;

        tracing::info!(
            account_id = %account.id,
            code = %account.code,
            account_type = %account.account_type,
            "Account created"
        );
        Ok(account)
    }

    /// Changes account metadata.
    ///
    /// A leaf that already has journal lines cannot become a header.
    pub async fn update_account(
        &self,
        id: AccountId,
        update: AccountUpdate,
    ) -> Result<Account, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut account = tx
            .find_account(id)
            .await?
            .ok_or(LedgerError::AccountNotFound(id))?;

        if let Some(name) = update.name {
            account.name = name.trim().to_string();
        }
        if let Some(is_header) = update.is_header {
            if is_header && !account.is_header && tx.account_has_lines(id).await? {
                return Err(LedgerError::HeaderConversionNotAllowed(id));
            }
            account.is_header = is_header;
        }
        account.updated_at = Utc::now();

        tx.update_account(&account).await?;
        tx.commit().await?;
        Ok(account)
    }

    /// Stops an account from receiving new lines.
    pub async fn deactivate_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.set_active(id, false).await
    }

    /// Allows an inactive account to receive lines again.
    pub async fn reactivate_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        self.set_active(id, true).await
    }

    async fn set_active(&self, id: AccountId, is_active: bool) -> Result<Account, LedgerError> {
        let mut tx = self.store.begin().await?;
        let mut account = tx
            .find_account(id)
            .await?
            .ok_or(LedgerError::AccountNotFound(id))?;
        account.is_active = is_active;
        account.updated_at = Utc::now();
        tx.update_account(&account).await?;
        tx.commit().await?;

        tracing::info!(account_id = %id, code = %account.code, is_active, "Account activation changed");
        Ok(account)
    }

    /// Account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, LedgerError> {
        let mut tx = self.store.read().await?;
        tx.find_account(id)
            .await?
            .ok_or(LedgerError::AccountNotFound(id))
    }

    /// Account by code.
    pub async fn get_account_by_code(&self, code: &str) -> Result<Account, LedgerError> {
        let mut tx = self.store.read().await?;
        tx.find_account_by_code(code)
            .await?
            .ok_or_else(|| LedgerError::AccountCodeNotFound(code.to_string()))
    }

    /// The whole chart, ordered by code.
    pub async fn list_accounts(&self) -> Result<Vec<Account>, LedgerError> {
        let mut tx = self.store.read().await?;
        tx.list_accounts().await
    }

    /// Records a journal entry, posting it immediately when `auto_post` is set.
    ///
    /// Validation, the period check, the entry, its lines, and the cached
    /// balance deltas all happen in one transaction.
    pub async fn post_journal_entry(
        &self,
        request: PostJournalEntryRequest,
    ) -> Result<PostingResult, LedgerError> {
        with_deadline(self.timeout, self.post_in_tx(request)).await
    }

    async fn post_in_tx(
        &self,
        request: PostJournalEntryRequest,
    ) -> Result<PostingResult, LedgerError> {
        let mut tx = self.store.begin().await?;
        tx.lock_periods(LockMode::Shared).await?;

        let accounts = accounts_for(&mut tx, &request.lines).await?;
        let balanced = validate_lines(&request.lines, &accounts)?;
        let postable = ensure_postable(
            &mut tx,
            request.entry_date,
            Some((&self.window, Utc::now().date_naive())),
        )
        .await?;

        let status = if request.auto_post {
            EntryStatus::Posted
        } else {
            EntryStatus::Draft
        };
        let entry = assemble_entry(
            JournalEntryId::new(),
            EntryHeader::from_request(&request),
            postable,
            &balanced,
            status,
        );
        record_entry(&mut tx, &entry, &balanced, true).await?;
        tx.commit().await?;

        tracing::info!(
            entry_id = %entry.id,
            source_type = %entry.source_type,
            entry_date = %entry.entry_date,
            status = %entry.status,
            total = %entry.total_debit,
            "Journal entry recorded"
        );
        Ok(PostingResult {
            entry_id: entry.id,
            status,
        })
    }

    /// Posts a draft entry, re-validating its lines and date.
    pub async fn post_draft(
        &self,
        entry_id: JournalEntryId,
        posted_by: UserId,
    ) -> Result<JournalEntry, LedgerError> {
        with_deadline(self.timeout, self.post_draft_in_tx(entry_id, posted_by)).await
    }

    async fn post_draft_in_tx(
        &self,
        entry_id: JournalEntryId,
        posted_by: UserId,
    ) -> Result<JournalEntry, LedgerError> {
        let mut tx = self.store.begin().await?;
        tx.lock_periods(LockMode::Shared).await?;

        let mut entry = tx
            .find_entry(entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(entry_id))?;
        if entry.status != EntryStatus::Draft {
            return Err(LedgerError::AlreadyPosted(entry_id));
        }

        let lines: Vec<LineInput> = entry
            .lines
            .iter()
            .map(|line| LineInput {
                account_id: line.account_id,
                debit: line.debit,
                credit: line.credit,
                description: line.description.clone(),
            })
            .collect();
        let accounts = accounts_for(&mut tx, &lines).await?;
        let balanced = validate_lines(&lines, &accounts)?;
        ensure_postable(
            &mut tx,
            entry.entry_date,
            Some((&self.window, Utc::now().date_naive())),
        )
        .await?;

        entry.status = EntryStatus::Posted;
        entry.posted_by = Some(posted_by);
        entry.posted_at = Some(Utc::now());
        tx.update_entry_header(&entry).await?;
        apply_balance_deltas(&mut tx, &aggregate_deltas(balanced.lines())).await?;
        tx.commit().await?;

        tracing::info!(entry_id = %entry_id, posted_by = %posted_by, "Draft journal entry posted");
        Ok(entry)
    }

    /// Validates an entry, moves the cached balances, and enqueues the
    /// journal write for the outbox relay.
    ///
    /// The returned entry ID becomes readable once the relay has run.
    pub async fn post_deferred(
        &self,
        request: PostJournalEntryRequest,
    ) -> Result<PostingResult, LedgerError> {
        with_deadline(self.timeout, self.post_deferred_in_tx(request)).await
    }

    async fn post_deferred_in_tx(
        &self,
        request: PostJournalEntryRequest,
    ) -> Result<PostingResult, LedgerError> {
        let mut tx = self.store.begin().await?;
        tx.lock_periods(LockMode::Shared).await?;

        let accounts = accounts_for(&mut tx, &request.lines).await?;
        let balanced = validate_lines(&request.lines, &accounts)?;
        ensure_postable(
            &mut tx,
            request.entry_date,
            Some((&self.window, Utc::now().date_naive())),
        )
        .await?;
        ensure_unique_source(&mut tx, request.source_type, request.source_id, true).await?;

        let deltas = aggregate_deltas(balanced.lines());
        apply_balance_deltas(&mut tx, &deltas).await?;

        let entry_id = JournalEntryId::new();
        let balance_deltas = deltas
            .into_iter()
            .map(|(account_id, amount)| BalanceDelta { account_id, amount })
            .collect();
        let mut request = request;
        request.auto_post = true;
        let message = OutboxMessage::pending(entry_id, request, balance_deltas);
        tx.enqueue_outbox(&message).await?;
        tx.commit().await?;

        tracing::info!(
            entry_id = %entry_id,
            message_id = %message.id,
            entry_date = %message.entry_date,
            "Deferred journal entry enqueued"
        );
        Ok(PostingResult {
            entry_id,
            status: EntryStatus::Posted,
        })
    }

    /// Reverses a posted entry with a compensating entry.
    ///
    /// The original stays in the ledger with status Reversed.
    pub async fn reverse_entry(
        &self,
        request: ReverseEntryRequest,
    ) -> Result<JournalEntry, LedgerError> {
        with_deadline(self.timeout, self.reverse_in_tx(request)).await
    }

    async fn reverse_in_tx(&self, request: ReverseEntryRequest) -> Result<JournalEntry, LedgerError> {
        if request.reason.trim().is_empty() {
            return Err(LedgerError::ReasonRequired);
        }

        let mut tx = self.store.begin().await?;
        tx.lock_periods(LockMode::Shared).await?;

        let mut original = tx
            .find_entry(request.entry_id)
            .await?
            .ok_or(LedgerError::EntryNotFound(request.entry_id))?;
        check_reversible(&original)?;

        let today = Utc::now().date_naive();
        let lines = reversing_lines(&original);
        let accounts = accounts_for(&mut tx, &lines).await?;
        let balanced = validate_lines(&lines, &accounts)?;
        let postable = ensure_postable(
            &mut tx,
            request.reversal_date.unwrap_or(today),
            Some((&self.window, today)),
        )
        .await?;

        let header = EntryHeader {
            source_type: SourceType::Reversal,
            source_id: Some(original.id.into_inner()),
            reference: original.reference.clone(),
            description: reversal_description(&original, &request.reason),
            created_by: request.reversed_by,
            reverses_entry_id: Some(original.id),
        };
        let reversal = assemble_entry(
            JournalEntryId::new(),
            header,
            postable,
            &balanced,
            EntryStatus::Posted,
        );
        record_entry(&mut tx, &reversal, &balanced, true).await?;

        original.status = EntryStatus::Reversed;
        original.reversed_by_entry_id = Some(reversal.id);
        tx.update_entry_header(&original).await?;
        tx.commit().await?;

        tracing::info!(
            entry_id = %original.id,
            reversal_entry_id = %reversal.id,
            reversed_by = %request.reversed_by,
            reason = %request.reason.trim(),
            "Journal entry reversed"
        );
        Ok(reversal)
    }

    /// Entry with its lines.
    pub async fn get_entry(&self, id: JournalEntryId) -> Result<JournalEntry, LedgerError> {
        let mut tx = self.store.read().await?;
        tx.find_entry(id).await?.ok_or(LedgerError::EntryNotFound(id))
    }

    /// Entry recorded for a business event, if any.
    pub async fn find_by_reference(
        &self,
        source_type: SourceType,
        source_id: Uuid,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        let mut tx = self.store.read().await?;
        tx.find_entry_by_source(source_type, source_id).await
    }

    /// Normal-side balance of an account as of a date, derived from the journal.
    pub async fn get_balance(
        &self,
        account_id: AccountId,
        as_of: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        let mut tx = self.store.read().await?;
        let account = tx
            .find_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        balance_as_of(&mut tx, &account, as_of).await
    }

    /// Normal-side activity of an account within `[start, end]`.
    pub async fn get_period_activity(
        &self,
        account_id: AccountId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Decimal, LedgerError> {
        let mut tx = self.store.read().await?;
        let account = tx
            .find_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        balance_for_range(&mut tx, &account, start, end).await
    }

    /// Trial balance as of a date.
    pub async fn trial_balance(&self, as_of: NaiveDate) -> Result<TrialBalance, LedgerError> {
        let mut tx = self.store.read().await?;
        let accounts = tx.list_accounts().await?;
        let totals = tx.posted_totals_by_account(Some(as_of)).await?;
        Ok(TrialBalance::build(as_of, &accounts, &totals))
    }
}
