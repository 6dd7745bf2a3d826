//! In-memory ledger store.
//!
//! Writers are serialized by a gate and work on a private copy of the state
//! that replaces the committed state on commit. Readers take a snapshot of
//! the committed state and never wait for writers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use ledgerline_shared::types::{AccountId, JournalEntryId, PeriodId};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{LedgerStore, LedgerTx, LockMode};
use crate::ledger::balance::fold_totals;
use crate::ledger::{Account, BalanceTotals, JournalEntry, LedgerError, SourceType};
use crate::outbox::{OutboxMessage, OutboxStatus};
use crate::period::AccountingPeriod;
use crate::reconciliation::BalanceCorrection;

#[derive(Debug, Clone, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    entries: Vec<JournalEntry>,
    periods: Vec<AccountingPeriod>,
    outbox: Vec<OutboxMessage>,
    corrections: Vec<BalanceCorrection>,
}

/// Ledger store kept in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    committed: Arc<RwLock<State>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<MemoryTx, LedgerError> {
        let gate = self.writer.clone().lock_owned().await;
        let working = self.committed.read().await.clone();
        Ok(MemoryTx {
            committed: self.committed.clone(),
            working,
            gate: Some(gate),
        })
    }

    async fn read(&self) -> Result<MemoryTx, LedgerError> {
        let working = self.committed.read().await.clone();
        Ok(MemoryTx {
            committed: self.committed.clone(),
            working,
            gate: None,
        })
    }
}

/// Transaction over a [`MemoryStore`].
pub struct MemoryTx {
    committed: Arc<RwLock<State>>,
    working: State,
    gate: Option<OwnedMutexGuard<()>>,
}

impl MemoryTx {
    fn writable(&mut self) -> Result<&mut State, LedgerError> {
        if self.gate.is_none() {
            return Err(LedgerError::Storage("read-only transaction".to_string()));
        }
        Ok(&mut self.working)
    }

    fn account_mut(&mut self, id: AccountId) -> Result<&mut Account, LedgerError> {
        self.writable()?
            .accounts
            .get_mut(&id)
            .ok_or(LedgerError::AccountNotFound(id))
    }
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_periods(&mut self, _mode: LockMode) -> Result<(), LedgerError> {
        // Writers already hold the gate for the whole transaction.
        Ok(())
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        let state = self.writable()?;
        if state.accounts.values().any(|a| a.code == account.code) {
            return Err(LedgerError::DuplicateAccountCode(account.code.clone()));
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        let stored = self.account_mut(account.id)?;
        let cached_balance = stored.cached_balance;
        *stored = account.clone();
        stored.cached_balance = cached_balance;
        Ok(())
    }

    async fn find_account(&mut self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        Ok(self.working.accounts.get(&id).cloned())
    }

    async fn find_account_by_code(&mut self, code: &str) -> Result<Option<Account>, LedgerError> {
        Ok(self
            .working
            .accounts
            .values()
            .find(|a| a.code == code)
            .cloned())
    }

    async fn list_accounts(&mut self) -> Result<Vec<Account>, LedgerError> {
        let mut accounts: Vec<Account> = self.working.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn account_has_lines(&mut self, id: AccountId) -> Result<bool, LedgerError> {
        Ok(self
            .working
            .entries
            .iter()
            .flat_map(|e| &e.lines)
            .any(|l| l.account_id == id))
    }

    async fn add_to_cached_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<(), LedgerError> {
        let account = self.account_mut(id)?;
        account.cached_balance += delta;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn set_cached_balance(
        &mut self,
        id: AccountId,
        value: Decimal,
    ) -> Result<(), LedgerError> {
        let account = self.account_mut(id)?;
        account.cached_balance = value;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), LedgerError> {
        let state = self.writable()?;
        if state.entries.iter().any(|e| e.id == entry.id) {
            return Err(LedgerError::Storage(format!(
                "journal entry {} already exists",
                entry.id
            )));
        }
        if let Some(source_id) = entry.source_id
            && state
                .entries
                .iter()
                .any(|e| e.source_type == entry.source_type && e.source_id == Some(source_id))
        {
            return Err(LedgerError::DuplicateReference {
                source_type: entry.source_type,
                source_id,
            });
        }
        state.entries.push(entry.clone());
        Ok(())
    }

    async fn update_entry_header(&mut self, entry: &JournalEntry) -> Result<(), LedgerError> {
        let stored = self
            .writable()?
            .entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or(LedgerError::EntryNotFound(entry.id))?;
        let lines = std::mem::take(&mut stored.lines);
        *stored = JournalEntry {
            lines,
            ..entry.clone()
        };
        Ok(())
    }

    async fn find_entry(
        &mut self,
        id: JournalEntryId,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        Ok(self.working.entries.iter().find(|e| e.id == id).cloned())
    }

    async fn find_entry_by_source(
        &mut self,
        source_type: SourceType,
        source_id: Uuid,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        Ok(self
            .working
            .entries
            .iter()
            .find(|e| e.source_type == source_type && e.source_id == Some(source_id))
            .cloned())
    }

    async fn entries_between(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        let mut entries: Vec<JournalEntry> = self
            .working
            .entries
            .iter()
            .filter(|e| e.entry_date >= start && e.entry_date <= end)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.entry_date, e.created_at));
        Ok(entries)
    }

    async fn posted_totals(
        &mut self,
        account: AccountId,
        from: Option<NaiveDate>,
        to: NaiveDate,
    ) -> Result<BalanceTotals, LedgerError> {
        Ok(fold_totals(&self.working.entries, Some(account), from, Some(to))
            .remove(&account)
            .unwrap_or_default())
    }

    async fn posted_totals_by_account(
        &mut self,
        to: Option<NaiveDate>,
    ) -> Result<HashMap<AccountId, BalanceTotals>, LedgerError> {
        Ok(fold_totals(&self.working.entries, None, None, to))
    }

    async fn list_periods(&mut self) -> Result<Vec<AccountingPeriod>, LedgerError> {
        let mut periods = self.working.periods.clone();
        periods.sort_by_key(|p| p.start_date);
        Ok(periods)
    }

    async fn find_period(&mut self, id: PeriodId) -> Result<Option<AccountingPeriod>, LedgerError> {
        Ok(self.working.periods.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_period(&mut self, period: &AccountingPeriod) -> Result<bool, LedgerError> {
        let state = self.writable()?;
        if state
            .periods
            .iter()
            .any(|p| p.overlaps(period.start_date, period.end_date))
        {
            return Ok(false);
        }
        state.periods.push(period.clone());
        Ok(true)
    }

    async fn update_period(&mut self, period: &AccountingPeriod) -> Result<(), LedgerError> {
        let stored = self
            .writable()?
            .periods
            .iter_mut()
            .find(|p| p.id == period.id)
            .ok_or(LedgerError::PeriodNotFound(period.id))?;
        *stored = period.clone();
        Ok(())
    }

    async fn delete_period(&mut self, id: PeriodId) -> Result<(), LedgerError> {
        self.writable()?.periods.retain(|p| p.id != id);
        Ok(())
    }

    async fn enqueue_outbox(&mut self, message: &OutboxMessage) -> Result<(), LedgerError> {
        self.writable()?.outbox.push(message.clone());
        Ok(())
    }

    async fn pending_outbox(
        &mut self,
        limit: Option<u64>,
    ) -> Result<Vec<OutboxMessage>, LedgerError> {
        let mut pending: Vec<OutboxMessage> = self
            .working
            .outbox
            .iter()
            .filter(|m| m.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        if let Some(limit) = limit {
            pending.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }
        Ok(pending)
    }

    async fn find_pending_outbox_by_source(
        &mut self,
        source_type: SourceType,
        source_id: Uuid,
    ) -> Result<Option<OutboxMessage>, LedgerError> {
        Ok(self
            .working
            .outbox
            .iter()
            .find(|m| {
                m.status == OutboxStatus::Pending
                    && m.request.source_type == source_type
                    && m.request.source_id == Some(source_id)
            })
            .cloned())
    }

    async fn count_pending_outbox(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, LedgerError> {
        let count = self
            .working
            .outbox
            .iter()
            .filter(|m| {
                m.status == OutboxStatus::Pending && m.entry_date >= start && m.entry_date <= end
            })
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    async fn update_outbox(&mut self, message: &OutboxMessage) -> Result<(), LedgerError> {
        let stored = self
            .writable()?
            .outbox
            .iter_mut()
            .find(|m| m.id == message.id)
            .ok_or_else(|| LedgerError::Storage(format!("outbox message {} not found", message.id)))?;
        *stored = message.clone();
        Ok(())
    }

    async fn insert_balance_correction(
        &mut self,
        correction: &BalanceCorrection,
    ) -> Result<(), LedgerError> {
        self.writable()?.corrections.push(correction.clone());
        Ok(())
    }

    async fn list_balance_corrections(&mut self) -> Result<Vec<BalanceCorrection>, LedgerError> {
        let mut corrections = self.working.corrections.clone();
        corrections.sort_by_key(|c| c.corrected_at);
        Ok(corrections)
    }

    async fn commit(self) -> Result<(), LedgerError> {
        if self.gate.is_some() {
            *self.committed.write().await = self.working;
        }
        Ok(())
    }
}
