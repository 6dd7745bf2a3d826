//! Deferred ledger postings.
//!
//! A deferred posting validates the entry, moves the cached balances and
//! enqueues an [`OutboxMessage`] in one transaction. The [`OutboxRelay`]
//! later writes the journal entry itself under the pre-allocated entry ID.
//! Until then, reconciliation counts the message's deltas as expected drift.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use ledgerline_shared::config::OutboxConfig;
use ledgerline_shared::types::{AccountId, JournalEntryId, OutboxMessageId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::journal::{EntryHeader, accounts_for, assemble_entry, record_entry};
use crate::ledger::validation::validate_lines;
use crate::ledger::{EntryStatus, LedgerError, PostJournalEntryRequest};
use crate::period::ensure_postable;
use crate::store::{LedgerStore, LedgerTx, LockMode};

/// Delivery status of an outbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    /// Waiting for the relay.
    Pending,
    /// The journal entry was written.
    Processed,
    /// Gave up after the maximum number of attempts.
    Failed,
}

impl OutboxStatus {
    /// Stable lowercase name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Failed => "failed",
        }
    }
}

/// Normal-side change already applied to an account's cached balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceDelta {
    /// Account whose cached balance moved.
    pub account_id: AccountId,
    /// Signed amount.
    pub amount: Decimal,
}

/// A journal entry whose balance effect is applied but whose lines are not
/// yet written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxMessage {
    /// Unique identifier.
    pub id: OutboxMessageId,
    /// ID the journal entry will be written under.
    pub entry_id: JournalEntryId,
    /// Accounting date of the entry.
    pub entry_date: NaiveDate,
    /// The original posting request.
    pub request: PostJournalEntryRequest,
    /// Deltas applied to cached balances at enqueue time.
    pub balance_deltas: Vec<BalanceDelta>,
    /// Delivery status.
    pub status: OutboxStatus,
    /// Delivery attempts so far.
    pub attempts: u32,
    /// Error of the last failed attempt.
    pub last_error: Option<String>,
    /// Enqueue time.
    pub created_at: DateTime<Utc>,
    /// When the entry was written.
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxMessage {
    /// Creates a pending message.
    #[must_use]
    pub fn pending(
        entry_id: JournalEntryId,
        request: PostJournalEntryRequest,
        balance_deltas: Vec<BalanceDelta>,
    ) -> Self {
        Self {
            id: OutboxMessageId::new(),
            entry_id,
            entry_date: request.entry_date,
            request,
            balance_deltas,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    fn record_failure(&mut self, error: &LedgerError, max_attempts: u32) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = Some(error.to_string());
        if self.attempts >= max_attempts {
            self.status = OutboxStatus::Failed;
        }
    }
}

/// Number of pending messages dated within `[start, end]`.
pub async fn pending_in_range<T: LedgerTx + ?Sized>(
    tx: &mut T,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<usize, LedgerError> {
    let count = tx.count_pending_outbox(start, end).await?;
    Ok(usize::try_from(count).unwrap_or(usize::MAX))
}

/// Number of pending messages dated on or before `end`.
pub async fn pending_through<T: LedgerTx + ?Sized>(
    tx: &mut T,
    end: NaiveDate,
) -> Result<usize, LedgerError> {
    let pending = tx.pending_outbox(None).await?;
    Ok(pending.iter().filter(|m| m.entry_date <= end).count())
}

/// Outcome of one relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Entries written.
    pub processed: usize,
    /// Attempts that failed and will be retried.
    pub retried: usize,
    /// Messages that exhausted their attempts.
    pub failed: usize,
}

/// Writes pending deferred postings to the journal.
pub struct OutboxRelay<S> {
    store: Arc<S>,
    batch_size: u64,
    max_attempts: u32,
}

impl<S: LedgerStore> OutboxRelay<S> {
    /// Creates a relay over the store.
    pub fn new(store: Arc<S>, config: &OutboxConfig) -> Self {
        Self {
            store,
            batch_size: config.batch_size,
            max_attempts: config.max_attempts.max(1),
        }
    }

    /// Processes one batch of pending messages, oldest first.
    pub async fn drain(&self) -> Result<DrainReport, LedgerError> {
        let batch = {
            let mut tx = self.store.read().await?;
            tx.pending_outbox(Some(self.batch_size)).await?
        };

        let mut report = DrainReport::default();
        for mut message in batch {
            match self.deliver(&message).await {
                Ok(()) => report.processed += 1,
                Err(error) => {
                    message.record_failure(&error, self.max_attempts);
                    if message.status == OutboxStatus::Failed {
                        tracing::error!(
                            message_id = %message.id,
                            entry_id = %message.entry_id,
                            attempts = message.attempts,
                            error = %error,
                            "Deferred posting failed permanently"
                        );
                        report.failed += 1;
                    } else {
                        tracing::warn!(
                            message_id = %message.id,
                            attempts = message.attempts,
                            error = %error,
                            "Deferred posting failed, will retry"
                        );
                        report.retried += 1;
                    }
                    let mut tx = self.store.begin().await?;
                    tx.update_outbox(&message).await?;
                    tx.commit().await?;
                }
            }
        }

        if report != DrainReport::default() {
            tracing::info!(
                processed = report.processed,
                retried = report.retried,
                failed = report.failed,
                "Outbox drained"
            );
        }
        Ok(report)
    }

    /// Writes the entry without touching cached balances, which moved at
    /// enqueue time.
    async fn deliver(&self, message: &OutboxMessage) -> Result<(), LedgerError> {
        let mut tx = self.store.begin().await?;
        tx.lock_periods(LockMode::Shared).await?;

        let postable = ensure_postable(&mut tx, message.entry_date, None).await?;
        let accounts = accounts_for(&mut tx, &message.request.lines).await?;
        let balanced = validate_lines(&message.request.lines, &accounts)?;
        let entry = assemble_entry(
            message.entry_id,
            EntryHeader::from_request(&message.request),
            postable,
            &balanced,
            EntryStatus::Posted,
        );
        record_entry(&mut tx, &entry, &balanced, false).await?;

        let mut delivered = message.clone();
        delivered.status = OutboxStatus::Processed;
        delivered.processed_at = Some(Utc::now());
        tx.update_outbox(&delivered).await?;
        tx.commit().await?;

        tracing::debug!(message_id = %message.id, entry_id = %entry.id, "Deferred posting written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerService, LineInput, SourceType};
    use crate::store::MemoryStore;
    use crate::test_support::{Chart, d, today};
    use ledgerline_shared::types::UserId;
    use rust_decimal_macros::dec;

    fn request(chart: &Chart, amount: Decimal) -> PostJournalEntryRequest {
        PostJournalEntryRequest {
            source_type: SourceType::Sale,
            source_id: Some(uuid::Uuid::now_v7()),
            reference: "INV-9".into(),
            entry_date: today(),
            description: "Deferred sale".into(),
            lines: vec![
                LineInput::debit(chart.cash.id, amount, ""),
                LineInput::credit(chart.sales.id, amount, ""),
            ],
            auto_post: true,
            created_by: UserId::new(),
        }
    }

    #[tokio::test]
    async fn test_deferred_posting_moves_balances_before_lines() {
        let store = Arc::new(MemoryStore::new());
        let chart = Chart::seed(&store).await;
        let service = LedgerService::new(store.clone(), Default::default());

        let result = service.post_deferred(request(&chart, dec!(300))).await.unwrap();
        assert_eq!(service.get_account(chart.cash.id).await.unwrap().cached_balance, dec!(300));
        assert!(matches!(
            service.get_entry(result.entry_id).await,
            Err(LedgerError::EntryNotFound(_))
        ));

        let relay = OutboxRelay::new(store.clone(), &OutboxConfig::default());
        let report = relay.drain().await.unwrap();
        assert_eq!(report.processed, 1);

        let entry = service.get_entry(result.entry_id).await.unwrap();
        assert_eq!(entry.status, EntryStatus::Posted);
        assert_eq!(entry.total_debit, dec!(300));
        assert_eq!(service.get_account(chart.cash.id).await.unwrap().cached_balance, dec!(300));
        assert_eq!(relay.drain().await.unwrap(), DrainReport::default());
    }

    #[tokio::test]
    async fn test_failed_delivery_retries_then_gives_up() {
        let store = Arc::new(MemoryStore::new());
        let chart = Chart::seed(&store).await;
        let service = LedgerService::new(store.clone(), Default::default());
        service.post_deferred(request(&chart, dec!(80))).await.unwrap();
        service.deactivate_account(chart.sales.id).await.unwrap();

        let config = OutboxConfig {
            batch_size: 10,
            max_attempts: 2,
        };
        let relay = OutboxRelay::new(store.clone(), &config);
        assert_eq!(relay.drain().await.unwrap().retried, 1);
        assert_eq!(relay.drain().await.unwrap().failed, 1);
        assert_eq!(relay.drain().await.unwrap(), DrainReport::default());

        let mut tx = store.read().await.unwrap();
        assert!(tx.pending_outbox(None).await.unwrap().is_empty());
        assert_eq!(tx.count_pending_outbox(d(2000, 1, 1), d(2100, 1, 1)).await.unwrap(), 0);
    }
}
