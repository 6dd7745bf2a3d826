//! Cached balance reconciliation.
//!
//! Compares every account's cached balance with the balance derived from
//! the journal plus the deltas of pending deferred postings. Drift is
//! reported, and corrected only through [`Reconciler::recompute_cached_balance`],
//! which writes an audit row for every change.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ledgerline_shared::config::ReconciliationConfig;
use ledgerline_shared::types::{AccountId, BalanceCorrectionId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::Actor;
use crate::deadline::with_deadline;
use crate::ledger::{Account, BalanceTotals, LedgerError};
use crate::outbox::OutboxMessage;
use crate::store::{LedgerStore, LedgerTx, LockMode};

/// Audit record of a cached balance overwrite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceCorrection {
    /// Unique identifier.
    pub id: BalanceCorrectionId,
    /// Corrected account.
    pub account_id: AccountId,
    /// Cached balance before the correction.
    pub previous_balance: Decimal,
    /// Cached balance after the correction.
    pub corrected_balance: Decimal,
    /// `corrected_balance - previous_balance`.
    pub difference: Decimal,
    /// Why the correction was made.
    pub reason: String,
    /// Who made it.
    pub corrected_by: UserId,
    /// When it was made.
    pub corrected_at: DateTime<Utc>,
}

/// One account whose cached balance disagrees with the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDrift {
    /// Account.
    pub account_id: AccountId,
    /// Account code.
    pub code: String,
    /// Cached balance.
    pub cached: Decimal,
    /// Balance derived from the journal.
    pub ledger: Decimal,
    /// Deltas of pending deferred postings.
    pub pending: Decimal,
    /// `cached - (ledger + pending)`.
    pub difference: Decimal,
}

impl AccountDrift {
    /// Cached balance the account should carry.
    #[must_use]
    pub fn expected(&self) -> Decimal {
        self.ledger + self.pending
    }

    /// The drift as an error value.
    #[must_use]
    pub fn to_error(&self) -> LedgerError {
        LedgerError::BalanceDrift {
            account_id: self.account_id,
            cached: self.cached,
            expected: self.expected(),
        }
    }
}

/// Result of a reconciliation sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// When the sweep read its snapshot.
    pub checked_at: DateTime<Utc>,
    /// Accounts compared.
    pub accounts_checked: usize,
    /// Accounts with drift.
    pub drifts: Vec<AccountDrift>,
    /// Corrections applied when auto-fix is on.
    pub corrections: Vec<BalanceCorrection>,
    /// Sum of all balance-affecting debits.
    pub total_debit: Decimal,
    /// Sum of all balance-affecting credits.
    pub total_credit: Decimal,
}

impl ReconciliationReport {
    /// True when the journal itself balances.
    #[must_use]
    pub fn ledger_balanced(&self) -> bool {
        self.total_debit == self.total_credit
    }

    /// True when nothing is wrong.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.drifts.is_empty() && self.ledger_balanced()
    }
}

/// Normal-side balance of each account derived from the journal.
#[must_use]
pub fn ledger_balances(
    accounts: &[Account],
    totals: &HashMap<AccountId, BalanceTotals>,
) -> HashMap<AccountId, Decimal> {
    accounts
        .iter()
        .map(|account| {
            let derived = totals
                .get(&account.id)
                .map_or(Decimal::ZERO, |t| t.signed_for(account.account_type));
            (account.id, derived)
        })
        .collect()
}

/// Cached-balance deltas of pending deferred postings, per account.
#[must_use]
pub fn pending_deltas(pending: &[OutboxMessage]) -> HashMap<AccountId, Decimal> {
    let mut deltas: HashMap<AccountId, Decimal> = HashMap::new();
    for delta in pending.iter().flat_map(|m| &m.balance_deltas) {
        *deltas.entry(delta.account_id).or_insert(Decimal::ZERO) += delta.amount;
    }
    deltas
}

/// Finds accounts whose cached balance differs from ledger plus pending.
#[must_use]
pub fn find_drifts(
    accounts: &[Account],
    ledger: &HashMap<AccountId, Decimal>,
    pending: &HashMap<AccountId, Decimal>,
) -> Vec<AccountDrift> {
    accounts
        .iter()
        .filter_map(|account| {
            let ledger = ledger.get(&account.id).copied().unwrap_or(Decimal::ZERO);
            let pending = pending.get(&account.id).copied().unwrap_or(Decimal::ZERO);
            let difference = account.cached_balance - ledger - pending;
            (!difference.is_zero()).then(|| AccountDrift {
                account_id: account.id,
                code: account.code.clone(),
                cached: account.cached_balance,
                ledger,
                pending,
                difference,
            })
        })
        .collect()
}

/// Periodic reconciliation job.
pub struct Reconciler<S> {
    store: Arc<S>,
    config: ReconciliationConfig,
}

impl<S: LedgerStore> Reconciler<S> {
    /// Creates a reconciler over the store.
    pub fn new(store: Arc<S>, config: ReconciliationConfig) -> Self {
        Self { store, config }
    }

    /// Runs one sweep under the configured execution limit.
    pub async fn run(&self) -> Result<ReconciliationReport, LedgerError> {
        with_deadline(
            Duration::from_secs(self.config.max_execution_secs),
            self.sweep(),
        )
        .await
    }

    async fn sweep(&self) -> Result<ReconciliationReport, LedgerError> {
        let checked_at = Utc::now();
        let (accounts, totals, pending) = {
            let mut tx = self.store.read().await?;
            let accounts = tx.list_accounts().await?;
            let totals = tx.posted_totals_by_account(None).await?;
            let pending = tx.pending_outbox(None).await?;
            (accounts, totals, pending)
        };

        let (total_debit, total_credit) = totals
            .values()
            .fold((Decimal::ZERO, Decimal::ZERO), |(d, c), t| (d + t.debit, c + t.credit));
        if total_debit != total_credit {
            tracing::error!(%total_debit, %total_credit, "Journal does not balance");
        }

        let drifts = find_drifts(
            &accounts,
            &ledger_balances(&accounts, &totals),
            &pending_deltas(&pending),
        );
        let threshold = Decimal::from(self.config.alert_threshold);
        for drift in &drifts {
            if drift.difference.abs() > threshold {
                tracing::error!(
                    account_id = %drift.account_id,
                    code = %drift.code,
                    cached = %drift.cached,
                    ledger = %drift.ledger,
                    pending = %drift.pending,
                    difference = %drift.difference,
                    "Cached balance drift above alert threshold"
                );
            } else {
                tracing::warn!(
                    account_id = %drift.account_id,
                    code = %drift.code,
                    difference = %drift.difference,
                    "Cached balance drift"
                );
            }
        }

        let mut corrections = Vec::new();
        if self.config.auto_fix {
            for drift in &drifts {
                if let Some(correction) = self
                    .recompute_cached_balance(
                        drift.account_id,
                        Actor::system(),
                        "automatic reconciliation",
                    )
                    .await?
                {
                    corrections.push(correction);
                }
            }
        }

        tracing::info!(
            accounts_checked = accounts.len(),
            drifts = drifts.len(),
            corrections = corrections.len(),
            "Reconciliation sweep finished"
        );

        Ok(ReconciliationReport {
            checked_at,
            accounts_checked: accounts.len(),
            drifts,
            corrections,
            total_debit,
            total_credit,
        })
    }

    /// Recomputes one account's cached balance from the ledger and writes it
    /// together with an audit row. Returns `None` when nothing changed.
    ///
    /// This is the only path that overwrites a cached balance.
    pub async fn recompute_cached_balance(
        &self,
        account_id: AccountId,
        actor: Actor,
        reason: &str,
    ) -> Result<Option<BalanceCorrection>, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::ReasonRequired);
        }

        let mut tx = self.store.begin().await?;
        tx.lock_periods(LockMode::Exclusive).await?;

        let account = tx
            .find_account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        let totals = tx.posted_totals_by_account(None).await?;
        let pending = tx.pending_outbox(None).await?;
        let ledger = totals
            .get(&account_id)
            .map_or(Decimal::ZERO, |t| t.signed_for(account.account_type));
        let expected = ledger
            + pending_deltas(&pending)
                .get(&account_id)
                .copied()
                .unwrap_or(Decimal::ZERO);

        if expected == account.cached_balance {
            return Ok(None);
        }

        let correction = BalanceCorrection {
            id: BalanceCorrectionId::new(),
            account_id,
            previous_balance: account.cached_balance,
            corrected_balance: expected,
            difference: expected - account.cached_balance,
            reason: reason.trim().to_string(),
            corrected_by: actor.user_id,
            corrected_at: Utc::now(),
        };
        tx.set_cached_balance(account_id, expected).await?;
        tx.insert_balance_correction(&correction).await?;
        tx.commit().await?;

        tracing::warn!(
            account_id = %account_id,
            previous = %correction.previous_balance,
            corrected = %correction.corrected_balance,
            corrected_by = %actor.user_id,
            "Cached balance corrected"
        );
        Ok(Some(correction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerService, LineInput, PostJournalEntryRequest, SourceType};
    use crate::outbox::OutboxRelay;
    use ledgerline_shared::config::OutboxConfig;
    use crate::store::MemoryStore;
    use crate::test_support::{Chart, today};
    use rust_decimal_macros::dec;

    fn sale(chart: &Chart, amount: Decimal) -> PostJournalEntryRequest {
        PostJournalEntryRequest {
            source_type: SourceType::Sale,
            source_id: None,
            reference: "INV-1".into(),
            entry_date: today(),
            description: "Sale".into(),
            lines: vec![
                LineInput::debit(chart.cash.id, amount, ""),
                LineInput::credit(chart.sales.id, amount, ""),
            ],
            auto_post: true,
            created_by: UserId::new(),
        }
    }

    async fn corrupt(store: &MemoryStore, account_id: AccountId, value: Decimal) {
        let mut tx = store.begin().await.unwrap();
        tx.set_cached_balance(account_id, value).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_clean_ledger_reports_nothing() {
        let store = Arc::new(MemoryStore::new());
        let chart = Chart::seed(&store).await;
        let service = LedgerService::new(store.clone(), Default::default());
        service.post_journal_entry(sale(&chart, dec!(500))).await.unwrap();

        let reconciler = Reconciler::new(store, ReconciliationConfig::default());
        let report = reconciler.run().await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.total_debit, dec!(500));
    }

    #[tokio::test]
    async fn test_pending_deferred_postings_are_not_drift() {
        let store = Arc::new(MemoryStore::new());
        let chart = Chart::seed(&store).await;
        let service = LedgerService::new(store.clone(), Default::default());
        service.post_deferred(sale(&chart, dec!(70))).await.unwrap();

        let reconciler = Reconciler::new(store.clone(), ReconciliationConfig::default());
        assert!(reconciler.run().await.unwrap().drifts.is_empty());

        corrupt(&store, chart.cash.id, dec!(0)).await;
        let drift = &reconciler.run().await.unwrap().drifts[0];
        assert_eq!(drift.pending, dec!(70));
        assert_eq!(drift.expected(), dec!(70));
    }

    #[tokio::test]
    async fn test_failed_deferred_posting_reported_as_drift() {
        let store = Arc::new(MemoryStore::new());
        let chart = Chart::seed(&store).await;
        let service = LedgerService::new(store.clone(), Default::default());
        service.post_deferred(sale(&chart, dec!(80))).await.unwrap();
        service.deactivate_account(chart.sales.id).await.unwrap();

        let outbox = OutboxConfig {
            batch_size: 10,
            max_attempts: 1,
        };
        assert_eq!(OutboxRelay::new(store.clone(), &outbox).drain().await.unwrap().failed, 1);

        let reconciler = Reconciler::new(store.clone(), ReconciliationConfig::default());
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.drifts.len(), 2);
        for account_id in [chart.cash.id, chart.sales.id] {
            let drift = report
                .drifts
                .iter()
                .find(|d| d.account_id == account_id)
                .unwrap();
            assert_eq!(drift.cached, dec!(80));
            assert_eq!(drift.ledger, Decimal::ZERO);
            assert_eq!(drift.pending, Decimal::ZERO);
            assert_eq!(drift.difference, dec!(80));
        }
        assert!(report.corrections.is_empty());
    }

    #[tokio::test]
    async fn test_drift_detected_without_auto_fix() {
        let store = Arc::new(MemoryStore::new());
        let chart = Chart::seed(&store).await;
        let service = LedgerService::new(store.clone(), Default::default());
        service.post_journal_entry(sale(&chart, dec!(500))).await.unwrap();
        corrupt(&store, chart.cash.id, dec!(450)).await;

        let reconciler = Reconciler::new(store.clone(), ReconciliationConfig::default());
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.drifts.len(), 1);
        assert_eq!(report.drifts[0].difference, dec!(-50));
        assert_eq!(report.drifts[0].ledger, dec!(500));
        assert!(report.corrections.is_empty());
        assert_eq!(
            report.drifts[0].to_error(),
            LedgerError::BalanceDrift {
                account_id: chart.cash.id,
                cached: dec!(450),
                expected: dec!(500),
            }
        );
        assert_eq!(service.get_account(chart.cash.id).await.unwrap().cached_balance, dec!(450));
    }

    #[tokio::test]
    async fn test_auto_fix_writes_audited_correction() {
        let store = Arc::new(MemoryStore::new());
        let chart = Chart::seed(&store).await;
        let service = LedgerService::new(store.clone(), Default::default());
        service.post_journal_entry(sale(&chart, dec!(500))).await.unwrap();
        corrupt(&store, chart.sales.id, dec!(900)).await;

        let config = ReconciliationConfig {
            auto_fix: true,
            ..ReconciliationConfig::default()
        };
        let reconciler = Reconciler::new(store.clone(), config);
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.corrections.len(), 1);
        assert_eq!(report.corrections[0].previous_balance, dec!(900));
        assert_eq!(report.corrections[0].corrected_balance, dec!(500));
        assert_eq!(service.get_account(chart.sales.id).await.unwrap().cached_balance, dec!(500));

        let mut tx = store.read().await.unwrap();
        assert_eq!(tx.list_balance_corrections().await.unwrap().len(), 1);
        drop(tx);
        assert!(reconciler.run().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn test_manual_recompute_requires_reason() {
        let store = Arc::new(MemoryStore::new());
        let chart = Chart::seed(&store).await;
        let reconciler = Reconciler::new(store, ReconciliationConfig::default());
        assert_eq!(
            reconciler
                .recompute_cached_balance(chart.cash.id, Actor::system(), " ")
                .await
                .unwrap_err(),
            LedgerError::ReasonRequired
        );
        assert_eq!(
            reconciler
                .recompute_cached_balance(chart.cash.id, Actor::system(), "audit")
                .await
                .unwrap(),
            None
        );
    }
}
