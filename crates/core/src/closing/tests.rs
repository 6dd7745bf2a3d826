//! Tests for the closing engine against the in-memory store.

use std::sync::Arc;

use chrono::NaiveDate;
use ledgerline_shared::LedgerConfig;
use ledgerline_shared::config::OutboxConfig;
use ledgerline_shared::types::{AccountId, UserId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::*;
use crate::auth::{Actor, ActorRole};
use crate::ledger::{
    EntryStatus, LedgerError, LedgerService, LineInput, PostJournalEntryRequest,
    ReverseEntryRequest, SourceType,
};
use crate::outbox::OutboxRelay;
use crate::period::{PeriodRegistry, PeriodStatus};
use crate::store::MemoryStore;
use crate::test_support::{Chart, accountant, admin, config, d};

struct Fixture {
    store: Arc<MemoryStore>,
    chart: Chart,
    ledger: LedgerService<MemoryStore>,
    engine: ClosingEngine<MemoryStore>,
}

async fn setup_with(config: LedgerConfig) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let chart = Chart::seed(&store).await;
    Fixture {
        ledger: LedgerService::new(store.clone(), config.clone()),
        engine: ClosingEngine::new(store.clone(), config),
        store,
        chart,
    }
}

async fn setup() -> Fixture {
    setup_with(config()).await
}

fn request(date: NaiveDate, debit: AccountId, credit: AccountId, amount: Decimal) -> PostJournalEntryRequest {
    PostJournalEntryRequest {
        source_type: SourceType::Manual,
        source_id: None,
        reference: String::new(),
        entry_date: date,
        description: "Test entry".into(),
        lines: vec![
            LineInput::debit(debit, amount, ""),
            LineInput::credit(credit, amount, ""),
        ],
        auto_post: true,
        created_by: UserId::new(),
    }
}

impl Fixture {
    async fn post(&self, date: NaiveDate, debit: AccountId, credit: AccountId, amount: Decimal) {
        self.ledger
            .post_journal_entry(request(date, debit, credit, amount))
            .await
            .unwrap();
    }

    async fn balance(&self, id: AccountId, as_of: NaiveDate) -> Decimal {
        self.ledger.get_balance(id, as_of).await.unwrap()
    }

    async fn cached(&self, id: AccountId) -> Decimal {
        self.ledger.get_account(id).await.unwrap().cached_balance
    }

    async fn close_january(&self) -> ClosingResult {
        self.engine
            .execute(d(2025, 1, 1), d(2025, 1, 31), "January close", accountant())
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_sale_closed_to_retained_earnings() {
    let f = setup().await;
    f.post(d(2025, 1, 15), f.chart.cash.id, f.chart.sales.id, dec!(1000000)).await;

    let preview = f.engine.preview(d(2025, 1, 1), d(2025, 1, 31)).await.unwrap();
    assert!(preview.can_close);
    assert_eq!(preview.total_revenue, dec!(1000000));
    assert_eq!(preview.total_expense, Decimal::ZERO);
    assert_eq!(preview.net_income, dec!(1000000));

    let result = f.close_january().await;
    let entry = f
        .ledger
        .get_entry(result.closing_entry_id.unwrap())
        .await
        .unwrap();
    assert_eq!(entry.source_type, SourceType::Closing);
    assert_eq!(entry.entry_date, d(2025, 1, 31));
    assert_eq!(entry.reference, "CLOSING-2025-01-01-2025-01-31");
    assert_eq!(entry.lines.len(), 2);
    assert_eq!(entry.lines[0].account_id, f.chart.sales.id);
    assert_eq!(entry.lines[0].debit, dec!(1000000));
    assert_eq!(entry.lines[1].account_id, f.chart.retained_earnings.id);
    assert_eq!(entry.lines[1].credit, dec!(1000000));

    assert_eq!(f.balance(f.chart.sales.id, d(2025, 1, 31)).await, Decimal::ZERO);
    assert_eq!(
        f.balance(f.chart.retained_earnings.id, d(2025, 1, 31)).await,
        dec!(1000000)
    );
    assert_eq!(f.balance(f.chart.cash.id, d(2025, 1, 31)).await, dec!(1000000));
    assert_eq!(f.cached(f.chart.sales.id).await, Decimal::ZERO);
    assert_eq!(f.cached(f.chart.retained_earnings.id).await, dec!(1000000));
}

#[tokio::test]
async fn test_execute_posts_exactly_the_preview() {
    let f = setup().await;
    f.post(d(2025, 1, 3), f.chart.cash.id, f.chart.sales.id, dec!(5000)).await;
    f.post(d(2025, 1, 9), f.chart.bank.id, f.chart.service_revenue.id, dec!(1250.50)).await;
    f.post(d(2025, 1, 12), f.chart.rent.id, f.chart.bank.id, dec!(1800)).await;
    f.post(d(2025, 1, 25), f.chart.salaries.id, f.chart.cash.id, dec!(2400.25)).await;
    f.post(d(2025, 1, 28), f.chart.sales.id, f.chart.cash.id, dec!(100)).await;

    let preview = f.engine.preview(d(2025, 1, 1), d(2025, 1, 31)).await.unwrap();
    let result = f.close_january().await;

    assert_eq!(result.total_revenue, preview.total_revenue);
    assert_eq!(result.total_expense, preview.total_expense);
    assert_eq!(result.net_income, preview.net_income);
    assert_eq!(preview.total_revenue, dec!(6150.50));
    assert_eq!(preview.total_expense, dec!(4200.25));
    assert_eq!(preview.net_income, dec!(1950.25));

    let entry = f
        .ledger
        .get_entry(result.closing_entry_id.unwrap())
        .await
        .unwrap();
    let previewed = preview.revenue_lines.iter().chain(&preview.expense_lines);
    for (line, planned) in entry.lines.iter().zip(previewed) {
        assert_eq!(line.account_id, planned.account_id);
        assert_eq!(line.debit, planned.debit);
        assert_eq!(line.credit, planned.credit);
    }
    assert_eq!(entry.lines.len(), preview.revenue_lines.len() + preview.expense_lines.len() + 2);
    assert_eq!(entry.total_debit, entry.total_credit);

    for account in [&f.chart.sales, &f.chart.service_revenue, &f.chart.rent, &f.chart.salaries] {
        assert_eq!(f.balance(account.id, d(2025, 1, 31)).await, Decimal::ZERO, "{}", account.code);
    }
    assert_eq!(
        f.balance(f.chart.retained_earnings.id, d(2025, 1, 31)).await,
        dec!(1950.25)
    );
    assert!(f.ledger.trial_balance(d(2025, 1, 31)).await.unwrap().is_balanced);
}

#[tokio::test]
async fn test_closing_twice_is_rejected_and_changes_nothing() {
    let f = setup().await;
    f.post(d(2025, 1, 15), f.chart.cash.id, f.chart.sales.id, dec!(700)).await;
    f.close_january().await;

    let err = f
        .engine
        .execute(d(2025, 1, 1), d(2025, 1, 31), "", accountant())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::AlreadyClosed {
            start: d(2025, 1, 1),
            end: d(2025, 1, 31),
        }
    );
    assert_eq!(
        f.balance(f.chart.retained_earnings.id, d(2025, 1, 31)).await,
        dec!(700)
    );

    let preview = f.engine.preview(d(2025, 1, 1), d(2025, 1, 31)).await.unwrap();
    assert!(!preview.can_close);
    assert!(preview.warnings.iter().any(|w| w.contains("already closed")));
}

#[tokio::test]
async fn test_concurrent_closings_apply_once() {
    let f = setup().await;
    f.post(d(2025, 1, 15), f.chart.cash.id, f.chart.sales.id, dec!(900)).await;

    let (first, second) = tokio::join!(
        f.engine.execute(d(2025, 1, 1), d(2025, 1, 31), "", accountant()),
        f.engine.execute(d(2025, 1, 1), d(2025, 1, 31), "", accountant()),
    );
    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(r, Err(LedgerError::AlreadyClosed { .. }))));
    assert_eq!(
        f.balance(f.chart.retained_earnings.id, d(2025, 1, 31)).await,
        dec!(900)
    );
}

#[tokio::test]
async fn test_closed_range_rejects_postings() {
    let f = setup().await;
    f.post(d(2025, 1, 15), f.chart.cash.id, f.chart.sales.id, dec!(10)).await;
    let result = f.close_january().await;

    let period = PeriodRegistry::new(f.store.clone())
        .get_period(result.period_id)
        .await
        .unwrap();
    assert_eq!(period.status(), PeriodStatus::Locked);
    assert_eq!(period.closing_entry_id, result.closing_entry_id);
    assert!(f.engine.is_date_in_closed_period(d(2025, 1, 20)).await.unwrap());
    assert!(!f.engine.is_date_in_closed_period(d(2025, 2, 1)).await.unwrap());

    let err = f
        .ledger
        .post_journal_entry(request(d(2025, 1, 20), f.chart.cash.id, f.chart.sales.id, dec!(5)))
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::PeriodClosed { .. }));
}

#[tokio::test]
async fn test_closing_entry_cannot_be_reversed() {
    let f = setup().await;
    f.post(d(2025, 1, 15), f.chart.cash.id, f.chart.sales.id, dec!(10)).await;
    let entry_id = f.close_january().await.closing_entry_id.unwrap();

    let err = f
        .ledger
        .reverse_entry(ReverseEntryRequest {
            entry_id,
            reason: "undo".into(),
            reversed_by: UserId::new(),
            reversal_date: Some(d(2025, 2, 3)),
        })
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::ClosingEntryImmutable(entry_id));
}

#[tokio::test]
async fn test_next_closing_starts_after_previous() {
    let f = setup().await;
    f.post(d(2025, 1, 10), f.chart.cash.id, f.chart.sales.id, dec!(300)).await;
    let january = f.close_january().await;
    f.post(d(2025, 2, 10), f.chart.rent.id, f.chart.cash.id, dec!(120)).await;
    f.post(d(2025, 3, 10), f.chart.cash.id, f.chart.sales.id, dec!(500)).await;

    let info = f.engine.last_closing_info().await.unwrap().unwrap();
    assert_eq!(info.period_id, january.period_id);
    assert_eq!(info.next_start_date, Some(d(2025, 2, 1)));

    let preview = f.engine.preview(d(2025, 3, 1), d(2025, 3, 31)).await.unwrap();
    assert_eq!(preview.effective_start, d(2025, 2, 1));
    assert!(preview.warnings.iter().any(|w| w.contains("previous closing")));

    let march = f
        .engine
        .execute(d(2025, 3, 1), d(2025, 3, 31), "", accountant())
        .await
        .unwrap();
    assert_eq!(march.effective_start, d(2025, 2, 1));
    assert_eq!(march.total_revenue, dec!(500));
    assert_eq!(march.total_expense, dec!(120));
    assert_eq!(
        f.balance(f.chart.retained_earnings.id, d(2025, 3, 31)).await,
        dec!(680)
    );

    let periods = PeriodRegistry::new(f.store.clone()).list_periods().await.unwrap();
    let spans: Vec<_> = periods
        .iter()
        .map(|p| (p.start_date, p.end_date, p.status()))
        .collect();
    assert_eq!(
        spans,
        vec![
            (d(2025, 1, 1), d(2025, 1, 31), PeriodStatus::Locked),
            (d(2025, 2, 1), d(2025, 3, 31), PeriodStatus::Locked),
        ]
    );
}

#[tokio::test]
async fn test_reopened_period_recloses_only_the_residual() {
    let f = setup().await;
    f.post(d(2025, 1, 10), f.chart.cash.id, f.chart.sales.id, dec!(1000)).await;
    let first = f.close_january().await;

    let registry = PeriodRegistry::new(f.store.clone());
    registry
        .reopen(first.period_id, "Late invoice", admin())
        .await
        .unwrap();
    f.post(d(2025, 1, 20), f.chart.cash.id, f.chart.sales.id, dec!(200)).await;

    let second = f.close_january().await;
    assert_eq!(second.period_id, first.period_id);
    assert_eq!(second.total_revenue, dec!(200));
    assert_ne!(second.closing_entry_id, first.closing_entry_id);

    let period = registry.get_period(first.period_id).await.unwrap();
    assert_eq!(period.status(), PeriodStatus::Locked);
    assert_eq!(period.total_revenue, dec!(1200));
    assert_eq!(period.closing_entry_id, second.closing_entry_id);
    assert_eq!(f.balance(f.chart.sales.id, d(2025, 1, 31)).await, Decimal::ZERO);
    assert_eq!(
        f.balance(f.chart.retained_earnings.id, d(2025, 1, 31)).await,
        dec!(1200)
    );
}

#[tokio::test]
async fn test_empty_range_locks_period_without_entry() {
    let f = setup().await;
    let preview = f.engine.preview(d(2025, 1, 1), d(2025, 1, 31)).await.unwrap();
    assert!(preview.can_close);
    assert!(preview.warnings.iter().any(|w| w.contains("No revenue or expense")));

    let result = f.close_january().await;
    assert_eq!(result.closing_entry_id, None);
    assert_eq!(result.net_income, Decimal::ZERO);
    assert!(f.engine.is_date_in_closed_period(d(2025, 1, 1)).await.unwrap());
}

#[tokio::test]
async fn test_soft_closed_period_absorbed() {
    let f = setup().await;
    f.post(d(2025, 1, 10), f.chart.cash.id, f.chart.sales.id, dec!(80)).await;
    let registry = PeriodRegistry::new(f.store.clone());
    let soft = registry
        .close(d(2025, 1, 1), d(2025, 1, 31), accountant())
        .await
        .unwrap();

    let result = f.close_january().await;
    assert_eq!(result.period_id, soft.period.id);
    assert_eq!(
        registry.get_period(soft.period.id).await.unwrap().status(),
        PeriodStatus::Locked
    );
}

#[tokio::test]
async fn test_missing_retained_earnings_blocks_closing() {
    let f = setup_with(LedgerConfig {
        retained_earnings_code: "3999".into(),
        ..config()
    })
    .await;
    f.post(d(2025, 1, 10), f.chart.cash.id, f.chart.sales.id, dec!(80)).await;

    let preview = f.engine.preview(d(2025, 1, 1), d(2025, 1, 31)).await.unwrap();
    assert!(!preview.can_close);
    assert_eq!(preview.total_revenue, dec!(80));

    let err = f
        .engine
        .execute(d(2025, 1, 1), d(2025, 1, 31), "", accountant())
        .await
        .unwrap_err();
    assert_eq!(err, LedgerError::RetainedEarningsNotFound("3999".into()));
    assert!(!f.engine.is_date_in_closed_period(d(2025, 1, 10)).await.unwrap());
    assert_eq!(f.balance(f.chart.sales.id, d(2025, 1, 31)).await, dec!(80));
}

#[tokio::test]
async fn test_pending_deferred_postings_block_closing() {
    let f = setup().await;
    f.ledger
        .post_deferred(request(d(2025, 1, 10), f.chart.cash.id, f.chart.sales.id, dec!(60)))
        .await
        .unwrap();

    let preview = f.engine.preview(d(2025, 1, 1), d(2025, 1, 31)).await.unwrap();
    assert!(!preview.can_close);
    assert_eq!(
        f.engine
            .execute(d(2025, 1, 1), d(2025, 1, 31), "", accountant())
            .await
            .unwrap_err(),
        LedgerError::PendingDeferredPostings { count: 1 }
    );

    let relay = OutboxRelay::new(f.store.clone(), &OutboxConfig::default());
    assert_eq!(relay.drain().await.unwrap().processed, 1);

    let result = f.close_january().await;
    assert_eq!(result.total_revenue, dec!(60));
    assert_eq!(f.cached(f.chart.sales.id).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_drafts_are_reported_and_left_out() {
    let f = setup().await;
    f.post(d(2025, 1, 10), f.chart.cash.id, f.chart.sales.id, dec!(50)).await;
    let mut draft = request(d(2025, 1, 11), f.chart.rent.id, f.chart.cash.id, dec!(20));
    draft.auto_post = false;
    f.ledger.post_journal_entry(draft).await.unwrap();

    let preview = f.engine.preview(d(2025, 1, 1), d(2025, 1, 31)).await.unwrap();
    assert!(preview.can_close);
    assert!(preview.warnings.iter().any(|w| w.contains("draft")));
    assert_eq!(preview.total_expense, Decimal::ZERO);

    let result = f.close_january().await;
    assert_eq!(result.net_income, dec!(50));
}

#[tokio::test]
async fn test_inactive_temporary_account_still_closed() {
    let f = setup().await;
    f.post(d(2025, 1, 10), f.chart.cash.id, f.chart.service_revenue.id, dec!(45)).await;
    f.ledger.deactivate_account(f.chart.service_revenue.id).await.unwrap();

    f.close_january().await;
    assert_eq!(
        f.balance(f.chart.service_revenue.id, d(2025, 1, 31)).await,
        Decimal::ZERO
    );
}

#[tokio::test]
async fn test_closing_requires_privilege() {
    let f = setup().await;
    let clerk = Actor::new(UserId::new(), ActorRole::Clerk);
    assert_eq!(
        f.engine
            .execute(d(2025, 1, 1), d(2025, 1, 31), "", clerk)
            .await
            .unwrap_err(),
        LedgerError::PrivilegeRequired {
            role: ActorRole::Clerk
        }
    );
    assert!(matches!(
        f.engine.preview(d(2025, 2, 1), d(2025, 1, 1)).await.unwrap_err(),
        LedgerError::InvalidDateRange { .. }
    ));
    assert_eq!(f.engine.last_closing_info().await.unwrap(), None);
}

#[tokio::test]
async fn test_postings_after_closing_date_unaffected() {
    let f = setup().await;
    f.post(d(2025, 1, 10), f.chart.cash.id, f.chart.sales.id, dec!(100)).await;
    f.post(d(2025, 2, 10), f.chart.cash.id, f.chart.sales.id, dec!(40)).await;
    let result = f.close_january().await;
    assert_eq!(result.total_revenue, dec!(100));

    assert_eq!(f.balance(f.chart.sales.id, d(2025, 1, 31)).await, Decimal::ZERO);
    assert_eq!(f.balance(f.chart.sales.id, d(2025, 2, 28)).await, dec!(40));
    assert_eq!(f.cached(f.chart.sales.id).await, dec!(40));

    let entry = f
        .ledger
        .get_entry(result.closing_entry_id.unwrap())
        .await
        .unwrap();
    assert_eq!(entry.status, EntryStatus::Posted);
}

#[tokio::test]
async fn test_backdated_posting_after_closing_rejected() {
    let f = setup().await;
    f.post(d(2025, 1, 15), f.chart.cash.id, f.chart.sales.id, dec!(1000)).await;
    let result = f.close_january().await;

    let backdated = request(d(2024, 12, 20), f.chart.cash.id, f.chart.sales.id, dec!(500));
    let closed = LedgerError::PeriodClosed {
        date: d(2024, 12, 20),
        period_start: d(2025, 1, 1),
        period_end: d(2025, 1, 31),
    };
    assert_eq!(f.ledger.post_journal_entry(backdated.clone()).await.unwrap_err(), closed);
    assert_eq!(f.ledger.post_deferred(backdated).await.unwrap_err(), closed);

    assert!(f.engine.is_date_in_closed_period(d(2024, 12, 20)).await.unwrap());
    let registry = PeriodRegistry::new(f.store.clone());
    assert!(!registry.can_post(d(2024, 12, 20)).await.unwrap());
    assert!(registry.find_period(d(2024, 12, 20)).await.unwrap().is_none());

    assert_eq!(f.balance(f.chart.sales.id, d(2025, 1, 31)).await, Decimal::ZERO);
    assert_eq!(f.cached(f.chart.cash.id).await, dec!(1000));
    let periods = registry.list_periods().await.unwrap();
    assert_eq!(periods.len(), 1);
    assert_eq!(periods[0].id, result.period_id);
}

#[tokio::test]
async fn test_earlier_pending_deferred_posting_blocks_closing() {
    let f = setup().await;
    f.ledger
        .post_deferred(request(d(2024, 12, 20), f.chart.cash.id, f.chart.sales.id, dec!(25)))
        .await
        .unwrap();

    let preview = f.engine.preview(d(2025, 1, 1), d(2025, 1, 31)).await.unwrap();
    assert!(!preview.can_close);
    assert_eq!(
        f.engine
            .execute(d(2025, 1, 1), d(2025, 1, 31), "", accountant())
            .await
            .unwrap_err(),
        LedgerError::PendingDeferredPostings { count: 1 }
    );

    let relay = OutboxRelay::new(f.store.clone(), &OutboxConfig::default());
    assert_eq!(relay.drain().await.unwrap().processed, 1);
    let result = f.close_january().await;
    assert_eq!(result.total_revenue, dec!(25));
    assert_eq!(f.balance(f.chart.sales.id, d(2025, 1, 31)).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_reopened_month_under_later_closing_stays_closed() {
    let f = setup().await;
    f.post(d(2025, 1, 10), f.chart.cash.id, f.chart.sales.id, dec!(300)).await;
    let january = f.close_january().await;
    f.post(d(2025, 2, 10), f.chart.cash.id, f.chart.sales.id, dec!(200)).await;
    f.engine
        .execute(d(2025, 2, 1), d(2025, 2, 28), "", accountant())
        .await
        .unwrap();

    let registry = PeriodRegistry::new(f.store.clone());
    registry
        .reopen(january.period_id, "Late invoice", admin())
        .await
        .unwrap();

    let err = f
        .ledger
        .post_journal_entry(request(d(2025, 1, 20), f.chart.cash.id, f.chart.sales.id, dec!(5)))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LedgerError::PeriodClosed {
            date: d(2025, 1, 20),
            period_start: d(2025, 2, 1),
            period_end: d(2025, 2, 28),
        }
    );
    assert_eq!(f.balance(f.chart.sales.id, d(2025, 2, 28)).await, Decimal::ZERO);
}
