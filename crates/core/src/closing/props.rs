//! Property-based tests for period closing.
//!
//! - After any closing, every temporary account is zero as of its end date
//! - Retained earnings receive exactly the sum of the reported net incomes
//! - Execution transfers the same totals its preview reported
//! - Cached balances stay equal to the derived balances

use std::sync::Arc;

use chrono::{Days, NaiveDate};
use ledgerline_shared::types::UserId;
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::engine::ClosingEngine;
use crate::ledger::{Account, LedgerService, LineInput, PostJournalEntryRequest, SourceType};
use crate::period::month_bounds;
use crate::store::MemoryStore;
use crate::test_support::{Chart, accountant, config, d};

/// Leaf accounts other than retained earnings.
const ACCOUNTS: usize = 9;

#[derive(Debug, Clone)]
struct Posting {
    debit: usize,
    credit: usize,
    amount: Decimal,
    day: u64,
}

fn posting() -> impl Strategy<Value = Posting> {
    (0usize..ACCOUNTS, 0usize..ACCOUNTS, 1i64..5_000_000i64, 0u64..180).prop_map(
        |(debit, credit, cents, day)| Posting {
            debit,
            credit: if credit == debit { (credit + 1) % ACCOUNTS } else { credit },
            amount: Decimal::new(cents, 2),
            day,
        },
    )
}

fn month_end(month: u32) -> NaiveDate {
    month_bounds(d(2025, month, 1)).1
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_closing_zeroes_temporary_accounts(
        postings in prop::collection::vec(posting(), 0..30),
        close_months in prop::collection::btree_set(1u32..=6, 1..4),
    ) {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(async {
                let store = Arc::new(MemoryStore::new());
                let chart = Chart::seed(&store).await;
                let accounts: Vec<Account> = chart
                    .all()
                    .into_iter()
                    .filter(|a| !a.is_header && a.id != chart.retained_earnings.id)
                    .cloned()
                    .collect();
                assert_eq!(accounts.len(), ACCOUNTS);
                let ledger = LedgerService::new(store.clone(), config());
                let engine = ClosingEngine::new(store, config());

                let mut closed_through = d(2024, 12, 31);
                let mut net_income_total = Decimal::ZERO;
                let mut pending = postings;
                pending.sort_by_key(|p| p.day);

                for month in close_months {
                    let end = month_end(month);
                    let (due, later): (Vec<_>, Vec<_>) = pending
                        .into_iter()
                        .partition(|p| d(2025, 1, 1) + Days::new(p.day) <= end);
                    pending = later;
                    for p in due {
                        let date = d(2025, 1, 1) + Days::new(p.day);
                        ledger
                            .post_journal_entry(PostJournalEntryRequest {
                                source_type: SourceType::Manual,
                                source_id: None,
                                reference: String::new(),
                                entry_date: date,
                                description: String::new(),
                                lines: vec![
                                    LineInput::debit(accounts[p.debit].id, p.amount, ""),
                                    LineInput::credit(accounts[p.credit].id, p.amount, ""),
                                ],
                                auto_post: true,
                                created_by: UserId::new(),
                            })
                            .await
                            .unwrap();
                    }

                    let start = d(2025, month, 1);
                    let preview = engine.preview(start, end).await.unwrap();
                    assert!(preview.can_close, "{:?}", preview.warnings);
                    let result = engine.execute(start, end, "", accountant()).await.unwrap();
                    assert_eq!(result.net_income, preview.net_income);
                    assert_eq!(result.total_revenue, preview.total_revenue);
                    assert_eq!(result.total_expense, preview.total_expense);
                    net_income_total += result.net_income;
                    closed_through = end;

                    for account in accounts.iter().filter(|a| a.is_closable()) {
                        assert_eq!(
                            ledger.get_balance(account.id, end).await.unwrap(),
                            Decimal::ZERO,
                            "{} as of {}",
                            account.code,
                            end
                        );
                    }
                    assert!(ledger.trial_balance(end).await.unwrap().is_balanced);
                }

                let retained = ledger
                    .get_balance(chart.retained_earnings.id, closed_through)
                    .await
                    .unwrap();
                assert_eq!(retained, net_income_total);

                for account in &accounts {
                    let cached = ledger.get_account(account.id).await.unwrap().cached_balance;
                    let derived = ledger
                        .get_balance(account.id, d(2026, 12, 31))
                        .await
                        .unwrap();
                    assert_eq!(cached, derived, "{}", account.code);
                }
            });
    }
}
