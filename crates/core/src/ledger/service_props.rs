//! Property-based tests for LedgerService.
//!
//! - Balances derived from the journal equal a from-scratch fold of the
//!   posted lines for every account and date
//! - Cached balances equal the derived balances after any posting sequence
//! - The journal always balances in total

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use ledgerline_shared::types::{AccountId, UserId};
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::account::Account;
use super::entry::SourceType;
use super::service::LedgerService;
use super::types::{LineInput, PostJournalEntryRequest};
use crate::store::MemoryStore;
use crate::test_support::{Chart, config, d};

/// A posting of `amount` from one chart account to another, `day` days
/// after the first of the year.
#[derive(Debug, Clone)]
struct Posting {
    debit: usize,
    credit: usize,
    amount: Decimal,
    day: u64,
    auto_post: bool,
}

fn posting() -> impl Strategy<Value = Posting> {
    (0usize..10, 0usize..10, 1i64..10_000_000i64, 0u64..90, prop::bool::weighted(0.8)).prop_map(
        |(debit, credit, cents, day, auto_post)| Posting {
            debit,
            credit: if credit == debit { (credit + 1) % 10 } else { credit },
            amount: Decimal::new(cents, 2),
            day,
            auto_post,
        },
    )
}

fn leaves(chart: &Chart) -> Vec<Account> {
    chart
        .all()
        .into_iter()
        .filter(|a| !a.is_header)
        .cloned()
        .collect()
}

fn start() -> NaiveDate {
    d(2025, 1, 1)
}

/// Reference model: normal-side balance of each account from posted lines.
fn fold(accounts: &[Account], postings: &[Posting], as_of: NaiveDate) -> HashMap<AccountId, Decimal> {
    let mut balances: HashMap<AccountId, Decimal> =
        accounts.iter().map(|a| (a.id, Decimal::ZERO)).collect();
    for p in postings.iter().filter(|p| p.auto_post) {
        if start() + Days::new(p.day) > as_of {
            continue;
        }
        let debit = &accounts[p.debit];
        let credit = &accounts[p.credit];
        *balances.entry(debit.id).or_default() += debit.normal_side().signed(p.amount, Decimal::ZERO);
        *balances.entry(credit.id).or_default() += credit.normal_side().signed(Decimal::ZERO, p.amount);
    }
    balances
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_balance_as_of_equals_fold(
        postings in prop::collection::vec(posting(), 1..25),
        probe_days in prop::collection::vec(0u64..100, 1..5),
    ) {
        runtime().block_on(async {
            let store = Arc::new(MemoryStore::new());
            let chart = Chart::seed(&store).await;
            let accounts = leaves(&chart);
            let service = LedgerService::new(store, config());

            for p in &postings {
                let request = PostJournalEntryRequest {
                    source_type: SourceType::Manual,
                    source_id: None,
                    reference: String::new(),
                    entry_date: start() + Days::new(p.day),
                    description: String::new(),
                    lines: vec![
                        LineInput::debit(accounts[p.debit].id, p.amount, ""),
                        LineInput::credit(accounts[p.credit].id, p.amount, ""),
                    ],
                    auto_post: p.auto_post,
                    created_by: UserId::new(),
                };
                service.post_journal_entry(request).await.unwrap();
            }

            for day in &probe_days {
                let as_of = start() + Days::new(*day);
                let expected = fold(&accounts, &postings, as_of);
                for account in &accounts {
                    let derived = service.get_balance(account.id, as_of).await.unwrap();
                    assert_eq!(derived, expected[&account.id], "account {} as of {}", account.code, as_of);
                }
                assert!(service.trial_balance(as_of).await.unwrap().is_balanced);
            }

            let end = start() + Days::new(365);
            for account in &accounts {
                let cached = service.get_account(account.id).await.unwrap().cached_balance;
                assert_eq!(cached, service.get_balance(account.id, end).await.unwrap());
            }
        });
    }
}
