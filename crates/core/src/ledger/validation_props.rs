//! Property-based tests for double-entry validation.

use std::collections::HashMap;

use ledgerline_shared::types::AccountId;
use proptest::prelude::*;
use rust_decimal::Decimal;

use super::account::{Account, AccountType};
use super::error::LedgerError;
use super::types::LineInput;
use super::validation::validate_lines;

/// Strategy to generate a positive amount (0.01 to 1,000,000.00).
fn positive_amount() -> impl Strategy<Value = Decimal> {
    (1i64..100_000_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

fn accounts() -> (HashMap<AccountId, Account>, Vec<AccountId>) {
    let mut map = HashMap::new();
    let mut ids = Vec::new();
    for (code, account_type) in [
        ("1101", AccountType::Asset),
        ("2101", AccountType::Liability),
        ("3101", AccountType::Equity),
        ("4101", AccountType::Revenue),
        ("5101", AccountType::Expense),
    ] {
        let account = Account::new(code.into(), code.into(), account_type, false);
        ids.push(account.id);
        map.insert(account.id, account);
    }
    (map, ids)
}

/// Splits each debit amount into a matching credit so the set balances.
fn balanced_lines(amounts: &[Decimal], ids: &[AccountId]) -> Vec<LineInput> {
    let mut lines = Vec::new();
    for (i, amount) in amounts.iter().enumerate() {
        lines.push(LineInput::debit(ids[i % ids.len()], *amount, ""));
        lines.push(LineInput::credit(ids[(i + 1) % ids.len()], *amount, ""));
    }
    lines
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_balanced_lines_always_validate(
        amounts in prop::collection::vec(positive_amount(), 1..10)
    ) {
        let (map, ids) = accounts();
        let lines = balanced_lines(&amounts, &ids);
        let balanced = validate_lines(&lines, &map).unwrap();
        let expected: Decimal = amounts.iter().copied().sum();

        prop_assert_eq!(balanced.total_debit(), expected);
        prop_assert_eq!(balanced.total_credit(), expected);
        prop_assert_eq!(balanced.lines().len(), lines.len());
    }

    #[test]
    fn prop_any_imbalance_is_rejected_with_totals(
        amounts in prop::collection::vec(positive_amount(), 1..10),
        extra in positive_amount(),
    ) {
        let (map, ids) = accounts();
        let mut lines = balanced_lines(&amounts, &ids);
        lines.push(LineInput::debit(ids[0], extra, ""));
        let credits: Decimal = amounts.iter().copied().sum();

        let err = validate_lines(&lines, &map).unwrap_err();
        prop_assert_eq!(
            err,
            LedgerError::UnbalancedEntry {
                debit_total: credits + extra,
                credit_total: credits,
            }
        );
    }

    #[test]
    fn prop_signed_deltas_net_to_zero_in_debit_terms(
        amounts in prop::collection::vec(positive_amount(), 1..10)
    ) {
        let (map, ids) = accounts();
        let lines = balanced_lines(&amounts, &ids);
        let balanced = validate_lines(&lines, &map).unwrap();

        let net_debit: Decimal = balanced
            .lines()
            .iter()
            .map(|line| line.account_type.normal_side().to_net_debit(line.balance_delta()))
            .sum();
        prop_assert_eq!(net_debit, Decimal::ZERO);
    }
}
