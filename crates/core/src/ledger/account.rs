//! Chart of accounts: account types, normal balance sides, account records.

use chrono::{DateTime, Utc};
use ledgerline_shared::types::AccountId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// The side on which an account naturally accumulates value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalSide {
    /// Balance grows with debits.
    Debit,
    /// Balance grows with credits.
    Credit,
}

impl NormalSide {
    /// Signed balance effect of a debit/credit pair.
    ///
    /// Positive means the amount moves the account toward its normal side.
    #[must_use]
    pub fn signed(self, debit: Decimal, credit: Decimal) -> Decimal {
        match self {
            Self::Debit => debit - credit,
            Self::Credit => credit - debit,
        }
    }

    /// Converts a normal-side balance back into a debit-minus-credit amount.
    #[must_use]
    pub fn to_net_debit(self, balance: Decimal) -> Decimal {
        match self {
            Self::Debit => balance,
            Self::Credit => -balance,
        }
    }
}

/// Account classification. Carries its normal balance side as data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Resources owned (debit-normal).
    Asset,
    /// Obligations owed (credit-normal).
    Liability,
    /// Owner's residual interest (credit-normal).
    Equity,
    /// Income earned (credit-normal, temporary).
    Revenue,
    /// Costs incurred (debit-normal, temporary).
    Expense,
}

impl AccountType {
    /// All account types in chart order.
    pub const ALL: [Self; 5] = [
        Self::Asset,
        Self::Liability,
        Self::Equity,
        Self::Revenue,
        Self::Expense,
    ];

    /// Returns the normal balance side for this type.
    #[must_use]
    pub const fn normal_side(self) -> NormalSide {
        match self {
            Self::Asset | Self::Expense => NormalSide::Debit,
            Self::Liability | Self::Equity | Self::Revenue => NormalSide::Credit,
        }
    }

    /// Temporary accounts are zeroed at each period close.
    #[must_use]
    pub const fn is_temporary(self) -> bool {
        matches!(self, Self::Revenue | Self::Expense)
    }

    /// Stable lowercase name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Liability => "liability",
            Self::Equity => "equity",
            Self::Revenue => "revenue",
            Self::Expense => "expense",
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asset" => Ok(Self::Asset),
            "liability" => Ok(Self::Liability),
            "equity" => Ok(Self::Equity),
            "revenue" => Ok(Self::Revenue),
            "expense" => Ok(Self::Expense),
            _ => Err(format!("Unknown account type: {s}")),
        }
    }
}

/// A chart of accounts entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Unique hierarchical code, e.g. "1101" or "1101-001".
    pub code: String,
    /// Display name.
    pub name: String,
    /// Account classification.
    pub account_type: AccountType,
    /// Parent header account.
    pub parent_id: Option<AccountId>,
    /// Aggregation-only account that never receives lines.
    pub is_header: bool,
    /// Inactive accounts reject new lines.
    pub is_active: bool,
    /// Materialized normal-side balance; always reconcilable to the ledger.
    pub cached_balance: Decimal,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last metadata or balance change.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates an active account with a zero cached balance.
    #[must_use]
    pub fn new(code: String, name: String, account_type: AccountType, is_header: bool) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            code,
            name,
            account_type,
            parent_id: None,
            is_header,
            is_active: true,
            cached_balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Shorthand for the account type's normal side.
    #[must_use]
    pub const fn normal_side(&self) -> NormalSide {
        self.account_type.normal_side()
    }

    /// True for non-header Revenue and Expense accounts.
    #[must_use]
    pub const fn is_closable(&self) -> bool {
        self.account_type.is_temporary() && !self.is_header
    }
}

/// Maximum length of an account code.
pub const MAX_ACCOUNT_CODE_LEN: usize = 32;

/// Validates an account code: digit groups separated by `-`.
pub fn validate_account_code(code: &str) -> Result<(), LedgerError> {
    let well_formed = !code.is_empty()
        && code.len() <= MAX_ACCOUNT_CODE_LEN
        && code
            .split('-')
            .all(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()));

    if well_formed {
        Ok(())
    } else {
        Err(LedgerError::InvalidAccountCode(code.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    #[rstest]
    #[case(AccountType::Asset, NormalSide::Debit)]
    #[case(AccountType::Expense, NormalSide::Debit)]
    #[case(AccountType::Liability, NormalSide::Credit)]
    #[case(AccountType::Equity, NormalSide::Credit)]
    #[case(AccountType::Revenue, NormalSide::Credit)]
    fn test_normal_side(#[case] account_type: AccountType, #[case] side: NormalSide) {
        assert_eq!(account_type.normal_side(), side);
    }

    #[test]
    fn test_signed_effect() {
        assert_eq!(NormalSide::Debit.signed(dec!(100), dec!(30)), dec!(70));
        assert_eq!(NormalSide::Credit.signed(dec!(100), dec!(30)), dec!(-70));
        assert_eq!(NormalSide::Credit.signed(dec!(0), dec!(1000000)), dec!(1000000));
    }

    #[test]
    fn test_net_debit_round_trip() {
        for side in [NormalSide::Debit, NormalSide::Credit] {
            let balance = side.signed(dec!(250), dec!(75));
            assert_eq!(side.to_net_debit(balance), dec!(175));
        }
    }

    #[test]
    fn test_temporary_accounts() {
        assert!(AccountType::Revenue.is_temporary());
        assert!(AccountType::Expense.is_temporary());
        assert!(!AccountType::Asset.is_temporary());
        assert!(!AccountType::Equity.is_temporary());
    }

    #[test]
    fn test_account_type_from_str() {
        for account_type in AccountType::ALL {
            assert_eq!(
                AccountType::from_str(account_type.as_str()).unwrap(),
                account_type
            );
        }
        assert_eq!(AccountType::from_str("REVENUE").unwrap(), AccountType::Revenue);
        assert!(AccountType::from_str("income").is_err());
    }

    #[test]
    fn test_closable_excludes_headers() {
        let leaf = Account::new("4101".into(), "Sales".into(), AccountType::Revenue, false);
        let header = Account::new("4000".into(), "Revenue".into(), AccountType::Revenue, true);
        let cash = Account::new("1101".into(), "Cash".into(), AccountType::Asset, false);
        assert!(leaf.is_closable());
        assert!(!header.is_closable());
        assert!(!cash.is_closable());
    }

    #[rstest]
    #[case("1101", true)]
    #[case("1101-001", true)]
    #[case("1-2-3", true)]
    #[case("", false)]
    #[case("11a1", false)]
    #[case("1101-", false)]
    #[case("-1101", false)]
    #[case("1101--001", false)]
    fn test_validate_account_code(#[case] code: &str, #[case] valid: bool) {
        assert_eq!(validate_account_code(code).is_ok(), valid);
    }
}
