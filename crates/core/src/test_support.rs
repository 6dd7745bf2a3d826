//! Fixtures shared by the unit tests.

use chrono::{NaiveDate, Utc};
use ledgerline_shared::LedgerConfig;
use ledgerline_shared::types::UserId;

use crate::auth::{Actor, ActorRole};
use crate::ledger::{Account, AccountType};
use crate::store::{LedgerStore, LedgerTx, MemoryStore};

pub fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Ledger config whose posting window admits the fixed dates used in tests.
pub fn config() -> LedgerConfig {
    LedgerConfig {
        max_past_years: 50,
        ..LedgerConfig::default()
    }
}

pub fn accountant() -> Actor {
    Actor::new(UserId::new(), ActorRole::Accountant)
}

pub fn admin() -> Actor {
    Actor::new(UserId::new(), ActorRole::Admin)
}

/// A small chart of accounts.
pub struct Chart {
    pub cash: Account,
    pub bank: Account,
    pub payables: Account,
    pub capital: Account,
    pub retained_earnings: Account,
    pub revenue_header: Account,
    pub sales: Account,
    pub service_revenue: Account,
    pub cogs: Account,
    pub rent: Account,
    pub salaries: Account,
}

impl Chart {
    pub async fn seed(store: &MemoryStore) -> Self {
        let leaf = |code: &str, name: &str, account_type| {
            Account::new(code.into(), name.into(), account_type, false)
        };
        let revenue_header = Account::new("4000".into(), "Revenue".into(), AccountType::Revenue, true);
        let mut sales = leaf("4101", "Sales Revenue", AccountType::Revenue);
        sales.parent_id = Some(revenue_header.id);
        let mut service_revenue = leaf("4201", "Service Revenue", AccountType::Revenue);
        service_revenue.parent_id = Some(revenue_header.id);

        let chart = Self {
            cash: leaf("1101", "Cash", AccountType::Asset),
            bank: leaf("1102", "Bank", AccountType::Asset),
            payables: leaf("2101", "Accounts Payable", AccountType::Liability),
            capital: leaf("3101", "Owner Capital", AccountType::Equity),
            retained_earnings: leaf("3201", "Retained Earnings", AccountType::Equity),
            revenue_header,
            sales,
            service_revenue,
            cogs: leaf("5101", "Cost of Goods Sold", AccountType::Expense),
            rent: leaf("5201", "Rent Expense", AccountType::Expense),
            salaries: leaf("5202", "Salaries Expense", AccountType::Expense),
        };

        let mut tx = store.begin().await.unwrap();
        for account in chart.all() {
            tx.insert_account(account).await.unwrap();
        }
        tx.commit().await.unwrap();
        chart
    }

    pub fn all(&self) -> [&Account; 11] {
        [
            &self.cash,
            &self.bank,
            &self.payables,
            &self.capital,
            &self.retained_earnings,
            &self.revenue_header,
            &self.sales,
            &self.service_revenue,
            &self.cogs,
            &self.rent,
            &self.salaries,
        ]
    }
}
