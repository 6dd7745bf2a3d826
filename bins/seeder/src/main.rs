//! Seeds the default chart of accounts.
//!
//! Accounts are matched by code, so running the seeder again only adds the
//! codes that are missing.
//!
//! Usage: cargo run --bin seeder

use std::sync::Arc;

use anyhow::Context;
use ledgerline_core::ledger::{AccountType, LedgerError, LedgerService, NewAccount};
use ledgerline_db::PgLedgerStore;
use ledgerline_shared::AppConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// `(code, name, type, parent code, is header)`, parents before children.
const CHART: &[(&str, &str, AccountType, Option<&str>, bool)] = &[
    ("1000", "Assets", AccountType::Asset, None, true),
    ("1100", "Current Assets", AccountType::Asset, Some("1000"), true),
    ("1101", "Cash", AccountType::Asset, Some("1100"), false),
    ("1102", "Bank", AccountType::Asset, Some("1100"), false),
    ("1200", "Receivables", AccountType::Asset, Some("1000"), true),
    ("1201", "Accounts Receivable", AccountType::Asset, Some("1200"), false),
    ("1240", "Input VAT", AccountType::Asset, Some("1200"), false),
    ("1301", "Merchandise Inventory", AccountType::Asset, Some("1100"), false),
    ("1500", "Fixed Assets", AccountType::Asset, Some("1000"), true),
    ("1501", "Office Equipment", AccountType::Asset, Some("1500"), false),
    ("1502", "Vehicles", AccountType::Asset, Some("1500"), false),
    ("1503", "Buildings", AccountType::Asset, Some("1500"), false),
    ("2000", "Liabilities", AccountType::Liability, None, true),
    ("2100", "Current Liabilities", AccountType::Liability, Some("2000"), true),
    ("2101", "Accounts Payable", AccountType::Liability, Some("2100"), false),
    ("2103", "Output VAT", AccountType::Liability, Some("2100"), false),
    ("3000", "Equity", AccountType::Equity, None, true),
    ("3101", "Owner Capital", AccountType::Equity, Some("3000"), false),
    ("3201", "Retained Earnings", AccountType::Equity, Some("3000"), false),
    ("4000", "Revenue", AccountType::Revenue, None, true),
    ("4101", "Sales Revenue", AccountType::Revenue, Some("4000"), false),
    ("4201", "Other Operating Revenue", AccountType::Revenue, Some("4000"), false),
    ("4900", "Other Income", AccountType::Revenue, Some("4000"), false),
    ("5000", "Expenses", AccountType::Expense, None, true),
    ("5101", "Cost of Goods Sold", AccountType::Expense, Some("5000"), false),
    ("5201", "Salaries Expense", AccountType::Expense, Some("5000"), false),
    ("5202", "Electricity Expense", AccountType::Expense, Some("5000"), false),
    ("5203", "Telephone Expense", AccountType::Expense, Some("5000"), false),
    ("5204", "Transportation Expense", AccountType::Expense, Some("5000"), false),
    ("5900", "General Expense", AccountType::Expense, Some("5000"), false),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerline=info,seeder=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let db = ledgerline_db::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Connected to database");

    let ledger = LedgerService::new(Arc::new(PgLedgerStore::new(db)), config.ledger);

    let mut created = 0usize;
    for &(code, name, account_type, parent_code, is_header) in CHART {
        match ledger.get_account_by_code(code).await {
            Ok(_) => {
                info!(code, "Account already exists, skipping");
                continue;
            }
            Err(LedgerError::AccountCodeNotFound(_)) => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to look up account {code}")),
        }

        ledger
            .create_account(NewAccount {
                code: code.to_string(),
                name: name.to_string(),
                account_type,
                parent_code: parent_code.map(str::to_string),
                is_header,
            })
            .await
            .with_context(|| format!("Failed to create account {code}"))?;
        created += 1;
        info!(code, name, %account_type, "Account created");
    }

    info!(created, total = CHART.len(), "Seeding complete");
    Ok(())
}
