//! `SeaORM` entity prelude.

pub use super::accounting_periods::Entity as AccountingPeriods;
pub use super::accounts::Entity as Accounts;
pub use super::balance_corrections::Entity as BalanceCorrections;
pub use super::journal_entries::Entity as JournalEntries;
pub use super::journal_lines::Entity as JournalLines;
pub use super::ledger_outbox::Entity as LedgerOutbox;
