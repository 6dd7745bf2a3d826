//! `SeaORM` entities for the ledger tables.

pub mod prelude;

pub mod accounting_periods;
pub mod accounts;
pub mod balance_corrections;
pub mod journal_entries;
pub mod journal_lines;
pub mod ledger_outbox;
pub mod sea_orm_active_enums;
