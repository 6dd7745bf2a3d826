//! Core ledger logic for Ledgerline.
//!
//! This crate contains the double-entry ledger and the period closing engine.
//! Persistence is reached only through the [`store::LedgerStore`] port, so
//! every rule here runs unchanged against PostgreSQL or the in-memory store.
//!
//! # Modules
//!
//! - `ledger` - Accounts, journal entries, validation, balances
//! - `period` - Accounting period registry and posting gate
//! - `closing` - Period closing preview and execution
//! - `outbox` - Deferred ledger postings
//! - `reconciliation` - Cached balance drift detection and correction
//! - `store` - Storage port and in-memory implementation
//! - `auth` - Actors and their privileges

pub mod auth;
pub mod closing;
pub mod deadline;
pub mod ledger;
pub mod outbox;
pub mod period;
pub mod reconciliation;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;
