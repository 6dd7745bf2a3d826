//! Double-entry bookkeeping logic.
//!
//! This module implements the core ledger functionality:
//! - Chart of accounts with normal balance sides
//! - Journal entries and their lines
//! - Double-entry validation
//! - Balance calculation from the journal
//! - Reversing entries
//! - Ledger service for the posting and balance contracts

pub mod account;
pub mod balance;
pub mod entry;
pub mod error;
pub mod journal;
pub mod reversal;
pub mod service;
pub mod types;
pub mod validation;

#[cfg(test)]
mod service_props;
#[cfg(test)]
mod validation_props;

pub use account::{Account, AccountType, NormalSide};
pub use balance::{BalanceTotals, TrialBalance, TrialBalanceRow, balance_as_of, balance_for_range};
pub use entry::{EntryStatus, JournalEntry, JournalLine, SourceType};
pub use error::{ErrorCategory, LedgerError};
pub use service::LedgerService;
pub use types::{
    AccountUpdate, LineInput, NewAccount, PostJournalEntryRequest, PostingResult,
    ReverseEntryRequest,
};
pub use validation::{Balanced, ValidatedLine, validate_lines};
