//! Request and response types for ledger operations.

use chrono::NaiveDate;
use ledgerline_shared::types::{AccountId, JournalEntryId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountType;
use super::entry::{EntryStatus, SourceType};

/// One requested journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    /// Account to post to.
    pub account_id: AccountId,
    /// Debit amount; zero on credit lines.
    pub debit: Decimal,
    /// Credit amount; zero on debit lines.
    pub credit: Decimal,
    /// Line memo.
    #[serde(default)]
    pub description: String,
}

impl LineInput {
    /// Debit line.
    #[must_use]
    pub fn debit(account_id: AccountId, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account_id,
            debit: amount,
            credit: Decimal::ZERO,
            description: description.into(),
        }
    }

    /// Credit line.
    #[must_use]
    pub fn credit(account_id: AccountId, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            account_id,
            debit: Decimal::ZERO,
            credit: amount,
            description: description.into(),
        }
    }
}

/// Request to record a journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJournalEntryRequest {
    /// Originating collaborator.
    pub source_type: SourceType,
    /// Originator's identifier, used for idempotency.
    pub source_id: Option<Uuid>,
    /// Human-readable reference.
    pub reference: String,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Description.
    pub description: String,
    /// Ordered lines.
    pub lines: Vec<LineInput>,
    /// Post immediately instead of leaving a draft.
    pub auto_post: bool,
    /// Author.
    pub created_by: UserId,
}

/// Result of recording a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingResult {
    /// The new entry.
    pub entry_id: JournalEntryId,
    /// Its status after the call.
    pub status: EntryStatus,
}

/// Request to reverse a posted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseEntryRequest {
    /// Entry to reverse.
    pub entry_id: JournalEntryId,
    /// Why the entry is being reversed.
    pub reason: String,
    /// Who reverses it.
    pub reversed_by: UserId,
    /// Date of the compensating entry; today when absent.
    pub reversal_date: Option<NaiveDate>,
}

/// Request to create an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    /// Unique hierarchical code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Account classification.
    pub account_type: AccountType,
    /// Code of the parent header account.
    pub parent_code: Option<String>,
    /// Aggregation-only account.
    pub is_header: bool,
}

/// Metadata changes to an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountUpdate {
    /// New display name.
    pub name: Option<String>,
    /// New header flag.
    pub is_header: Option<bool>,
}
