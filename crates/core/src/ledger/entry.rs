//! Journal entries and their lines.

use chrono::{DateTime, NaiveDate, Utc};
use ledgerline_shared::types::{AccountId, JournalEntryId, JournalLineId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Recorded but without effect on balances.
    Draft,
    /// Final; lines are immutable and affect balances.
    Posted,
    /// Posted and later cancelled by a compensating entry.
    Reversed,
}

impl EntryStatus {
    /// Posted and Reversed entries both contribute to balances; a Reversed
    /// entry is cancelled by its own Posted compensating entry.
    #[must_use]
    pub const fn affects_balances(self) -> bool {
        matches!(self, Self::Posted | Self::Reversed)
    }

    /// Stable lowercase name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Posted => "posted",
            Self::Reversed => "reversed",
        }
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The external collaborator that originated a journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    /// Hand-written journal entry.
    Manual,
    /// Sales invoice.
    Sale,
    /// Purchase invoice.
    Purchase,
    /// Cash or bank movement.
    CashBank,
    /// Customer or vendor payment.
    Payment,
    /// Adjusting entry.
    Adjustment,
    /// Opening balances.
    Opening,
    /// Compensating entry produced by a reversal.
    Reversal,
    /// Period closing entry.
    Closing,
}

impl SourceType {
    /// Stable snake_case name used in storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Sale => "sale",
            Self::Purchase => "purchase",
            Self::CashBank => "cash_bank",
            Self::Payment => "payment",
            Self::Adjustment => "adjustment",
            Self::Opening => "opening",
            Self::Reversal => "reversal",
            Self::Closing => "closing",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(Self::Manual),
            "sale" => Ok(Self::Sale),
            "purchase" => Ok(Self::Purchase),
            "cash_bank" => Ok(Self::CashBank),
            "payment" => Ok(Self::Payment),
            "adjustment" => Ok(Self::Adjustment),
            "opening" => Ok(Self::Opening),
            "reversal" => Ok(Self::Reversal),
            "closing" => Ok(Self::Closing),
            _ => Err(format!("Unknown source type: {s}")),
        }
    }
}

/// One debit or credit line of a journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    /// Unique identifier.
    pub id: JournalLineId,
    /// Owning entry.
    pub entry_id: JournalEntryId,
    /// Account posted to.
    pub account_id: AccountId,
    /// 1-based position within the entry.
    pub line_number: u32,
    /// Line memo.
    pub description: String,
    /// Debit amount (zero for credit lines).
    pub debit: Decimal,
    /// Credit amount (zero for debit lines).
    pub credit: Decimal,
}

/// A journal entry with its ordered lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// Unique identifier.
    pub id: JournalEntryId,
    /// Originating collaborator.
    pub source_type: SourceType,
    /// Originator's identifier; weak back-reference.
    pub source_id: Option<Uuid>,
    /// Human-readable reference (invoice number, closing tag).
    pub reference: String,
    /// Accounting date.
    pub entry_date: NaiveDate,
    /// Description.
    pub description: String,
    /// Lifecycle status.
    pub status: EntryStatus,
    /// Sum of line debits.
    pub total_debit: Decimal,
    /// Sum of line credits.
    pub total_credit: Decimal,
    /// Always `total_debit == total_credit` for persisted entries.
    pub is_balanced: bool,
    /// Author.
    pub created_by: UserId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Who posted the entry.
    pub posted_by: Option<UserId>,
    /// When the entry was posted.
    pub posted_at: Option<DateTime<Utc>>,
    /// The compensating entry, once reversed.
    pub reversed_by_entry_id: Option<JournalEntryId>,
    /// The original entry, when this entry is a reversal.
    pub reverses_entry_id: Option<JournalEntryId>,
    /// Ordered lines.
    pub lines: Vec<JournalLine>,
}

impl JournalEntry {
    /// Returns true if the entry's lines count toward balances.
    #[must_use]
    pub const fn affects_balances(&self) -> bool {
        self.status.affects_balances()
    }

    /// Recomputes the debit/credit totals from the lines.
    #[must_use]
    pub fn line_totals(&self) -> (Decimal, Decimal) {
        self.lines.iter().fold((Decimal::ZERO, Decimal::ZERO), |(d, c), line| {
            (d + line.debit, c + line.credit)
        })
    }
}
