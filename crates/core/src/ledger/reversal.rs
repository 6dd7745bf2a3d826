//! Reversing entries for posted journal entries.

use super::entry::{EntryStatus, JournalEntry, SourceType};
use super::error::LedgerError;
use super::types::LineInput;

/// Checks that `entry` may be reversed.
pub fn check_reversible(entry: &JournalEntry) -> Result<(), LedgerError> {
    if entry.source_type == SourceType::Closing {
        return Err(LedgerError::ClosingEntryImmutable(entry.id));
    }
    match entry.status {
        EntryStatus::Posted if entry.reversed_by_entry_id.is_none() => Ok(()),
        EntryStatus::Draft => Err(LedgerError::EntryNotPosted(entry.id)),
        EntryStatus::Posted | EntryStatus::Reversed => Err(LedgerError::AlreadyReversed(entry.id)),
    }
}

/// Lines of the compensating entry: debits become credits and vice versa.
#[must_use]
pub fn reversing_lines(entry: &JournalEntry) -> Vec<LineInput> {
    entry
        .lines
        .iter()
        .map(|line| LineInput {
            account_id: line.account_id,
            debit: line.credit,
            credit: line.debit,
            description: format!("Reversal: {}", line.description),
        })
        .collect()
}

/// Description of the compensating entry.
#[must_use]
pub fn reversal_description(entry: &JournalEntry, reason: &str) -> String {
    format!("Reversal of entry {}. Reason: {}", entry.id, reason.trim())
}
