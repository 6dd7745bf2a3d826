//! Ledger error types for validation, state, and invariant errors.
//!
//! Every contract of the ledger and closing engine fails with a
//! [`LedgerError`]. Each variant carries the numeric or identifying context
//! needed to diagnose the rejection.

use chrono::NaiveDate;
use ledgerline_shared::AppError;
use ledgerline_shared::types::{AccountId, JournalEntryId, PeriodId};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::entry::SourceType;
use crate::auth::ActorRole;
use crate::period::PeriodStatus;

/// Broad class of a ledger error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected before any write: malformed or unbalanced input.
    Validation,
    /// Rejected before mutation: the current state forbids the operation.
    State,
    /// Detected after computation, before commit; the unit of work was aborted.
    Invariant,
    /// Cached state disagrees with the ledger.
    Consistency,
    /// The storage layer failed or the deadline expired.
    Storage,
}

/// Errors that can occur during ledger operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    // ========== Validation Errors ==========
    /// Journal entry has no lines.
    #[error("Journal entry must have at least one line")]
    EmptyEntry,

    /// A line is malformed.
    #[error("Invalid line {line_number}: {reason}")]
    InvalidLine {
        /// 1-based line number.
        line_number: u32,
        /// What is wrong with the line.
        reason: String,
    },

    /// Journal entry is not balanced (debits != credits).
    #[error("Journal entry is not balanced. Debit: {debit_total}, Credit: {credit_total}")]
    UnbalancedEntry {
        /// Sum of debit amounts.
        debit_total: Decimal,
        /// Sum of credit amounts.
        credit_total: Decimal,
    },

    /// Header accounts aggregate children and never receive lines.
    #[error("Account {0} is a header account and cannot be posted to")]
    HeaderAccountPosting(AccountId),

    /// A free-text field that must be present is empty.
    #[error("A reason is required")]
    ReasonRequired,

    /// Start date after end date.
    #[error("Invalid date range: {start} to {end}")]
    InvalidDateRange {
        /// Requested start.
        start: NaiveDate,
        /// Requested end.
        end: NaiveDate,
    },

    /// Posting date outside the sanity window.
    #[error("Date {date} is outside the posting window {earliest} to {latest}")]
    DateOutOfRange {
        /// Requested date.
        date: NaiveDate,
        /// Earliest accepted date.
        earliest: NaiveDate,
        /// Latest accepted date.
        latest: NaiveDate,
    },

    // ========== Account Errors ==========
    /// Account not found.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// No account carries the code.
    #[error("Account code not found: {0}")]
    AccountCodeNotFound(String),

    /// Account is inactive and cannot be used.
    #[error("Account {0} is inactive")]
    AccountInactive(AccountId),

    /// Account code already exists.
    #[error("Account code already exists: {0}")]
    DuplicateAccountCode(String),

    /// Account code is malformed.
    #[error("Invalid account code: {0:?}")]
    InvalidAccountCode(String),

    /// Parent account is unusable.
    #[error("Invalid parent account {code}: {reason}")]
    InvalidParentAccount {
        /// Parent code.
        code: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A posted-to account cannot become a header.
    #[error("Account {0} has journal lines and cannot become a header account")]
    HeaderConversionNotAllowed(AccountId),

    // ========== Journal Errors ==========
    /// The business event has already been recorded.
    #[error("Journal entry already exists for {source_type} {source_id}")]
    DuplicateReference {
        /// Originating collaborator.
        source_type: SourceType,
        /// Originator's identifier.
        source_id: Uuid,
    },

    /// Journal entry not found.
    #[error("Journal entry not found: {0}")]
    EntryNotFound(JournalEntryId),

    /// Only drafts can be posted.
    #[error("Journal entry {0} is already posted")]
    AlreadyPosted(JournalEntryId),

    /// Only posted entries can be reversed.
    #[error("Journal entry {0} is not posted")]
    EntryNotPosted(JournalEntryId),

    /// An entry can be reversed once.
    #[error("Journal entry {0} is already reversed")]
    AlreadyReversed(JournalEntryId),

    /// Closing entries are undone by reopening the period.
    #[error("Journal entry {0} is a closing entry and cannot be reversed")]
    ClosingEntryImmutable(JournalEntryId),

    // ========== Period Errors ==========
    /// The date falls inside a closed or locked period.
    #[error("Period {period_start} to {period_end} is closed, cannot post on {date}")]
    PeriodClosed {
        /// Requested date.
        date: NaiveDate,
        /// Start of the closed period.
        period_start: NaiveDate,
        /// End of the closed period.
        period_end: NaiveDate,
    },

    /// Period not found.
    #[error("Accounting period not found: {0}")]
    PeriodNotFound(PeriodId),

    /// Locked periods reject modification.
    #[error("Accounting period {0} is locked")]
    PeriodLocked(PeriodId),

    /// Status change not permitted by the period state machine.
    #[error("Invalid period transition from {from} to {to}")]
    InvalidPeriodTransition {
        /// Current status.
        from: PeriodStatus,
        /// Requested status.
        to: PeriodStatus,
    },

    /// Posted entries inside the range do not balance.
    #[error("Cannot close period: {count} unbalanced entries in range")]
    UnbalancedEntriesInPeriod {
        /// Number of offending entries.
        count: usize,
    },

    /// The actor's role does not allow the operation.
    #[error("Role {role} is not allowed to perform this operation")]
    PrivilegeRequired {
        /// The actor's role.
        role: ActorRole,
    },

    // ========== Closing Errors ==========
    /// The range has already been closed.
    #[error("Period {start} to {end} is already closed")]
    AlreadyClosed {
        /// Requested start.
        start: NaiveDate,
        /// Requested end.
        end: NaiveDate,
    },

    /// The range overlaps a closed period.
    #[error("Period {start} to {end} overlaps closed period {existing_start} to {existing_end}")]
    OverlappingPeriod {
        /// Requested start.
        start: NaiveDate,
        /// Requested end.
        end: NaiveDate,
        /// Start of the closed period.
        existing_start: NaiveDate,
        /// End of the closed period.
        existing_end: NaiveDate,
    },

    /// Deferred postings inside the range have not reached the ledger yet.
    #[error("Cannot close period: {count} deferred postings are still pending")]
    PendingDeferredPostings {
        /// Number of pending outbox messages in range.
        count: usize,
    },

    /// Retained earnings account is missing or unusable.
    #[error("Retained earnings account ({0}) not found")]
    RetainedEarningsNotFound(String),

    /// A temporary account was not zeroed by the closing entry.
    #[error("Closing did not balance: account {account_id} has residual {residual}")]
    ClosingDidNotBalance {
        /// Offending account.
        account_id: AccountId,
        /// Balance left after closing.
        residual: Decimal,
    },

    // ========== Consistency Errors ==========
    /// Cached balance disagrees with the ledger-derived balance.
    #[error("Balance drift on account {account_id}: cached {cached}, expected {expected}")]
    BalanceDrift {
        /// Offending account.
        account_id: AccountId,
        /// Cached balance.
        cached: Decimal,
        /// Ledger-derived balance plus pending deferred deltas.
        expected: Decimal,
    },

    // ========== Storage Errors ==========
    /// Concurrent modification detected.
    #[error("Concurrent modification detected, please retry")]
    ConcurrentModification,

    /// The operation exceeded its deadline and was rolled back.
    #[error("Operation timed out and was rolled back")]
    Timeout,

    /// Storage error.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl LedgerError {
    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyEntry => "EMPTY_ENTRY",
            Self::InvalidLine { .. } => "INVALID_LINE",
            Self::UnbalancedEntry { .. } => "UNBALANCED_ENTRY",
            Self::HeaderAccountPosting(_) => "HEADER_ACCOUNT_POSTING",
            Self::ReasonRequired => "REASON_REQUIRED",
            Self::InvalidDateRange { .. } => "INVALID_DATE_RANGE",
            Self::DateOutOfRange { .. } => "DATE_OUT_OF_RANGE",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::AccountCodeNotFound(_) => "ACCOUNT_CODE_NOT_FOUND",
            Self::AccountInactive(_) => "ACCOUNT_INACTIVE",
            Self::DuplicateAccountCode(_) => "DUPLICATE_ACCOUNT_CODE",
            Self::InvalidAccountCode(_) => "INVALID_ACCOUNT_CODE",
            Self::InvalidParentAccount { .. } => "INVALID_PARENT_ACCOUNT",
            Self::HeaderConversionNotAllowed(_) => "HEADER_CONVERSION_NOT_ALLOWED",
            Self::DuplicateReference { .. } => "DUPLICATE_REFERENCE",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::AlreadyPosted(_) => "ALREADY_POSTED",
            Self::EntryNotPosted(_) => "ENTRY_NOT_POSTED",
            Self::AlreadyReversed(_) => "ALREADY_REVERSED",
            Self::ClosingEntryImmutable(_) => "CLOSING_ENTRY_IMMUTABLE",
            Self::PeriodClosed { .. } => "PERIOD_CLOSED",
            Self::PeriodNotFound(_) => "PERIOD_NOT_FOUND",
            Self::PeriodLocked(_) => "PERIOD_LOCKED",
            Self::InvalidPeriodTransition { .. } => "INVALID_PERIOD_TRANSITION",
            Self::UnbalancedEntriesInPeriod { .. } => "UNBALANCED_ENTRIES_IN_PERIOD",
            Self::PrivilegeRequired { .. } => "PRIVILEGE_REQUIRED",
            Self::AlreadyClosed { .. } => "ALREADY_CLOSED",
            Self::OverlappingPeriod { .. } => "OVERLAPPING_PERIOD",
            Self::PendingDeferredPostings { .. } => "PENDING_DEFERRED_POSTINGS",
            Self::RetainedEarningsNotFound(_) => "RETAINED_EARNINGS_NOT_FOUND",
            Self::ClosingDidNotBalance { .. } => "CLOSING_DID_NOT_BALANCE",
            Self::BalanceDrift { .. } => "BALANCE_DRIFT",
            Self::ConcurrentModification => "CONCURRENT_MODIFICATION",
            Self::Timeout => "TIMEOUT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns the taxonomy class of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyEntry
            | Self::InvalidLine { .. }
            | Self::UnbalancedEntry { .. }
            | Self::HeaderAccountPosting(_)
            | Self::ReasonRequired
            | Self::InvalidDateRange { .. }
            | Self::DateOutOfRange { .. }
            | Self::AccountInactive(_)
            | Self::InvalidAccountCode(_)
            | Self::InvalidParentAccount { .. } => ErrorCategory::Validation,

            Self::AccountNotFound(_)
            | Self::AccountCodeNotFound(_)
            | Self::DuplicateAccountCode(_)
            | Self::HeaderConversionNotAllowed(_)
            | Self::DuplicateReference { .. }
            | Self::EntryNotFound(_)
            | Self::AlreadyPosted(_)
            | Self::EntryNotPosted(_)
            | Self::AlreadyReversed(_)
            | Self::ClosingEntryImmutable(_)
            | Self::PeriodClosed { .. }
            | Self::PeriodNotFound(_)
            | Self::PeriodLocked(_)
            | Self::InvalidPeriodTransition { .. }
            | Self::UnbalancedEntriesInPeriod { .. }
            | Self::PrivilegeRequired { .. }
            | Self::AlreadyClosed { .. }
            | Self::OverlappingPeriod { .. }
            | Self::PendingDeferredPostings { .. }
            | Self::RetainedEarningsNotFound(_) => ErrorCategory::State,

            Self::ClosingDidNotBalance { .. } => ErrorCategory::Invariant,

            Self::BalanceDrift { .. } => ErrorCategory::Consistency,

            Self::ConcurrentModification | Self::Timeout | Self::Storage(_) => {
                ErrorCategory::Storage
            }
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrentModification | Self::Timeout)
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        let message = err.to_string();
        match err {
            LedgerError::PrivilegeRequired { .. } => Self::Forbidden(message),
            LedgerError::AccountNotFound(_)
            | LedgerError::AccountCodeNotFound(_)
            | LedgerError::EntryNotFound(_)
            | LedgerError::PeriodNotFound(_) => Self::NotFound(message),
            LedgerError::DuplicateReference { .. }
            | LedgerError::DuplicateAccountCode(_)
            | LedgerError::ConcurrentModification => Self::Conflict(message),
            LedgerError::Timeout => Self::Timeout(message),
            LedgerError::Storage(_) => Self::Database(message),
            other => match other.category() {
                ErrorCategory::Validation => Self::Validation(message),
                ErrorCategory::State => Self::BusinessRule(message),
                ErrorCategory::Invariant | ErrorCategory::Consistency => {
                    Self::InvariantViolation(message)
                }
                ErrorCategory::Storage => Self::Internal(message),
            },
        }
    }
}
