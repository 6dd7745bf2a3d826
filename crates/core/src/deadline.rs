//! Operation deadlines.
//!
//! Every public mutating contract runs under [`with_deadline`]. When the
//! deadline passes, the future is dropped together with its open
//! transaction, which rolls back every write it made.

use std::future::Future;
use std::time::Duration;

use crate::ledger::LedgerError;

/// Runs `operation` with a deadline, mapping expiry to [`LedgerError::Timeout`].
pub async fn with_deadline<T, F>(timeout: Duration, operation: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(timeout_ms = timeout.as_millis(), "Ledger operation timed out");
            Err(LedgerError::Timeout)
        }
    }
}
