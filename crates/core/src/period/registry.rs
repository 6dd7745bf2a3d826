//! Period registry: the posting gate and period lifecycle operations.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use ledgerline_shared::types::PeriodId;

use super::types::{AccountingPeriod, PeriodStatus};
use super::window::{PostingWindow, month_description, monthly_range_for};
use crate::auth::Actor;
use crate::ledger::{EntryStatus, LedgerError};
use crate::outbox;
use crate::store::{LedgerStore, LedgerTx, LockMode};

/// Proof that a date may receive a posting.
///
/// Obtained from [`ensure_postable`] while holding the period lock, and
/// required by the journal store to create an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Postable {
    date: NaiveDate,
}

impl Postable {
    /// The postable date.
    #[must_use]
    pub const fn date(&self) -> NaiveDate {
        self.date
    }

    /// Closing entries are dated on the last day of the range being closed,
    /// which the engine has already verified under the exclusive lock.
    pub(crate) const fn for_closing(end_date: NaiveDate) -> Self {
        Self { date: end_date }
    }
}

/// Checks that `date` may receive a posting, creating its monthly period
/// on first use.
///
/// The caller must hold the period lock. `window` carries the sanity window
/// and today's date; deferred postings already passed it and skip it.
pub async fn ensure_postable<T: LedgerTx + ?Sized>(
    tx: &mut T,
    date: NaiveDate,
    window: Option<(&PostingWindow, NaiveDate)>,
) -> Result<Postable, LedgerError> {
    if let Some((window, today)) = window {
        window.check(date, today)?;
    }

    let periods = tx.list_periods().await?;
    check_not_closed(&periods, date)?;
    if periods.iter().any(|p| p.contains_date(date)) {
        return Ok(Postable { date });
    }

    let (start, end) = monthly_range_for(date, &periods);
    let period = AccountingPeriod::open(start, end, month_description(start));
    if tx.insert_period(&period).await? {
        tracing::debug!(period_id = %period.id, %start, %end, "Opened accounting period on demand");
        return Ok(Postable { date });
    }

    // Another posting created an overlapping period first.
    let periods = tx.list_periods().await?;
    check_not_closed(&periods, date)?;
    if periods.iter().any(|p| p.contains_date(date)) {
        Ok(Postable { date })
    } else {
        Err(LedgerError::ConcurrentModification)
    }
}

/// Period that forbids postings on `date`, if any.
///
/// A closing zeroes the temporary accounts cumulatively as of its end date,
/// so the latest Locked period also closes every date before it.
#[must_use]
pub fn closed_period_for(
    periods: &[AccountingPeriod],
    date: NaiveDate,
) -> Option<&AccountingPeriod> {
    if let Some(period) = periods
        .iter()
        .find(|p| p.contains_date(date) && !p.accepts_postings())
    {
        return Some(period);
    }
    periods
        .iter()
        .filter(|p| p.status() == PeriodStatus::Locked)
        .max_by_key(|p| p.end_date)
        .filter(|p| date <= p.end_date)
}

fn check_not_closed(periods: &[AccountingPeriod], date: NaiveDate) -> Result<(), LedgerError> {
    match closed_period_for(periods, date) {
        Some(period) => Err(LedgerError::PeriodClosed {
            date,
            period_start: period.start_date,
            period_end: period.end_date,
        }),
        None => Ok(()),
    }
}

/// Makes room for a period spanning exactly `[start, end]`.
///
/// Periods that are not Locked and overlap the range are absorbed: one that
/// spans it exactly is returned for reuse, ones fully inside are deleted,
/// and ones straddling a boundary are trimmed to the part outside.
pub(crate) async fn absorb_unlocked<T: LedgerTx + ?Sized>(
    tx: &mut T,
    periods: &[AccountingPeriod],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Option<AccountingPeriod>, LedgerError> {
    let mut reusable = None;
    for period in periods
        .iter()
        .filter(|p| p.overlaps(start, end) && p.status() != PeriodStatus::Locked)
    {
        if period.spans(start, end) {
            reusable = Some(period.clone());
            continue;
        }

        let before = start.pred_opt().filter(|_| period.start_date < start);
        let after = end.succ_opt().filter(|_| period.end_date > end);
        match (before, after) {
            (None, None) => tx.delete_period(period.id).await?,
            (Some(before), None) => {
                let mut trimmed = period.clone();
                trimmed.end_date = before;
                trimmed.updated_at = Utc::now();
                tx.update_period(&trimmed).await?;
            }
            (None, Some(after)) => {
                let mut trimmed = period.clone();
                trimmed.start_date = after;
                trimmed.updated_at = Utc::now();
                tx.update_period(&trimmed).await?;
            }
            (Some(before), Some(after)) => {
                let mut head = period.clone();
                head.end_date = before;
                head.updated_at = Utc::now();
                tx.update_period(&head).await?;

                let mut tail = period.clone();
                tail.id = PeriodId::new();
                tail.start_date = after;
                tail.created_at = Utc::now();
                tail.updated_at = tail.created_at;
                if !tx.insert_period(&tail).await? {
                    return Err(LedgerError::ConcurrentModification);
                }
            }
        }
    }
    Ok(reusable)
}

/// Outcome of a soft close.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodCloseOutcome {
    /// The period after the transition.
    pub period: AccountingPeriod,
    /// Non-blocking findings, e.g. drafts left in the range.
    pub warnings: Vec<String>,
}

/// Period registry service.
pub struct PeriodRegistry<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> PeriodRegistry<S> {
    /// Creates a registry over the store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns false if `date` falls in a Closed or Locked period, or on or
    /// before the latest closing date.
    pub async fn can_post(&self, date: NaiveDate) -> Result<bool, LedgerError> {
        let mut tx = self.store.read().await?;
        let periods = tx.list_periods().await?;
        Ok(closed_period_for(&periods, date).is_none())
    }

    /// Negation of [`Self::can_post`].
    pub async fn is_date_in_closed_period(&self, date: NaiveDate) -> Result<bool, LedgerError> {
        Ok(!self.can_post(date).await?)
    }

    /// Period covering `date`, if any.
    pub async fn find_period(
        &self,
        date: NaiveDate,
    ) -> Result<Option<AccountingPeriod>, LedgerError> {
        let mut tx = self.store.read().await?;
        let periods = tx.list_periods().await?;
        Ok(periods.into_iter().find(|p| p.contains_date(date)))
    }

    /// Period by ID.
    pub async fn get_period(&self, id: PeriodId) -> Result<AccountingPeriod, LedgerError> {
        let mut tx = self.store.read().await?;
        tx.find_period(id)
            .await?
            .ok_or(LedgerError::PeriodNotFound(id))
    }

    /// All periods ordered by start date.
    pub async fn list_periods(&self) -> Result<Vec<AccountingPeriod>, LedgerError> {
        let mut tx = self.store.read().await?;
        tx.list_periods().await
    }

    /// Closes `[start, end]` to new postings without posting closing entries.
    ///
    /// The period is created if no period spans the range; Open periods
    /// overlapping it are absorbed.
    pub async fn close(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        actor: Actor,
    ) -> Result<PeriodCloseOutcome, LedgerError> {
        if !actor.role.can_close_periods() {
            return Err(LedgerError::PrivilegeRequired { role: actor.role });
        }
        if end < start {
            return Err(LedgerError::InvalidDateRange { start, end });
        }

        let mut tx = self.store.begin().await?;
        tx.lock_periods(LockMode::Exclusive).await?;

        let periods = tx.list_periods().await?;
        if let Some(closed) = periods
            .iter()
            .find(|p| p.overlaps(start, end) && !p.accepts_postings())
        {
            return Err(if closed.spans(start, end) {
                LedgerError::AlreadyClosed { start, end }
            } else {
                LedgerError::OverlappingPeriod {
                    start,
                    end,
                    existing_start: closed.start_date,
                    existing_end: closed.end_date,
                }
            });
        }

        let entries = tx.entries_between(start, end).await?;
        let unbalanced = entries
            .iter()
            .filter(|e| e.affects_balances() && e.total_debit != e.total_credit)
            .count();
        if unbalanced > 0 {
            return Err(LedgerError::UnbalancedEntriesInPeriod { count: unbalanced });
        }
        let pending = outbox::pending_in_range(&mut tx, start, end).await?;
        if pending > 0 {
            return Err(LedgerError::PendingDeferredPostings { count: pending });
        }

        let drafts = entries
            .iter()
            .filter(|e| e.status == EntryStatus::Draft)
            .count();
        let mut warnings = Vec::new();
        if drafts > 0 {
            warnings.push(format!(
                "{drafts} draft entries remain in the period and can no longer be posted"
            ));
        }

        let now = Utc::now();
        let mut period = match absorb_unlocked(&mut tx, &periods, start, end).await? {
            Some(existing) => existing,
            None => {
                let fresh = AccountingPeriod::open(start, end, format!("{start} to {end}"));
                if !tx.insert_period(&fresh).await? {
                    return Err(LedgerError::ConcurrentModification);
                }
                fresh
            }
        };
        period.close(actor.user_id, now)?;
        tx.update_period(&period).await?;
        tx.commit().await?;

        tracing::info!(
            period_id = %period.id,
            %start,
            %end,
            closed_by = %actor.user_id,
            drafts,
            "Accounting period closed"
        );

        Ok(PeriodCloseOutcome { period, warnings })
    }

    /// Closed → Locked.
    pub async fn lock(&self, id: PeriodId, actor: Actor) -> Result<AccountingPeriod, LedgerError> {
        if !actor.role.can_close_periods() {
            return Err(LedgerError::PrivilegeRequired { role: actor.role });
        }

        let mut tx = self.store.begin().await?;
        tx.lock_periods(LockMode::Exclusive).await?;
        let mut period = tx
            .find_period(id)
            .await?
            .ok_or(LedgerError::PeriodNotFound(id))?;
        period.lock(actor.user_id, Utc::now())?;
        tx.update_period(&period).await?;
        tx.commit().await?;

        tracing::info!(period_id = %id, locked_by = %actor.user_id, "Accounting period locked");
        Ok(period)
    }

    /// Closed or Locked → Open. Requires a privileged actor and a reason.
    pub async fn reopen(
        &self,
        id: PeriodId,
        reason: &str,
        actor: Actor,
    ) -> Result<AccountingPeriod, LedgerError> {
        if !actor.role.can_reopen_periods() {
            return Err(LedgerError::PrivilegeRequired { role: actor.role });
        }

        let mut tx = self.store.begin().await?;
        tx.lock_periods(LockMode::Exclusive).await?;
        let mut period = tx
            .find_period(id)
            .await?
            .ok_or(LedgerError::PeriodNotFound(id))?;
        let previous = period.status();
        period.reopen(reason, actor.user_id, Utc::now())?;
        tx.update_period(&period).await?;
        tx.commit().await?;

        tracing::warn!(
            period_id = %id,
            from = %previous,
            reopened_by = %actor.user_id,
            reason = %reason.trim(),
            "Accounting period reopened"
        );
        Ok(period)
    }
}
