//! PostgreSQL implementation of the ledger storage port.
//!
//! Each [`PgLedgerTx`] wraps one database transaction. The period registry
//! lock is a transaction-scoped advisory lock: postings take it shared,
//! closings and period transitions take it exclusive. Readers run in a
//! read-only `REPEATABLE READ` transaction and never take it.

mod convert;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ledgerline_core::ledger::{Account, BalanceTotals, JournalEntry, LedgerError, SourceType};
use ledgerline_core::outbox::OutboxMessage;
use ledgerline_core::period::AccountingPeriod;
use ledgerline_core::reconciliation::BalanceCorrection;
use ledgerline_core::store::{LedgerStore, LedgerTx, LockMode};
use ledgerline_shared::types::{AccountId, JournalEntryId, PeriodId, UserId};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    AccessMode, ActiveModelTrait, ActiveValue::Set, ActiveValue::Unchanged, ColumnTrait,
    ConnectionTrait, DatabaseConnection, DatabaseTransaction, DbBackend, DbErr, EntityTrait,
    FromQueryResult, IsolationLevel, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, SqlErr,
    Statement, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::sea_orm_active_enums::{OutboxStatus, SourceType as DbSourceType};
use crate::entities::{
    accounting_periods, accounts, balance_corrections, journal_entries, journal_lines,
    ledger_outbox,
};
use convert::{
    account_from_model, account_to_active, correction_from_model, correction_to_active,
    entry_from_models, entry_to_active, line_to_active, outbox_from_model, outbox_to_active,
    period_from_model, period_to_active,
};

/// Advisory lock key guarding the accounting period registry.
const PERIOD_LOCK_KEY: i64 = 0x4c45_4447_4552;

const POSTED_TOTALS_SQL: &str = r"
SELECT l.account_id,
       COALESCE(SUM(l.debit), 0) AS debit,
       COALESCE(SUM(l.credit), 0) AS credit
FROM journal_lines l
JOIN journal_entries e ON e.id = l.entry_id
WHERE e.status IN ('posted', 'reversed')
  AND ($1::uuid IS NULL OR l.account_id = $1)
  AND ($2::date IS NULL OR e.entry_date >= $2)
  AND ($3::date IS NULL OR e.entry_date <= $3)
GROUP BY l.account_id
";

#[derive(Debug, FromQueryResult)]
struct TotalsRow {
    account_id: Uuid,
    debit: Decimal,
    credit: Decimal,
}

/// Maps a database error to the ledger's storage errors.
fn storage(err: DbErr) -> LedgerError {
    let message = err.to_string();
    if message.contains("could not serialize") || message.contains("deadlock detected") {
        tracing::debug!(error = %message, "Transaction conflict, reporting a retryable error");
        return LedgerError::ConcurrentModification;
    }
    tracing::error!(error = %message, "Database error");
    LedgerError::Storage(message)
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Ledger store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    db: DatabaseConnection,
}

impl PgLedgerStore {
    /// Creates a store over an open connection pool.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// The underlying connection pool.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    type Tx = PgLedgerTx;

    async fn begin(&self) -> Result<PgLedgerTx, LedgerError> {
        let txn = self
            .db
            .begin_with_config(Some(IsolationLevel::ReadCommitted), None)
            .await
            .map_err(storage)?;
        Ok(PgLedgerTx { txn })
    }

    async fn read(&self) -> Result<PgLedgerTx, LedgerError> {
        let txn = self
            .db
            .begin_with_config(
                Some(IsolationLevel::RepeatableRead),
                Some(AccessMode::ReadOnly),
            )
            .await
            .map_err(storage)?;
        Ok(PgLedgerTx { txn })
    }
}

/// Transaction over a [`PgLedgerStore`].
pub struct PgLedgerTx {
    txn: DatabaseTransaction,
}

impl PgLedgerTx {
    async fn lines_for(
        &self,
        entry_ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, Vec<journal_lines::Model>>, LedgerError> {
        let mut grouped: HashMap<Uuid, Vec<journal_lines::Model>> = HashMap::new();
        if entry_ids.is_empty() {
            return Ok(grouped);
        }
        let lines = journal_lines::Entity::find()
            .filter(journal_lines::Column::EntryId.is_in(entry_ids))
            .order_by_asc(journal_lines::Column::EntryId)
            .order_by_asc(journal_lines::Column::LineNumber)
            .all(&self.txn)
            .await
            .map_err(storage)?;
        for line in lines {
            grouped.entry(line.entry_id).or_default().push(line);
        }
        Ok(grouped)
    }

    async fn with_lines(
        &self,
        models: Vec<journal_entries::Model>,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        let mut lines = self.lines_for(models.iter().map(|m| m.id).collect()).await?;
        models
            .into_iter()
            .map(|model| {
                let entry_lines = lines.remove(&model.id).unwrap_or_default();
                entry_from_models(model, entry_lines)
            })
            .collect()
    }

    async fn totals(
        &self,
        account: Option<AccountId>,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<HashMap<AccountId, BalanceTotals>, LedgerError> {
        let statement = Statement::from_sql_and_values(
            DbBackend::Postgres,
            POSTED_TOTALS_SQL,
            [
                account.map(AccountId::into_inner).into(),
                from.into(),
                to.into(),
            ],
        );
        let rows = TotalsRow::find_by_statement(statement)
            .all(&self.txn)
            .await
            .map_err(storage)?;
        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    AccountId::from_uuid(row.account_id),
                    BalanceTotals {
                        debit: row.debit,
                        credit: row.credit,
                    },
                )
            })
            .collect())
    }
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_periods(&mut self, mode: LockMode) -> Result<(), LedgerError> {
        let sql = match mode {
            LockMode::Shared => "SELECT pg_advisory_xact_lock_shared($1)",
            LockMode::Exclusive => "SELECT pg_advisory_xact_lock($1)",
        };
        self.txn
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                [PERIOD_LOCK_KEY.into()],
            ))
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn insert_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        account_to_active(account)
            .insert(&self.txn)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    LedgerError::DuplicateAccountCode(account.code.clone())
                } else {
                    storage(err)
                }
            })?;
        Ok(())
    }

    async fn update_account(&mut self, account: &Account) -> Result<(), LedgerError> {
        let active = accounts::ActiveModel {
            id: Unchanged(account.id.into_inner()),
            name: Set(account.name.clone()),
            parent_id: Set(account.parent_id.map(AccountId::into_inner)),
            is_header: Set(account.is_header),
            is_active: Set(account.is_active),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        active.update(&self.txn).await.map_err(|err| match err {
            DbErr::RecordNotUpdated => LedgerError::AccountNotFound(account.id),
            other => storage(other),
        })?;
        Ok(())
    }

    async fn find_account(&mut self, id: AccountId) -> Result<Option<Account>, LedgerError> {
        Ok(accounts::Entity::find_by_id(id.into_inner())
            .one(&self.txn)
            .await
            .map_err(storage)?
            .map(account_from_model))
    }

    async fn find_account_by_code(&mut self, code: &str) -> Result<Option<Account>, LedgerError> {
        Ok(accounts::Entity::find()
            .filter(accounts::Column::Code.eq(code))
            .one(&self.txn)
            .await
            .map_err(storage)?
            .map(account_from_model))
    }

    async fn list_accounts(&mut self) -> Result<Vec<Account>, LedgerError> {
        Ok(accounts::Entity::find()
            .order_by_asc(accounts::Column::Code)
            .all(&self.txn)
            .await
            .map_err(storage)?
            .into_iter()
            .map(account_from_model)
            .collect())
    }

    async fn account_has_lines(&mut self, id: AccountId) -> Result<bool, LedgerError> {
        let count = journal_lines::Entity::find()
            .filter(journal_lines::Column::AccountId.eq(id.into_inner()))
            .count(&self.txn)
            .await
            .map_err(storage)?;
        Ok(count > 0)
    }

    async fn add_to_cached_balance(
        &mut self,
        id: AccountId,
        delta: Decimal,
    ) -> Result<(), LedgerError> {
        let result = accounts::Entity::update_many()
            .col_expr(
                accounts::Column::CachedBalance,
                Expr::col(accounts::Column::CachedBalance).add(delta),
            )
            .col_expr(accounts::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(accounts::Column::Id.eq(id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(storage)?;
        if result.rows_affected == 0 {
            return Err(LedgerError::AccountNotFound(id));
        }
        Ok(())
    }

    async fn set_cached_balance(
        &mut self,
        id: AccountId,
        value: Decimal,
    ) -> Result<(), LedgerError> {
        let result = accounts::Entity::update_many()
            .col_expr(accounts::Column::CachedBalance, Expr::value(value))
            .col_expr(accounts::Column::UpdatedAt, Expr::value(Utc::now().fixed_offset()))
            .filter(accounts::Column::Id.eq(id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(storage)?;
        if result.rows_affected == 0 {
            return Err(LedgerError::AccountNotFound(id));
        }
        Ok(())
    }

    async fn insert_entry(&mut self, entry: &JournalEntry) -> Result<(), LedgerError> {
        entry_to_active(entry)
            .insert(&self.txn)
            .await
            .map_err(|err| match entry.source_id {
                Some(source_id) if is_unique_violation(&err) => LedgerError::DuplicateReference {
                    source_type: entry.source_type,
                    source_id,
                },
                _ => storage(err),
            })?;

        let lines = entry
            .lines
            .iter()
            .map(line_to_active)
            .collect::<Result<Vec<_>, _>>()?;
        if !lines.is_empty() {
            journal_lines::Entity::insert_many(lines)
                .exec_without_returning(&self.txn)
                .await
                .map_err(storage)?;
        }
        Ok(())
    }

    async fn update_entry_header(&mut self, entry: &JournalEntry) -> Result<(), LedgerError> {
        let active = journal_entries::ActiveModel {
            id: Unchanged(entry.id.into_inner()),
            status: Set(entry.status.into()),
            description: Set(entry.description.clone()),
            posted_by: Set(entry.posted_by.map(UserId::into_inner)),
            posted_at: Set(entry.posted_at.as_ref().map(DateTime::fixed_offset)),
            reversed_by_entry_id: Set(entry.reversed_by_entry_id.map(JournalEntryId::into_inner)),
            reverses_entry_id: Set(entry.reverses_entry_id.map(JournalEntryId::into_inner)),
            ..Default::default()
        };
        active.update(&self.txn).await.map_err(|err| match err {
            DbErr::RecordNotUpdated => LedgerError::EntryNotFound(entry.id),
            other => storage(other),
        })?;
        Ok(())
    }

    async fn find_entry(
        &mut self,
        id: JournalEntryId,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        let Some(model) = journal_entries::Entity::find_by_id(id.into_inner())
            .one(&self.txn)
            .await
            .map_err(storage)?
        else {
            return Ok(None);
        };
        Ok(self.with_lines(vec![model]).await?.pop())
    }

    async fn find_entry_by_source(
        &mut self,
        source_type: SourceType,
        source_id: Uuid,
    ) -> Result<Option<JournalEntry>, LedgerError> {
        let Some(model) = journal_entries::Entity::find()
            .filter(journal_entries::Column::SourceType.eq(DbSourceType::from(source_type)))
            .filter(journal_entries::Column::SourceId.eq(source_id))
            .one(&self.txn)
            .await
            .map_err(storage)?
        else {
            return Ok(None);
        };
        Ok(self.with_lines(vec![model]).await?.pop())
    }

    async fn entries_between(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<JournalEntry>, LedgerError> {
        let models = journal_entries::Entity::find()
            .filter(journal_entries::Column::EntryDate.gte(start))
            .filter(journal_entries::Column::EntryDate.lte(end))
            .order_by_asc(journal_entries::Column::EntryDate)
            .order_by_asc(journal_entries::Column::CreatedAt)
            .all(&self.txn)
            .await
            .map_err(storage)?;
        self.with_lines(models).await
    }

    async fn posted_totals(
        &mut self,
        account: AccountId,
        from: Option<NaiveDate>,
        to: NaiveDate,
    ) -> Result<BalanceTotals, LedgerError> {
        Ok(self
            .totals(Some(account), from, Some(to))
            .await?
            .remove(&account)
            .unwrap_or_default())
    }

    async fn posted_totals_by_account(
        &mut self,
        to: Option<NaiveDate>,
    ) -> Result<HashMap<AccountId, BalanceTotals>, LedgerError> {
        self.totals(None, None, to).await
    }

    async fn list_periods(&mut self) -> Result<Vec<AccountingPeriod>, LedgerError> {
        Ok(accounting_periods::Entity::find()
            .order_by_asc(accounting_periods::Column::StartDate)
            .all(&self.txn)
            .await
            .map_err(storage)?
            .into_iter()
            .map(period_from_model)
            .collect())
    }

    async fn find_period(&mut self, id: PeriodId) -> Result<Option<AccountingPeriod>, LedgerError> {
        Ok(accounting_periods::Entity::find_by_id(id.into_inner())
            .one(&self.txn)
            .await
            .map_err(storage)?
            .map(period_from_model))
    }

    async fn insert_period(&mut self, period: &AccountingPeriod) -> Result<bool, LedgerError> {
        // The exclusion constraint turns an overlapping insert into a no-op.
        let inserted = accounting_periods::Entity::insert(period_to_active(period))
            .on_conflict(OnConflict::new().do_nothing().to_owned())
            .exec_without_returning(&self.txn)
            .await
            .map_err(storage)?;
        Ok(inserted > 0)
    }

    async fn update_period(&mut self, period: &AccountingPeriod) -> Result<(), LedgerError> {
        let mut active = period_to_active(period);
        active.id = Unchanged(period.id.into_inner());
        active.updated_at = Set(Utc::now().fixed_offset());
        active.update(&self.txn).await.map_err(|err| match err {
            DbErr::RecordNotUpdated => LedgerError::PeriodNotFound(period.id),
            other => storage(other),
        })?;
        Ok(())
    }

    async fn delete_period(&mut self, id: PeriodId) -> Result<(), LedgerError> {
        accounting_periods::Entity::delete_by_id(id.into_inner())
            .exec(&self.txn)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn enqueue_outbox(&mut self, message: &OutboxMessage) -> Result<(), LedgerError> {
        let request = &message.request;
        outbox_to_active(message)?
            .insert(&self.txn)
            .await
            .map_err(|err| match request.source_id {
                Some(source_id) if is_unique_violation(&err) => LedgerError::DuplicateReference {
                    source_type: request.source_type,
                    source_id,
                },
                _ => storage(err),
            })?;
        Ok(())
    }

    async fn find_pending_outbox_by_source(
        &mut self,
        source_type: SourceType,
        source_id: Uuid,
    ) -> Result<Option<OutboxMessage>, LedgerError> {
        ledger_outbox::Entity::find()
            .filter(ledger_outbox::Column::Status.eq(OutboxStatus::Pending))
            .filter(ledger_outbox::Column::SourceType.eq(DbSourceType::from(source_type)))
            .filter(ledger_outbox::Column::SourceId.eq(source_id))
            .one(&self.txn)
            .await
            .map_err(storage)?
            .map(outbox_from_model)
            .transpose()
    }

    async fn pending_outbox(
        &mut self,
        limit: Option<u64>,
    ) -> Result<Vec<OutboxMessage>, LedgerError> {
        let mut query = ledger_outbox::Entity::find()
            .filter(ledger_outbox::Column::Status.eq(OutboxStatus::Pending))
            .order_by_asc(ledger_outbox::Column::CreatedAt);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        query
            .all(&self.txn)
            .await
            .map_err(storage)?
            .into_iter()
            .map(outbox_from_model)
            .collect()
    }

    async fn count_pending_outbox(
        &mut self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<u64, LedgerError> {
        ledger_outbox::Entity::find()
            .filter(ledger_outbox::Column::Status.eq(OutboxStatus::Pending))
            .filter(ledger_outbox::Column::EntryDate.gte(start))
            .filter(ledger_outbox::Column::EntryDate.lte(end))
            .count(&self.txn)
            .await
            .map_err(storage)
    }

    async fn update_outbox(&mut self, message: &OutboxMessage) -> Result<(), LedgerError> {
        let mut active = outbox_to_active(message)?;
        active.id = Unchanged(message.id.into_inner());
        active.update(&self.txn).await.map_err(|err| match err {
            DbErr::RecordNotUpdated => {
                LedgerError::Storage(format!("outbox message {} not found", message.id))
            }
            other => storage(other),
        })?;
        Ok(())
    }

    async fn insert_balance_correction(
        &mut self,
        correction: &BalanceCorrection,
    ) -> Result<(), LedgerError> {
        correction_to_active(correction)
            .insert(&self.txn)
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn list_balance_corrections(&mut self) -> Result<Vec<BalanceCorrection>, LedgerError> {
        Ok(balance_corrections::Entity::find()
            .order_by_asc(balance_corrections::Column::CorrectedAt)
            .all(&self.txn)
            .await
            .map_err(storage)?
            .into_iter()
            .map(correction_from_model)
            .collect())
    }

    async fn commit(self) -> Result<(), LedgerError> {
        self.txn.commit().await.map_err(storage)
    }
}
