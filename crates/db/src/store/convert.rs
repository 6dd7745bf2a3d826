//! Conversions between `SeaORM` models and ledger domain types.

use chrono::{DateTime, Utc};
use ledgerline_core::ledger::{self, Account, JournalEntry, JournalLine, LedgerError};
use ledgerline_core::outbox::{self, OutboxMessage};
use ledgerline_core::period::AccountingPeriod;
use ledgerline_core::reconciliation::BalanceCorrection;
use ledgerline_shared::types::{
    AccountId, BalanceCorrectionId, JournalEntryId, JournalLineId, OutboxMessageId, PeriodId,
    UserId,
};
use sea_orm::ActiveValue::Set;
use sea_orm::prelude::DateTimeWithTimeZone;

use crate::entities::sea_orm_active_enums::{AccountType, EntryStatus, OutboxStatus, SourceType};
use crate::entities::{
    accounting_periods, accounts, balance_corrections, journal_entries, journal_lines,
    ledger_outbox,
};

fn to_db_time(at: DateTime<Utc>) -> DateTimeWithTimeZone {
    at.fixed_offset()
}

fn from_db_time(at: DateTimeWithTimeZone) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

fn malformed(what: &str, detail: impl std::fmt::Display) -> LedgerError {
    LedgerError::Storage(format!("malformed {what}: {detail}"))
}

impl From<ledger::AccountType> for AccountType {
    fn from(value: ledger::AccountType) -> Self {
        match value {
            ledger::AccountType::Asset => Self::Asset,
            ledger::AccountType::Liability => Self::Liability,
            ledger::AccountType::Equity => Self::Equity,
            ledger::AccountType::Revenue => Self::Revenue,
            ledger::AccountType::Expense => Self::Expense,
        }
    }
}

impl From<AccountType> for ledger::AccountType {
    fn from(value: AccountType) -> Self {
        match value {
            AccountType::Asset => Self::Asset,
            AccountType::Liability => Self::Liability,
            AccountType::Equity => Self::Equity,
            AccountType::Revenue => Self::Revenue,
            AccountType::Expense => Self::Expense,
        }
    }
}

impl From<ledger::EntryStatus> for EntryStatus {
    fn from(value: ledger::EntryStatus) -> Self {
        match value {
            ledger::EntryStatus::Draft => Self::Draft,
            ledger::EntryStatus::Posted => Self::Posted,
            ledger::EntryStatus::Reversed => Self::Reversed,
        }
    }
}

impl From<EntryStatus> for ledger::EntryStatus {
    fn from(value: EntryStatus) -> Self {
        match value {
            EntryStatus::Draft => Self::Draft,
            EntryStatus::Posted => Self::Posted,
            EntryStatus::Reversed => Self::Reversed,
        }
    }
}

impl From<ledger::SourceType> for SourceType {
    fn from(value: ledger::SourceType) -> Self {
        match value {
            ledger::SourceType::Manual => Self::Manual,
            ledger::SourceType::Sale => Self::Sale,
            ledger::SourceType::Purchase => Self::Purchase,
            ledger::SourceType::CashBank => Self::CashBank,
            ledger::SourceType::Payment => Self::Payment,
            ledger::SourceType::Adjustment => Self::Adjustment,
            ledger::SourceType::Opening => Self::Opening,
            ledger::SourceType::Reversal => Self::Reversal,
            ledger::SourceType::Closing => Self::Closing,
        }
    }
}

impl From<SourceType> for ledger::SourceType {
    fn from(value: SourceType) -> Self {
        match value {
            SourceType::Manual => Self::Manual,
            SourceType::Sale => Self::Sale,
            SourceType::Purchase => Self::Purchase,
            SourceType::CashBank => Self::CashBank,
            SourceType::Payment => Self::Payment,
            SourceType::Adjustment => Self::Adjustment,
            SourceType::Opening => Self::Opening,
            SourceType::Reversal => Self::Reversal,
            SourceType::Closing => Self::Closing,
        }
    }
}

impl From<outbox::OutboxStatus> for OutboxStatus {
    fn from(value: outbox::OutboxStatus) -> Self {
        match value {
            outbox::OutboxStatus::Pending => Self::Pending,
            outbox::OutboxStatus::Processed => Self::Processed,
            outbox::OutboxStatus::Failed => Self::Failed,
        }
    }
}

impl From<OutboxStatus> for outbox::OutboxStatus {
    fn from(value: OutboxStatus) -> Self {
        match value {
            OutboxStatus::Pending => Self::Pending,
            OutboxStatus::Processed => Self::Processed,
            OutboxStatus::Failed => Self::Failed,
        }
    }
}

pub fn account_from_model(model: accounts::Model) -> Account {
    Account {
        id: AccountId::from_uuid(model.id),
        code: model.code,
        name: model.name,
        account_type: model.account_type.into(),
        parent_id: model.parent_id.map(AccountId::from_uuid),
        is_header: model.is_header,
        is_active: model.is_active,
        cached_balance: model.cached_balance,
        created_at: from_db_time(model.created_at),
        updated_at: from_db_time(model.updated_at),
    }
}

pub fn account_to_active(account: &Account) -> accounts::ActiveModel {
    accounts::ActiveModel {
        id: Set(account.id.into_inner()),
        code: Set(account.code.clone()),
        name: Set(account.name.clone()),
        account_type: Set(account.account_type.into()),
        parent_id: Set(account.parent_id.map(AccountId::into_inner)),
        is_header: Set(account.is_header),
        is_active: Set(account.is_active),
        cached_balance: Set(account.cached_balance),
        created_at: Set(to_db_time(account.created_at)),
        updated_at: Set(to_db_time(account.updated_at)),
    }
}

pub fn entry_from_models(
    model: journal_entries::Model,
    lines: Vec<journal_lines::Model>,
) -> Result<JournalEntry, LedgerError> {
    let lines = lines
        .into_iter()
        .map(line_from_model)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(JournalEntry {
        id: JournalEntryId::from_uuid(model.id),
        source_type: model.source_type.into(),
        source_id: model.source_id,
        reference: model.reference,
        entry_date: model.entry_date,
        description: model.description,
        status: model.status.into(),
        total_debit: model.total_debit,
        total_credit: model.total_credit,
        is_balanced: model.is_balanced,
        created_by: UserId::from_uuid(model.created_by),
        created_at: from_db_time(model.created_at),
        posted_by: model.posted_by.map(UserId::from_uuid),
        posted_at: model.posted_at.map(from_db_time),
        reversed_by_entry_id: model.reversed_by_entry_id.map(JournalEntryId::from_uuid),
        reverses_entry_id: model.reverses_entry_id.map(JournalEntryId::from_uuid),
        lines,
    })
}

fn line_from_model(model: journal_lines::Model) -> Result<JournalLine, LedgerError> {
    Ok(JournalLine {
        id: JournalLineId::from_uuid(model.id),
        entry_id: JournalEntryId::from_uuid(model.entry_id),
        account_id: AccountId::from_uuid(model.account_id),
        line_number: u32::try_from(model.line_number)
            .map_err(|e| malformed("line number", e))?,
        description: model.description,
        debit: model.debit,
        credit: model.credit,
    })
}

pub fn entry_to_active(entry: &JournalEntry) -> journal_entries::ActiveModel {
    journal_entries::ActiveModel {
        id: Set(entry.id.into_inner()),
        source_type: Set(entry.source_type.into()),
        source_id: Set(entry.source_id),
        reference: Set(entry.reference.clone()),
        entry_date: Set(entry.entry_date),
        description: Set(entry.description.clone()),
        status: Set(entry.status.into()),
        total_debit: Set(entry.total_debit),
        total_credit: Set(entry.total_credit),
        is_balanced: Set(entry.is_balanced),
        created_by: Set(entry.created_by.into_inner()),
        created_at: Set(to_db_time(entry.created_at)),
        posted_by: Set(entry.posted_by.map(UserId::into_inner)),
        posted_at: Set(entry.posted_at.map(to_db_time)),
        reversed_by_entry_id: Set(entry.reversed_by_entry_id.map(JournalEntryId::into_inner)),
        reverses_entry_id: Set(entry.reverses_entry_id.map(JournalEntryId::into_inner)),
    }
}

pub fn line_to_active(line: &JournalLine) -> Result<journal_lines::ActiveModel, LedgerError> {
    Ok(journal_lines::ActiveModel {
        id: Set(line.id.into_inner()),
        entry_id: Set(line.entry_id.into_inner()),
        account_id: Set(line.account_id.into_inner()),
        line_number: Set(
            i32::try_from(line.line_number).map_err(|e| malformed("line number", e))?
        ),
        description: Set(line.description.clone()),
        debit: Set(line.debit),
        credit: Set(line.credit),
    })
}

pub fn period_from_model(model: accounting_periods::Model) -> AccountingPeriod {
    AccountingPeriod {
        id: PeriodId::from_uuid(model.id),
        start_date: model.start_date,
        end_date: model.end_date,
        description: model.description,
        is_closed: model.is_closed,
        is_locked: model.is_locked,
        closed_by: model.closed_by.map(UserId::from_uuid),
        closed_at: model.closed_at.map(from_db_time),
        locked_by: model.locked_by.map(UserId::from_uuid),
        locked_at: model.locked_at.map(from_db_time),
        total_revenue: model.total_revenue,
        total_expense: model.total_expense,
        net_income: model.net_income,
        closing_entry_id: model.closing_entry_id.map(JournalEntryId::from_uuid),
        reopened_by: model.reopened_by.map(UserId::from_uuid),
        reopened_at: model.reopened_at.map(from_db_time),
        reopen_reason: model.reopen_reason,
        created_at: from_db_time(model.created_at),
        updated_at: from_db_time(model.updated_at),
    }
}

pub fn period_to_active(period: &AccountingPeriod) -> accounting_periods::ActiveModel {
    accounting_periods::ActiveModel {
        id: Set(period.id.into_inner()),
        start_date: Set(period.start_date),
        end_date: Set(period.end_date),
        description: Set(period.description.clone()),
        is_closed: Set(period.is_closed),
        is_locked: Set(period.is_locked),
        closed_by: Set(period.closed_by.map(UserId::into_inner)),
        closed_at: Set(period.closed_at.map(to_db_time)),
        locked_by: Set(period.locked_by.map(UserId::into_inner)),
        locked_at: Set(period.locked_at.map(to_db_time)),
        total_revenue: Set(period.total_revenue),
        total_expense: Set(period.total_expense),
        net_income: Set(period.net_income),
        closing_entry_id: Set(period.closing_entry_id.map(JournalEntryId::into_inner)),
        reopened_by: Set(period.reopened_by.map(UserId::into_inner)),
        reopened_at: Set(period.reopened_at.map(to_db_time)),
        reopen_reason: Set(period.reopen_reason.clone()),
        created_at: Set(to_db_time(period.created_at)),
        updated_at: Set(to_db_time(period.updated_at)),
    }
}

pub fn outbox_from_model(model: ledger_outbox::Model) -> Result<OutboxMessage, LedgerError> {
    Ok(OutboxMessage {
        id: OutboxMessageId::from_uuid(model.id),
        entry_id: JournalEntryId::from_uuid(model.entry_id),
        entry_date: model.entry_date,
        request: serde_json::from_value(model.payload)
            .map_err(|e| malformed("outbox payload", e))?,
        balance_deltas: serde_json::from_value(model.balance_deltas)
            .map_err(|e| malformed("outbox balance deltas", e))?,
        status: model.status.into(),
        attempts: u32::try_from(model.attempts).map_err(|e| malformed("outbox attempts", e))?,
        last_error: model.last_error,
        created_at: from_db_time(model.created_at),
        processed_at: model.processed_at.map(from_db_time),
    })
}

pub fn outbox_to_active(message: &OutboxMessage) -> Result<ledger_outbox::ActiveModel, LedgerError> {
    Ok(ledger_outbox::ActiveModel {
        id: Set(message.id.into_inner()),
        entry_id: Set(message.entry_id.into_inner()),
        entry_date: Set(message.entry_date),
        source_type: Set(message.request.source_type.into()),
        source_id: Set(message.request.source_id),
        payload: Set(
            serde_json::to_value(&message.request).map_err(|e| malformed("outbox payload", e))?
        ),
        balance_deltas: Set(serde_json::to_value(&message.balance_deltas)
            .map_err(|e| malformed("outbox balance deltas", e))?),
        status: Set(message.status.into()),
        attempts: Set(i32::try_from(message.attempts).map_err(|e| malformed("outbox attempts", e))?),
        last_error: Set(message.last_error.clone()),
        created_at: Set(to_db_time(message.created_at)),
        processed_at: Set(message.processed_at.map(to_db_time)),
    })
}

pub fn correction_from_model(model: balance_corrections::Model) -> BalanceCorrection {
    BalanceCorrection {
        id: BalanceCorrectionId::from_uuid(model.id),
        account_id: AccountId::from_uuid(model.account_id),
        previous_balance: model.previous_balance,
        corrected_balance: model.corrected_balance,
        difference: model.difference,
        reason: model.reason,
        corrected_by: UserId::from_uuid(model.corrected_by),
        corrected_at: from_db_time(model.corrected_at),
    }
}

pub fn correction_to_active(correction: &BalanceCorrection) -> balance_corrections::ActiveModel {
    balance_corrections::ActiveModel {
        id: Set(correction.id.into_inner()),
        account_id: Set(correction.account_id.into_inner()),
        previous_balance: Set(correction.previous_balance),
        corrected_balance: Set(correction.corrected_balance),
        difference: Set(correction.difference),
        reason: Set(correction.reason.clone()),
        corrected_by: Set(correction.corrected_by.into_inner()),
        corrected_at: Set(to_db_time(correction.corrected_at)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ledgerline_core::ledger::{LineInput, PostJournalEntryRequest};
    use ledgerline_core::outbox::BalanceDelta;
    use rust_decimal_macros::dec;
    use sea_orm::ActiveValue;

    fn unwrap_set<T: Into<sea_orm::Value>>(value: ActiveValue<T>) -> T {
        match value {
            ActiveValue::Set(v) | ActiveValue::Unchanged(v) => v,
            ActiveValue::NotSet => panic!("value not set"),
        }
    }

    #[test]
    fn test_enum_mapping_is_symmetric() {
        for kind in [
            ledger::AccountType::Asset,
            ledger::AccountType::Liability,
            ledger::AccountType::Equity,
            ledger::AccountType::Revenue,
            ledger::AccountType::Expense,
        ] {
            assert_eq!(ledger::AccountType::from(AccountType::from(kind)), kind);
        }
        for source in [
            ledger::SourceType::Manual,
            ledger::SourceType::CashBank,
            ledger::SourceType::Reversal,
            ledger::SourceType::Closing,
        ] {
            assert_eq!(ledger::SourceType::from(SourceType::from(source)), source);
        }
    }

    #[test]
    fn test_outbox_payload_survives_storage() {
        let cash = AccountId::new();
        let sales = AccountId::new();
        let message = OutboxMessage {
            id: OutboxMessageId::new(),
            entry_id: JournalEntryId::new(),
            entry_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
            request: PostJournalEntryRequest {
                source_type: ledger::SourceType::Sale,
                source_id: Some(uuid::Uuid::now_v7()),
                reference: "INV-0042".into(),
                entry_date: NaiveDate::from_ymd_opt(2026, 3, 14).unwrap(),
                description: "Sale".into(),
                lines: vec![
                    LineInput::debit(cash, dec!(120.50), ""),
                    LineInput::credit(sales, dec!(120.50), ""),
                ],
                auto_post: true,
                created_by: UserId::new(),
            },
            balance_deltas: vec![
                BalanceDelta { account_id: cash, amount: dec!(120.50) },
                BalanceDelta { account_id: sales, amount: dec!(120.50) },
            ],
            status: outbox::OutboxStatus::Pending,
            attempts: 2,
            last_error: Some("timeout".into()),
            created_at: Utc::now(),
            processed_at: None,
        };

        let active = outbox_to_active(&message).unwrap();
        let model = ledger_outbox::Model {
            id: unwrap_set(active.id),
            entry_id: unwrap_set(active.entry_id),
            entry_date: unwrap_set(active.entry_date),
            source_type: unwrap_set(active.source_type),
            source_id: unwrap_set(active.source_id),
            payload: unwrap_set(active.payload),
            balance_deltas: unwrap_set(active.balance_deltas),
            status: unwrap_set(active.status),
            attempts: unwrap_set(active.attempts),
            last_error: unwrap_set(active.last_error),
            created_at: unwrap_set(active.created_at),
            processed_at: unwrap_set(active.processed_at),
        };
        assert_eq!(outbox_from_model(model).unwrap(), message);
    }

    #[test]
    fn test_negative_line_number_is_malformed() {
        let model = journal_lines::Model {
            id: uuid::Uuid::now_v7(),
            entry_id: uuid::Uuid::now_v7(),
            account_id: uuid::Uuid::now_v7(),
            line_number: -1,
            description: String::new(),
            debit: dec!(1),
            credit: dec!(0),
        };
        assert!(matches!(line_from_model(model), Err(LedgerError::Storage(_))));
    }
}
