//! Deferred postings and balance correction audit.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(LEDGER_OUTBOX_SQL).await?;
        db.execute_unprepared(BALANCE_CORRECTIONS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const LEDGER_OUTBOX_SQL: &str = r"
CREATE TYPE outbox_status AS ENUM ('pending', 'processed', 'failed');

CREATE TABLE ledger_outbox (
    id UUID PRIMARY KEY,
    entry_id UUID NOT NULL,
    entry_date DATE NOT NULL,
    source_type source_type NOT NULL,
    source_id UUID,
    payload JSONB NOT NULL,
    balance_deltas JSONB NOT NULL,
    status outbox_status NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    processed_at TIMESTAMPTZ,
    CONSTRAINT uq_outbox_entry UNIQUE (entry_id),
    CONSTRAINT chk_outbox_attempts CHECK (attempts >= 0)
);

CREATE INDEX idx_outbox_pending ON ledger_outbox(created_at) WHERE status = 'pending';
CREATE INDEX idx_outbox_pending_date ON ledger_outbox(entry_date) WHERE status = 'pending';
CREATE UNIQUE INDEX uq_outbox_pending_source ON ledger_outbox(source_type, source_id)
    WHERE source_id IS NOT NULL AND status = 'pending';
";

const BALANCE_CORRECTIONS_SQL: &str = r"
CREATE TABLE balance_corrections (
    id UUID PRIMARY KEY,
    account_id UUID NOT NULL REFERENCES accounts(id),
    previous_balance NUMERIC(20, 2) NOT NULL,
    corrected_balance NUMERIC(20, 2) NOT NULL,
    difference NUMERIC(20, 2) NOT NULL,
    reason TEXT NOT NULL,
    corrected_by UUID NOT NULL,
    corrected_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_corrections_reason CHECK (length(trim(reason)) > 0)
);

CREATE INDEX idx_corrections_account ON balance_corrections(account_id, corrected_at);
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS balance_corrections CASCADE;
DROP TABLE IF EXISTS ledger_outbox CASCADE;
DROP TYPE IF EXISTS outbox_status CASCADE;
";
