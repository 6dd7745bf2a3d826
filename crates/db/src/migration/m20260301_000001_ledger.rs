//! Ledger schema.
//!
//! Creates the chart of accounts, the journal, and the accounting period
//! registry, with the constraints that back the ledger invariants at the
//! storage layer.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(ENUMS_SQL).await?;
        db.execute_unprepared(ACCOUNTS_SQL).await?;
        db.execute_unprepared(JOURNAL_ENTRIES_SQL).await?;
        db.execute_unprepared(JOURNAL_LINES_SQL).await?;
        db.execute_unprepared(ACCOUNTING_PERIODS_SQL).await?;
        db.execute_unprepared(TRIGGERS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

const ENUMS_SQL: &str = r"
CREATE TYPE account_type AS ENUM ('asset', 'liability', 'equity', 'revenue', 'expense');
CREATE TYPE entry_status AS ENUM ('draft', 'posted', 'reversed');
CREATE TYPE source_type AS ENUM (
    'manual', 'sale', 'purchase', 'cash_bank', 'payment',
    'adjustment', 'opening', 'reversal', 'closing'
);
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY,
    code VARCHAR(32) NOT NULL,
    name VARCHAR(255) NOT NULL,
    account_type account_type NOT NULL,
    parent_id UUID REFERENCES accounts(id),
    is_header BOOLEAN NOT NULL DEFAULT false,
    is_active BOOLEAN NOT NULL DEFAULT true,
    cached_balance NUMERIC(20, 2) NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_accounts_code UNIQUE (code),
    CONSTRAINT chk_accounts_code_digits CHECK (code ~ '^[0-9]+(-[0-9]+)*$')
);

CREATE INDEX idx_accounts_parent ON accounts(parent_id);
CREATE INDEX idx_accounts_type ON accounts(account_type);
";

const JOURNAL_ENTRIES_SQL: &str = r"
CREATE TABLE journal_entries (
    id UUID PRIMARY KEY,
    source_type source_type NOT NULL,
    source_id UUID,
    reference VARCHAR(255) NOT NULL DEFAULT '',
    entry_date DATE NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    status entry_status NOT NULL,
    total_debit NUMERIC(20, 2) NOT NULL,
    total_credit NUMERIC(20, 2) NOT NULL,
    is_balanced BOOLEAN NOT NULL,
    created_by UUID NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    posted_by UUID,
    posted_at TIMESTAMPTZ,
    reversed_by_entry_id UUID REFERENCES journal_entries(id),
    reverses_entry_id UUID REFERENCES journal_entries(id),
    CONSTRAINT chk_entries_totals_non_negative CHECK (total_debit >= 0 AND total_credit >= 0),
    CONSTRAINT chk_entries_balanced_flag CHECK (is_balanced = (total_debit = total_credit)),
    CONSTRAINT chk_entries_posted_balanced CHECK (status = 'draft' OR is_balanced),
    CONSTRAINT chk_entries_posted_stamp CHECK (status = 'draft' OR posted_at IS NOT NULL),
    CONSTRAINT chk_entries_reversed_link CHECK (
        (status = 'reversed') = (reversed_by_entry_id IS NOT NULL)
    )
);

CREATE UNIQUE INDEX uq_entries_source
    ON journal_entries(source_type, source_id)
    WHERE source_id IS NOT NULL;
CREATE INDEX idx_entries_date ON journal_entries(entry_date);
CREATE INDEX idx_entries_status_date ON journal_entries(status, entry_date);
";

const JOURNAL_LINES_SQL: &str = r"
CREATE TABLE journal_lines (
    id UUID PRIMARY KEY,
    entry_id UUID NOT NULL REFERENCES journal_entries(id),
    account_id UUID NOT NULL REFERENCES accounts(id),
    line_number INTEGER NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    debit NUMERIC(20, 2) NOT NULL DEFAULT 0,
    credit NUMERIC(20, 2) NOT NULL DEFAULT 0,
    CONSTRAINT uq_lines_number UNIQUE (entry_id, line_number),
    CONSTRAINT chk_lines_one_side CHECK (
        (debit > 0 AND credit = 0) OR (debit = 0 AND credit > 0)
    ),
    CONSTRAINT chk_lines_number_positive CHECK (line_number > 0)
);

CREATE INDEX idx_lines_entry ON journal_lines(entry_id);
CREATE INDEX idx_lines_account ON journal_lines(account_id);
";

const ACCOUNTING_PERIODS_SQL: &str = r"
CREATE TABLE accounting_periods (
    id UUID PRIMARY KEY,
    start_date DATE NOT NULL,
    end_date DATE NOT NULL,
    description VARCHAR(255) NOT NULL DEFAULT '',
    is_closed BOOLEAN NOT NULL DEFAULT false,
    is_locked BOOLEAN NOT NULL DEFAULT false,
    closed_by UUID,
    closed_at TIMESTAMPTZ,
    locked_by UUID,
    locked_at TIMESTAMPTZ,
    total_revenue NUMERIC(20, 2) NOT NULL DEFAULT 0,
    total_expense NUMERIC(20, 2) NOT NULL DEFAULT 0,
    net_income NUMERIC(20, 2) NOT NULL DEFAULT 0,
    closing_entry_id UUID REFERENCES journal_entries(id),
    reopened_by UUID,
    reopened_at TIMESTAMPTZ,
    reopen_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_periods_range CHECK (start_date <= end_date),
    CONSTRAINT chk_periods_lock_implies_close CHECK (NOT is_locked OR is_closed),
    CONSTRAINT excl_periods_overlap EXCLUDE USING gist (
        daterange(start_date, end_date, '[]') WITH &&
    )
);

CREATE INDEX idx_periods_end ON accounting_periods(end_date);
";

const TRIGGERS_SQL: &str = r"
-- ============================================================
-- FUNCTION: prevent_line_modification
-- Journal lines are immutable once written
-- ============================================================
CREATE OR REPLACE FUNCTION prevent_line_modification()
RETURNS TRIGGER AS $$
BEGIN
    RAISE EXCEPTION 'Journal lines are immutable. Post a reversing entry instead.';
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_prevent_line_modification
BEFORE UPDATE OR DELETE ON journal_lines
FOR EACH ROW
EXECUTE FUNCTION prevent_line_modification();

-- ============================================================
-- FUNCTION: prevent_entry_deletion
-- Entries leave the journal only through reversal
-- ============================================================
CREATE OR REPLACE FUNCTION prevent_entry_deletion()
RETURNS TRIGGER AS $$
BEGIN
    IF OLD.status <> 'draft' THEN
        RAISE EXCEPTION 'Cannot delete a posted journal entry.';
    END IF;
    RETURN OLD;
END;
$$ LANGUAGE plpgsql;

CREATE TRIGGER trg_prevent_entry_deletion
BEFORE DELETE ON journal_entries
FOR EACH ROW
EXECUTE FUNCTION prevent_entry_deletion();
";

const DROP_ALL_SQL: &str = r"
DROP TRIGGER IF EXISTS trg_prevent_entry_deletion ON journal_entries;
DROP TRIGGER IF EXISTS trg_prevent_line_modification ON journal_lines;
DROP FUNCTION IF EXISTS prevent_entry_deletion();
DROP FUNCTION IF EXISTS prevent_line_modification();

DROP TABLE IF EXISTS accounting_periods CASCADE;
DROP TABLE IF EXISTS journal_lines CASCADE;
DROP TABLE IF EXISTS journal_entries CASCADE;
DROP TABLE IF EXISTS accounts CASCADE;

DROP TYPE IF EXISTS source_type CASCADE;
DROP TYPE IF EXISTS entry_status CASCADE;
DROP TYPE IF EXISTS account_type CASCADE;
";
