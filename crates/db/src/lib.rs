//! PostgreSQL persistence for Ledgerline.
//!
//! This crate provides:
//! - `SeaORM` entity definitions for the ledger tables
//! - Database migrations
//! - [`PgLedgerStore`], the PostgreSQL implementation of the ledger store

pub mod entities;
pub mod migration;
pub mod store;

pub use store::{PgLedgerStore, PgLedgerTx};

use std::time::Duration;

use ledgerline_shared::config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a connection pool to the database.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .sqlx_logging(false);
    Database::connect(options).await
}
