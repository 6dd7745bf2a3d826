//! Application configuration management.

use serde::Deserialize;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Ledger rules consumed by the core services.
    #[serde(default)]
    pub ledger: LedgerConfig,
    /// Reconciliation job configuration.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Ledger outbox worker configuration.
    #[serde(default)]
    pub outbox: OutboxConfig,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Database connection URL.
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Seconds to wait for a pooled connection.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connect_timeout() -> u64 {
    8
}

/// Ledger rules: retained earnings, posting window, deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerConfig {
    /// Account code of the retained earnings account that receives net income.
    #[serde(default = "default_retained_earnings_code")]
    pub retained_earnings_code: String,
    /// Postings older than this many years are rejected.
    #[serde(default = "default_max_past_years")]
    pub max_past_years: u32,
    /// Postings further than this many days ahead are rejected.
    #[serde(default = "default_max_future_days")]
    pub max_future_days: u32,
    /// Deadline applied to postings and closings, in seconds.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

fn default_retained_earnings_code() -> String {
    "3201".to_string()
}

fn default_max_past_years() -> u32 {
    2
}

fn default_max_future_days() -> u32 {
    7
}

fn default_operation_timeout() -> u64 {
    30
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            retained_earnings_code: default_retained_earnings_code(),
            max_past_years: default_max_past_years(),
            max_future_days: default_max_future_days(),
            operation_timeout_secs: default_operation_timeout(),
        }
    }
}

/// Reconciliation job configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconciliationConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Correct drift automatically (each correction is audited).
    #[serde(default)]
    pub auto_fix: bool,
    /// Drift magnitude above which an alert is logged.
    #[serde(default = "default_alert_threshold")]
    pub alert_threshold: u64,
    /// Run one sweep immediately on startup.
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,
    /// Upper bound for a single sweep, in seconds.
    #[serde(default = "default_max_execution")]
    pub max_execution_secs: u64,
    /// Exit after the first sweep.
    #[serde(default)]
    pub run_once: bool,
}

fn default_interval() -> u64 {
    1800 // 30 minutes
}

fn default_alert_threshold() -> u64 {
    1000
}

fn default_run_on_startup() -> bool {
    true
}

fn default_max_execution() -> u64 {
    600 // 10 minutes
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            auto_fix: false,
            alert_threshold: default_alert_threshold(),
            run_on_startup: default_run_on_startup(),
            max_execution_secs: default_max_execution(),
            run_once: false,
        }
    }
}

/// Ledger outbox worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OutboxConfig {
    /// Messages drained per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Attempts before a message is marked failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_batch_size() -> u64 {
    100
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from environment and config files.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{run_mode}")).required(false))
            .add_source(config::Environment::with_prefix("LEDGERLINE").separator("__"))
            .build()?;

        config.try_deserialize()
    }
}
