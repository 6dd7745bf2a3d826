//! Ledgerline background worker.
//!
//! On every tick the worker drains pending deferred postings into the
//! journal, then compares every cached balance against the ledger. Drift is
//! logged, and corrected with an audit row when auto-fix is enabled.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ledgerline_core::outbox::OutboxRelay;
use ledgerline_core::reconciliation::Reconciler;
use ledgerline_core::store::LedgerStore;
use ledgerline_db::PgLedgerStore;
use ledgerline_shared::AppConfig;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ledgerline=debug,reconciler=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn tick<S: LedgerStore>(relay: &OutboxRelay<S>, reconciler: &Reconciler<S>) {
    match relay.drain().await {
        Ok(report) if report.processed + report.retried + report.failed > 0 => info!(
            processed = report.processed,
            retried = report.retried,
            failed = report.failed,
            "Outbox drained"
        ),
        Ok(_) => {}
        Err(e) => error!(error = %e, "Outbox relay failed"),
    }

    match reconciler.run().await {
        Ok(report) if report.is_clean() => info!(
            accounts_checked = report.accounts_checked,
            "Reconciliation clean"
        ),
        Ok(report) => warn!(
            accounts_checked = report.accounts_checked,
            drifts = report.drifts.len(),
            corrections = report.corrections.len(),
            ledger_balanced = report.ledger_balanced(),
            "Reconciliation found problems"
        ),
        Err(e) => error!(error = %e, "Reconciliation failed"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::load().context("Failed to load configuration")?;
    let db = ledgerline_db::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Connected to database");

    let store = Arc::new(PgLedgerStore::new(db));
    let relay = OutboxRelay::new(store.clone(), &config.outbox);
    let reconciler = Reconciler::new(store, config.reconciliation.clone());

    if config.reconciliation.run_once {
        tick(&relay, &reconciler).await;
        return Ok(());
    }

    let period = Duration::from_secs(config.reconciliation.interval_secs.max(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    if !config.reconciliation.run_on_startup {
        // The first tick of an interval completes immediately.
        ticker.tick().await;
    }
    info!(interval_secs = period.as_secs(), "Reconciler started");

    loop {
        tokio::select! {
            _ = ticker.tick() => tick(&relay, &reconciler).await,
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!("Reconciler stopped");
    Ok(())
}
