//! Points ledger server binary
//!
//! Opens the configured store, bootstraps it when empty and serves ledger
//! commands until interrupted. Configuration comes from the file named by
//! `POINTS_CONFIG` (if set) with `POINTS_*` environment overrides on top.

use anyhow::Context;
use points_ledger::{spawn_ledger_actor, Config, PointsLedger};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting points ledger server");

    // Load configuration
    let config = match std::env::var("POINTS_CONFIG") {
        Ok(path) => {
            let mut config = Config::from_file(&path)
                .with_context(|| format!("loading config from {}", path))?;
            config.apply_env()?;
            config
        }
        Err(_) => Config::from_env()?,
    };

    // Open ledger on the blocking pool; RocksDB open does file I/O
    let ledger = tokio::task::spawn_blocking(move || PointsLedger::open(config))
        .await
        .context("ledger open task")??;
    let ledger = Arc::new(ledger);

    tracing::info!(
        next_reference = %ledger.next_reference()?,
        "Ledger opened successfully"
    );

    let handle = spawn_ledger_actor(ledger.clone());

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down points ledger server");
    handle.shutdown().await?;

    let metrics = ledger.metrics();
    tracing::info!(
        committed = metrics.transfers_total.get(),
        failed = metrics.transfers_failed.get(),
        rejected = metrics.transfers_rejected.get(),
        "Final transfer counts"
    );

    Ok(())
}
