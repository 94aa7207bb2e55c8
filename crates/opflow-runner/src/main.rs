//! # Opflow Runner
//!
//! Runs a sample multi-chain deployment changeset through the opflow engine
//! and prints the aggregated reports and address book as JSON.

use std::sync::Arc;

use opflow_engine::Bundle;
use opflow_store::{InMemoryReportStore, ReportStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod chain;
mod changeset;
mod config;

use chain::{AddressBook, SimulatedRpc};
use changeset::ChangesetDeps;
use config::RunnerConfig;

/// Run the changeset described by the environment.
pub async fn run() -> anyhow::Result<()> {
    let config = RunnerConfig::from_env()?;
    info!(
        "🚀 Opflow runner starting for {} chain(s), max {} attempt(s) per operation",
        config.chains.len(),
        config.max_attempts
    );

    let store = Arc::new(InMemoryReportStore::new());
    let cancel = CancellationToken::new();

    // Cancel in-flight handlers on Ctrl-C
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight operations");
            on_signal.cancel();
        }
    });

    let bundle = Bundle::new(cancel, store.clone());
    let deps = ChangesetDeps {
        address_book: AddressBook::new(),
        rpc: SimulatedRpc::new(config.simulated_failures, config.rpc_latency),
    };

    let result = changeset::run(&config, &bundle, deps).await;
    info!("📚 {} report(s) recorded", store.all().await?.len());

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    run().await
}
