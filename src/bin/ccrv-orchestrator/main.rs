//! ccrv-orchestrator CLI entry point.
//!
//! Runs one verification end to end against a configured provider: initiate,
//! then poll until the transaction reaches a terminal state. The in-memory
//! store and ledger stand in for the platform's collaborators.

mod cli;

use std::sync::Arc;

use ccrv_orchestrator::notify::BroadcastSink;
use ccrv_orchestrator::quota::InMemoryQuotaLedger;
use ccrv_orchestrator::store::InMemoryTransactionStore;
use ccrv_orchestrator::{
    create_event_channel, HttpProviderGateway, Orchestrator, VerificationEvent,
};
use clap::Parser;
use cli::Cli;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("ccrv-orchestrator v{}", env!("CARGO_PKG_VERSION"));

    // Build configuration
    let config = cli.to_config()?;

    // Wire the orchestrator with in-process collaborators
    let gateway = Arc::new(HttpProviderGateway::new(&config.provider)?);
    let store = Arc::new(InMemoryTransactionStore::new());
    let ledger = Arc::new(InMemoryQuotaLedger::with_credits(config.quota_credits));
    let (events_tx, mut events_rx) = create_event_channel();
    let sink = Arc::new(BroadcastSink::new(events_tx));

    let orchestrator = Orchestrator::with_retry(
        gateway,
        store,
        ledger,
        sink,
        config.callback_retry.clone(),
        config.store_retry.clone(),
    );

    // Log finalization and anomaly events as they arrive
    tokio::spawn(async move {
        while let Ok(event) = events_rx.recv().await {
            match event {
                VerificationEvent::Finalized {
                    transaction_id,
                    status,
                    case_count,
                    ..
                } => info!(
                    "Transaction {} finalized: {:?} (cases: {:?})",
                    transaction_id, status, case_count
                ),
                VerificationEvent::AnomalyRecorded {
                    transaction_id,
                    detail,
                } => warn!("Anomaly on {}: {}", transaction_id, detail),
            }
        }
    });

    // Initiate the verification
    let receipt = orchestrator
        .initiate(&cli.reference, &cli.identity(), cli.consent_marker())
        .await?;
    info!(
        "Verification submitted, transaction id {}",
        receipt.transaction_id
    );

    // Poll until the transaction terminates
    let poll_interval = std::time::Duration::from_secs(config.poll_interval_secs);
    let record = loop {
        tokio::time::sleep(poll_interval).await;
        let record = orchestrator.poll(&receipt.transaction_id).await?;
        info!(
            "Transaction {} status: {:?}",
            record.transaction_id, record.status
        );
        if record.is_final() {
            break record;
        }
    };

    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
