//! Main entry point for the rentcast-ingest CLI

use clap::Parser;
use rentcast_ingest::cancel::CancelSignal;
use rentcast_ingest::cli::{execute_check, Cli, Commands};
use rentcast_ingest::metrics::init_metrics;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber with optional JSON formatting
///
/// Logs go to stderr; stdout carries command output.
fn init_tracing() {
    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rentcast_ingest=info"));

    if json_format {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();

    if let Some(addr) = cli.metrics_addr {
        if let Err(e) = init_metrics(addr) {
            error!("Failed to start metrics exporter: {}", e);
            std::process::exit(1);
        }
    }

    // Ctrl+C cancels in-flight requests, queued acquisitions and backoff sleeps
    let cancel = CancelSignal::shared();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Ctrl+C received - cancelling requests...");
                cancel.cancel();
            }
        }
    });

    let result = match cli.command {
        Commands::Fetch(ref args) => args
            .execute(&cli, cancel.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
        Commands::Stored(ref args) => args.execute(&cli).await.map_err(|e| anyhow::anyhow!(e)),
        Commands::Check => execute_check(&cli, cancel.clone())
            .await
            .map_err(|e| anyhow::anyhow!(e)),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
