//! CLI command implementations

pub mod error;
pub mod fetch;
pub mod stored;

pub use error::CliError;
pub use fetch::FetchArgs;
pub use stored::StoredArgs;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use crate::cancel::SharedCancel;
use crate::config::AppConfig;
use crate::fetcher::Fetcher;

/// RentCast ingestion CLI
#[derive(Parser, Debug)]
#[command(name = "rentcast-ingest")]
#[command(about = "Fetch and store RentCast property, listing, valuation and market data", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (default: rentcast.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Request quota, overriding the configuration
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..))]
    pub requests_per_second: Option<u32>,

    /// Attempts per request including the first (range: 1-20)
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(1..=20))]
    pub max_attempts: Option<u32>,

    /// Local store location, overriding the configuration
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Serve Prometheus metrics on this address (e.g. 127.0.0.1:9090)
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch records from the API
    Fetch(FetchArgs),

    /// Show one page of locally stored records
    Stored(StoredArgs),

    /// Check that the API accepts the configured key
    Check,
}

impl Cli {
    /// Configuration with command-line overrides applied
    pub fn load_config(&self) -> Result<AppConfig, CliError> {
        let mut config = AppConfig::load(self.config.as_deref())?;

        if let Some(rps) = self.requests_per_second {
            config.requests_per_second = rps;
        }
        if let Some(max_attempts) = self.max_attempts {
            config.max_attempts = max_attempts;
        }
        if let Some(database_url) = &self.database_url {
            config.database_url = database_url.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

/// Execute the check command
pub async fn execute_check(cli: &Cli, cancel: SharedCancel) -> Result<(), CliError> {
    let config = cli.load_config()?;
    let fetcher = Fetcher::from_config(&config)?.with_cancel(cancel);

    info!(base_url = %config.base_url, "Testing connection");
    if fetcher.test_connection().await {
        println!("Connection OK ({})", config.base_url);
        Ok(())
    } else {
        Err(CliError::ConnectionFailed(config.base_url))
    }
}
