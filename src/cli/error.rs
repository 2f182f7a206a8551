//! CLI error types and conversions

use crate::config::ConfigError;
use crate::fetcher::FetcherError;
use crate::metrics::MetricsError;
use crate::page::ValidationError;
use crate::storage::StorageError;

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Fetcher error
    #[error("fetch failed: {0}")]
    Fetcher(#[from] FetcherError),

    /// Local store error
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Bad pagination arguments
    #[error("invalid pagination: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Metrics exporter error
    #[error(transparent)]
    Metrics(#[from] MetricsError),

    /// Output serialization error
    #[error("output error: {0}")]
    Output(#[from] serde_json::Error),

    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Connection test failed
    #[error("connection test failed for {0}; check the API key and network")]
    ConnectionFailed(String),
}
