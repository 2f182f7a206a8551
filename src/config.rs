//! Configuration constants and layered application configuration
//!
//! Constants describe the RentCast service limits and retry defaults.
//! [`AppConfig`] is merged from built-in defaults, an optional TOML file and
//! `RENTCAST_`-prefixed environment variables, in that order.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::retry::RetryPolicy;
use crate::page::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

/// Maximum number of attempts for one logical request.
pub const MAX_ATTEMPTS: u32 = 3;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Jitter added on top of each backoff, as a fraction of the delay.
pub const JITTER_RATIO: f64 = 0.25;

/// Backoff ceiling for rate-limited (429) responses, in seconds.
pub const RATE_LIMITED_MAX_BACKOFF_SECS: u64 = 60;

/// Backoff ceiling for server (500) errors, in seconds.
pub const SERVER_ERROR_MAX_BACKOFF_SECS: u64 = 20;

/// Backoff ceiling for gateway (504) and transport timeouts, in seconds.
pub const TIMEOUT_MAX_BACKOFF_SECS: u64 = 30;

/// RentCast's documented request quota per API key.
pub const REQUESTS_PER_SECOND: u32 = 20;

/// Per-request timeout in seconds.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Hard upper bound on pages for one logical fetch.
pub const MAX_PAGES_GUARD: u32 = 10_000;

/// Default RentCast API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.rentcast.io";

/// Default local store location.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://rentcast.db";

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "rentcast.toml";

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "RENTCAST_";

/// Calculate exponential backoff delay before jitter
///
/// `attempt` is 1-based: the delay after the first failed attempt is `base`.
pub fn calculate_backoff(base: Duration, attempt: u32, ceiling: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(ceiling)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to merge or extract configuration sources
    #[error("failed to load configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    /// A value is outside its allowed range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Extract(Box::new(err))
    }
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// RentCast API key; required only for remote operations
    pub api_key: Option<String>,
    /// API base URL, without the `/v1` prefix
    pub base_url: String,
    /// Request quota shared by every call through one client
    pub requests_per_second: u32,
    /// Page size used when the caller does not pass one
    pub default_page_size: u32,
    /// Largest accepted page size
    pub max_page_size: u32,
    /// Attempts per logical request, first attempt included
    pub max_attempts: u32,
    /// Page cap for one logical fetch
    pub max_pages: Option<u32>,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Base backoff before the first retry
    pub base_backoff_ms: u64,
    /// Jitter fraction in `[0, 1]`
    pub jitter_ratio: f64,
    /// Local store location
    pub database_url: String,
    /// User-Agent header value
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            requests_per_second: REQUESTS_PER_SECOND,
            default_page_size: DEFAULT_PAGE_LIMIT,
            max_page_size: MAX_PAGE_LIMIT,
            max_attempts: MAX_ATTEMPTS,
            max_pages: None,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            base_backoff_ms: INITIAL_BACKOFF_MS,
            jitter_ratio: JITTER_RATIO,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

impl AppConfig {
    /// Build the layered figment: defaults, TOML file, environment.
    ///
    /// With `path = None`, `rentcast.toml` in the working directory is used if
    /// it exists.
    pub fn figment(path: Option<&Path>) -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(AppConfig::default()));

        let file = match path {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            }
        };

        let figment = match file {
            Some(file) => figment.merge(Toml::file(file)),
            None => figment,
        };

        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Load and validate configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            if !path.is_file() {
                return Err(ConfigError::Invalid(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
        }

        let config: AppConfig = Self::figment(path).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the client cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.requests_per_second == 0 {
            return Err(ConfigError::Invalid(
                "requests_per_second must be at least 1".to_string(),
            ));
        }

        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_attempts must be at least 1".to_string(),
            ));
        }

        if self.max_page_size == 0 || self.max_page_size > MAX_PAGE_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_page_size must be between 1 and {MAX_PAGE_LIMIT}, got {}",
                self.max_page_size
            )));
        }

        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "default_page_size must be between 1 and max_page_size ({}), got {}",
                self.max_page_size, self.default_page_size
            )));
        }

        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ConfigError::Invalid(format!(
                "jitter_ratio must be within [0, 1], got {}",
                self.jitter_ratio
            )));
        }

        if self.max_pages == Some(0) {
            return Err(ConfigError::Invalid(
                "max_pages must be at least 1 when set".to_string(),
            ));
        }

        if self.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("base_url must not be empty".to_string()));
        }

        Ok(())
    }

    /// Retry policy derived from this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_backoff_ms),
            jitter_ratio: self.jitter_ratio,
        }
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
