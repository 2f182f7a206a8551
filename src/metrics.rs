//! Production observability metrics for RentCast ingestion
//!
//! This module records request outcomes, 429 responses, retry backoff,
//! rate limiter queueing and ingestion progress.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Prometheus exporter for scraping endpoint (enabled with `--metrics-addr`)
//! - Without an installed recorder every call is a no-op

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::OnceCell;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Set once the Prometheus exporter is installed
static METRICS_INITIALIZED: OnceCell<SocketAddr> = OnceCell::new();

/// Correlation ID generator for request tracing
static CORRELATION_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Metrics initialization errors
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Exporter could not be installed (address in use, recorder already set)
    #[error("failed to install Prometheus exporter: {0}")]
    Install(String),
}

/// Initialize metrics system with Prometheus exporter
///
/// This should be called once at application startup, typically in main().
/// The function is idempotent and will not reinitialize if already called.
///
/// # Arguments
/// * `addr` - Socket address to bind Prometheus scrape endpoint (e.g., "0.0.0.0:9090")
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    if let Some(existing) = METRICS_INITIALIZED.get() {
        debug!(addr = %existing, "Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    describe_metrics();

    let _ = METRICS_INITIALIZED.set(addr);
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Register metric descriptions for better Prometheus integration
fn describe_metrics() {
    describe_counter!(
        "rentcast_requests_total",
        Unit::Count,
        "Total number of HTTP requests made to the RentCast API"
    );

    describe_counter!(
        "rentcast_rate_limited_total",
        Unit::Count,
        "Total number of 429 rate limit responses received"
    );

    describe_counter!(
        "rentcast_retries_total",
        Unit::Count,
        "Total number of retry attempts"
    );

    describe_histogram!(
        "rentcast_request_duration_seconds",
        Unit::Seconds,
        "HTTP request duration in seconds"
    );

    describe_histogram!(
        "rentcast_retry_backoff_seconds",
        Unit::Seconds,
        "Duration of retry backoff in seconds"
    );

    describe_counter!(
        "rate_limit_permits_acquired_total",
        Unit::Count,
        "Total number of rate limit permits acquired"
    );

    describe_gauge!(
        "rate_limit_permits_available",
        Unit::Count,
        "Rate limit permits available right after the last grant"
    );

    describe_histogram!(
        "rate_limit_queue_wait_seconds",
        Unit::Seconds,
        "Time spent waiting for rate limit permits"
    );

    describe_counter!(
        "rentcast_pages_fetched_total",
        Unit::Count,
        "Total number of pages fetched from the RentCast API"
    );

    describe_counter!(
        "rentcast_records_stored_total",
        Unit::Count,
        "Total number of records written to the local store"
    );
}

/// Check if metrics system is initialized
pub fn is_initialized() -> bool {
    METRICS_INITIALIZED.get().is_some()
}

/// Generate a new correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    let id = CORRELATION_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("req-{id:08x}")
}

/// Record an HTTP request with timing
pub struct HttpRequestMetrics {
    endpoint: String,
    start_time: Instant,
    correlation_id: String,
    attempt: u32,
}

impl HttpRequestMetrics {
    /// Start recording a new HTTP request
    pub fn start(endpoint: impl Into<String>, attempt: u32) -> Self {
        let endpoint = endpoint.into();
        let correlation_id = generate_correlation_id();

        debug!(
            correlation_id = %correlation_id,
            endpoint = %endpoint,
            attempt = attempt,
            "Starting HTTP request metrics"
        );

        Self {
            endpoint,
            start_time: Instant::now(),
            correlation_id,
            attempt,
        }
    }

    /// Record completion of the HTTP request
    pub fn record_complete(&self, status_code: u16) {
        let duration = self.start_time.elapsed();
        self.record(status_code.to_string(), duration);

        if status_code == 429 {
            counter!(
                "rentcast_rate_limited_total",
                "endpoint" => self.endpoint.clone(),
            )
            .increment(1);

            warn!(
                correlation_id = %self.correlation_id,
                endpoint = %self.endpoint,
                attempt = self.attempt,
                duration_ms = duration.as_millis() as u64,
                "Rate limit error (429) recorded"
            );
        }

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            status = status_code,
            duration_ms = duration.as_millis() as u64,
            "HTTP request completed"
        );
    }

    /// Record a network error (no status code)
    pub fn record_network_error(&self) {
        let duration = self.start_time.elapsed();
        self.record("network_error".to_string(), duration);

        warn!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            duration_ms = duration.as_millis() as u64,
            "Network error recorded"
        );
    }

    /// Record a request abandoned because the call was cancelled
    pub fn record_cancelled(&self) {
        let duration = self.start_time.elapsed();
        self.record("cancelled".to_string(), duration);

        debug!(
            correlation_id = %self.correlation_id,
            endpoint = %self.endpoint,
            attempt = self.attempt,
            "HTTP request cancelled"
        );
    }

    fn record(&self, status: String, duration: Duration) {
        counter!(
            "rentcast_requests_total",
            "endpoint" => self.endpoint.clone(),
            "status" => status,
            "attempt" => self.attempt.to_string(),
        )
        .increment(1);

        histogram!(
            "rentcast_request_duration_seconds",
            "endpoint" => self.endpoint.clone(),
        )
        .record(duration.as_secs_f64());
    }

    /// Get the correlation ID for this request
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

/// Record retry backoff duration
pub fn record_retry_backoff(duration: Duration, attempt: u32) {
    counter!(
        "rentcast_retries_total",
        "attempt" => attempt.to_string(),
    )
    .increment(1);

    histogram!(
        "rentcast_retry_backoff_seconds",
        "attempt" => attempt.to_string(),
    )
    .record(duration.as_secs_f64());

    debug!(
        attempt = attempt,
        backoff_ms = duration.as_millis() as u64,
        "Retry backoff recorded"
    );
}

/// Rate limiter metrics helper
pub struct RateLimiterMetrics {
    start_time: Option<Instant>,
}

impl Default for RateLimiterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterMetrics {
    /// Create a new rate limiter metrics instance
    pub fn new() -> Self {
        Self { start_time: None }
    }

    /// Start measuring queue wait time
    pub fn start_acquire(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Record successful permit acquisition
    pub fn record_acquired(&mut self) {
        if let Some(start) = self.start_time.take() {
            let wait_duration = start.elapsed();

            histogram!("rate_limit_queue_wait_seconds").record(wait_duration.as_secs_f64());
            counter!("rate_limit_permits_acquired_total").increment(1);

            if wait_duration.as_millis() > 100 {
                debug!(
                    wait_ms = wait_duration.as_millis() as u64,
                    "Rate limit permit acquired after wait"
                );
            }
        }
    }

    /// Update available permits gauge
    pub fn update_available_permits(&self, available: u32) {
        gauge!("rate_limit_permits_available").set(f64::from(available));
    }
}

/// Ingestion run metrics
pub struct IngestMetrics {
    endpoint: String,
    start_time: Instant,
}

impl IngestMetrics {
    /// Start tracking an ingestion run
    pub fn start(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();

        info!(endpoint = %endpoint, "Ingestion started");

        Self {
            endpoint,
            start_time: Instant::now(),
        }
    }

    /// Record one fetched page
    pub fn record_page(&self, items: usize) {
        counter!(
            "rentcast_pages_fetched_total",
            "endpoint" => self.endpoint.clone(),
        )
        .increment(1);

        debug!(endpoint = %self.endpoint, items = items, "Page fetched");
    }

    /// Record records written to the store
    pub fn record_stored(&self, stored: u64) {
        counter!(
            "rentcast_records_stored_total",
            "endpoint" => self.endpoint.clone(),
        )
        .increment(stored);
    }

    /// Record successful completion
    pub fn record_success(&self, pages: u32, fetched: u64, stored: u64) {
        let duration = self.start_time.elapsed();

        info!(
            endpoint = %self.endpoint,
            pages = pages,
            fetched = fetched,
            stored = stored,
            duration_secs = duration.as_secs(),
            "Ingestion completed successfully"
        );
    }

    /// Record a failed run
    pub fn record_failure(&self, error: &str) {
        let duration = self.start_time.elapsed();

        error!(
            endpoint = %self.endpoint,
            error = %error,
            duration_secs = duration.as_secs(),
            "Ingestion failed"
        );
    }
}
