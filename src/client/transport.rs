//! Transport seam between the retry executor and the network
//!
//! The executor only sees [`Transport::send`]: one attempt, one
//! [`RawResponse`] or one [`TransportError`]. Non-2xx statuses are *not*
//! errors at this layer; classification happens above.

use async_trait::async_trait;
use reqwest::Client;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::request::RequestDescriptor;

/// HTTP connect timeout (seconds) - time to establish TCP connection
const HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;
/// HTTP request timeout (seconds) - upper bound when a request declares none
const HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Status code and body of one completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl RawResponse {
    /// Build a response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Connection-level failure: no response was received
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// A deadline was exceeded
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Could not connect (DNS, refused, TLS)
    #[error("connection failed: {0}")]
    Connect(String),

    /// Any other transport failure
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Whether the failure was a deadline being exceeded
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

/// Sends one attempt of a request
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform exactly one exchange for `request`
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        (**self).send(request).await
    }
}

/// Build the HTTP client shared by every request of one fetcher
///
/// Configured with explicit timeouts to prevent indefinite hangs:
/// - Connect timeout: 10 seconds
/// - Request timeout: 30 seconds (overridden per request by the descriptor)
pub fn build_http_client(user_agent: &str) -> Result<Client, TransportError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(HTTP_REQUEST_TIMEOUT_SECS))
        .user_agent(user_agent)
        .build()
        .map_err(|e| {
            TransportError::Other(format!(
                "failed to build HTTP client: {e}. Check system TLS configuration."
            ))
        })
}

/// reqwest-backed transport against a base URL
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Arc<Client>,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport
    ///
    /// # Arguments
    /// * `client` - Shared HTTP client (Arc for cheap cloning)
    /// * `base_url` - Base URL for API endpoints (e.g., "<https://api.rentcast.io>")
    pub fn new(client: Arc<Client>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Full URL for a request path
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        let url = self.url_for(&request.path);

        debug!(
            method = %request.method,
            url = %url,
            params = request.query.len(),
            "Sending request"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .query(&request.query_pairs())
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        Ok(RawResponse { status, body })
    }
}

/// Transport backed by a closure, for injecting custom send behaviour
pub struct FnTransport<F> {
    send_fn: F,
}

impl<F> FnTransport<F> {
    /// Wrap a send closure
    pub fn new(send_fn: F) -> Self {
        Self { send_fn }
    }
}

#[async_trait]
impl<F, Fut> Transport for FnTransport<F>
where
    F: Fn(RequestDescriptor) -> Fut + Send + Sync,
    Fut: Future<Output = Result<RawResponse, TransportError>> + Send,
{
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        (self.send_fn)(request.clone()).await
    }
}
