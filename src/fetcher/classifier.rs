//! Classification of RentCast responses into a closed set of error kinds.
//!
//! Every non-2xx response and every transport failure resolves to exactly one
//! [`ErrorKind`]. The kind alone decides whether a retry is allowed and how
//! long the backoff may grow; call sites match on it exhaustively.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::client::transport::TransportError;
use crate::config::{
    RATE_LIMITED_MAX_BACKOFF_SECS, SERVER_ERROR_MAX_BACKOFF_SECS, TIMEOUT_MAX_BACKOFF_SECS,
};

/// Closed classification of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// HTTP 400: bad or missing query parameters
    InvalidParameters,
    /// HTTP 401: missing/invalid API key or inactive subscription
    AuthFailure,
    /// HTTP 404: the query matched nothing
    NoResults,
    /// HTTP 405: method other than GET
    MethodNotAllowed,
    /// HTTP 429: request quota exceeded
    RateLimited,
    /// HTTP 500: server-side failure
    ServerError,
    /// HTTP 504, an exceeded transport deadline, or cancellation
    Timeout,
    /// Anything else
    Unclassified,
}

impl ErrorKind {
    /// Map a status code through the fixed classification table
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ErrorKind::InvalidParameters,
            401 => ErrorKind::AuthFailure,
            404 => ErrorKind::NoResults,
            405 => ErrorKind::MethodNotAllowed,
            429 => ErrorKind::RateLimited,
            500 => ErrorKind::ServerError,
            504 => ErrorKind::Timeout,
            _ => ErrorKind::Unclassified,
        }
    }

    /// Whether a failed attempt of this kind may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::ServerError | ErrorKind::Timeout
        )
    }

    /// Backoff ceiling for retryable kinds
    pub fn max_backoff(&self) -> Option<Duration> {
        match self {
            ErrorKind::RateLimited => Some(Duration::from_secs(RATE_LIMITED_MAX_BACKOFF_SECS)),
            ErrorKind::ServerError => Some(Duration::from_secs(SERVER_ERROR_MAX_BACKOFF_SECS)),
            ErrorKind::Timeout => Some(Duration::from_secs(TIMEOUT_MAX_BACKOFF_SECS)),
            _ => None,
        }
    }

    /// Short description used inside retry log messages
    pub fn description(&self) -> &'static str {
        match self {
            ErrorKind::InvalidParameters => "invalid parameters",
            ErrorKind::AuthFailure => "authentication failed",
            ErrorKind::NoResults => "no results",
            ErrorKind::MethodNotAllowed => "method not allowed",
            ErrorKind::RateLimited => "rate limit exceeded",
            ErrorKind::ServerError => "server error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unclassified => "unexpected response",
        }
    }

    /// Suggested remediation presented with failures
    pub fn recommendation(&self) -> &'static str {
        match self {
            ErrorKind::InvalidParameters => {
                "check request parameters and format; ensure required fields are provided"
            }
            ErrorKind::AuthFailure => {
                "verify the API key is valid and the subscription/billing is active"
            }
            ErrorKind::NoResults => {
                "broaden the query parameters or check that the location exists"
            }
            ErrorKind::MethodNotAllowed => "use GET; the API only supports GET requests",
            ErrorKind::RateLimited => "reduce request rate or increase inter-request delay",
            ErrorKind::ServerError => "retry later; contact RentCast support if it persists",
            ErrorKind::Timeout => "retry with a smaller result set or simpler query",
            ErrorKind::Unclassified => "check the RentCast API documentation for this status",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidParameters => "InvalidParameters",
            ErrorKind::AuthFailure => "AuthFailure",
            ErrorKind::NoResults => "NoResults",
            ErrorKind::MethodNotAllowed => "MethodNotAllowed",
            ErrorKind::RateLimited => "RateLimited",
            ErrorKind::ServerError => "ServerError",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::Unclassified => "Unclassified",
        };
        f.write_str(name)
    }
}

/// A classified failure: the kind plus what the service said about it
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
pub struct ClassifiedError {
    /// Classification
    pub kind: ErrorKind,
    /// Source status code; `None` for transport failures and cancellation
    pub status: Option<u16>,
    /// Human-readable message
    pub message: String,
    /// RentCast error code from the response body, when present
    pub api_error: Option<String>,
}

impl ClassifiedError {
    /// Build an error of `kind`
    pub fn new(kind: ErrorKind, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            message: message.into(),
            api_error: None,
        }
    }

    /// Error reported when a call is cancelled or its deadline passes
    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Timeout, None, "request cancelled")
    }

    /// Error reported for a 2xx body that cannot be decoded
    pub fn malformed(status: u16, detail: impl fmt::Display) -> Self {
        Self::new(
            ErrorKind::Unclassified,
            Some(status),
            format!("malformed response: {detail}"),
        )
    }

    /// Whether a retry is allowed
    pub fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Backoff ceiling, for retryable kinds
    pub fn max_backoff(&self) -> Option<Duration> {
        self.kind.max_backoff()
    }

    /// Suggested remediation
    pub fn recommendation(&self) -> &'static str {
        self.kind.recommendation()
    }

    /// Whether this is the "zero results" outcome
    pub fn is_no_results(&self) -> bool {
        self.kind == ErrorKind::NoResults
    }
}

/// RentCast error body: `{"status": 404, "error": "...", "message": "..."}`
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Stateless response classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify a non-2xx response. Pure; performs no I/O.
    pub fn classify(status: u16, body: &str) -> ClassifiedError {
        let kind = ErrorKind::from_status(status);
        let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();

        let (api_error, message) = match parsed {
            Some(parsed) => (parsed.error, parsed.message),
            None => (None, None),
        };

        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("HTTP {status}"));

        ClassifiedError {
            kind,
            status: Some(status),
            message,
            api_error,
        }
    }

    /// Classify a failure where no response was received
    pub fn classify_transport(err: &TransportError) -> ClassifiedError {
        let kind = if err.is_timeout() {
            ErrorKind::Timeout
        } else {
            ErrorKind::Unclassified
        };
        ClassifiedError::new(kind, None, err.to_string())
    }
}

/// Shorthand for [`ErrorClassifier::classify`]
pub fn classify(status: u16, body: &str) -> ClassifiedError {
    ErrorClassifier::classify(status, body)
}
