//! Bounded, classified retry execution
//!
//! [`RetryExecutor`] resolves one [`RequestDescriptor`] into either a 2xx
//! [`RawResponse`] or exactly one terminal [`ClassifiedError`]:
//!
//! - every attempt first takes a token from the shared [`RateLimiter`]
//! - non-retryable classifications return after a single attempt
//! - retryable ones back off exponentially with jitter, capped per kind
//! - cancellation at any point returns a Timeout-classified error
//!
//! Backoff sleeps never hold the limiter.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::rate_limit::{Admission, RateLimiter};
use super::request::RequestDescriptor;
use super::transport::{RawResponse, Transport};
use crate::cancel::CancelSignal;
use crate::config::{calculate_backoff, INITIAL_BACKOFF_MS, JITTER_RATIO, MAX_ATTEMPTS};
use crate::fetcher::classifier::{ClassifiedError, ErrorClassifier, ErrorKind};
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};

/// Retry parameters
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per request, first attempt included
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound of the jitter term, as a fraction of the delay
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            jitter_ratio: JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    /// Policy with `max_attempts` and default delays
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based)
    ///
    /// `base * 2^(attempt-1)` capped at the kind's ceiling, plus jitter in
    /// `[0, jitter_ratio * delay]`; the sum is capped at the ceiling again.
    pub fn backoff(&self, attempt: u32, kind: ErrorKind) -> Duration {
        let ceiling = kind.max_backoff().unwrap_or(self.base_delay);
        let delay = calculate_backoff(self.base_delay, attempt, ceiling);
        (delay + jitter(delay, self.jitter_ratio)).min(ceiling)
    }
}

/// Random jitter in `[0, ratio * delay]`
fn jitter(delay: Duration, ratio: f64) -> Duration {
    let ratio = ratio.clamp(0.0, 1.0);
    let max = delay.as_secs_f64() * ratio;
    if max <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rand::rng().random_range(0.0..=max))
}

/// What happened on one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx with this status
    Success(u16),
    /// Classified failure
    Failed(ErrorKind),
    /// Cancelled before the attempt resolved
    Cancelled,
}

/// Diagnostic record of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    /// 1-based attempt number
    pub attempt: u32,
    /// Backoff slept before this attempt
    pub delay: Duration,
    /// Outcome
    pub outcome: AttemptOutcome,
}

/// Result of one logical request plus its attempt history
#[derive(Debug, Clone)]
pub struct Execution {
    /// Success payload or terminal error
    pub result: Result<RawResponse, ClassifiedError>,
    /// Attempts in order
    pub attempts: Vec<AttemptRecord>,
}

/// Context for formatting retry messages.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Attempt number the message refers to (1-based)
    pub attempt: u32,
    /// Maximum number of attempts configured
    pub max_attempts: u32,
    /// Classification that triggered the message
    pub kind: ErrorKind,
    /// Backoff duration until the next attempt
    pub backoff_duration: Duration,
    /// Request path
    pub endpoint: String,
    /// Original error message for details
    pub error_message: String,
}

impl RetryContext {
    /// Convenience constructor used throughout the retry loop.
    pub fn new(
        attempt: u32,
        max_attempts: u32,
        kind: ErrorKind,
        backoff_duration: Duration,
        endpoint: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            attempt,
            max_attempts,
            kind,
            backoff_duration,
            endpoint: endpoint.into(),
            error_message: error_message.into(),
        }
    }

    /// Format standardized retry message with attempt counters and context.
    pub fn format_retry(&self) -> String {
        format!(
            "Retrying (attempt {}/{}) after {} - waiting {:.1} seconds... ({})",
            self.attempt,
            self.max_attempts,
            self.kind.description(),
            self.backoff_duration.as_secs_f64(),
            self.endpoint
        )
    }

    /// Format retry success message when a later attempt works.
    pub fn format_success(&self) -> String {
        format!(
            "Retry attempt {}/{} succeeded ({})",
            self.attempt, self.max_attempts, self.endpoint
        )
    }

    /// Format final failure summary with actionable suggestions.
    pub fn format_failure(&self) -> String {
        let mut lines = vec![
            format!(
                "[FAILED] Request failed after {} attempt{}",
                self.attempt,
                if self.attempt == 1 { "" } else { "s" }
            ),
            format!("  Last error: {}", self.error_message),
            format!("  Endpoint: {}", self.endpoint),
            "  Suggestions:".to_string(),
        ];

        for suggestion in self.format_suggestions() {
            lines.push(format!("    - {suggestion}"));
        }

        lines.join("\n")
    }

    /// Derive suggestions tailored to the current retry context.
    pub fn format_suggestions(&self) -> Vec<String> {
        let mut suggestions = vec![self.kind.recommendation().to_string()];
        if self.kind.is_retryable() {
            suggestions.push(format!(
                "Try increasing --max-attempts (current: {})",
                self.max_attempts
            ));
        }
        suggestions
    }
}

/// Executes requests through the shared limiter with bounded retries
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create an executor
    ///
    /// # Arguments
    /// * `limiter` - Shared rate limiter (Arc for global quota enforcement)
    /// * `policy` - Attempt budget and backoff parameters
    pub fn new(limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self { limiter, policy }
    }

    /// Retry policy in use
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Shared limiter in use
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Execute `request` and return the success payload or terminal error
    pub async fn execute<T>(
        &self,
        request: &RequestDescriptor,
        transport: &T,
        cancel: &CancelSignal,
    ) -> Result<RawResponse, ClassifiedError>
    where
        T: Transport + ?Sized,
    {
        self.execute_recorded(request, transport, cancel).await.result
    }

    /// Execute `request`, keeping the per-attempt history
    pub async fn execute_recorded<T>(
        &self,
        request: &RequestDescriptor,
        transport: &T,
        cancel: &CancelSignal,
    ) -> Execution
    where
        T: Transport + ?Sized,
    {
        let endpoint = request.path.as_str();
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = Vec::new();
        let mut delay = Duration::ZERO;
        let mut attempt = 1;

        loop {
            if self.limiter.acquire_or_cancel(cancel).await == Admission::Cancelled {
                return cancelled_execution(attempts, attempt, delay, endpoint);
            }

            debug!(endpoint = %endpoint, attempt, max_attempts, "Sending attempt");
            let metrics = HttpRequestMetrics::start(endpoint, attempt);

            let outcome = tokio::select! {
                outcome = transport.send(request) => outcome,
                _ = cancel.cancelled() => {
                    metrics.record_cancelled();
                    return cancelled_execution(attempts, attempt, delay, endpoint);
                }
            };

            let err = match outcome {
                Ok(response) if response.is_success() => {
                    metrics.record_complete(response.status);
                    attempts.push(AttemptRecord {
                        attempt,
                        delay,
                        outcome: AttemptOutcome::Success(response.status),
                    });
                    if attempt > 1 {
                        let context = RetryContext::new(
                            attempt,
                            max_attempts,
                            ErrorKind::Unclassified,
                            Duration::ZERO,
                            endpoint,
                            "",
                        );
                        info!("{}", context.format_success());
                    }
                    return Execution {
                        result: Ok(response),
                        attempts,
                    };
                }
                Ok(response) => {
                    metrics.record_complete(response.status);
                    ErrorClassifier::classify(response.status, &response.body)
                }
                Err(transport_err) => {
                    metrics.record_network_error();
                    ErrorClassifier::classify_transport(&transport_err)
                }
            };

            attempts.push(AttemptRecord {
                attempt,
                delay,
                outcome: AttemptOutcome::Failed(err.kind),
            });

            if err.is_no_results() {
                debug!(endpoint = %endpoint, "No results");
                return Execution {
                    result: Err(err),
                    attempts,
                };
            }

            if !err.retryable() || attempt >= max_attempts {
                let context = RetryContext::new(
                    attempt,
                    max_attempts,
                    err.kind,
                    Duration::ZERO,
                    endpoint,
                    err.to_string(),
                );
                error!(
                    endpoint = %endpoint,
                    status = ?err.status,
                    kind = %err.kind,
                    "{}",
                    context.format_failure()
                );
                return Execution {
                    result: Err(err),
                    attempts,
                };
            }

            delay = self.policy.backoff(attempt, err.kind);
            attempt += 1;

            let context = RetryContext::new(
                attempt,
                max_attempts,
                err.kind,
                delay,
                endpoint,
                err.to_string(),
            );
            warn!(
                endpoint = %endpoint,
                status = ?err.status,
                kind = %err.kind,
                "{}",
                context.format_retry()
            );
            record_retry_backoff(delay, attempt);

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return cancelled_execution(attempts, attempt, delay, endpoint);
                }
            }
        }
    }
}

fn cancelled_execution(
    mut attempts: Vec<AttemptRecord>,
    attempt: u32,
    delay: Duration,
    endpoint: &str,
) -> Execution {
    attempts.push(AttemptRecord {
        attempt,
        delay,
        outcome: AttemptOutcome::Cancelled,
    });
    warn!(endpoint = %endpoint, attempt, "Request cancelled");
    Execution {
        result: Err(ClassifiedError::cancelled()),
        attempts,
    }
}
