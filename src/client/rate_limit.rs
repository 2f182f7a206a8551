//! Request-rate governor
//!
//! A sliding-window token bucket: the bucket holds `quota` tokens, and a spent
//! token returns to the bucket one window after it was granted. Any `quota + 1`
//! consecutive grants therefore span at least one window, even under bursts.
//!
//! Every acquisition runs under a single [`tokio::sync::Mutex`]. The lock is held
//! while waiting for the next token so queued callers are admitted in arrival
//! order; retry backoff sleeps happen elsewhere and never hold it.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::cancel::CancelSignal;
use crate::metrics::RateLimiterMetrics;

/// Result of a cancellable acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// A token was granted
    Granted,
    /// The caller was cancelled before a token was granted
    Cancelled,
}

/// Mutable limiter state, guarded by the limiter's mutex
#[derive(Debug)]
pub struct RateLimitState {
    quota: u32,
    last_grant: Option<Instant>,
    granted: u64,
    recent: VecDeque<Instant>,
}

impl RateLimitState {
    fn new(quota: u32) -> Self {
        Self {
            quota,
            last_grant: None,
            granted: 0,
            recent: VecDeque::with_capacity(quota as usize),
        }
    }

    /// Drop grants older than `window` relative to `now`
    fn refill(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.recent.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Tokens currently available
    fn available(&self) -> u32 {
        self.quota.saturating_sub(self.recent.len() as u32)
    }

    fn grant(&mut self, now: Instant) {
        self.recent.push_back(now);
        self.last_grant = Some(now);
        self.granted += 1;
    }

    /// Instant at which the oldest outstanding token returns
    fn next_refill(&self, window: Duration) -> Option<Instant> {
        self.recent.front().map(|&oldest| oldest + window)
    }
}

/// Shared request-rate limiter
///
/// Construct once per client and share it (behind an `Arc`) with every
/// component that issues requests.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<RateLimitState>,
    window: Duration,
}

impl RateLimiter {
    /// Limiter allowing `quota` grants per `window`
    ///
    /// # Arguments
    /// * `quota` - Maximum grants per window (a quota of 0 is treated as 1)
    /// * `window` - Time window the quota applies to
    pub fn new(quota: u32, window: Duration) -> Self {
        Self {
            state: Mutex::new(RateLimitState::new(quota.max(1))),
            window,
        }
    }

    /// Limiter allowing `quota` requests per second
    pub fn per_second(quota: u32) -> Self {
        Self::new(quota, Duration::from_secs(1))
    }

    /// Block until a token can be granted without exceeding the quota
    ///
    /// Never fails; only delays.
    pub async fn acquire(&self) {
        let mut metrics = RateLimiterMetrics::new();
        metrics.start_acquire();

        let mut state = self.state.lock().await;
        let admission = self.wait_for_token(&mut state, None).await;
        debug_assert_eq!(admission, Admission::Granted);

        metrics.record_acquired();
        metrics.update_available_permits(state.available());
    }

    /// Like [`RateLimiter::acquire`], but gives up once `cancel` fires
    ///
    /// A cancelled caller consumes no token.
    pub async fn acquire_or_cancel(&self, cancel: &CancelSignal) -> Admission {
        if cancel.is_cancelled() {
            return Admission::Cancelled;
        }

        let mut metrics = RateLimiterMetrics::new();
        metrics.start_acquire();

        let mut state = tokio::select! {
            state = self.state.lock() => state,
            _ = cancel.cancelled() => return Admission::Cancelled,
        };

        let admission = self.wait_for_token(&mut state, Some(cancel)).await;
        if admission == Admission::Granted {
            metrics.record_acquired();
            metrics.update_available_permits(state.available());
        }
        admission
    }

    async fn wait_for_token(
        &self,
        state: &mut RateLimitState,
        cancel: Option<&CancelSignal>,
    ) -> Admission {
        loop {
            let now = Instant::now();
            state.refill(now, self.window);

            if state.available() > 0 {
                state.grant(now);
                return Admission::Granted;
            }

            let Some(wake_at) = state.next_refill(self.window) else {
                // Quota is never zero, so an empty window always has a token
                state.grant(now);
                return Admission::Granted;
            };

            debug!(
                wait_ms = wake_at.saturating_duration_since(now).as_millis() as u64,
                granted = state.granted,
                "Rate limit reached, waiting for next token"
            );

            match cancel {
                Some(cancel) => {
                    tokio::select! {
                        _ = sleep_until(wake_at) => {}
                        _ = cancel.cancelled() => return Admission::Cancelled,
                    }
                }
                None => sleep_until(wake_at).await,
            }
        }
    }

    /// Configured quota per window
    pub async fn quota(&self) -> u32 {
        self.state.lock().await.quota
    }

    /// Window the quota applies to
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Total tokens granted since construction
    pub async fn granted(&self) -> u64 {
        self.state.lock().await.granted
    }

    /// Instant of the most recent grant
    pub async fn last_grant(&self) -> Option<Instant> {
        self.state.lock().await.last_grant
    }
}
