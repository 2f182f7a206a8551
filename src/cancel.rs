//! Cancellation signalling for in-flight calls.
//!
//! A [`CancelSignal`] is shared by every stage of a call (limiter queue, send,
//! backoff sleep). Once cancelled it stays cancelled; callers that need a fresh
//! signal construct a new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

/// Shared handle to a cancellation signal.
pub type SharedCancel = Arc<CancelSignal>;

/// One-shot cancellation flag that async tasks can wait on.
#[derive(Debug, Default)]
pub struct CancelSignal {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// Create a signal that is not yet cancelled.
    pub fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Create a new shared signal wrapped in [`Arc`].
    pub fn shared() -> SharedCancel {
        Arc::new(Self::new())
    }

    /// Cancel. Wakes all current waiters exactly once.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            self.notify.notify_waiters();
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled. Returns immediately if already set.
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a concurrent cancel() is not missed
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// Cancel this signal once `deadline` has elapsed.
    ///
    /// The timer task holds its own handle, so dropping every other handle does
    /// not stop it.
    pub fn cancel_after(self: &Arc<Self>, deadline: Duration) -> tokio::task::JoinHandle<()> {
        let signal = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    debug!(deadline_ms = deadline.as_millis() as u64, "Deadline elapsed, cancelling");
                    signal.cancel();
                }
                _ = signal.cancelled() => {}
            }
        })
    }
}
