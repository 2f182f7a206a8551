//! HTTP client plumbing
//!
//! - [`request`] - Immutable request descriptors
//! - [`transport`] - The [`transport::Transport`] seam and its reqwest implementation
//! - [`rate_limit`] - The shared request-rate governor
//! - [`retry`] - Bounded, classified retry execution

pub mod rate_limit;
pub mod request;
pub mod retry;
pub mod transport;

pub use rate_limit::{Admission, RateLimiter};
pub use request::{ParamValue, RequestDescriptor};
pub use retry::{AttemptOutcome, AttemptRecord, Execution, RetryExecutor, RetryPolicy};
pub use transport::{FnTransport, HttpTransport, RawResponse, Transport, TransportError};
