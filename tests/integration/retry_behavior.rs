//! Integration tests for bounded, classified retries
//!
//! All tests run on paused time so real backoff delays cost nothing.

use rentcast_ingest::cancel::CancelSignal;
use rentcast_ingest::client::{
    AttemptOutcome, RateLimiter, RawResponse, RequestDescriptor, RetryExecutor, RetryPolicy,
    TransportError,
};
use rentcast_ingest::fetcher::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::support::MockTransport;

fn executor(max_attempts: u32) -> RetryExecutor {
    RetryExecutor::new(
        Arc::new(RateLimiter::per_second(1000)),
        RetryPolicy::with_max_attempts(max_attempts),
    )
}

fn request() -> RequestDescriptor {
    RequestDescriptor::get("/v1/listings/sale").param("city", "Austin")
}

#[tokio::test(start_paused = true)]
async fn test_always_500_stops_after_max_attempts() {
    let transport = MockTransport::always(500, r#"{"message":"Internal error"}"#);
    let cancel = CancelSignal::new();

    let execution = executor(3)
        .execute_recorded(&request(), transport.as_ref(), &cancel)
        .await;

    let err = execution.result.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServerError);
    assert_eq!(err.status, Some(500));
    assert_eq!(transport.calls(), 3);
    assert_eq!(execution.attempts.len(), 3);
    assert!(execution
        .attempts
        .iter()
        .all(|record| record.outcome == AttemptOutcome::Failed(ErrorKind::ServerError)));
}

#[tokio::test(start_paused = true)]
async fn test_404_makes_exactly_one_attempt() {
    let transport = MockTransport::always(404, r#"{"message":"No data found"}"#);
    let cancel = CancelSignal::new();

    let err = executor(3)
        .execute(&request(), transport.as_ref(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::NoResults);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_retryable_statuses_make_one_attempt() {
    for status in [400, 401, 405, 418] {
        let transport = MockTransport::always(status, "{}");
        let cancel = CancelSignal::new();

        let err = executor(5)
            .execute(&request(), transport.as_ref(), &cancel)
            .await
            .unwrap_err();

        assert!(!err.retryable());
        assert_eq!(transport.calls(), 1, "status {status}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_500_500_200_recovers_after_two_backoffs() {
    let transport = MockTransport::new(vec![
        Ok(RawResponse::new(500, "{}")),
        Ok(RawResponse::new(500, "{}")),
        Ok(RawResponse::new(200, r#"{"data": [{"id": "a"}]}"#)),
    ]);
    let cancel = CancelSignal::new();
    let start = Instant::now();

    let execution = executor(3)
        .execute_recorded(&request(), transport.as_ref(), &cancel)
        .await;

    let response = execution.result.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(transport.calls(), 3);

    let delays: Vec<_> = execution.attempts.iter().map(|r| r.delay).collect();
    assert_eq!(delays[0], Duration::ZERO);
    assert!(delays[1] >= Duration::from_secs(1));
    assert!(delays[2] >= Duration::from_secs(2));
    assert!(delays.iter().all(|d| *d <= Duration::from_secs(20)));
    assert_eq!(execution.attempts[2].outcome, AttemptOutcome::Success(200));

    assert!(start.elapsed() >= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_504_504_200_recovers_within_timeout_ceiling() {
    let transport = MockTransport::new(vec![
        Ok(RawResponse::new(504, "{}")),
        Ok(RawResponse::new(504, "{}")),
        Ok(RawResponse::new(200, r#"{"data": [{"id": "a"}]}"#)),
    ]);
    let cancel = CancelSignal::new();

    let execution = executor(3)
        .execute_recorded(&request(), transport.as_ref(), &cancel)
        .await;

    assert_eq!(execution.result.unwrap().status, 200);
    assert_eq!(transport.calls(), 3);
    assert_eq!(
        execution.attempts[0].outcome,
        AttemptOutcome::Failed(ErrorKind::Timeout)
    );
    assert!(execution
        .attempts
        .iter()
        .all(|record| record.delay <= Duration::from_secs(30)));
    assert_eq!(execution.attempts[2].outcome, AttemptOutcome::Success(200));
}

#[tokio::test(start_paused = true)]
async fn test_always_504_backoff_capped_at_timeout_ceiling() {
    let transport = MockTransport::always(504, "{}");
    let cancel = CancelSignal::new();

    let execution = executor(8)
        .execute_recorded(&request(), transport.as_ref(), &cancel)
        .await;

    assert_eq!(execution.result.unwrap_err().kind, ErrorKind::Timeout);
    assert_eq!(transport.calls(), 8);
    let max_delay = execution.attempts.iter().map(|r| r.delay).max().unwrap();
    assert_eq!(max_delay, Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_delays_never_exceed_ceiling() {
    let transport = MockTransport::always(429, "{}");
    let cancel = CancelSignal::new();

    let execution = executor(10)
        .execute_recorded(&request(), transport.as_ref(), &cancel)
        .await;

    assert_eq!(execution.result.unwrap_err().kind, ErrorKind::RateLimited);
    assert_eq!(transport.calls(), 10);
    let max_delay = execution.attempts.iter().map(|r| r.delay).max().unwrap();
    assert!(max_delay <= Duration::from_secs(60));
    assert_eq!(max_delay, Duration::from_secs(60), "later attempts hit the ceiling");
}

#[tokio::test(start_paused = true)]
async fn test_transport_timeout_is_retried() {
    let transport = MockTransport::new(vec![
        Err(TransportError::Timeout("operation timed out".into())),
        Ok(RawResponse::new(200, "[]")),
    ]);
    let cancel = CancelSignal::new();

    let response = executor(3)
        .execute(&request(), transport.as_ref(), &cancel)
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_connect_failure_is_not_retried() {
    let transport = MockTransport::new(vec![Err(TransportError::Connect("connection refused".into()))]);
    let cancel = CancelSignal::new();

    let err = executor(3)
        .execute(&request(), transport.as_ref(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unclassified);
    assert_eq!(err.status, None);
    assert_eq!(transport.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_execute_sends_nothing() {
    let transport = MockTransport::always(200, "[]");
    let cancel = CancelSignal::new();
    cancel.cancel();

    let err = executor(3)
        .execute(&request(), transport.as_ref(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert_eq!(err.status, None);
    assert_eq!(transport.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_stops_retrying() {
    let transport = MockTransport::always(500, "{}");
    let cancel = CancelSignal::shared();
    let _deadline = cancel.cancel_after(Duration::from_millis(500));

    let execution = executor(5)
        .execute_recorded(&request(), transport.as_ref(), &cancel)
        .await;

    assert_eq!(execution.result.unwrap_err().kind, ErrorKind::Timeout);
    assert_eq!(transport.calls(), 1);
    assert_eq!(
        execution.attempts.last().map(|r| r.outcome),
        Some(AttemptOutcome::Cancelled)
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_send_returns_timeout() {
    let transport = MockTransport::with_delay(
        vec![Ok(RawResponse::new(200, "[]"))],
        Duration::from_secs(10),
    );
    let cancel = CancelSignal::shared();
    let _deadline = cancel.cancel_after(Duration::from_secs(1));
    let start = Instant::now();

    let err = executor(3)
        .execute(&request(), transport.as_ref(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(start.elapsed() < Duration::from_secs(10));
    assert_eq!(transport.calls(), 1);
}
