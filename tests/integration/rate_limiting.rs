//! Integration tests for rate limiting

use rentcast_ingest::cancel::CancelSignal;
use rentcast_ingest::client::{Admission, RateLimiter, RequestDescriptor, RetryExecutor};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::support::{quick_policy, MockTransport};

#[tokio::test(start_paused = true)]
async fn test_quota_two_five_sequential_acquires_take_two_seconds() {
    let limiter = RateLimiter::per_second(2);
    let start = Instant::now();

    for _ in 0..5 {
        limiter.acquire().await;
    }

    assert!(
        start.elapsed() >= Duration::from_secs(2),
        "elapsed {:?}",
        start.elapsed()
    );
    assert_eq!(limiter.granted().await, 5);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_burst_never_exceeds_quota() {
    const QUOTA: u32 = 3;
    const CALLERS: usize = 12;

    let limiter = Arc::new(RateLimiter::per_second(QUOTA));
    let grants = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let grants = Arc::clone(&grants);
            tokio::spawn(async move {
                limiter.acquire().await;
                grants.lock().unwrap().push(Instant::now());
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap();
    }

    let mut grants = grants.lock().unwrap().clone();
    grants.sort();
    assert_eq!(grants.len(), CALLERS);

    // Any QUOTA + 1 consecutive grants span at least one window
    for window in grants.windows(QUOTA as usize + 1) {
        let span = window[QUOTA as usize] - window[0];
        assert!(span >= Duration::from_secs(1), "span {span:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_while_queued_returns_without_token() {
    let limiter = RateLimiter::per_second(1);
    limiter.acquire().await;

    let cancel = CancelSignal::shared();
    let _deadline = cancel.cancel_after(Duration::from_millis(100));

    let start = Instant::now();
    let admission = limiter.acquire_or_cancel(&cancel).await;

    assert_eq!(admission, Admission::Cancelled);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(limiter.granted().await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_executors_sharing_a_limiter_share_the_quota() {
    let limiter = Arc::new(RateLimiter::per_second(2));
    let transport = MockTransport::always(200, "[]");
    let first = RetryExecutor::new(Arc::clone(&limiter), quick_policy(1));
    let second = RetryExecutor::new(Arc::clone(&limiter), quick_policy(1));
    let cancel = CancelSignal::new();
    let request = RequestDescriptor::get("/v1/markets");

    let start = Instant::now();
    let run = |executor: &RetryExecutor| {
        let executor = executor.clone();
        let transport = Arc::clone(&transport);
        let request = request.clone();
        let cancel = &cancel;
        async move {
            for _ in 0..4 {
                executor
                    .execute(&request, transport.as_ref(), cancel)
                    .await
                    .unwrap();
            }
        }
    };
    tokio::join!(run(&first), run(&second));

    // 8 grants at 2 per second: the last one cannot happen before t = 3s
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert_eq!(transport.calls(), 8);
    assert_eq!(limiter.granted().await, 8);
}

#[tokio::test]
async fn test_backoff_sleep_does_not_hold_limiter() {
    let limiter = Arc::new(RateLimiter::per_second(100));
    let executor = RetryExecutor::new(Arc::clone(&limiter), {
        let mut policy = quick_policy(2);
        policy.base_delay = Duration::from_millis(300);
        policy
    });
    let failing = MockTransport::statuses(&[500, 200]);
    let cancel = CancelSignal::new();

    let request = RequestDescriptor::get("/v1/properties");
    let retrying = executor.execute(&request, failing.as_ref(), &cancel);
    let other = async {
        // Give the first caller time to fail and start its backoff
        tokio::time::sleep(Duration::from_millis(50)).await;
        let start = std::time::Instant::now();
        limiter.acquire().await;
        start.elapsed()
    };

    let (result, waited) = tokio::join!(retrying, other);
    assert!(result.is_ok());
    assert!(waited < Duration::from_millis(200), "acquire blocked for {waited:?}");
}
