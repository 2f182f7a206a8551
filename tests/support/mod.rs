//! Shared fixtures: scripted transports and fast executors

#![allow(dead_code)]

use async_trait::async_trait;
use rentcast_ingest::client::{
    RateLimiter, RawResponse, RequestDescriptor, RetryExecutor, RetryPolicy, Transport,
    TransportError,
};
use rentcast_ingest::fetcher::{ApiKey, FetchSettings, Fetcher};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Transport replaying a fixed script of outcomes
///
/// Once the script runs out, the last outcome repeats.
pub struct MockTransport {
    script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    last: Mutex<Option<Result<RawResponse, TransportError>>>,
    requests: Mutex<Vec<RequestDescriptor>>,
    delay: Duration,
}

impl MockTransport {
    pub fn new(script: Vec<Result<RawResponse, TransportError>>) -> Arc<Self> {
        Self::with_delay(script, Duration::ZERO)
    }

    /// Each send waits `delay` before answering
    pub fn with_delay(
        script: Vec<Result<RawResponse, TransportError>>,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            delay,
        })
    }

    /// Always answer with `status` and `body`
    pub fn always(status: u16, body: &str) -> Arc<Self> {
        Self::new(vec![Ok(RawResponse::new(status, body))])
    }

    /// Answer with each status in turn, with an empty JSON body
    pub fn statuses(statuses: &[u16]) -> Arc<Self> {
        Self::new(
            statuses
                .iter()
                .map(|&status| Ok(RawResponse::new(status, "{}")))
                .collect(),
        )
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(outcome) => {
                *self.last.lock().unwrap() = Some(outcome.clone());
                outcome
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Err(TransportError::Other("empty script".to_string()))),
        }
    }
}

/// Paged collection served in the RentCast envelope format
///
/// Items are `{"id": "item-<n>", "price": <n>}`; `offset`/`limit` are read
/// from the request query.
pub struct PagedServer {
    total: u64,
    failures: Mutex<HashMap<u64, VecDeque<u16>>>,
    offsets: Mutex<Vec<u64>>,
    calls: AtomicUsize,
}

impl PagedServer {
    pub fn new(total: u64) -> Arc<Self> {
        Arc::new(Self {
            total,
            failures: Mutex::new(HashMap::new()),
            offsets: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Answer requests at `offset` with these statuses first
    pub fn fail_at(self: &Arc<Self>, offset: u64, statuses: &[u16]) -> Arc<Self> {
        self.failures
            .lock()
            .unwrap()
            .insert(offset, statuses.iter().copied().collect());
        Arc::clone(self)
    }

    /// Offsets of every request, in order
    pub fn offsets(&self) -> Vec<u64> {
        self.offsets.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn query_u64(request: &RequestDescriptor, key: &str) -> Option<u64> {
    request
        .query
        .get(key)
        .and_then(|value| value.to_string().parse().ok())
}

#[async_trait]
impl Transport for PagedServer {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let offset = query_u64(request, "offset").unwrap_or(0);
        let limit = query_u64(request, "limit").unwrap_or(50);
        self.offsets.lock().unwrap().push(offset);

        if let Some(queue) = self.failures.lock().unwrap().get_mut(&offset) {
            if let Some(status) = queue.pop_front() {
                return Ok(RawResponse::new(status, "{}"));
            }
        }

        if self.total == 0 {
            return Ok(RawResponse::new(
                404,
                json!({"status": 404, "error": "not-found", "message": "No data found"}).to_string(),
            ));
        }

        let end = (offset + limit).min(self.total);
        let data: Vec<_> = (offset..end)
            .map(|n| json!({"id": format!("item-{n}"), "price": n}))
            .collect();
        let has_more = end < self.total;

        let body = json!({
            "data": data,
            "totalCount": self.total,
            "hasMore": has_more,
            "nextOffset": if has_more { Some(end) } else { None },
        });
        Ok(RawResponse::new(200, body.to_string()))
    }
}

/// Retry policy with tiny delays and no jitter
pub fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        jitter_ratio: 0.0,
    }
}

/// Executor whose limiter never gets in the way
pub fn quick_executor(max_attempts: u32) -> RetryExecutor {
    RetryExecutor::new(Arc::new(RateLimiter::per_second(10_000)), quick_policy(max_attempts))
}

/// Fetcher over `transport` with `page_size` pages and quick retries
pub fn test_fetcher(transport: Arc<dyn Transport>, page_size: u32, max_attempts: u32) -> Fetcher {
    let settings = FetchSettings {
        page_size,
        retry: quick_policy(max_attempts),
        ..FetchSettings::default()
    };
    Fetcher::new(
        transport,
        Arc::new(RateLimiter::per_second(10_000)),
        ApiKey::new("test-key"),
        settings,
    )
}
