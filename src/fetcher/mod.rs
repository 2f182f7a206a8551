//! Remote fetching: classification, pagination and the [`Fetcher`] facade
//!
//! [`Fetcher`] is the only component that touches credentials. It builds one
//! [`RequestDescriptor`] per logical call, attaches the API key and default
//! headers, and hands it to the pagers.

use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::client::rate_limit::RateLimiter;
use crate::client::request::{ParamValue, RequestDescriptor, API_KEY_HEADER};
use crate::client::retry::{RetryExecutor, RetryPolicy};
use crate::client::transport::{build_http_client, HttpTransport, Transport, TransportError};
use crate::config::{AppConfig, ConfigError};
use crate::metrics::IngestMetrics;
use crate::page::{Page, PaginationCursor, ValidationError, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
use crate::storage::{QueryCriteria, RecordStore, StorageError, StoragePager};
use crate::{Endpoint, RawItem};

pub mod classifier;
pub mod envelope;
pub mod pagination;

pub use classifier::{classify, ClassifiedError, ErrorClassifier, ErrorKind};
pub use envelope::{EnvelopeParser, PageRequest};
pub use pagination::{PageStream, RemotePager};

/// Facade errors
#[derive(Debug, thiserror::Error)]
pub enum FetcherError {
    /// Terminal remote error after retries
    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    /// Bad pagination parameters
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Local store failure
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// HTTP client could not be built
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Invalid configuration
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Remote operation requested without an API key
    #[error("no API key configured (set RENTCAST_API_KEY or api_key in the config file)")]
    MissingApiKey,

    /// Store operation requested on a fetcher without a store
    #[error("no record store attached")]
    NoStore,
}

/// Result type for facade operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// RentCast API key; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw key value
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Per-fetcher paging and retry settings
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSettings {
    /// Page size requested when walking a collection
    pub page_size: u32,
    /// Upper bound on any page size
    pub max_page_size: u32,
    /// Default page budget per logical fetch
    pub max_pages: Option<u32>,
    /// Declared per-request timeout
    pub timeout: Duration,
    /// Attempt budget and backoff
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_LIMIT,
            max_page_size: MAX_PAGE_LIMIT,
            max_pages: None,
            timeout: Duration::from_secs(crate::config::REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
        }
    }
}

impl FetchSettings {
    /// Settings taken from a loaded configuration
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            max_pages: config.max_pages,
            timeout: config.request_timeout(),
            retry: config.retry_policy(),
        }
    }
}

/// One logical query against an endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Target endpoint
    pub endpoint: Endpoint,
    /// Single record id (`/v1/properties/{id}`)
    pub id: Option<String>,
    /// Query parameters, excluding `offset`/`limit`
    pub params: BTreeMap<String, ParamValue>,
}

impl Query {
    /// Query with no parameters
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            id: None,
            params: BTreeMap::new(),
        }
    }

    /// Add a query parameter
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Address a single record
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Request path
    pub fn path(&self) -> String {
        match &self.id {
            Some(id) => format!("{}/{}", self.endpoint.path(), id),
            None => self.endpoint.path().to_string(),
        }
    }

    /// Whether this query walks pages
    pub fn is_paginated(&self) -> bool {
        self.endpoint.is_paginated() && self.id.is_none()
    }
}

/// Outcome of an [`Fetcher::ingest`] run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Pages received
    pub pages: u32,
    /// Items received
    pub fetched: u64,
    /// Rows written to the store
    pub stored: u64,
}

/// RentCast fetcher
///
/// Cheap to clone; clones share the transport, the rate limiter and the
/// cancellation signal.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    executor: Arc<RetryExecutor>,
    api_key: ApiKey,
    settings: FetchSettings,
    store: Option<RecordStore>,
    cancel: Arc<CancelSignal>,
}

impl Fetcher {
    /// Create a fetcher
    ///
    /// # Arguments
    /// * `transport` - Transport every attempt goes through
    /// * `limiter` - Rate limiter shared with any other fetcher on the same quota
    /// * `api_key` - Credential attached to every request
    /// * `settings` - Paging and retry settings
    pub fn new(
        transport: Arc<dyn Transport>,
        limiter: Arc<RateLimiter>,
        api_key: ApiKey,
        settings: FetchSettings,
    ) -> Self {
        let executor = Arc::new(RetryExecutor::new(limiter, settings.retry.clone()));
        Self {
            transport,
            executor,
            api_key,
            settings,
            store: None,
            cancel: CancelSignal::shared(),
        }
    }

    /// HTTP fetcher built from configuration
    ///
    /// # Errors
    /// [`FetcherError::MissingApiKey`] when no key is configured.
    pub fn from_config(config: &AppConfig) -> FetcherResult<Self> {
        config.validate()?;

        let api_key = config
            .api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(ApiKey::new)
            .ok_or(FetcherError::MissingApiKey)?;

        let client = build_http_client(&config.user_agent)?;
        let transport = HttpTransport::new(Arc::new(client), config.base_url.clone());
        let limiter = Arc::new(RateLimiter::per_second(config.requests_per_second));

        info!(
            base_url = %config.base_url,
            requests_per_second = config.requests_per_second,
            max_attempts = config.max_attempts,
            "Fetcher initialized"
        );

        Ok(Self::new(
            Arc::new(transport),
            limiter,
            api_key,
            FetchSettings::from_config(config),
        ))
    }

    /// Attach a local store for [`Fetcher::ingest`] and [`Fetcher::stored_page`]
    pub fn with_store(mut self, store: RecordStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Use `cancel` for every call made through this fetcher
    pub fn with_cancel(mut self, cancel: Arc<CancelSignal>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancellation signal in use
    pub fn cancel_signal(&self) -> &Arc<CancelSignal> {
        &self.cancel
    }

    /// Settings in use
    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Shared rate limiter
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        self.executor.limiter()
    }

    /// Attached store, if any
    pub fn store(&self) -> Option<&RecordStore> {
        self.store.as_ref()
    }

    /// Request descriptor for `query`, with credentials and default headers
    pub fn build_request(&self, query: &Query) -> RequestDescriptor {
        let mut request = RequestDescriptor::get(query.path())
            .header(API_KEY_HEADER, self.api_key.expose())
            .header("accept", "application/json")
            .timeout(self.settings.timeout);

        for (key, value) in &query.params {
            request = request.param(key.clone(), value.clone());
        }

        request
    }

    fn remote_pager(&self) -> RemotePager {
        RemotePager::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.transport),
            self.settings.max_page_size,
            Arc::clone(&self.cancel),
        )
    }

    /// Lazy sequence of pages for `query`
    ///
    /// `max_pages = None` falls back to the configured page budget.
    pub fn stream(&self, query: &Query, max_pages: Option<u32>) -> PageStream {
        let request = self.build_request(query);
        let source = Some(query.endpoint.source_label().to_string());
        let pager = self.remote_pager();

        if query.is_paginated() {
            pager.paginate(
                request,
                self.settings.page_size,
                max_pages.or(self.settings.max_pages),
                source,
            )
        } else {
            pager.once(request, source)
        }
    }

    /// Drain up to `max_pages` pages, in order
    pub async fn fetch_pages(
        &self,
        query: &Query,
        max_pages: Option<u32>,
    ) -> FetcherResult<Vec<Page<RawItem>>> {
        let mut stream = self.stream(query, max_pages);
        let mut pages = Vec::new();

        while let Some(page) = stream.next().await {
            pages.push(page?);
        }

        Ok(pages)
    }

    /// Drain up to `max_pages` pages into one ordered list of items
    pub async fn fetch_all(&self, query: &Query, max_pages: Option<u32>) -> FetcherResult<Vec<RawItem>> {
        let pages = self.fetch_pages(query, max_pages).await?;
        let items: Vec<RawItem> = pages.into_iter().flat_map(|page| page.items).collect();

        debug!(endpoint = %query.endpoint, items = items.len(), "Fetched all pages");
        Ok(items)
    }

    /// First item of a single-request query; `None` when there are no results
    pub async fn fetch_one(&self, query: &Query) -> FetcherResult<Option<RawItem>> {
        let request = self.build_request(query);
        let source = Some(query.endpoint.source_label().to_string());
        let mut stream = self.remote_pager().once(request, source);

        match stream.next().await {
            Some(page) => Ok(page?.items.into_iter().next()),
            None => Ok(None),
        }
    }

    /// Whether the API accepts our credentials
    ///
    /// Requests one property record. A `NoResults` answer still proves the
    /// key works.
    pub async fn test_connection(&self) -> bool {
        let request = self
            .build_request(&Query::new(Endpoint::Properties))
            .with_page(0, 1);

        match self
            .executor
            .execute(&request, self.transport.as_ref(), &self.cancel)
            .await
        {
            Ok(_) => {
                info!("Connection test succeeded");
                true
            }
            Err(err) if err.is_no_results() => {
                info!("Connection test succeeded (no results)");
                true
            }
            Err(err) => {
                warn!(
                    kind = %err.kind,
                    status = ?err.status,
                    recommendation = err.recommendation(),
                    "Connection test failed"
                );
                false
            }
        }
    }

    /// Fetch `query` page by page into the attached store
    ///
    /// Pages stored before a terminal error stay stored; the error is
    /// returned.
    pub async fn ingest(&self, query: &Query, max_pages: Option<u32>) -> FetcherResult<IngestSummary> {
        let store = self.store.as_ref().ok_or(FetcherError::NoStore)?;
        let metrics = IngestMetrics::start(query.endpoint.to_string());
        let source = query.endpoint.source_label();
        let endpoint = query.endpoint.to_string();

        let mut summary = IngestSummary::default();
        let mut stream = self.stream(query, max_pages);

        while let Some(page) = stream.next().await {
            let stored = match page {
                Ok(page) => {
                    metrics.record_page(page.len());
                    summary.pages += 1;
                    summary.fetched += page.len() as u64;
                    store
                        .upsert_items(&page.items, source, &endpoint)
                        .await
                        .map_err(FetcherError::from)
                }
                Err(err) => Err(FetcherError::from(err)),
            };

            match stored {
                Ok(written) => {
                    metrics.record_stored(written);
                    summary.stored += written;
                }
                Err(err) => {
                    warn!(
                        endpoint = %endpoint,
                        pages = summary.pages,
                        stored = summary.stored,
                        "Ingestion stopped early; stored pages are kept"
                    );
                    metrics.record_failure(&err.to_string());
                    return Err(err);
                }
            }
        }

        metrics.record_success(summary.pages, summary.fetched, summary.stored);
        Ok(summary)
    }

    /// One page from the attached store
    pub async fn stored_page(
        &self,
        criteria: &QueryCriteria,
        cursor: &PaginationCursor,
    ) -> FetcherResult<Page<RawItem>> {
        let store = self.store.as_ref().ok_or(FetcherError::NoStore)?;
        let pager = StoragePager::new(store.clone(), self.settings.max_page_size);
        Ok(pager.paginate(criteria, cursor).await?)
    }
}

impl fmt::Debug for Fetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetcher")
            .field("api_key", &self.api_key)
            .field("settings", &self.settings)
            .field("has_store", &self.store.is_some())
            .finish_non_exhaustive()
    }
}
