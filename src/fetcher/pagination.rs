//! Remote pagination over RentCast collections
//!
//! [`RemotePager::paginate`] returns a lazy, single-pass [`PageStream`]. Each
//! poll issues one request through the [`RetryExecutor`]; no page is requested
//! before the previous one has resolved, so offsets are strictly increasing.
//!
//! Termination:
//! - the page reports no more results
//! - the page budget is spent
//! - a terminal error, yielded as the last item (pages already yielded stay valid)
//!
//! `NoResults` ends the stream without an error. On the first page this means
//! an empty stream.
//!
//! A hard page guard (`MAX_PAGES_GUARD`) bounds every walk, even when the
//! caller passes no page budget.

use futures_util::stream::{self, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::client::request::RequestDescriptor;
use crate::client::retry::RetryExecutor;
use crate::client::transport::Transport;
use crate::config::MAX_PAGES_GUARD;
use crate::fetcher::classifier::ClassifiedError;
use crate::fetcher::envelope::{EnvelopeParser, PageRequest};
use crate::page::{Page, PaginationCursor};
use crate::RawItem;

/// Lazy sequence of pages; ends after the first `Err`
pub type PageStream = Pin<Box<dyn Stream<Item = Result<Page<RawItem>, ClassifiedError>> + Send>>;

/// Drives the retry executor across successive pages of one collection
#[derive(Clone)]
pub struct RemotePager {
    executor: Arc<RetryExecutor>,
    transport: Arc<dyn Transport>,
    max_limit: u32,
    cancel: Arc<CancelSignal>,
}

struct PagerState {
    pager: RemotePager,
    base: RequestDescriptor,
    cursor: PaginationCursor,
    source: Option<String>,
    done: bool,
}

impl RemotePager {
    /// Create a pager
    ///
    /// # Arguments
    /// * `executor` - Retry executor (shares the client's rate limiter)
    /// * `transport` - Transport every attempt goes through
    /// * `max_limit` - Upper bound applied to the requested page size
    /// * `cancel` - Cancellation signal honoured by every request
    pub fn new(
        executor: Arc<RetryExecutor>,
        transport: Arc<dyn Transport>,
        max_limit: u32,
        cancel: Arc<CancelSignal>,
    ) -> Self {
        Self {
            executor,
            transport,
            max_limit: max_limit.max(1),
            cancel,
        }
    }

    /// Largest page size this pager requests
    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// Walk a paginated collection
    ///
    /// `page_size` is clamped to `[1, max_limit]`. With `max_pages = None` the
    /// walk is bounded only by the iteration guard.
    pub fn paginate(
        &self,
        base: RequestDescriptor,
        page_size: u32,
        max_pages: Option<u32>,
        source: Option<String>,
    ) -> PageStream {
        let max_pages = Some(max_pages.unwrap_or(MAX_PAGES_GUARD).min(MAX_PAGES_GUARD));
        let cursor = PaginationCursor::clamped(page_size, self.max_limit).with_max_pages(max_pages);

        let state = PagerState {
            pager: self.clone(),
            base,
            cursor,
            source,
            done: false,
        };

        Box::pin(stream::unfold(state, |mut state| async move {
            let item = state.next_page().await?;
            Some((item, state))
        }))
    }

    /// Issue a single request for a non-paginated endpoint
    ///
    /// Yields one page, no pages (NoResults), or one error.
    pub fn once(&self, request: RequestDescriptor, source: Option<String>) -> PageStream {
        let pager = self.clone();
        Box::pin(stream::once(async move { pager.fetch_single(&request, source).await }).filter_map(
            |result| async move {
                match result {
                    Ok(Some(page)) => Some(Ok(page)),
                    Ok(None) => None,
                    Err(err) => Some(Err(err)),
                }
            },
        ))
    }

    async fn fetch_single(
        &self,
        request: &RequestDescriptor,
        source: Option<String>,
    ) -> Result<Option<Page<RawItem>>, ClassifiedError> {
        match self
            .executor
            .execute(request, self.transport.as_ref(), &self.cancel)
            .await
        {
            Ok(response) => {
                let page = EnvelopeParser::decode_page(
                    response.status,
                    &response.body,
                    PageRequest {
                        offset: 0,
                        limit: self.max_limit,
                    },
                    source.as_deref(),
                )?;
                // A single request is always the whole result
                Ok(Some(Page::last(page.items, 0, page.total_count, page.source)))
            }
            Err(err) if err.is_no_results() => {
                info!(endpoint = %request.path, "No results");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl PagerState {
    /// Produce the next stream item, or `None` once the stream is finished
    async fn next_page(&mut self) -> Option<Result<Page<RawItem>, ClassifiedError>> {
        if self.done {
            return None;
        }

        if self.cursor.budget_exhausted() {
            debug!(
                endpoint = %self.base.path,
                pages = self.cursor.pages_yielded(),
                "Page budget reached"
            );
            self.done = true;
            return None;
        }

        let offset = self.cursor.offset_u64();
        let limit = self.cursor.limit_u32();
        let request = self.base.with_page(offset, limit);

        debug!(
            endpoint = %self.base.path,
            page = self.cursor.pages_yielded() + 1,
            offset = offset,
            limit = limit,
            "Fetching page"
        );

        let response = match self
            .pager
            .executor
            .execute(&request, self.pager.transport.as_ref(), &self.pager.cancel)
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_no_results() => {
                info!(
                    endpoint = %self.base.path,
                    offset = offset,
                    pages = self.cursor.pages_yielded(),
                    "No results, ending pagination"
                );
                self.done = true;
                return None;
            }
            Err(err) => {
                warn!(
                    endpoint = %self.base.path,
                    offset = offset,
                    pages = self.cursor.pages_yielded(),
                    kind = %err.kind,
                    "Pagination stopped by terminal error"
                );
                self.done = true;
                return Some(Err(err));
            }
        };

        let page = match EnvelopeParser::decode_page(
            response.status,
            &response.body,
            PageRequest { offset, limit },
            self.source.as_deref(),
        ) {
            Ok(page) => page,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        self.cursor.advance(page.next_offset);

        if page.has_more {
            debug!(
                endpoint = %self.base.path,
                items = page.len(),
                next_offset = ?page.next_offset,
                "Page received"
            );
        } else {
            info!(
                endpoint = %self.base.path,
                pages = self.cursor.pages_yielded(),
                "Reached end of results"
            );
            self.done = true;
        }

        Some(Ok(page))
    }
}
