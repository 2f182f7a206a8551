//! Pagination data shapes shared by the remote and local pagers.
//!
//! A [`Page`] is one bounded slice of an ordered collection. Both pagers build
//! pages through [`Page::new`], which derives `has_more` from `next_offset` so
//! the two can never disagree.

use serde::{Deserialize, Serialize};

/// Default page size when the caller does not ask for one
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Largest page size the RentCast API accepts
pub const MAX_PAGE_LIMIT: u32 = 500;

/// One slice of a larger ordered collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Items in collection order
    pub items: Vec<T>,
    /// Offset this page was requested at
    pub offset: u64,
    /// Total size of the collection, when the source reports it
    pub total_count: Option<u64>,
    /// Whether another page follows
    pub has_more: bool,
    /// Offset of the next page; present iff `has_more`
    pub next_offset: Option<u64>,
    /// Where the page came from (endpoint label or store)
    pub source: Option<String>,
}

impl<T> Page<T> {
    /// Build a page. `has_more` is derived from `next_offset`.
    pub fn new(
        items: Vec<T>,
        offset: u64,
        total_count: Option<u64>,
        next_offset: Option<u64>,
        source: Option<String>,
    ) -> Self {
        Self {
            items,
            offset,
            total_count,
            has_more: next_offset.is_some(),
            next_offset,
            source,
        }
    }

    /// Build the final page of a collection
    pub fn last(items: Vec<T>, offset: u64, total_count: Option<u64>, source: Option<String>) -> Self {
        Self::new(items, offset, total_count, None, source)
    }

    /// Number of items on this page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the page holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Transform every item, keeping the pagination metadata
    pub fn map<U, F>(self, f: F) -> Page<U>
    where
        F: FnMut(T) -> U,
    {
        Page {
            items: self.items.into_iter().map(f).collect(),
            offset: self.offset,
            total_count: self.total_count,
            has_more: self.has_more,
            next_offset: self.next_offset,
            source: self.source,
        }
    }

    /// Validate page metadata integrity
    pub fn validate(&self) -> Result<(), String> {
        if self.has_more != self.next_offset.is_some() {
            return Err(format!(
                "has_more ({}) disagrees with next_offset ({:?})",
                self.has_more, self.next_offset
            ));
        }

        if let Some(next) = self.next_offset {
            if next <= self.offset {
                return Err(format!(
                    "next_offset ({next}) must exceed offset ({})",
                    self.offset
                ));
            }
        }

        Ok(())
    }
}

/// Invalid pagination parameters, rejected before any query runs
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Limit outside `[1, max]`
    #[error("limit must be between 1 and {max}, got {limit}")]
    LimitOutOfRange {
        /// Requested limit
        limit: i64,
        /// Configured maximum
        max: u32,
    },

    /// Negative offset
    #[error("offset must be non-negative, got {0}")]
    NegativeOffset(i64),
}

/// Mutable offset/limit state for one paginated query
///
/// Fields are signed so that raw caller input (CLI flags, query strings) can be
/// carried as-is and rejected by [`PaginationCursor::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationCursor {
    /// Offset of the next page to request
    pub offset: i64,
    /// Page size
    pub limit: i64,
    /// Optional page budget
    pub max_pages: Option<u32>,
    pages_yielded: u32,
}

impl Default for PaginationCursor {
    fn default() -> Self {
        Self::new(0, i64::from(DEFAULT_PAGE_LIMIT))
    }
}

impl PaginationCursor {
    /// Create a cursor at `offset` with page size `limit`
    pub fn new(offset: i64, limit: i64) -> Self {
        Self {
            offset,
            limit,
            max_pages: None,
            pages_yielded: 0,
        }
    }

    /// Cursor starting at offset 0 with `limit` bounded to `[1, max_limit]`
    pub fn clamped(limit: u32, max_limit: u32) -> Self {
        let limit = limit.clamp(1, max_limit.max(1));
        Self::new(0, i64::from(limit))
    }

    /// Attach a page budget
    pub fn with_max_pages(mut self, max_pages: Option<u32>) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Check `limit ∈ [1, max_limit]` and `offset ≥ 0`
    pub fn validate(&self, max_limit: u32) -> Result<(), ValidationError> {
        if self.limit < 1 || self.limit > i64::from(max_limit) {
            return Err(ValidationError::LimitOutOfRange {
                limit: self.limit,
                max: max_limit,
            });
        }

        if self.offset < 0 {
            return Err(ValidationError::NegativeOffset(self.offset));
        }

        Ok(())
    }

    /// Offset as an unsigned value (negative offsets read as 0)
    pub fn offset_u64(&self) -> u64 {
        u64::try_from(self.offset).unwrap_or(0)
    }

    /// Limit as an unsigned value (non-positive limits read as 1)
    pub fn limit_u32(&self) -> u32 {
        u32::try_from(self.limit.max(1)).unwrap_or(u32::MAX)
    }

    /// Pages yielded so far for this query
    pub fn pages_yielded(&self) -> u32 {
        self.pages_yielded
    }

    /// Whether the page budget has been spent
    pub fn budget_exhausted(&self) -> bool {
        self.max_pages
            .is_some_and(|max_pages| self.pages_yielded >= max_pages)
    }

    /// Count a yielded page and move to `next_offset`
    ///
    /// Offsets only move forward; a non-advancing `next_offset` is ignored.
    pub fn advance(&mut self, next_offset: Option<u64>) {
        self.pages_yielded = self.pages_yielded.saturating_add(1);
        if let Some(next) = next_offset {
            let next = i64::try_from(next).unwrap_or(i64::MAX);
            if next > self.offset {
                self.offset = next;
            }
        }
    }
}
