//! Page-at-a-time access to the local record store
//!
//! Unlike the remote pager this is not a stream: each call returns one page
//! and callers drive iteration by advancing the cursor themselves.
//!
//! Order is `ingested_at DESC, record_id ASC, source ASC`, total over the
//! primary key, so increasing offsets partition the matching set. Writes
//! between calls can move a record across a page boundary; pages are
//! consistent per call, not across calls.

use sqlx::QueryBuilder;
use tracing::debug;

use super::criteria::QueryCriteria;
use super::{RecordStore, StorageError, StoredRecord, RECORD_COLUMNS};
use crate::page::{Page, PaginationCursor, MAX_PAGE_LIMIT};
use crate::RawItem;

/// Source label recorded on pages read from the store
pub const STORE_SOURCE: &str = "store";

/// Serves pages of stored records
#[derive(Debug, Clone)]
pub struct StoragePager {
    store: RecordStore,
    max_limit: u32,
}

impl StoragePager {
    /// Pager over `store` accepting limits up to `max_limit`
    pub fn new(store: RecordStore, max_limit: u32) -> Self {
        Self { store, max_limit }
    }

    /// Pager with the API's page-size cap
    pub fn with_default_limit(store: RecordStore) -> Self {
        Self::new(store, MAX_PAGE_LIMIT)
    }

    /// Largest accepted limit
    pub fn max_limit(&self) -> u32 {
        self.max_limit
    }

    /// One page of payloads matching `criteria`
    ///
    /// # Errors
    /// [`StorageError::Validation`] when `cursor.limit ∉ [1, max_limit]` or
    /// `cursor.offset < 0`, before any query runs.
    pub async fn paginate(
        &self,
        criteria: &QueryCriteria,
        cursor: &PaginationCursor,
    ) -> Result<Page<RawItem>, StorageError> {
        let page = self.paginate_records(criteria, cursor).await?;

        let mut items = Vec::with_capacity(page.len());
        for record in &page.items {
            items.push(record.payload()?);
        }

        Ok(Page {
            items,
            offset: page.offset,
            total_count: page.total_count,
            has_more: page.has_more,
            next_offset: page.next_offset,
            source: page.source,
        })
    }

    /// One page of full records matching `criteria`
    pub async fn paginate_records(
        &self,
        criteria: &QueryCriteria,
        cursor: &PaginationCursor,
    ) -> Result<Page<StoredRecord>, StorageError> {
        cursor.validate(self.max_limit)?;

        // Count and page read the same snapshot
        let mut tx = self.store.pool().begin().await?;

        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM records");
        criteria.push_filters(&mut count_qb);
        let total: i64 = count_qb.build_query_scalar().fetch_one(&mut *tx).await?;
        let total = u64::try_from(total).unwrap_or(0);

        let mut qb = QueryBuilder::new(format!("SELECT {RECORD_COLUMNS} FROM records"));
        criteria.push_filters(&mut qb);
        qb.push(" ORDER BY ingested_at DESC, record_id ASC, source ASC LIMIT ");
        qb.push_bind(cursor.limit);
        qb.push(" OFFSET ");
        qb.push_bind(cursor.offset);

        let records: Vec<StoredRecord> = qb
            .build_query_as::<StoredRecord>()
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        let offset = cursor.offset_u64();
        let end = offset + records.len() as u64;
        let next_offset = (!records.is_empty() && end < total).then_some(end);

        debug!(
            offset = offset,
            limit = cursor.limit,
            returned = records.len(),
            total = total,
            "Served stored page"
        );

        Ok(Page::new(
            records,
            offset,
            Some(total),
            next_offset,
            Some(STORE_SOURCE.to_string()),
        ))
    }
}
