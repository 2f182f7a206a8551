//! Integration tests for paging the local record store

use chrono::{Duration, TimeZone, Utc};
use rentcast_ingest::storage::{QueryCriteria, RecordStore, StorageError, StoragePager};
use rentcast_ingest::{PaginationCursor, ValidationError};
use serde_json::json;
use std::collections::HashSet;

/// Five sale listings; `b` and `c` share the newest timestamp
async fn seeded_store() -> RecordStore {
    let store = RecordStore::in_memory().await.unwrap();
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let source = "rentcast:listings-sale";
    let endpoint = "listings-sale";

    let batches = [
        (json!({"id": "a", "city": "Austin", "state": "TX", "propertyType": "Condo", "price": 310000}), base),
        (json!({"id": "c", "city": "Austin", "state": "TX", "propertyType": "Single Family", "price": 720000}), base + Duration::hours(2)),
        (json!({"id": "b", "city": "austin", "state": "tx", "propertyType": "Townhouse", "price": 455000}), base + Duration::hours(2)),
        (json!({"id": "d", "city": "Dallas", "state": "TX", "propertyType": "Condo", "price": 280000}), base + Duration::hours(1)),
        (json!({"id": "e", "city": "Houston", "state": "TX", "propertyType": "Single Family", "price": 390000}), base - Duration::hours(1)),
    ];

    for (item, at) in batches {
        store
            .upsert_items_at(&[item], source, endpoint, at)
            .await
            .unwrap();
    }
    store
}

fn ids(items: &[serde_json::Value]) -> Vec<String> {
    items
        .iter()
        .map(|item| item["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_limit_two_partitions_five_records() {
    let pager = StoragePager::with_default_limit(seeded_store().await);
    let criteria = QueryCriteria::new();

    let mut cursor = PaginationCursor::new(0, 2);
    let mut offsets = Vec::new();
    let mut seen = Vec::new();

    loop {
        let page = pager.paginate(&criteria, &cursor).await.unwrap();
        assert!(page.validate().is_ok());
        assert_eq!(page.total_count, Some(5));
        offsets.push(page.offset);
        seen.extend(ids(&page.items));

        match page.next_offset {
            Some(next) => cursor = PaginationCursor::new(next as i64, 2),
            None => break,
        }
    }

    assert_eq!(offsets, vec![0, 2, 4]);
    // Most recent first; b and c tie on time and are ordered by id
    assert_eq!(seen, vec!["b", "c", "d", "a", "e"]);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 5);
}

#[tokio::test]
async fn test_invalid_limits_rejected_before_query() {
    let store = seeded_store().await;
    let pager = StoragePager::with_default_limit(store.clone());

    // With the pool closed any query would fail with a database error
    store.pool().close().await;

    for limit in [0, 501] {
        let err = pager
            .paginate(&QueryCriteria::new(), &PaginationCursor::new(0, limit))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err,
                StorageError::Validation(ValidationError::LimitOutOfRange { .. })
            ),
            "limit {limit}: {err:?}"
        );
    }
}

#[tokio::test]
async fn test_criteria_restrict_items_and_total() {
    let pager = StoragePager::with_default_limit(seeded_store().await);

    let austin = QueryCriteria::new().city("AUSTIN").state("TX");
    let page = pager
        .paginate(&austin, &PaginationCursor::new(0, 2))
        .await
        .unwrap();
    assert_eq!(page.total_count, Some(3));
    assert_eq!(ids(&page.items), vec!["b", "c"]);
    assert_eq!(page.next_offset, Some(2));

    let condos_under_300k = QueryCriteria::new()
        .property_type("Condo")
        .price_range(None, Some(300000.0));
    let page = pager
        .paginate(&condos_under_300k, &PaginationCursor::new(0, 10))
        .await
        .unwrap();
    assert_eq!(page.total_count, Some(1));
    assert_eq!(ids(&page.items), vec!["d"]);
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_ingested_since_filter() {
    let pager = StoragePager::with_default_limit(seeded_store().await);
    let since = Utc.with_ymd_and_hms(2026, 3, 1, 13, 0, 0).unwrap();

    let page = pager
        .paginate(
            &QueryCriteria::new().ingested_since(since),
            &PaginationCursor::new(0, 10),
        )
        .await
        .unwrap();
    assert_eq!(ids(&page.items), vec!["b", "c", "d"]);
}

#[tokio::test]
async fn test_records_page_exposes_columns() {
    let pager = StoragePager::with_default_limit(seeded_store().await);
    let page = pager
        .paginate_records(&QueryCriteria::new().source("rentcast:listings-sale"), &PaginationCursor::new(4, 2))
        .await
        .unwrap();

    assert_eq!(page.len(), 1);
    let record = &page.items[0];
    assert_eq!(record.record_id, "e");
    assert_eq!(record.city.as_deref(), Some("Houston"));
    assert_eq!(record.endpoint, "listings-sale");
    assert_eq!(record.price, Some(390000.0));
    assert!(!page.has_more);
}

#[tokio::test]
async fn test_file_backed_store_persists_between_connections() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("rentcast.db").display());

    {
        let store = RecordStore::connect(&url).await.unwrap();
        store
            .upsert_items(&[json!({"id": "p1"}), json!({"id": "p2"})], "rentcast:properties", "properties")
            .await
            .unwrap();
        store.pool().close().await;
    }

    let store = RecordStore::connect(&url).await.unwrap();
    assert_eq!(store.count(&QueryCriteria::new()).await.unwrap(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_page_agrees_with_its_total_under_concurrent_writes() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("busy.db").display());
    let store = RecordStore::connect(&url).await.unwrap();

    let writer_store = store.clone();
    let writer = tokio::spawn(async move {
        for batch in 0..40 {
            let items: Vec<_> = (0..5)
                .map(|n| json!({"id": format!("w-{batch}-{n}"), "city": "Austin"}))
                .collect();
            writer_store
                .upsert_items(&items, "rentcast:listings-sale", "listings-sale")
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }
    });

    let pager = StoragePager::with_default_limit(store);
    let cursor = PaginationCursor::new(0, 500);
    while !writer.is_finished() {
        let page = pager.paginate(&QueryCriteria::new(), &cursor).await.unwrap();
        let total = page.total_count.unwrap();
        assert_eq!(page.len() as u64, total.min(500));
        assert!(!page.has_more);
    }
    writer.await.unwrap();

    let page = pager.paginate(&QueryCriteria::new(), &cursor).await.unwrap();
    assert_eq!(page.total_count, Some(200));
    assert_eq!(page.len(), 200);
}
