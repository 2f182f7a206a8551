//! SQL DDL for the local record store.

/// SQLite schema:
/// - `records` table (one row per (source, record_id))
/// - listing index matching the pager's sort order
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    record_id TEXT NOT NULL,
    source TEXT NOT NULL,
    endpoint TEXT NOT NULL,
    city TEXT NULL,
    state TEXT NULL,
    zip_code TEXT NULL,
    property_type TEXT NULL,
    price REAL NULL,
    bedrooms REAL NULL,
    ingested_at INTEGER NOT NULL, -- unix millis
    payload TEXT NOT NULL, -- raw JSON as returned by the API
    PRIMARY KEY (source, record_id)
);

CREATE INDEX IF NOT EXISTS idx_records_recent ON records(ingested_at DESC, record_id);

CREATE INDEX IF NOT EXISTS idx_records_location ON records(state, city, zip_code);
"#;
