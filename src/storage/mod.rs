//! Local persisted record store
//!
//! Records fetched from the API are kept in SQLite, one row per
//! `(source, record_id)`, with the raw payload alongside a few columns
//! extracted for filtering. [`pager::StoragePager`] serves them back in pages.

pub mod criteria;
pub mod pager;
pub mod schema;

pub use criteria::QueryCriteria;
pub use pager::StoragePager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::page::ValidationError;
use crate::RawItem;
use schema::SQLITE_INIT;

/// Columns selected for [`StoredRecord`]
pub(crate) const RECORD_COLUMNS: &str = "record_id, source, endpoint, city, state, zip_code, \
     property_type, price, bedrooms, ingested_at, payload";

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid pagination parameters
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Stored payload is not valid JSON
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// One persisted record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct StoredRecord {
    /// Payload `id`, or a hash of the payload
    pub record_id: String,
    /// Source label (e.g. `rentcast:listings-sale`)
    pub source: String,
    /// Endpoint name
    pub endpoint: String,
    /// City
    pub city: Option<String>,
    /// Two-letter state code
    pub state: Option<String>,
    /// ZIP code
    pub zip_code: Option<String>,
    /// Property type (e.g. `Single Family`)
    pub property_type: Option<String>,
    /// Listing price or valuation
    pub price: Option<f64>,
    /// Bedroom count
    pub bedrooms: Option<f64>,
    /// Unix millis
    pub ingested_at: i64,
    /// Raw JSON payload
    pub payload: String,
}

impl StoredRecord {
    /// Parse the raw payload
    pub fn payload(&self) -> Result<RawItem, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    /// Ingestion time as a UTC timestamp
    pub fn ingested_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.ingested_at)
    }
}

/// Filter columns pulled out of a payload
#[derive(Debug, Clone, Default, PartialEq)]
struct RecordFields {
    id: Option<String>,
    city: Option<String>,
    state: Option<String>,
    zip_code: Option<String>,
    property_type: Option<String>,
    price: Option<f64>,
    bedrooms: Option<f64>,
}

impl RecordFields {
    fn from_payload(payload: &Value) -> Self {
        let text = |key: &str| payload.get(key).and_then(Value::as_str).map(str::to_string);
        let number = |key: &str| payload.get(key).and_then(Value::as_f64);

        let id = match payload.get("id") {
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(Value::Number(id)) => Some(id.to_string()),
            _ => None,
        };

        Self {
            id,
            city: text("city"),
            state: text("state"),
            zip_code: text("zipCode"),
            property_type: text("propertyType"),
            price: number("price"),
            bedrooms: number("bedrooms"),
        }
    }
}

/// Content-addressed identifier for a payload without an `id`
///
/// Hex SHA-256 of the serialized payload; identical across builds.
fn synthetic_id_from_payload(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("payload_hash:{:x}", hasher.finalize())
}

/// Whether a SQLite URL names an in-memory database
fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// SQLite-backed record store
#[derive(Debug, Clone)]
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    /// Open (creating if missing) the database at `database_url` and apply the schema
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let in_memory = is_in_memory(database_url);

        let mut connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            connect_opts = connect_opts
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // Every connection to `:memory:` is a separate database, so keep exactly one alive
        let pool_opts = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
        };

        let pool = pool_opts.connect_with(connect_opts).await?;
        let store = Self::from_pool(pool);
        store.apply_schema().await?;

        info!(database_url = %database_url, "Record store initialized");
        Ok(store)
    }

    /// Private in-memory store
    pub async fn in_memory() -> Result<Self, StorageError> {
        Self::connect("sqlite::memory:").await
    }

    /// Wrap an existing pool; the schema is not applied
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn apply_schema(&self) -> Result<(), StorageError> {
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Upsert a batch of items stamped with the current time
    pub async fn upsert_items(
        &self,
        items: &[RawItem],
        source: &str,
        endpoint: &str,
    ) -> Result<u64, StorageError> {
        self.upsert_items_at(items, source, endpoint, Utc::now()).await
    }

    /// Upsert a batch of items in one transaction, stamped with `ingested_at`
    ///
    /// Returns the number of rows written.
    pub async fn upsert_items_at(
        &self,
        items: &[RawItem],
        source: &str,
        endpoint: &str,
        ingested_at: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        if items.is_empty() {
            return Ok(0);
        }

        let ingested_at = ingested_at.timestamp_millis();
        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for item in items {
            let payload = serde_json::to_string(item)?;
            let fields = RecordFields::from_payload(item);
            let record_id = fields
                .id
                .clone()
                .unwrap_or_else(|| synthetic_id_from_payload(&payload));

            let res = sqlx::query(
                r#"
            INSERT INTO records (
                record_id, source, endpoint, city, state, zip_code,
                property_type, price, bedrooms, ingested_at, payload
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, record_id) DO UPDATE SET
                endpoint = excluded.endpoint,
                city = excluded.city,
                state = excluded.state,
                zip_code = excluded.zip_code,
                property_type = excluded.property_type,
                price = excluded.price,
                bedrooms = excluded.bedrooms,
                ingested_at = excluded.ingested_at,
                payload = excluded.payload
            "#,
            )
            .bind(&record_id)
            .bind(source)
            .bind(endpoint)
            .bind(fields.city)
            .bind(fields.state)
            .bind(fields.zip_code)
            .bind(fields.property_type)
            .bind(fields.price)
            .bind(fields.bedrooms)
            .bind(ingested_at)
            .bind(&payload)
            .execute(&mut *tx)
            .await?;

            written += res.rows_affected();
        }

        tx.commit().await?;
        debug!(source = %source, written = written, "Upserted records");
        Ok(written)
    }

    /// Fetch one record
    pub async fn get(&self, source: &str, record_id: &str) -> Result<Option<StoredRecord>, StorageError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM records WHERE source = ? AND record_id = ?");
        let row = sqlx::query_as::<_, StoredRecord>(&sql)
            .bind(source)
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    /// Number of records matching `criteria`
    pub async fn count(&self, criteria: &QueryCriteria) -> Result<u64, StorageError> {
        let mut qb = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM records");
        criteria.push_filters(&mut qb);
        let total: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(u64::try_from(total).unwrap_or(0))
    }
}
