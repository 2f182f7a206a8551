//! Filters for local record queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite};

/// Record filter; every set field narrows the result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryCriteria {
    /// Exact source label
    pub source: Option<String>,
    /// Exact endpoint name
    pub endpoint: Option<String>,
    /// City, case-insensitive
    pub city: Option<String>,
    /// State code, case-insensitive
    pub state: Option<String>,
    /// ZIP code
    pub zip_code: Option<String>,
    /// Any of these property types
    pub property_types: Vec<String>,
    /// Minimum price, inclusive
    pub min_price: Option<f64>,
    /// Maximum price, inclusive
    pub max_price: Option<f64>,
    /// Minimum bedroom count, inclusive
    pub min_bedrooms: Option<f64>,
    /// Only records ingested at or after this time
    pub ingested_since: Option<DateTime<Utc>>,
}

impl QueryCriteria {
    /// Criteria matching every record
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a source label
    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Restrict to an endpoint
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Restrict to a city
    pub fn city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    /// Restrict to a state
    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// Restrict to a ZIP code
    pub fn zip_code(mut self, zip_code: impl Into<String>) -> Self {
        self.zip_code = Some(zip_code.into());
        self
    }

    /// Add an accepted property type
    pub fn property_type(mut self, property_type: impl Into<String>) -> Self {
        self.property_types.push(property_type.into());
        self
    }

    /// Restrict to a price range
    pub fn price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_price = min;
        self.max_price = max;
        self
    }

    /// Require at least this many bedrooms
    pub fn min_bedrooms(mut self, min_bedrooms: f64) -> Self {
        self.min_bedrooms = Some(min_bedrooms);
        self
    }

    /// Only records ingested at or after `since`
    pub fn ingested_since(mut self, since: DateTime<Utc>) -> Self {
        self.ingested_since = Some(since);
        self
    }

    /// Append a `WHERE` clause for the set filters (nothing if none are set)
    pub fn push_filters(&self, qb: &mut QueryBuilder<'_, Sqlite>) {
        let mut first = true;

        if let Some(source) = &self.source {
            push_clause(qb, &mut first, "source = ");
            qb.push_bind(source.clone());
        }

        if let Some(endpoint) = &self.endpoint {
            push_clause(qb, &mut first, "endpoint = ");
            qb.push_bind(endpoint.clone());
        }

        if let Some(city) = &self.city {
            push_clause(qb, &mut first, "city = ");
            qb.push_bind(city.clone());
            qb.push(" COLLATE NOCASE");
        }

        if let Some(state) = &self.state {
            push_clause(qb, &mut first, "state = ");
            qb.push_bind(state.clone());
            qb.push(" COLLATE NOCASE");
        }

        if let Some(zip_code) = &self.zip_code {
            push_clause(qb, &mut first, "zip_code = ");
            qb.push_bind(zip_code.clone());
        }

        if !self.property_types.is_empty() {
            push_clause(qb, &mut first, "property_type IN (");
            let mut separated = qb.separated(", ");
            for property_type in &self.property_types {
                separated.push_bind(property_type.clone());
            }
            separated.push_unseparated(")");
        }

        if let Some(min_price) = self.min_price {
            push_clause(qb, &mut first, "price >= ");
            qb.push_bind(min_price);
        }

        if let Some(max_price) = self.max_price {
            push_clause(qb, &mut first, "price <= ");
            qb.push_bind(max_price);
        }

        if let Some(min_bedrooms) = self.min_bedrooms {
            push_clause(qb, &mut first, "bedrooms >= ");
            qb.push_bind(min_bedrooms);
        }

        if let Some(since) = self.ingested_since {
            push_clause(qb, &mut first, "ingested_at >= ");
            qb.push_bind(since.timestamp_millis());
        }
    }
}

fn push_clause(qb: &mut QueryBuilder<'_, Sqlite>, first: &mut bool, sql: &str) {
    qb.push(if *first { " WHERE " } else { " AND " });
    qb.push(sql);
    *first = false;
}
