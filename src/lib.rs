//! # RentCast Ingest Library
//!
//! Resilient ingestion of listing, valuation and market data from the
//! rate-limited RentCast REST API, exposed to downstream analysis as complete,
//! gap-free result sets.
//!
//! ## Features
//!
//! - **Rate Limiting**: One shared limiter per client; the aggregate grant rate never exceeds the quota
//! - **Typed Errors**: Every non-2xx response is classified into a closed [`fetcher::ErrorKind`] set
//! - **Bounded Retries**: Exponential backoff with jitter, capped per error kind
//! - **Dual Pagination**: The same [`Page`] shape over the remote API and the local SQLite store
//! - **Cancellation**: Every request honours a [`cancel::CancelSignal`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use rentcast_ingest::config::AppConfig;
//! use rentcast_ingest::fetcher::{Fetcher, Query};
//! use rentcast_ingest::Endpoint;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load(None)?;
//! let fetcher = Fetcher::from_config(&config)?;
//!
//! let query = Query::new(Endpoint::ListingsSale)
//!     .param("city", "Austin")
//!     .param("state", "TX");
//!
//! // Eagerly drain at most 5 pages
//! let listings = fetcher.fetch_all(&query, Some(5)).await?;
//! println!("fetched {} listings", listings.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Control flow for a remote fetch:
//!
//! [`fetcher::Fetcher`] → [`fetcher::pagination::RemotePager`] →
//! [`client::retry::RetryExecutor`] → [`client::rate_limit::RateLimiter`] →
//! [`client::transport::Transport`] → [`fetcher::classifier::ErrorClassifier`]
//!
//! The local store is paged by [`storage::pager::StoragePager`], which never
//! touches the network stack.
//!
//! - [`page`] - Pagination data shapes shared by both pagers
//! - [`client`] - Request descriptors, transport, rate limiting and retries
//! - [`fetcher`] - Error classification, remote pagination and the fetcher facade
//! - [`storage`] - Persisted records and local pagination
//! - [`config`] - Layered configuration and retry constants

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Cancellation signal shared by in-flight calls
pub mod cancel;

/// CLI command implementations
pub mod cli;

/// HTTP client plumbing: requests, transport, rate limiting, retries
pub mod client;

/// Configuration loading and retry constants
pub mod config;

/// Remote fetching: classification, pagination, facade
pub mod fetcher;

/// Observability metrics
pub mod metrics;

/// Pagination data shapes
pub mod page;

/// Local persisted store
pub mod storage;

pub use page::{Page, PaginationCursor, ValidationError};

/// A single record as returned by the API, before schema mapping.
pub type RawItem = serde_json::Value;

/// API version prefix shared by every endpoint path
pub const API_VERSION_PREFIX: &str = "/v1";

/// RentCast API endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    /// Property records
    #[serde(rename = "properties")]
    Properties,
    /// Sale listings
    #[serde(rename = "listings-sale")]
    ListingsSale,
    /// Long-term rental listings
    #[serde(rename = "listings-rental")]
    ListingsRental,
    /// Automated valuation (sale price estimate)
    #[serde(rename = "avm-value")]
    AvmValue,
    /// Automated valuation (long-term rent estimate)
    #[serde(rename = "avm-rent")]
    AvmRent,
    /// Aggregate market statistics
    #[serde(rename = "markets")]
    Markets,
}

impl Endpoint {
    /// All endpoints, in catalogue order
    pub const ALL: [Endpoint; 6] = [
        Endpoint::Properties,
        Endpoint::ListingsSale,
        Endpoint::ListingsRental,
        Endpoint::AvmValue,
        Endpoint::AvmRent,
        Endpoint::Markets,
    ];

    /// Full request path, including the API version prefix
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Properties => "/v1/properties",
            Endpoint::ListingsSale => "/v1/listings/sale",
            Endpoint::ListingsRental => "/v1/listings/rental/long-term",
            Endpoint::AvmValue => "/v1/avm/value",
            Endpoint::AvmRent => "/v1/avm/rent/long-term",
            Endpoint::Markets => "/v1/markets",
        }
    }

    /// Whether the endpoint accepts `offset`/`limit` and returns pages
    pub fn is_paginated(&self) -> bool {
        matches!(
            self,
            Endpoint::Properties | Endpoint::ListingsSale | Endpoint::ListingsRental
        )
    }

    /// Source label recorded on pages and stored rows
    pub fn source_label(&self) -> &'static str {
        match self {
            Endpoint::Properties => "rentcast:properties",
            Endpoint::ListingsSale => "rentcast:listings-sale",
            Endpoint::ListingsRental => "rentcast:listings-rental",
            Endpoint::AvmValue => "rentcast:avm-value",
            Endpoint::AvmRent => "rentcast:avm-rent",
            Endpoint::Markets => "rentcast:markets",
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Endpoint::Properties => "properties",
            Endpoint::ListingsSale => "listings-sale",
            Endpoint::ListingsRental => "listings-rental",
            Endpoint::AvmValue => "avm-value",
            Endpoint::AvmRent => "avm-rent",
            Endpoint::Markets => "markets",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Endpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "properties" => Ok(Endpoint::Properties),
            "listings-sale" => Ok(Endpoint::ListingsSale),
            "listings-rental" => Ok(Endpoint::ListingsRental),
            "avm-value" => Ok(Endpoint::AvmValue),
            "avm-rent" => Ok(Endpoint::AvmRent),
            "markets" => Ok(Endpoint::Markets),
            _ => Err(format!(
                "Invalid endpoint: {s}. Valid options: properties, listings-sale, listings-rental, avm-value, avm-rent, markets"
            )),
        }
    }
}
