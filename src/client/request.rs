//! Request descriptors
//!
//! A [`RequestDescriptor`] fully describes one logical call. It is built by the
//! caller, handed to the retry executor by reference and re-sent unchanged on
//! every attempt.

use reqwest::Method;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::config::REQUEST_TIMEOUT_SECS;

/// Header carrying the RentCast API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Scalar query parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// String value
    Str(String),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Bool(bool),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => write!(f, "{s}"),
            ParamValue::Int(n) => write!(f, "{n}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Int(i64::from(value))
    }
}

impl From<u64> for ParamValue {
    fn from(value: u64) -> Self {
        ParamValue::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// One logical request: method, path, query, headers and timeout
///
/// Query parameters and headers are kept in sorted maps so that two
/// descriptors built from the same inputs compare and log identically.
#[derive(Clone, PartialEq)]
pub struct RequestDescriptor {
    /// HTTP method
    pub method: Method,
    /// Path relative to the transport's base URL (e.g. `/v1/properties`)
    pub path: String,
    /// Query parameters
    pub query: BTreeMap<String, ParamValue>,
    /// Request headers, lower-case names
    pub headers: BTreeMap<String, String>,
    /// Declared per-request timeout
    pub timeout: Duration,
}

impl RequestDescriptor {
    /// GET request for `path` with the default timeout
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: BTreeMap::new(),
            headers: BTreeMap::new(),
            timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }

    /// Set a query parameter, replacing any previous value
    pub fn param(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Set a header, replacing any previous value
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Set the declared timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Copy of this descriptor positioned at `offset`/`limit`
    pub fn with_page(&self, offset: u64, limit: u32) -> Self {
        self.clone().param("offset", offset).param("limit", limit)
    }

    /// Look up a header by (case-insensitive) name
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Query parameters rendered as string pairs
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .iter()
            .map(|(key, value)| (key.clone(), value.to_string()))
            .collect()
    }
}

impl fmt::Debug for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let headers: BTreeMap<&str, &str> = self
            .headers
            .iter()
            .map(|(name, value)| {
                let shown = if name == API_KEY_HEADER {
                    "<redacted>"
                } else {
                    value.as_str()
                };
                (name.as_str(), shown)
            })
            .collect();

        f.debug_struct("RequestDescriptor")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("query", &self.query)
            .field("headers", &headers)
            .field("timeout", &self.timeout)
            .finish()
    }
}
