//! RentCast page envelope decoding
//!
//! Turns a 2xx response body into a [`Page`] whose metadata always satisfies
//! the page invariants, whatever shape the endpoint returned:
//!
//! - `{"data": [...], "totalCount", "hasMore", "nextOffset"}` - paginated envelope
//! - `[...]` - one final page
//! - any other object (AVM, market statistics) - one final page holding it

use serde_json::{Map, Value};
use tracing::warn;

use crate::fetcher::classifier::ClassifiedError;
use crate::page::Page;
use crate::RawItem;

/// Where a page sits in the collection being walked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Offset the page was requested at
    pub offset: u64,
    /// Page size that was requested
    pub limit: u32,
}

/// Stateless decoder for RentCast response bodies
pub struct EnvelopeParser;

impl EnvelopeParser {
    /// Decode a 2xx body into a page
    ///
    /// # Arguments
    /// * `status` - Response status, reported on malformed bodies
    /// * `body` - Response body
    /// * `request` - Offset and limit the page was requested with
    /// * `source` - Label recorded on the page
    ///
    /// # Errors
    /// Returns an Unclassified [`ClassifiedError`] if the body is not JSON or
    /// `data` is not an array
    pub fn decode_page(
        status: u16,
        body: &str,
        request: PageRequest,
        source: Option<&str>,
    ) -> Result<Page<RawItem>, ClassifiedError> {
        let source = source.map(str::to_string);

        if body.trim().is_empty() {
            return Ok(Page::last(Vec::new(), request.offset, Some(0), source));
        }

        let value: Value =
            serde_json::from_str(body).map_err(|e| ClassifiedError::malformed(status, e))?;

        match value {
            Value::Array(items) => Ok(Page::last(items, request.offset, None, source)),
            Value::Object(object) if object.contains_key("data") => {
                Self::decode_envelope(status, object, request, source)
            }
            other => Ok(Page::last(vec![other], request.offset, Some(1), source)),
        }
    }

    fn decode_envelope(
        status: u16,
        mut object: Map<String, Value>,
        request: PageRequest,
        source: Option<String>,
    ) -> Result<Page<RawItem>, ClassifiedError> {
        let items = match object.remove("data") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) => Vec::new(),
            Some(other) => {
                return Err(ClassifiedError::malformed(
                    status,
                    format!("expected `data` to be an array, got {}", json_type(&other)),
                ))
            }
            None => Vec::new(),
        };

        let total_count = object.get("totalCount").and_then(Value::as_u64);
        let next_offset = object.get("nextOffset").and_then(Value::as_u64);
        let has_more = object
            .get("hasMore")
            .and_then(Value::as_bool)
            .unwrap_or(next_offset.is_some());

        let offset = request.offset;

        if !has_more || items.is_empty() || items.len() < request.limit as usize {
            return Ok(Page::last(items, offset, total_count, source));
        }

        let next_offset = match next_offset {
            Some(next) if next > offset => next,
            reported => {
                let fallback = offset + u64::from(request.limit.max(1));
                warn!(
                    offset = offset,
                    reported = ?reported,
                    fallback = fallback,
                    "hasMore without a usable nextOffset, advancing by limit"
                );
                fallback
            }
        };

        Ok(Page::new(items, offset, total_count, Some(next_offset), source))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
