//! Order types shared across ordersync
//!
//! [`raw`] mirrors the subset of the upstream order payload the synchronizer
//! consumes. [`canonical`] is the document persisted to the store.

pub mod canonical;
pub mod raw;

pub use canonical::{CanonicalOrder, Cancellation, ProductEntry};
pub use raw::{RawAddress, RawCustomer, RawDiscountCode, RawLineItem, RawNumber, RawOrder};

use chrono::{DateTime, Utc};

use crate::error::{RecordError, Result};

/// Parse an upstream ISO-8601 timestamp (any offset) into UTC
pub fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| RecordError::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}
