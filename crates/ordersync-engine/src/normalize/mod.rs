//! Record normalization
//!
//! [`normalize`] is a pure function from an upstream [`RawOrder`] to the
//! persisted [`CanonicalOrder`]. It reads no clock and no global state, so the
//! same input always produces the same document.
//!
//! Defaulting rules:
//! - missing customer or name fields become empty strings
//! - phone is taken from the first usable candidate (order, shipping, billing)
//! - line items without a product id are dropped
//! - an empty SKU is stored as absent
//!
//! Malformed order numbers, prices or timestamps fail the record, never the page.

pub mod mapping;
pub mod phone;

pub use mapping::{FieldMapping, MappingVersion};

use ordersync_common::types::{parse_timestamp, RawLineItem};
use ordersync_common::{CanonicalOrder, Cancellation, ProductEntry, RawOrder, RecordError};
use tracing::warn;
use url::Url;

/// Map one upstream order into its canonical document
pub fn normalize(order: &RawOrder, mapping: &FieldMapping) -> Result<CanonicalOrder, RecordError> {
    let order_number = order
        .order_number
        .as_ref()
        .ok_or(RecordError::MissingField {
            field: "order_number",
        })?
        .to_i64("order_number")?;

    let created_at = order
        .created_at
        .as_deref()
        .ok_or(RecordError::MissingField { field: "created_at" })
        .and_then(|s| parse_timestamp("created_at", s))?;

    let cancelled = match order.cancelled_at.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Cancellation::Cancelled(parse_timestamp("cancelled_at", s)?),
        _ => Cancellation::Active,
    };

    let (price_field, price) = mapping.price(order);
    let price = price
        .ok_or(RecordError::MissingField { field: price_field })?
        .to_decimal(price_field)?;

    let customer = order.customer.as_ref();
    let name = |field: Option<&Option<String>>| {
        field
            .and_then(Option::as_deref)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    };

    Ok(CanonicalOrder {
        id: order.id,
        order_number,
        created_at,
        cancelled,
        price,
        fulfillment_status: order.fulfillment_status.clone(),
        financial_status: order.financial_status.clone(),
        status_url: order.order_status_url.as_deref().map(strip_query),
        discount_codes: order.discount_codes.iter().map(|d| d.code.clone()).collect(),
        first_name: name(customer.map(|c| &c.first_name)),
        last_name: name(customer.map(|c| &c.last_name)),
        phone: phone::pick_phone(order),
        products: order
            .line_items
            .iter()
            .filter_map(|item| product_entry(item, mapping))
            .collect(),
    })
}

fn product_entry(item: &RawLineItem, mapping: &FieldMapping) -> Option<ProductEntry> {
    let id = item.product_id?;
    Some(ProductEntry {
        id,
        name: item.title.clone().unwrap_or_default(),
        sku: item
            .sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        quantity: mapping.quantity(item),
    })
}

/// Drop the query string and fragment; the token-bearing query changes between requests
fn strip_query(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            url.set_query(None);
            url.set_fragment(None);
            url.to_string()
        },
        Err(_) => raw
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// Orders from one page that survived normalization, plus the ones that did not
#[derive(Debug, Default)]
pub struct NormalizedPage {
    pub orders: Vec<CanonicalOrder>,
    pub rejected: Vec<(u64, RecordError)>,
}

/// Page-level wrapper around [`normalize`] holding the deployment's mapping
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    mapping: FieldMapping,
}

impl Normalizer {
    pub fn new(mapping: FieldMapping) -> Self {
        Self { mapping }
    }

    pub fn mapping(&self) -> &FieldMapping {
        &self.mapping
    }

    /// Normalize every order of a page, excluding and logging malformed ones
    pub fn normalize_page(&self, orders: &[RawOrder]) -> NormalizedPage {
        let mut page = NormalizedPage {
            orders: Vec::with_capacity(orders.len()),
            rejected: Vec::new(),
        };

        for order in orders {
            match normalize(order, &self.mapping) {
                Ok(canonical) => page.orders.push(canonical),
                Err(e) => {
                    warn!(
                        order_id = order.id,
                        stage = "normalize",
                        field = e.field(),
                        error = %e,
                        "Excluding malformed order from batch"
                    );
                    page.rejected.push((order.id, e));
                },
            }
        }

        page
    }
}
