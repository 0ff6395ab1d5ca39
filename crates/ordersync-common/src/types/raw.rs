//! Upstream order payload
//!
//! Decoding is deliberately lenient: apart from `id`, every field is optional
//! and numbers may arrive as JSON numbers or strings. Malformed values are
//! reported later by the normalizer so a single bad record never fails a page.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::error::{RecordError, Result};

/// One order as returned by the source API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOrder {
    /// Source identifier, monotonically assigned upstream
    pub id: u64,

    #[serde(default)]
    pub order_number: Option<RawNumber>,

    #[serde(default)]
    pub created_at: Option<String>,

    #[serde(default)]
    pub cancelled_at: Option<String>,

    #[serde(default)]
    pub current_subtotal_price: Option<RawNumber>,

    #[serde(default)]
    pub total_price: Option<RawNumber>,

    #[serde(default)]
    pub fulfillment_status: Option<String>,

    #[serde(default)]
    pub financial_status: Option<String>,

    #[serde(default)]
    pub order_status_url: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub discount_codes: Vec<RawDiscountCode>,

    #[serde(default)]
    pub customer: Option<RawCustomer>,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default)]
    pub shipping_address: Option<RawAddress>,

    #[serde(default)]
    pub billing_address: Option<RawAddress>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub line_items: Vec<RawLineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDiscountCode {
    pub code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCustomer {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAddress {
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLineItem {
    /// `None` for custom items and gift cards
    #[serde(default)]
    pub product_id: Option<u64>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub sku: Option<String>,

    #[serde(default)]
    pub quantity: Option<i64>,

    /// Quantity after order edits and refunds
    #[serde(default)]
    pub current_quantity: Option<i64>,
}

/// Numeric value that upstream may send either as a number or as a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl RawNumber {
    /// Interpret the value as a whole number
    pub fn to_i64(&self, field: &'static str) -> Result<i64> {
        match self {
            RawNumber::Integer(n) => Ok(*n),
            RawNumber::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
            RawNumber::Text(s) => s.trim().parse().map_err(|_| invalid(field, s)),
            RawNumber::Float(f) => Err(invalid(field, &f.to_string())),
        }
    }

    /// Interpret the value as an exact decimal amount
    pub fn to_decimal(&self, field: &'static str) -> Result<Decimal> {
        match self {
            RawNumber::Integer(n) => Ok(Decimal::from(*n)),
            RawNumber::Float(f) => {
                Decimal::from_str(&f.to_string()).map_err(|_| invalid(field, &f.to_string()))
            },
            RawNumber::Text(s) => Decimal::from_str(s.trim()).map_err(|_| invalid(field, s)),
        }
    }
}

fn invalid(field: &'static str, value: &str) -> RecordError {
    RecordError::InvalidNumber {
        field,
        value: value.to_string(),
    }
}

/// Treat an explicit `null` the same as a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_minimal_order_decodes() {
        let order: RawOrder = serde_json::from_value(json!({ "id": 42 })).unwrap();
        assert_eq!(order.id, 42);
        assert!(order.line_items.is_empty());
        assert!(order.discount_codes.is_empty());
        assert!(order.customer.is_none());
    }

    #[test]
    fn test_null_collections_become_empty() {
        let order: RawOrder = serde_json::from_value(json!({
            "id": 1,
            "discount_codes": null,
            "line_items": null
        }))
        .unwrap();
        assert!(order.discount_codes.is_empty());
        assert!(order.line_items.is_empty());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let result = serde_json::from_value::<RawOrder>(json!({ "order_number": 1001 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_raw_number_accepts_strings_and_numbers() {
        let n: RawNumber = serde_json::from_value(json!(1001)).unwrap();
        assert_eq!(n.to_i64("order_number").unwrap(), 1001);

        let n: RawNumber = serde_json::from_value(json!("1002")).unwrap();
        assert_eq!(n.to_i64("order_number").unwrap(), 1002);

        let n: RawNumber = serde_json::from_value(json!("19.90")).unwrap();
        assert_eq!(n.to_decimal("total_price").unwrap(), Decimal::new(1990, 2));
    }

    #[test]
    fn test_raw_number_rejects_malformed() {
        let n = RawNumber::Text("12,50".to_string());
        assert_eq!(
            n.to_decimal("total_price").unwrap_err(),
            RecordError::InvalidNumber {
                field: "total_price",
                value: "12,50".to_string()
            }
        );
        assert!(RawNumber::Float(10.5).to_i64("order_number").is_err());
    }
}
