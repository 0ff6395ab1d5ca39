//! Canonical order document
//!
//! Field order in [`CanonicalOrder`] is the serialized field order, which keeps
//! the stored JSON byte-identical across repeated normalizations.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Order document persisted to the store, keyed by `id`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalOrder {
    pub id: u64,
    pub order_number: i64,
    pub created_at: DateTime<Utc>,
    pub cancelled: Cancellation,
    pub price: Decimal,
    pub fulfillment_status: Option<String>,
    pub financial_status: Option<String>,
    pub status_url: Option<String>,
    pub discount_codes: Vec<String>,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub products: Vec<ProductEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductEntry {
    pub id: u64,
    pub name: String,
    pub sku: Option<String>,
    pub quantity: i64,
}

/// Cancellation state of an order.
///
/// Stored as `false` for active orders and as the cancellation timestamp
/// otherwise. Downstream queries test the field for truthiness, so it is
/// always present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cancellation {
    #[default]
    Active,
    Cancelled(DateTime<Utc>),
}

impl Cancellation {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Cancellation::Cancelled(_))
    }

    pub fn cancelled_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Cancellation::Active => None,
            Cancellation::Cancelled(at) => Some(*at),
        }
    }
}

impl From<Option<DateTime<Utc>>> for Cancellation {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Cancellation::Active, Cancellation::Cancelled)
    }
}

impl Serialize for Cancellation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cancellation::Active => serializer.serialize_bool(false),
            Cancellation::Cancelled(at) => at.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Cancellation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Stored {
            Flag(bool),
            At(DateTime<Utc>),
        }

        match Stored::deserialize(deserializer)? {
            Stored::Flag(false) => Ok(Cancellation::Active),
            Stored::Flag(true) => Err(serde::de::Error::custom(
                "cancelled must be false or a timestamp",
            )),
            Stored::At(at) => Ok(Cancellation::Cancelled(at)),
        }
    }
}
