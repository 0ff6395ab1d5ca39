//! Versioned field mappings
//!
//! The canonical document has kept its shape while the upstream fields it is
//! read from have changed between deployments. Each [`MappingVersion`] names
//! one row of [`MAPPINGS`]; the normalizer consults the row instead of
//! branching on the version.

use ordersync_common::types::{RawLineItem, RawNumber};
use ordersync_common::RawOrder;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MappingVersion {
    /// Price from `current_subtotal_price`, quantity from `current_quantity`
    V1,
    /// Price from `total_price`, quantity from `current_quantity` or `quantity`
    #[default]
    V2,
}

impl std::str::FromStr for MappingVersion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v1" | "1" => Ok(MappingVersion::V1),
            "v2" | "2" => Ok(MappingVersion::V2),
            _ => anyhow::bail!("Invalid mapping version: {}. Must be 'v1' or 'v2'", s),
        }
    }
}

impl std::fmt::Display for MappingVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MappingVersion::V1 => f.write_str("v1"),
            MappingVersion::V2 => f.write_str("v2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    CurrentSubtotal,
    Total,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityField {
    /// `current_quantity` only
    Current,
    /// `current_quantity`, else the ordered `quantity`
    CurrentOrOrdered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub version: MappingVersion,
    pub price: PriceField,
    pub quantity: QuantityField,
}

pub const MAPPINGS: [FieldMapping; 2] = [
    FieldMapping {
        version: MappingVersion::V1,
        price: PriceField::CurrentSubtotal,
        quantity: QuantityField::Current,
    },
    FieldMapping {
        version: MappingVersion::V2,
        price: PriceField::Total,
        quantity: QuantityField::CurrentOrOrdered,
    },
];

impl FieldMapping {
    pub fn for_version(version: MappingVersion) -> Self {
        MAPPINGS
            .into_iter()
            .find(|m| m.version == version)
            .unwrap_or(MAPPINGS[MAPPINGS.len() - 1])
    }

    /// Upstream field name and value the price is read from
    pub fn price<'a>(&self, order: &'a RawOrder) -> (&'static str, Option<&'a RawNumber>) {
        match self.price {
            PriceField::CurrentSubtotal => {
                ("current_subtotal_price", order.current_subtotal_price.as_ref())
            },
            PriceField::Total => ("total_price", order.total_price.as_ref()),
        }
    }

    /// Line item quantity; missing upstream counts as zero
    pub fn quantity(&self, item: &RawLineItem) -> i64 {
        let quantity = match self.quantity {
            QuantityField::Current => item.current_quantity,
            QuantityField::CurrentOrOrdered => item.current_quantity.or(item.quantity),
        };
        quantity.unwrap_or(0)
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::for_version(MappingVersion::default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_every_version_has_a_row() {
        for version in [MappingVersion::V1, MappingVersion::V2] {
            assert_eq!(FieldMapping::for_version(version).version, version);
        }
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!("V1".parse::<MappingVersion>().unwrap(), MappingVersion::V1);
        assert_eq!("2".parse::<MappingVersion>().unwrap(), MappingVersion::V2);
        assert!("v3".parse::<MappingVersion>().is_err());
    }

    #[test]
    fn test_quantity_fallback_depends_on_version() {
        let item = RawLineItem {
            product_id: Some(1),
            title: None,
            sku: None,
            quantity: Some(3),
            current_quantity: None,
        };
        assert_eq!(FieldMapping::for_version(MappingVersion::V1).quantity(&item), 0);
        assert_eq!(FieldMapping::for_version(MappingVersion::V2).quantity(&item), 3);
    }
}
