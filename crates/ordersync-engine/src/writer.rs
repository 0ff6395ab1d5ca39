//! Batch writer
//!
//! Serializes canonical orders into store documents and submits them as one
//! unordered upsert keyed by `id`.

use ordersync_common::CanonicalOrder;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;

use crate::error::StoreError;
use crate::store::{Document, DocumentStore};

pub use crate::store::{WriteFailure, WriteReport};

/// Field every order document is keyed by
pub const KEY_FIELD: &str = "id";

pub struct BatchWriter {
    store: Arc<dyn DocumentStore>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Upsert a batch of orders; per-document failures are reported, not raised
    pub async fn write(&self, orders: &[CanonicalOrder]) -> Result<WriteReport, StoreError> {
        if orders.is_empty() {
            return Ok(WriteReport::default());
        }

        let mut documents = Vec::with_capacity(orders.len());
        let mut unserializable = Vec::new();
        for (index, order) in orders.iter().enumerate() {
            match to_document(order) {
                Ok(doc) => documents.push(doc),
                Err(e) => unserializable.push(WriteFailure {
                    index,
                    key: Some(order.id.to_string()),
                    message: e.to_string(),
                }),
            }
        }

        let mut report = self.store.upsert_many(KEY_FIELD, documents).await?;
        report.attempted += unserializable.len();
        report.failures.extend(unserializable);

        for failure in &report.failures {
            warn!(
                order_id = failure.key.as_deref().unwrap_or("?"),
                stage = "write",
                error = %failure.message,
                "Order document rejected by store"
            );
        }

        Ok(report)
    }
}

/// Canonical order as a JSON object
pub fn to_document(order: &CanonicalOrder) -> Result<Document, serde_json::Error> {
    match serde_json::to_value(order)? {
        Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "order {} serialized to a non-object: {}",
            order.id, other
        ))),
    }
}
