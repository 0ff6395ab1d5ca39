//! Document store interface
//!
//! Documents are JSON objects. Writes are upserts keyed by one field and are
//! submitted as unordered batches: one rejected document never blocks the
//! others. Only a failure of the whole call (store unreachable) is an error.

pub mod memory;
pub mod postgres;

pub use memory::MemoryDocumentStore;
pub use postgres::PgDocumentStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// A stored JSON document
pub type Document = Map<String, Value>;

/// A document the store refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteFailure {
    /// Position of the document in the submitted batch
    pub index: usize,
    pub key: Option<String>,
    pub message: String,
}

/// Outcome of one unordered batch write
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub attempted: usize,
    pub written: usize,
    pub failures: Vec<WriteFailure>,
}

impl WriteReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.written == self.attempted
    }

    /// Fold another batch into a running total
    pub fn absorb(&mut self, other: WriteReport) {
        self.attempted += other.attempted;
        self.written += other.written;
        self.failures.extend(other.failures);
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Upsert every document keyed by `key_field`, unordered and partial-failure tolerant
    async fn upsert_many(
        &self,
        key_field: &str,
        documents: Vec<Document>,
    ) -> Result<WriteReport, StoreError>;

    /// Newest document whose `timestamp_field` is at or before `cutoff`
    async fn find_latest_before(
        &self,
        timestamp_field: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Document>, StoreError>;
}

/// String form of a document's key; numbers and strings are accepted
pub fn document_key(document: &Document, key_field: &str) -> Option<String> {
    match document.get(key_field)? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}
