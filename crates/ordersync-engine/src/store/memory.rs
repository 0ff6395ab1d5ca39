//! In-process document store
//!
//! Used for dry runs (`STORE_BACKEND=memory`) and tests. Upserts merge
//! top-level fields into the existing document, the same way the PostgreSQL
//! store does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{document_key, Document, DocumentStore, WriteFailure, WriteReport};
use crate::error::StoreError;

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<BTreeMap<String, Document>>,
    upsert_calls: AtomicUsize,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }

    pub async fn get(&self, key: &str) -> Option<Document> {
        self.documents.read().await.get(key).cloned()
    }

    /// Number of `upsert_many` calls served so far
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn upsert_many(
        &self,
        key_field: &str,
        documents: Vec<Document>,
    ) -> Result<WriteReport, StoreError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let mut report = WriteReport {
            attempted: documents.len(),
            ..Default::default()
        };
        let mut stored = self.documents.write().await;

        for (index, document) in documents.into_iter().enumerate() {
            let Some(key) = document_key(&document, key_field) else {
                report.failures.push(WriteFailure {
                    index,
                    key: None,
                    message: format!("document has no usable '{key_field}' field"),
                });
                continue;
            };
            stored.entry(key).or_default().extend(document);
            report.written += 1;
        }

        Ok(report)
    }

    async fn find_latest_before(
        &self,
        timestamp_field: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Document>, StoreError> {
        let stored = self.documents.read().await;

        let latest = stored
            .values()
            .filter_map(|doc| {
                let ts = doc.get(timestamp_field)?.as_str()?;
                let ts = DateTime::parse_from_rfc3339(ts).ok()?.with_timezone(&Utc);
                (ts <= cutoff).then_some((ts, doc))
            })
            .max_by_key(|(ts, _)| *ts)
            .map(|(_, doc)| doc.clone());

        Ok(latest)
    }
}
