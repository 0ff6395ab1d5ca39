//! PostgreSQL document store
//!
//! Documents live as JSONB in `order_documents`, keyed by the string form of
//! the key field. An upsert merges top-level fields into the stored document
//! (`document || EXCLUDED.document`), so fields written by other processes
//! survive a resync.
//!
//! The document's `created_at` is also kept in a typed, indexed column. A
//! value that does not parse as a timestamp is stored as NULL, so such rows
//! never take part in [`DocumentStore::find_latest_before`].
//!
//! Batch writes are unordered: every document is its own statement, issued
//! concurrently up to `write_concurrency`, and a rejected document is recorded
//! in the [`WriteReport`] without affecting the rest. Connection-level
//! failures abort the batch with [`StoreError`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use ordersync_common::types::parse_timestamp;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use tracing::{debug, info};

use super::{document_key, Document, DocumentStore, WriteFailure, WriteReport};
use crate::config::StoreConfig;
use crate::error::StoreError;

/// Document field mirrored into the `created_at` column
pub const CREATED_AT_FIELD: &str = "created_at";

pub struct PgDocumentStore {
    pool: PgPool,
    write_concurrency: usize,
}

enum UpsertOutcome {
    Written,
    Rejected(WriteFailure),
    Unavailable(sqlx::Error),
}

impl PgDocumentStore {
    pub fn new(pool: PgPool, write_concurrency: usize) -> Self {
        Self {
            pool,
            write_concurrency: write_concurrency.max(1),
        }
    }

    /// Open a pool and apply pending migrations
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.database_url)
            .await?;

        info!(
            max_connections = config.max_connections,
            write_concurrency = config.write_concurrency,
            "Document store connection pool created"
        );

        let store = Self::new(pool, config.write_concurrency);
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Errors that say nothing about the document itself
fn is_connection_error(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
    )
}

/// Typed `created_at` of a document, `None` when absent or unparseable
fn created_at(document: &Document) -> Option<DateTime<Utc>> {
    let value = document.get(CREATED_AT_FIELD)?.as_str()?;
    parse_timestamp(CREATED_AT_FIELD, value).ok()
}

async fn upsert_one(pool: &PgPool, key: &str, document: &Document) -> Result<(), sqlx::Error> {
    // The column follows the merged document: it only changes when the
    // incoming document carries the field.
    sqlx::query(
        r#"
        INSERT INTO order_documents (doc_key, document, created_at, synced_at)
        VALUES ($1, $2, $3, now())
        ON CONFLICT (doc_key) DO UPDATE SET
            document = order_documents.document || EXCLUDED.document,
            created_at = CASE
                WHEN EXCLUDED.document ? $4 THEN EXCLUDED.created_at
                ELSE order_documents.created_at
            END,
            synced_at = now()
        "#,
    )
    .bind(key)
    .bind(Json(document))
    .bind(created_at(document))
    .bind(CREATED_AT_FIELD)
    .execute(pool)
    .await?;

    Ok(())
}

#[async_trait]
impl DocumentStore for PgDocumentStore {
    async fn upsert_many(
        &self,
        key_field: &str,
        documents: Vec<Document>,
    ) -> Result<WriteReport, StoreError> {
        let attempted = documents.len();
        let pool = &self.pool;

        let outcomes: Vec<UpsertOutcome> = stream::iter(documents.into_iter().enumerate())
            .map(|(index, document)| async move {
                let Some(key) = document_key(&document, key_field) else {
                    return UpsertOutcome::Rejected(WriteFailure {
                        index,
                        key: None,
                        message: format!("document has no usable '{key_field}' field"),
                    });
                };
                match upsert_one(pool, &key, &document).await {
                    Ok(()) => UpsertOutcome::Written,
                    Err(e) if is_connection_error(&e) => UpsertOutcome::Unavailable(e),
                    Err(e) => UpsertOutcome::Rejected(WriteFailure {
                        index,
                        key: Some(key),
                        message: e.to_string(),
                    }),
                }
            })
            .buffer_unordered(self.write_concurrency)
            .collect()
            .await;

        let mut report = WriteReport {
            attempted,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                UpsertOutcome::Written => report.written += 1,
                UpsertOutcome::Rejected(failure) => report.failures.push(failure),
                UpsertOutcome::Unavailable(e) => return Err(StoreError::Database(e)),
            }
        }
        report.failures.sort_by_key(|f| f.index);

        debug!(
            attempted = report.attempted,
            written = report.written,
            failed = report.failed(),
            "Upserted document batch"
        );
        Ok(report)
    }

    async fn find_latest_before(
        &self,
        timestamp_field: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<Document>, StoreError> {
        if timestamp_field != CREATED_AT_FIELD {
            return Err(StoreError::UnindexedField(timestamp_field.to_string()));
        }

        let found: Option<Json<Document>> = sqlx::query_scalar(
            r#"
            SELECT document
            FROM order_documents
            WHERE created_at <= $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await?;

        Ok(found.map(|Json(document)| document))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_created_at_column_value() {
        assert_eq!(
            created_at(&doc(json!({ "created_at": "2024-04-01T10:00:00-04:00" }))),
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 14, 0, 0).unwrap())
        );
        assert_eq!(created_at(&doc(json!({ "created_at": "garbage" }))), None);
        assert_eq!(created_at(&doc(json!({ "created_at": 1_700_000_000 }))), None);
        assert_eq!(created_at(&doc(json!({ "id": 1 }))), None);
    }
}
