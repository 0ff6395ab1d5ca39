//! Error types for the sync engine
//!
//! Each collaborator has its own error so the orchestrator can tell a source
//! outage apart from a store outage. Per-record problems are
//! [`ordersync_common::RecordError`] and per-document write problems live in
//! [`crate::writer::WriteReport`]; neither aborts a run.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure talking to the order source.
///
/// Never used to signal "no more records": an exhausted source returns an
/// empty page.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("source returned HTTP {status} for {url}: {body}")]
    Status { status: u16, url: String, body: String },

    #[error("rate limited by source (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Failure of a whole document-store call
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("no timestamp index for document field '{0}'")]
    UnindexedField(String),
}

/// Failure reading or writing the durable checkpoint
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt checkpoint: {0}")]
    Corrupt(String),
}

/// Errors that end a run or a cycle
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: &'static str, after: Duration },

    #[error("cursor stalled at {since_id}: full page of {received} records did not advance it")]
    StalledCursor { since_id: u64, received: usize },
}

impl SyncError {
    /// Delay requested by the source before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SyncError::Source(SourceError::RateLimited { retry_after }) => *retry_after,
            _ => None,
        }
    }
}
