//! Resume checkpoint
//!
//! The checkpoint is the `since_id` the next cycle starts from. After a run it
//! is deliberately moved *behind* the newest record: to the id of the latest
//! order created at or before `run end - rewind window`. Orders younger than
//! the window are therefore fetched again on every cycle, which picks up their
//! status changes (fulfillment, refunds, cancellation).

pub mod file;
pub mod postgres;

pub use file::FileCheckpointStore;
pub use postgres::PgCheckpointStore;

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{CheckpointError, StoreError};
use crate::store::DocumentStore;
use crate::writer::KEY_FIELD;

/// Document field the rewind query orders by
pub const TIMESTAMP_FIELD: &str = "created_at";

/// Durable storage for the checkpoint value
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// `Ok(None)` when no checkpoint has ever been written
    async fn read(&self) -> Result<Option<u64>, CheckpointError>;

    async fn write(&self, since_id: u64) -> Result<(), CheckpointError>;
}

/// Result of moving the checkpoint after a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Persisted the id of the newest order at or before `cutoff`
    Advanced { since_id: u64, cutoff: DateTime<Utc> },
    /// No stored order is old enough; the checkpoint is untouched
    Unchanged { cutoff: DateTime<Utc> },
    /// The new value is held in memory only; the stored value is stale
    PersistFailed { since_id: u64, cutoff: DateTime<Utc> },
}

impl AdvanceOutcome {
    pub fn since_id(&self) -> Option<u64> {
        match self {
            AdvanceOutcome::Advanced { since_id, .. }
            | AdvanceOutcome::PersistFailed { since_id, .. } => Some(*since_id),
            AdvanceOutcome::Unchanged { .. } => None,
        }
    }
}

/// `run_end` moved back by whole calendar months
///
/// Month arithmetic clamps to the end of shorter months (May 31 minus three
/// months is February 28 or 29).
pub fn rewind_cutoff(run_end: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    run_end
        .checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    documents: Arc<dyn DocumentStore>,
    bootstrap_id: u64,
    rewind_months: u32,
    /// Checkpoint value as this process last saw or set it
    last_known: Option<u64>,
}

impl CheckpointManager {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        documents: Arc<dyn DocumentStore>,
        bootstrap_id: u64,
        rewind_months: u32,
    ) -> Self {
        Self {
            store,
            documents,
            bootstrap_id,
            rewind_months,
            last_known: None,
        }
    }

    pub fn bootstrap_id(&self) -> u64 {
        self.bootstrap_id
    }

    pub fn last_known(&self) -> Option<u64> {
        self.last_known
    }

    /// Checkpoint to start the next run from
    ///
    /// Never fails: a missing or corrupt value yields the bootstrap id, and a
    /// storage error yields the in-memory value (or the bootstrap id).
    pub async fn load(&mut self) -> u64 {
        let since_id = match self.store.read().await {
            Ok(Some(since_id)) => since_id,
            Ok(None) => {
                info!(bootstrap_id = self.bootstrap_id, "No checkpoint stored, starting from bootstrap id");
                self.bootstrap_id
            },
            Err(CheckpointError::Corrupt(reason)) => {
                warn!(
                    bootstrap_id = self.bootstrap_id,
                    stage = "checkpoint",
                    reason = %reason,
                    "Stored checkpoint is corrupt, starting from bootstrap id"
                );
                self.bootstrap_id
            },
            Err(e) => {
                let fallback = self.last_known.unwrap_or(self.bootstrap_id);
                warn!(
                    fallback,
                    stage = "checkpoint",
                    error = %e,
                    "Failed to read checkpoint, using last known value"
                );
                fallback
            },
        };

        self.last_known = Some(since_id);
        since_id
    }

    /// Move the checkpoint to the rewind position for a run that ended at `run_end`
    pub async fn advance(&mut self, run_end: DateTime<Utc>) -> Result<AdvanceOutcome, StoreError> {
        let cutoff = rewind_cutoff(run_end, self.rewind_months);

        let Some(document) = self.documents.find_latest_before(TIMESTAMP_FIELD, cutoff).await? else {
            info!(%cutoff, "No order at or before rewind cutoff, checkpoint unchanged");
            return Ok(AdvanceOutcome::Unchanged { cutoff });
        };

        let Some(since_id) = document.get(KEY_FIELD).and_then(Value::as_u64) else {
            warn!(%cutoff, stage = "checkpoint", "Rewind document has no numeric id, checkpoint unchanged");
            return Ok(AdvanceOutcome::Unchanged { cutoff });
        };

        self.last_known = Some(since_id);
        match self.store.write(since_id).await {
            Ok(()) => {
                info!(since_id, %cutoff, "Checkpoint advanced");
                Ok(AdvanceOutcome::Advanced { since_id, cutoff })
            },
            Err(e) => {
                error!(
                    since_id,
                    %cutoff,
                    stage = "checkpoint",
                    error = %e,
                    "Failed to persist checkpoint, keeping value in memory"
                );
                Ok(AdvanceOutcome::PersistFailed { since_id, cutoff })
            },
        }
    }

    /// Overwrite the stored checkpoint
    pub async fn set(&mut self, since_id: u64) -> Result<(), CheckpointError> {
        self.store.write(since_id).await?;
        self.last_known = Some(since_id);
        info!(since_id, "Checkpoint set");
        Ok(())
    }

    /// Stored value as-is, without bootstrap or fallback
    pub async fn stored(&self) -> Result<Option<u64>, CheckpointError> {
        self.store.read().await
    }
}
