//! Sync orchestrator
//!
//! A *run* walks the source from a start cursor until it is exhausted:
//! fetch a page, normalize it, write it, move the cursor to the page's highest
//! id. A *cycle* is checkpoint load, one run, then the checkpoint rewind.
//!
//! Pages are processed strictly one after another. Every call to a
//! collaborator is bounded by the configured call timeout.

use chrono::Utc;
use ordersync_common::CanonicalOrder;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::checkpoint::{AdvanceOutcome, CheckpointManager};
use crate::config::SyncSettings;
use crate::error::{Result, SyncError};
use crate::normalize::{FieldMapping, Normalizer};
use crate::source::{OrderPage, OrderSource};
use crate::store::DocumentStore;
use crate::writer::{BatchWriter, WriteReport};

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The source returned a short or empty page
    Exhausted,
    /// A fetch failed; progress up to the failure is kept in the store
    FetchFailed,
}

/// Progress of one run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub start_id: u64,
    /// Cursor after the last processed page
    pub last_id: u64,
    pub fetches: usize,
    pub pages: usize,
    pub received: usize,
    pub normalized: usize,
    pub rejected: usize,
    pub writes: usize,
    pub written: usize,
    pub write_failures: usize,
    pub min_order_number: Option<i64>,
    pub max_order_number: Option<i64>,
    pub outcome: RunOutcome,
    /// Set when `outcome` is [`RunOutcome::FetchFailed`]
    pub error: Option<SyncError>,
}

impl RunReport {
    fn new(run_id: Uuid, start_id: u64) -> Self {
        Self {
            run_id,
            start_id,
            last_id: start_id,
            fetches: 0,
            pages: 0,
            received: 0,
            normalized: 0,
            rejected: 0,
            writes: 0,
            written: 0,
            write_failures: 0,
            min_order_number: None,
            max_order_number: None,
            outcome: RunOutcome::Exhausted,
            error: None,
        }
    }

    fn record_orders(&mut self, orders: &[CanonicalOrder]) {
        for order in orders {
            let n = order.order_number;
            self.min_order_number = Some(self.min_order_number.map_or(n, |m| m.min(n)));
            self.max_order_number = Some(self.max_order_number.map_or(n, |m| m.max(n)));
        }
    }

    fn record_write(&mut self, write: &WriteReport) {
        self.writes += 1;
        self.written += write.written;
        self.write_failures += write.failed();
    }

    /// The fetch error of a failed run, or the report of an exhausted one
    pub fn into_result(mut self) -> Result<Self> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }
}

/// A finished cycle or backfill
#[derive(Debug)]
pub struct CycleReport {
    pub run: RunReport,
    pub checkpoint: AdvanceOutcome,
}

async fn bounded<T, E, F>(stage: &'static str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    SyncError: From<E>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result.map_err(SyncError::from),
        Err(_) => Err(SyncError::Timeout { stage, after }),
    }
}

pub struct SyncOrchestrator {
    source: Arc<dyn OrderSource>,
    writer: BatchWriter,
    checkpoint: CheckpointManager,
    normalizer: Normalizer,
    settings: SyncSettings,
}

impl SyncOrchestrator {
    pub fn new(
        source: Arc<dyn OrderSource>,
        store: Arc<dyn DocumentStore>,
        checkpoint: CheckpointManager,
        settings: SyncSettings,
    ) -> Self {
        Self {
            source,
            writer: BatchWriter::new(store),
            checkpoint,
            normalizer: Normalizer::new(FieldMapping::for_version(settings.mapping_version)),
            settings,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn checkpoint(&self) -> &CheckpointManager {
        &self.checkpoint
    }

    /// Process every record after `start_id` until the source is exhausted
    ///
    /// A fetch failure ends the run with [`RunOutcome::FetchFailed`] rather
    /// than an `Err`; store outages, timeouts outside the fetch and a stalled
    /// cursor are returned as errors.
    pub async fn run(&mut self, start_id: u64) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = info_span!("sync_run", %run_id, start_id);
        self.run_pages(run_id, start_id).instrument(span).await
    }

    async fn run_pages(&mut self, run_id: Uuid, start_id: u64) -> Result<RunReport> {
        let mut report = RunReport::new(run_id, start_id);
        let mut since_id = start_id;
        let call_timeout = self.settings.call_timeout();

        info!(page_size = self.settings.page_size, "Run started");

        loop {
            report.fetches += 1;
            let fetched = bounded(
                "fetch",
                call_timeout,
                self.source.fetch_page(since_id, self.settings.page_size),
            )
            .await;

            let page = match fetched {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        since_id,
                        stage = "fetch",
                        pages = report.pages,
                        error = %e,
                        "Fetch failed, ending run"
                    );
                    report.outcome = RunOutcome::FetchFailed;
                    report.error = Some(e);
                    return Ok(report);
                },
            };

            if page.is_empty() {
                break;
            }

            self.process_page(&page, since_id, &mut report).await?;

            match page.max_id() {
                Some(max_id) if max_id > since_id => {
                    since_id = max_id;
                    report.last_id = max_id;
                },
                _ if page.has_more => {
                    return Err(SyncError::StalledCursor {
                        since_id,
                        received: page.received,
                    });
                },
                _ => {},
            }

            if !page.has_more {
                break;
            }
        }

        info!(
            fetches = report.fetches,
            pages = report.pages,
            received = report.received,
            normalized = report.normalized,
            rejected = report.rejected,
            written = report.written,
            write_failures = report.write_failures,
            last_id = report.last_id,
            "Run exhausted source"
        );
        Ok(report)
    }

    async fn process_page(
        &mut self,
        page: &OrderPage,
        since_id: u64,
        report: &mut RunReport,
    ) -> Result<()> {
        let normalized = self.normalizer.normalize_page(&page.orders);

        let write = if normalized.orders.is_empty() {
            WriteReport::default()
        } else {
            let write = bounded(
                "write",
                self.settings.call_timeout(),
                self.writer.write(&normalized.orders),
            )
            .await?;
            report.record_write(&write);
            write
        };

        report.pages += 1;
        report.received += page.received;
        report.normalized += normalized.orders.len();
        report.rejected += normalized.rejected.len();
        report.record_orders(&normalized.orders);

        info!(
            page = report.pages,
            since_id,
            received = page.received,
            skipped = page.received.saturating_sub(page.orders.len()),
            normalized = normalized.orders.len(),
            rejected = normalized.rejected.len(),
            written = write.written,
            write_failures = write.failed(),
            "Processed order page"
        );
        Ok(())
    }

    async fn load_checkpoint(&mut self) -> Result<u64> {
        let after = self.settings.call_timeout();
        tokio::time::timeout(after, self.checkpoint.load())
            .await
            .map_err(|_| SyncError::Timeout {
                stage: "checkpoint",
                after,
            })
    }

    async fn advance_checkpoint(&mut self) -> Result<AdvanceOutcome> {
        let run_end = Utc::now();
        let after = self.settings.call_timeout();
        bounded("checkpoint", after, self.checkpoint.advance(run_end)).await
    }

    /// Load the checkpoint, run to exhaustion, rewind the checkpoint
    ///
    /// A fetch failure is returned as an error and leaves the stored
    /// checkpoint untouched.
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        let start_id = self.load_checkpoint().await?;
        let run = self.run(start_id).await?.into_result()?;
        let checkpoint = self.advance_checkpoint().await?;
        Ok(CycleReport { run, checkpoint })
    }

    /// One bounded run from a fixed start id, then the checkpoint rewind
    pub async fn run_backfill(&mut self, start_id: u64) -> Result<CycleReport> {
        info!(start_id, "Backfill started");
        let run = self.run(start_id).await?.into_result()?;
        let checkpoint = self.advance_checkpoint().await?;
        Ok(CycleReport { run, checkpoint })
    }
}
