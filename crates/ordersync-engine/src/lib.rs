//! ordersync engine
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Incremental order sync from a paginated e-commerce REST API into a
//! document store.
//!
//! # Pipeline
//!
//! - **Source** ([`source`]): pages of raw orders by ascending id cursor
//! - **Normalize** ([`normalize`]): raw order to canonical document, per record
//! - **Write** ([`writer`]): unordered upsert batches keyed by order id
//! - **Checkpoint** ([`checkpoint`]): resume cursor, rewound after each run so
//!   recent orders are revisited
//! - **Orchestrate** ([`orchestrator`], [`supervisor`]): runs, cycles, backfills
//!   and the retrying live loop
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ordersync_engine::checkpoint::{CheckpointManager, FileCheckpointStore};
//! use ordersync_engine::config::{SourceConfig, SyncSettings};
//! use ordersync_engine::orchestrator::SyncOrchestrator;
//! use ordersync_engine::source::HttpOrderSource;
//! use ordersync_engine::store::MemoryDocumentStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = Arc::new(HttpOrderSource::new(&SourceConfig::from_env()?)?);
//!     let store = Arc::new(MemoryDocumentStore::new());
//!     let checkpoint = CheckpointManager::new(
//!         Arc::new(FileCheckpointStore::new("./data/checkpoint.json")),
//!         store.clone(),
//!         0,
//!         3,
//!     );
//!
//!     let mut sync = SyncOrchestrator::new(source, store, checkpoint, SyncSettings::default());
//!     let cycle = sync.run_cycle().await?;
//!     println!("normalized {} orders", cycle.run.normalized);
//!     Ok(())
//! }
//! ```

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod source;
pub mod store;
pub mod supervisor;
pub mod writer;

pub use config::SyncConfig;
pub use error::{CheckpointError, SourceError, StoreError, SyncError};
pub use orchestrator::{CycleReport, RunOutcome, RunReport, SyncOrchestrator};
pub use supervisor::Supervisor;
