//! ordersync - incremental order sync

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ordersync_common::logging::{init_logging, LogConfig, LogLevel};
use ordersync_engine::checkpoint::{
    CheckpointManager, CheckpointStore, FileCheckpointStore, PgCheckpointStore,
};
use ordersync_engine::config::{
    CheckpointBackend, CheckpointConfig, StoreBackend, StoreConfig, SyncConfig, SyncMode,
    SyncSettings,
};
use ordersync_engine::source::HttpOrderSource;
use ordersync_engine::store::{DocumentStore, MemoryDocumentStore, PgDocumentStore};
use ordersync_engine::supervisor::{shutdown_signal, Supervisor};
use ordersync_engine::{CycleReport, SyncOrchestrator};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ordersync")]
#[command(author, version, about = "Incremental order sync into a document store")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the live sync loop (or one backfill when SYNC_BACKFILL_MODE=true)
    Sync,

    /// Run one backfill from a fixed start id, then exit
    Backfill {
        /// Orders with an id greater than this are synced
        #[arg(long, env = "SYNC_BACKFILL_START_ID", default_value_t = 0)]
        start_id: u64,
    },

    /// Run a single cycle from the stored checkpoint, then exit
    Once,

    /// Inspect or override the stored checkpoint
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand, Debug)]
enum CheckpointAction {
    /// Print the stored checkpoint
    Show,

    /// Store a new checkpoint
    Set {
        /// Next cycle starts after this order id
        id: u64,
    },
}

/// Document store plus the pool backing it, when there is one
struct StoreHandle {
    documents: Arc<dyn DocumentStore>,
    pool: Option<PgPool>,
}

async fn open_store(config: &StoreConfig) -> Result<StoreHandle> {
    match config.backend {
        StoreBackend::Postgres => {
            let store = PgDocumentStore::connect(config)
                .await
                .context("Failed to connect to document store")?;
            let pool = store.pool().clone();
            Ok(StoreHandle {
                documents: Arc::new(store),
                pool: Some(pool),
            })
        },
        StoreBackend::Memory => {
            info!("Using in-memory document store; nothing is persisted");
            Ok(StoreHandle {
                documents: Arc::new(MemoryDocumentStore::new()),
                pool: None,
            })
        },
    }
}

async fn open_checkpoint_store(
    config: &CheckpointConfig,
    store_config: &StoreConfig,
    pool: Option<&PgPool>,
) -> Result<Arc<dyn CheckpointStore>> {
    match config.backend {
        CheckpointBackend::File => Ok(Arc::new(FileCheckpointStore::new(config.path.clone()))),
        CheckpointBackend::Database => {
            let pool = match pool {
                Some(pool) => pool.clone(),
                None => PgDocumentStore::connect(store_config)
                    .await
                    .context("Failed to connect to checkpoint database")?
                    .pool()
                    .clone(),
            };
            Ok(Arc::new(PgCheckpointStore::new(pool, config.name.clone())))
        },
    }
}

async fn build_orchestrator(config: &SyncConfig) -> Result<SyncOrchestrator> {
    let source = Arc::new(HttpOrderSource::new(&config.source)?);
    let store = open_store(&config.store).await?;
    let checkpoint_store =
        open_checkpoint_store(&config.checkpoint, &config.store, store.pool.as_ref()).await?;

    let checkpoint = CheckpointManager::new(
        checkpoint_store,
        store.documents.clone(),
        config.settings.bootstrap_id,
        config.settings.rewind_months,
    );

    info!(
        orders_url = source.orders_url(),
        page_size = config.settings.page_size,
        mapping_version = %config.settings.mapping_version,
        rewind_months = config.settings.rewind_months,
        "Sync configured"
    );

    Ok(SyncOrchestrator::new(
        source,
        store.documents,
        checkpoint,
        config.settings,
    ))
}

fn log_cycle(label: &str, cycle: &CycleReport) {
    info!(
        run_id = %cycle.run.run_id,
        fetches = cycle.run.fetches,
        received = cycle.run.received,
        normalized = cycle.run.normalized,
        rejected = cycle.run.rejected,
        written = cycle.run.written,
        write_failures = cycle.run.write_failures,
        checkpoint = ?cycle.checkpoint.since_id(),
        "{} complete",
        label
    );
}

async fn run_backfill(config: &SyncConfig, start_id: u64) -> Result<()> {
    let mut orchestrator = build_orchestrator(config).await?;
    let cycle = orchestrator
        .run_backfill(start_id)
        .await
        .with_context(|| format!("Backfill from {} failed", start_id))?;
    log_cycle("Backfill", &cycle);
    Ok(())
}

async fn checkpoint_command(action: CheckpointAction) -> Result<()> {
    let checkpoint_config = CheckpointConfig::from_env()?;
    let store_config = StoreConfig::from_env()?;
    let settings = SyncSettings::from_env()?;

    let store = open_store(&store_config).await?;
    let checkpoint_store =
        open_checkpoint_store(&checkpoint_config, &store_config, store.pool.as_ref()).await?;
    let mut checkpoint = CheckpointManager::new(
        checkpoint_store,
        store.documents,
        settings.bootstrap_id,
        settings.rewind_months,
    );

    match action {
        CheckpointAction::Show => match checkpoint.stored().await? {
            Some(since_id) => println!("{}", since_id),
            None => println!("no checkpoint stored (bootstrap id {})", checkpoint.bootstrap_id()),
        },
        CheckpointAction::Set { id } => {
            checkpoint.set(id).await?;
            println!("checkpoint set to {}", id);
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over flags
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("ordersync")
        .build()
        .merge_env()?;
    let _log_guard = init_logging(&log_config)?;

    match cli.command {
        Command::Sync => {
            let config = SyncConfig::from_env()?;
            match config.mode {
                SyncMode::Live => {
                    let orchestrator = build_orchestrator(&config).await?;
                    Supervisor::new(orchestrator, config.supervisor)
                        .run_until(shutdown_signal())
                        .await;
                },
                SyncMode::Backfill(backfill) => run_backfill(&config, backfill.start_id).await?,
            }
        },
        Command::Backfill { start_id } => {
            let config = SyncConfig::from_env()?;
            run_backfill(&config, start_id).await?;
        },
        Command::Once => {
            let config = SyncConfig::from_env()?;
            let mut orchestrator = build_orchestrator(&config).await?;
            let cycle = orchestrator.run_cycle().await.context("Sync cycle failed")?;
            log_cycle("Cycle", &cycle);
        },
        Command::Checkpoint { action } => checkpoint_command(action).await?,
    }

    Ok(())
}
