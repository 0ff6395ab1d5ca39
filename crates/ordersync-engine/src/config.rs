//! Sync configuration
//!
//! Every setting is read from the environment (after `.env` is loaded by the
//! binary). Unset or unparsable numeric values fall back to their `DEFAULT_*`
//! constant; unknown backend or mode names are rejected.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::normalize::MappingVersion;

pub const DEFAULT_API_VERSION: &str = "2024-04";
pub const DEFAULT_PAGE_SIZE: u32 = 250;
/// Largest page the Admin API serves
pub const MAX_PAGE_SIZE: u32 = 250;
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/ordersync";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_WRITE_CONCURRENCY: usize = 8;

pub const DEFAULT_CHECKPOINT_PATH: &str = "./data/checkpoint.json";
pub const DEFAULT_CHECKPOINT_NAME: &str = "orders";

pub const DEFAULT_BOOTSTRAP_ID: u64 = 0;
pub const DEFAULT_REWIND_MONTHS: u32 = 3;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_CYCLE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_RETRY_BASE_SECS: u64 = 5;
pub const DEFAULT_RETRY_MAX_SECS: u64 = 300;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr<Err = anyhow::Error>,
{
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .parse()
            .map_err(|e: anyhow::Error| e.context(format!("Invalid {}", key))),
        _ => Ok(default),
    }
}

/// Where canonical documents are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Postgres,
    /// Process-local store, nothing survives a restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => anyhow::bail!("Invalid store backend: {}. Must be 'postgres' or 'memory'", s),
        }
    }
}

/// Where the resume cursor is persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    #[default]
    File,
    Database,
}

impl FromStr for CheckpointBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(CheckpointBackend::File),
            "database" | "postgres" => Ok(CheckpointBackend::Database),
            _ => anyhow::bail!("Invalid checkpoint backend: {}. Must be 'file' or 'database'", s),
        }
    }
}

/// Order source connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Shop origin, e.g. `https://shop.myshopify.com`
    pub base_url: String,
    pub api_version: String,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            access_token: None,
            timeout_secs: DEFAULT_SOURCE_TIMEOUT_SECS,
        }
    }
}

impl SourceConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            base_url: std::env::var("SOURCE_BASE_URL")
                .map_err(|_| anyhow::anyhow!("SOURCE_BASE_URL must be set"))?,
            api_version: std::env::var("SOURCE_API_VERSION")
                .unwrap_or_else(|_| DEFAULT_API_VERSION.to_string()),
            access_token: std::env::var("SOURCE_ACCESS_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            timeout_secs: env_or("SOURCE_TIMEOUT_SECS", DEFAULT_SOURCE_TIMEOUT_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.is_empty() {
            anyhow::bail!("SOURCE_BASE_URL cannot be empty");
        }
        let parsed = url::Url::parse(&self.base_url)
            .map_err(|e| anyhow::anyhow!("SOURCE_BASE_URL is not a valid URL: {}", e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("SOURCE_BASE_URL must use http or https, got: {}", parsed.scheme());
        }
        if self.api_version.is_empty() {
            anyhow::bail!("SOURCE_API_VERSION cannot be empty");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("SOURCE_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Document store settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub database_url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    /// Upserts in flight within one batch
    pub write_concurrency: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            write_concurrency: DEFAULT_WRITE_CONCURRENCY,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            backend: env_parsed("STORE_BACKEND", StoreBackend::default())?,
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            connect_timeout_secs: env_or(
                "DATABASE_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            ),
            write_concurrency: env_or("STORE_WRITE_CONCURRENCY", DEFAULT_WRITE_CONCURRENCY),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL cannot be empty");
        }
        if self.max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
        }
        if self.write_concurrency == 0 {
            anyhow::bail!("STORE_WRITE_CONCURRENCY must be greater than 0");
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Checkpoint persistence settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    /// File backend location
    pub path: PathBuf,
    /// Database backend row name
    pub name: String,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::default(),
            path: PathBuf::from(DEFAULT_CHECKPOINT_PATH),
            name: DEFAULT_CHECKPOINT_NAME.to_string(),
        }
    }
}

impl CheckpointConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            backend: env_parsed("CHECKPOINT_BACKEND", CheckpointBackend::default())?,
            path: std::env::var("CHECKPOINT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_CHECKPOINT_PATH)),
            name: std::env::var("CHECKPOINT_NAME")
                .unwrap_or_else(|_| DEFAULT_CHECKPOINT_NAME.to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self.backend {
            CheckpointBackend::File if self.path.as_os_str().is_empty() => {
                anyhow::bail!("CHECKPOINT_PATH cannot be empty")
            },
            CheckpointBackend::Database if self.name.is_empty() => {
                anyhow::bail!("CHECKPOINT_NAME cannot be empty")
            },
            _ => Ok(()),
        }
    }
}

/// Configuration for a backfill run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// First cursor of the run; records with a greater id are fetched
    pub start_id: u64,
}

/// What the `sync` command does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SyncMode {
    /// Repeat cycles until shutdown
    #[default]
    Live,
    /// One bounded run from a fixed start id, then exit
    Backfill(BackfillConfig),
}

/// Settings the orchestrator runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub page_size: u32,
    /// Cursor used when no checkpoint has ever been written
    pub bootstrap_id: u64,
    /// Calendar months between the end of a run and the next checkpoint
    pub rewind_months: u32,
    pub mapping_version: MappingVersion,
    /// Bound on every fetch, write and checkpoint call
    pub call_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            bootstrap_id: DEFAULT_BOOTSTRAP_ID,
            rewind_months: DEFAULT_REWIND_MONTHS,
            mapping_version: MappingVersion::default(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }
}

impl SyncSettings {
    pub fn from_env() -> anyhow::Result<Self> {
        let settings = Self {
            page_size: env_or("SOURCE_PAGE_SIZE", DEFAULT_PAGE_SIZE),
            bootstrap_id: env_or("SYNC_BOOTSTRAP_ID", DEFAULT_BOOTSTRAP_ID),
            rewind_months: env_or("SYNC_REWIND_MONTHS", DEFAULT_REWIND_MONTHS),
            mapping_version: env_parsed("SYNC_MAPPING_VERSION", MappingVersion::default())?,
            call_timeout_secs: env_or("SYNC_CALL_TIMEOUT_SECS", DEFAULT_CALL_TIMEOUT_SECS),
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            anyhow::bail!(
                "SOURCE_PAGE_SIZE must be between 1 and {}, got: {}",
                MAX_PAGE_SIZE,
                self.page_size
            );
        }
        if self.call_timeout_secs == 0 {
            anyhow::bail!("SYNC_CALL_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Backoff and pacing of the live loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    pub cycle_interval_secs: u64,
    pub retry_base_secs: u64,
    pub retry_max_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            cycle_interval_secs: DEFAULT_CYCLE_INTERVAL_SECS,
            retry_base_secs: DEFAULT_RETRY_BASE_SECS,
            retry_max_secs: DEFAULT_RETRY_MAX_SECS,
        }
    }
}

impl SupervisorConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            cycle_interval_secs: env_or("SYNC_CYCLE_INTERVAL_SECS", DEFAULT_CYCLE_INTERVAL_SECS),
            retry_base_secs: env_or("SYNC_RETRY_BASE_SECS", DEFAULT_RETRY_BASE_SECS),
            retry_max_secs: env_or("SYNC_RETRY_MAX_SECS", DEFAULT_RETRY_MAX_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retry_base_secs == 0 {
            anyhow::bail!("SYNC_RETRY_BASE_SECS must be greater than 0");
        }
        if self.retry_max_secs < self.retry_base_secs {
            anyhow::bail!(
                "SYNC_RETRY_MAX_SECS ({}) must not be less than SYNC_RETRY_BASE_SECS ({})",
                self.retry_max_secs,
                self.retry_base_secs
            );
        }
        Ok(())
    }

    pub fn cycle_interval(&self) -> Duration {
        Duration::from_secs(self.cycle_interval_secs)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_secs(self.retry_base_secs)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_secs(self.retry_max_secs)
    }
}

/// Complete deployment configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub source: SourceConfig,
    pub store: StoreConfig,
    pub checkpoint: CheckpointConfig,
    pub settings: SyncSettings,
    pub supervisor: SupervisorConfig,
    pub mode: SyncMode,
}

impl SyncConfig {
    /// Load the whole configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let backfill = env_or("SYNC_BACKFILL_MODE", false);
        let mode = if backfill {
            SyncMode::Backfill(BackfillConfig {
                start_id: env_or("SYNC_BACKFILL_START_ID", DEFAULT_BOOTSTRAP_ID),
            })
        } else {
            SyncMode::Live
        };

        Ok(Self {
            source: SourceConfig::from_env()?,
            store: StoreConfig::from_env()?,
            checkpoint: CheckpointConfig::from_env()?,
            settings: SyncSettings::from_env()?,
            supervisor: SupervisorConfig::from_env()?,
            mode,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "SOURCE_BASE_URL",
        "SOURCE_API_VERSION",
        "SOURCE_ACCESS_TOKEN",
        "SOURCE_PAGE_SIZE",
        "SOURCE_TIMEOUT_SECS",
        "STORE_BACKEND",
        "DATABASE_URL",
        "STORE_WRITE_CONCURRENCY",
        "CHECKPOINT_BACKEND",
        "CHECKPOINT_PATH",
        "CHECKPOINT_NAME",
        "SYNC_BACKFILL_MODE",
        "SYNC_BACKFILL_START_ID",
        "SYNC_MAPPING_VERSION",
        "SYNC_REWIND_MONTHS",
        "SYNC_RETRY_BASE_SECS",
        "SYNC_RETRY_MAX_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(SyncSettings::default().validate().is_ok());
        assert!(StoreConfig::default().validate().is_ok());
        assert!(CheckpointConfig::default().validate().is_ok());
        assert!(SupervisorConfig::default().validate().is_ok());
        assert_eq!(SyncSettings::default().rewind_months, 3);
        assert_eq!(SyncSettings::default().mapping_version, MappingVersion::V2);
    }

    #[test]
    fn test_page_size_bounds() {
        let mut settings = SyncSettings::default();
        settings.page_size = 0;
        assert!(settings.validate().is_err());
        settings.page_size = MAX_PAGE_SIZE + 1;
        assert!(settings.validate().is_err());
        settings.page_size = 1;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_source_requires_http_url() {
        let mut config = SourceConfig::default();
        assert!(config.validate().is_err());
        config.base_url = "ftp://shop.example.com".to_string();
        assert!(config.validate().is_err());
        config.base_url = "https://shop.example.com".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_max_below_base_is_rejected() {
        let config = SupervisorConfig {
            cycle_interval_secs: 60,
            retry_base_secs: 10,
            retry_max_secs: 5,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        std::env::set_var("SOURCE_BASE_URL", "https://shop.example.com");

        let config = SyncConfig::from_env().unwrap();
        assert_eq!(config.source.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.source.access_token, None);
        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::File);
        assert_eq!(config.settings.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.mode, SyncMode::Live);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_backfill_mode() {
        clear_env();
        std::env::set_var("SOURCE_BASE_URL", "https://shop.example.com");
        std::env::set_var("SYNC_BACKFILL_MODE", "true");
        std::env::set_var("SYNC_BACKFILL_START_ID", "5000000");
        std::env::set_var("SYNC_MAPPING_VERSION", "v1");
        std::env::set_var("STORE_BACKEND", "memory");

        let config = SyncConfig::from_env().unwrap();
        assert_eq!(
            config.mode,
            SyncMode::Backfill(BackfillConfig { start_id: 5_000_000 })
        );
        assert_eq!(config.settings.mapping_version, MappingVersion::V1);
        assert_eq!(config.store.backend, StoreBackend::Memory);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_rejects_unknown_backend() {
        clear_env();
        std::env::set_var("SOURCE_BASE_URL", "https://shop.example.com");
        std::env::set_var("CHECKPOINT_BACKEND", "redis");

        assert!(SyncConfig::from_env().is_err());

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_base_url() {
        clear_env();
        assert!(SourceConfig::from_env().is_err());
    }
}
