//! Checkpoint kept in a small JSON file
//!
//! Writes go to a sibling temp file that is then renamed over the target, so
//! a crash mid-write leaves the previous checkpoint intact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::CheckpointStore;
use crate::error::CheckpointError;

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    since_id: u64,
    updated_at: DateTime<Utc>,
}

pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "checkpoint".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn read(&self) -> Result<Option<u64>, CheckpointError> {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: CheckpointFile = serde_json::from_str(&contents)
            .map_err(|e| CheckpointError::Corrupt(format!("{}: {}", self.path.display(), e)))?;
        Ok(Some(file.since_id))
    }

    async fn write(&self, since_id: u64) -> Result<(), CheckpointError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let body = serde_json::to_vec_pretty(&CheckpointFile {
            since_id,
            updated_at: Utc::now(),
        })
        .map_err(|e| CheckpointError::Corrupt(e.to_string()))?;

        let temp = self.temp_path();
        fs::write(&temp, body).await?;
        fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}
