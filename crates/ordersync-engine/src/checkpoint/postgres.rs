//! Checkpoint kept as a named row in `sync_checkpoints`

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use super::CheckpointStore;
use crate::error::CheckpointError;

pub struct PgCheckpointStore {
    pool: PgPool,
    name: String,
}

impl PgCheckpointStore {
    /// The table is created by the document store migrations
    pub fn new(pool: PgPool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }
}

#[async_trait]
impl CheckpointStore for PgCheckpointStore {
    async fn read(&self) -> Result<Option<u64>, CheckpointError> {
        let stored: Option<i64> =
            sqlx::query_scalar("SELECT since_id FROM sync_checkpoints WHERE name = $1")
                .bind(&self.name)
                .fetch_optional(&self.pool)
                .await?;

        stored
            .map(|v| {
                u64::try_from(v).map_err(|_| {
                    CheckpointError::Corrupt(format!("negative since_id {} for '{}'", v, self.name))
                })
            })
            .transpose()
    }

    async fn write(&self, since_id: u64) -> Result<(), CheckpointError> {
        let value = i64::try_from(since_id).map_err(|_| {
            CheckpointError::Corrupt(format!("since_id {} does not fit in BIGINT", since_id))
        })?;

        sqlx::query(
            r#"
            INSERT INTO sync_checkpoints (name, since_id, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (name) DO UPDATE SET
                since_id = EXCLUDED.since_id,
                updated_at = now()
            "#,
        )
        .bind(&self.name)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
