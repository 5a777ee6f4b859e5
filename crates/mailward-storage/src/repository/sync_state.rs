//! Fetch-loop watermark persistence

use crate::db::DatabasePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailward_common::{Error, Result};

/// Watermark repository trait
#[async_trait]
pub trait SyncStateRepository: Send + Sync {
    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>>;
    async fn set_last_synced_at(&self, at: DateTime<Utc>) -> Result<()>;
}

/// Database watermark repository
pub struct DbSyncStateRepository {
    pool: DatabasePool,
}

impl DbSyncStateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncStateRepository for DbSyncStateRepository {
    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(Option<DateTime<Utc>>,)> =
            sqlx::query_as("SELECT last_synced_at FROM sync_state WHERE id = 1")
                .fetch_optional(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.and_then(|(at,)| at))
    }

    async fn set_last_synced_at(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (id, last_synced_at) VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE SET last_synced_at = EXCLUDED.last_synced_at
            "#,
        )
        .bind(at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
