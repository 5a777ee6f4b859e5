//! Spam scan log repository

use crate::db::DatabasePool;
use crate::models::SpamScanLog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailward_common::{Error, Result};

/// Spam scan log repository trait
#[async_trait]
pub trait ScanLogRepository: Send + Sync {
    async fn create(&self, log: &SpamScanLog) -> Result<()>;
    /// Drop logs older than the retention cutoff
    async fn clear_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Database spam scan log repository
pub struct DbScanLogRepository {
    pool: DatabasePool,
}

impl DbScanLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScanLogRepository for DbScanLogRepository {
    async fn create(&self, log: &SpamScanLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO spam_scan_logs (id, message, source_ip, source_host, scanning_mode,
                                        hybrid_threshold, spamd_response, spam_score,
                                        started_at, completed_at, duration_secs, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(log.id)
        .bind(&log.message)
        .bind(&log.source_ip)
        .bind(&log.source_host)
        .bind(&log.scanning_mode)
        .bind(log.hybrid_threshold)
        .bind(&log.spamd_response)
        .bind(log.spam_score)
        .bind(log.started_at)
        .bind(log.completed_at)
        .bind(log.duration_secs)
        .bind(log.created_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn clear_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM spam_scan_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
