//! Incoming message repository

use crate::db::DatabasePool;
use crate::models::IncomingMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailward_common::{Error, Result};
use uuid::Uuid;

/// Incoming message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist a routed message. A `(receiver, log_reference)` collision
    /// surfaces as [`Error::Duplicate`].
    async fn create(&self, message: &IncomingMessage) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<IncomingMessage>>;
    /// Resolve a Message-ID header to a stored message, for reply threading
    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<Uuid>>;
    /// Drop rejected messages older than the retention cutoff
    async fn clear_rejected_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

/// Database incoming message repository
pub struct DbMessageRepository {
    pool: DatabasePool,
}

impl DbMessageRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for DbMessageRepository {
    async fn create(&self, message: &IncomingMessage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO incoming_messages (
                id, log_reference, receiver, domain_name, message, is_spam, is_rejected,
                rejection_message, sender, display_name, subject, message_id, in_reply_to,
                in_reply_to_message, reply_to, recipients, spf, dkim, dmarc, from_ip, from_host,
                body_html, body_plain, message_size, folder, status, created_at, received_at,
                fetched_at, processed_at, received_after, fetched_after, processed_after
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33)
            "#,
        )
        .bind(message.id)
        .bind(&message.log_reference)
        .bind(&message.receiver)
        .bind(&message.domain_name)
        .bind(&message.message)
        .bind(message.is_spam)
        .bind(message.is_rejected)
        .bind(&message.rejection_message)
        .bind(&message.sender)
        .bind(&message.display_name)
        .bind(&message.subject)
        .bind(&message.message_id)
        .bind(&message.in_reply_to)
        .bind(message.in_reply_to_message)
        .bind(&message.reply_to)
        .bind(&message.recipients)
        .bind(&message.spf)
        .bind(&message.dkim)
        .bind(&message.dmarc)
        .bind(&message.from_ip)
        .bind(&message.from_host)
        .bind(&message.body_html)
        .bind(&message.body_plain)
        .bind(message.message_size)
        .bind(&message.folder)
        .bind(&message.status)
        .bind(message.created_at)
        .bind(message.received_at)
        .bind(message.fetched_at)
        .bind(message.processed_at)
        .bind(message.received_after)
        .bind(message.fetched_after)
        .bind(message.processed_after)
        .execute(self.pool.pool())
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => Error::Duplicate(format!(
                "incoming message for {} from log {}",
                message.receiver, message.log_reference
            )),
            _ => Error::Database(e.to_string()),
        })?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<IncomingMessage>> {
        sqlx::query_as::<_, IncomingMessage>("SELECT * FROM incoming_messages WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<Uuid>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            "SELECT id FROM incoming_messages WHERE message_id = $1 ORDER BY processed_at ASC LIMIT 1",
        )
        .bind(message_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.map(|(id,)| id))
    }

    async fn clear_rejected_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM incoming_messages WHERE is_rejected = true AND processed_at < $1",
        )
        .bind(cutoff)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }
}
