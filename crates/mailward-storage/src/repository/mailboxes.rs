//! Mailbox repository

use crate::db::DatabasePool;
use crate::models::Mailbox;
use async_trait::async_trait;
use mailward_common::{Error, Result};

/// Mailbox repository trait
#[async_trait]
pub trait MailboxRepository: Send + Sync {
    async fn create(&self, mailbox: &Mailbox) -> Result<()>;
    async fn get_by_address(&self, address: &str) -> Result<Option<Mailbox>>;
    /// True iff the mailbox exists and is enabled
    async fn is_enabled(&self, address: &str) -> Result<bool>;
    async fn list_by_domain(&self, domain_name: &str) -> Result<Vec<Mailbox>>;
}

/// Database mailbox repository
pub struct DbMailboxRepository {
    pool: DatabasePool,
}

impl DbMailboxRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MailboxRepository for DbMailboxRepository {
    async fn create(&self, mailbox: &Mailbox) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO mailboxes (id, address, display_name, domain_name, enabled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(mailbox.id)
        .bind(&mailbox.address)
        .bind(&mailbox.display_name)
        .bind(&mailbox.domain_name)
        .bind(mailbox.enabled)
        .bind(mailbox.created_at)
        .bind(mailbox.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_by_address(&self, address: &str) -> Result<Option<Mailbox>> {
        sqlx::query_as::<_, Mailbox>("SELECT * FROM mailboxes WHERE address = $1")
            .bind(address)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn is_enabled(&self, address: &str) -> Result<bool> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT enabled FROM mailboxes WHERE address = $1")
                .bind(address)
                .fetch_optional(self.pool.pool())
                .await
                .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.map(|(enabled,)| enabled).unwrap_or(false))
    }

    async fn list_by_domain(&self, domain_name: &str) -> Result<Vec<Mailbox>> {
        sqlx::query_as::<_, Mailbox>(
            "SELECT * FROM mailboxes WHERE domain_name = $1 ORDER BY address ASC",
        )
        .bind(domain_name)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
