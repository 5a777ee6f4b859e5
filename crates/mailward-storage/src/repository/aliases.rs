//! Alias repository

use crate::db::DatabasePool;
use crate::models::Alias;
use async_trait::async_trait;
use mailward_common::{Error, Result};

/// Alias repository trait
#[async_trait]
pub trait AliasRepository: Send + Sync {
    async fn create(&self, alias: &Alias) -> Result<()>;
    async fn get_by_address(&self, address: &str) -> Result<Option<Alias>>;
}

/// Database alias repository
pub struct DbAliasRepository {
    pool: DatabasePool,
}

impl DbAliasRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AliasRepository for DbAliasRepository {
    async fn create(&self, alias: &Alias) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO aliases (id, address, enabled, members, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(alias.id)
        .bind(&alias.address)
        .bind(alias.enabled)
        .bind(&alias.members)
        .bind(alias.created_at)
        .bind(alias.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_by_address(&self, address: &str) -> Result<Option<Alias>> {
        sqlx::query_as::<_, Alias>("SELECT * FROM aliases WHERE address = $1")
            .bind(address)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
