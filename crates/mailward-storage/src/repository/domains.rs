//! Domain repository

use crate::db::DatabasePool;
use crate::models::Domain;
use async_trait::async_trait;
use mailward_common::{Error, Result};
use uuid::Uuid;

/// Domain repository trait
#[async_trait]
pub trait DomainRepository: Send + Sync {
    async fn create(&self, domain: &Domain) -> Result<()>;
    async fn update(&self, domain: &Domain) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<Domain>>;
    async fn get_by_name(&self, domain_name: &str) -> Result<Option<Domain>>;
    /// True iff the domain exists and is active
    async fn is_active(&self, domain_name: &str) -> Result<bool>;
    async fn list_active(&self) -> Result<Vec<Domain>>;
    /// Active domains whose record set has not fully verified yet
    async fn list_unverified(&self) -> Result<Vec<Domain>>;
}

/// Database domain repository
pub struct DbDomainRepository {
    pool: DatabasePool,
}

impl DbDomainRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DomainRepository for DbDomainRepository {
    async fn create(&self, domain: &Domain) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO domains (id, domain_name, dkim_selector, dkim_bits, dkim_private_key,
                                 dkim_public_key, active, verified, dns_records, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(domain.id)
        .bind(&domain.domain_name)
        .bind(&domain.dkim_selector)
        .bind(domain.dkim_bits)
        .bind(&domain.dkim_private_key)
        .bind(&domain.dkim_public_key)
        .bind(domain.active)
        .bind(domain.verified)
        .bind(&domain.dns_records)
        .bind(domain.created_at)
        .bind(domain.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn update(&self, domain: &Domain) -> Result<()> {
        let now = chrono::Utc::now();
        sqlx::query(
            r#"
            UPDATE domains
            SET dkim_selector = $2, dkim_bits = $3, dkim_private_key = $4, dkim_public_key = $5,
                active = $6, verified = $7, dns_records = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(domain.id)
        .bind(&domain.dkim_selector)
        .bind(domain.dkim_bits)
        .bind(&domain.dkim_private_key)
        .bind(&domain.dkim_public_key)
        .bind(domain.active)
        .bind(domain.verified)
        .bind(&domain.dns_records)
        .bind(now)
        .execute(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Domain>> {
        sqlx::query_as::<_, Domain>("SELECT * FROM domains WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn get_by_name(&self, domain_name: &str) -> Result<Option<Domain>> {
        sqlx::query_as::<_, Domain>("SELECT * FROM domains WHERE domain_name = $1")
            .bind(domain_name.to_lowercase())
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    async fn is_active(&self, domain_name: &str) -> Result<bool> {
        let row: Option<(bool,)> = sqlx::query_as(
            "SELECT active FROM domains WHERE domain_name = $1",
        )
        .bind(domain_name.to_lowercase())
        .fetch_optional(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row.map(|(active,)| active).unwrap_or(false))
    }

    async fn list_active(&self) -> Result<Vec<Domain>> {
        sqlx::query_as::<_, Domain>(
            "SELECT * FROM domains WHERE active = true ORDER BY domain_name ASC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn list_unverified(&self) -> Result<Vec<Domain>> {
        sqlx::query_as::<_, Domain>(
            "SELECT * FROM domains WHERE active = true AND verified = false ORDER BY domain_name ASC",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
