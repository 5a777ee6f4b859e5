//! Database connection and pool management

use mailward_common::config::DatabaseConfig;
use mailward_common::{Error, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

/// Database pool wrapper
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.url)
            .await
            .map_err(|e| Error::Database(format!("Failed to connect: {}", e)))?;

        info!("Database connection established");

        Ok(Self { pool })
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the schema if it does not exist yet
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        }

        info!("Database schema ready");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS domains (
        id UUID PRIMARY KEY,
        domain_name TEXT NOT NULL UNIQUE,
        dkim_selector TEXT NOT NULL,
        dkim_bits INTEGER NOT NULL,
        dkim_private_key TEXT,
        dkim_public_key TEXT,
        active BOOLEAN NOT NULL DEFAULT TRUE,
        verified BOOLEAN NOT NULL DEFAULT FALSE,
        dns_records JSONB NOT NULL DEFAULT '[]',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS mailboxes (
        id UUID PRIMARY KEY,
        address TEXT NOT NULL UNIQUE,
        display_name TEXT,
        domain_name TEXT NOT NULL,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS aliases (
        id UUID PRIMARY KEY,
        address TEXT NOT NULL UNIQUE,
        enabled BOOLEAN NOT NULL DEFAULT TRUE,
        members JSONB NOT NULL DEFAULT '[]',
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS spam_scan_logs (
        id UUID PRIMARY KEY,
        message TEXT NOT NULL,
        source_ip TEXT,
        source_host TEXT,
        scanning_mode TEXT NOT NULL,
        hybrid_threshold DOUBLE PRECISION NOT NULL,
        spamd_response TEXT NOT NULL,
        spam_score DOUBLE PRECISION NOT NULL,
        started_at TIMESTAMPTZ NOT NULL,
        completed_at TIMESTAMPTZ NOT NULL,
        duration_secs DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS incoming_messages (
        id UUID PRIMARY KEY,
        log_reference TEXT NOT NULL,
        receiver TEXT NOT NULL,
        domain_name TEXT NOT NULL,
        message TEXT NOT NULL,
        is_spam BOOLEAN NOT NULL DEFAULT FALSE,
        is_rejected BOOLEAN NOT NULL DEFAULT FALSE,
        rejection_message TEXT,
        sender TEXT,
        display_name TEXT,
        subject TEXT,
        message_id TEXT,
        in_reply_to TEXT,
        in_reply_to_message UUID,
        reply_to TEXT,
        recipients JSONB NOT NULL DEFAULT '[]',
        spf TEXT,
        dkim TEXT,
        dmarc TEXT,
        from_ip TEXT,
        from_host TEXT,
        body_html TEXT,
        body_plain TEXT,
        message_size BIGINT NOT NULL DEFAULT 0,
        folder TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ,
        received_at TIMESTAMPTZ,
        fetched_at TIMESTAMPTZ NOT NULL,
        processed_at TIMESTAMPTZ NOT NULL,
        received_after DOUBLE PRECISION,
        fetched_after DOUBLE PRECISION,
        processed_after DOUBLE PRECISION
    )
    "#,
    // Re-processing the same fetch-batch entry for a mailbox must not duplicate
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS unique_receiver_log_reference
        ON incoming_messages (receiver, log_reference)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_incoming_messages_message_id
        ON incoming_messages (message_id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sync_state (
        id INTEGER PRIMARY KEY DEFAULT 1 CHECK (id = 1),
        last_synced_at TIMESTAMPTZ
    )
    "#,
];
