//! Mailward - mail service entry point

use anyhow::Result;
use chrono::Utc;
use mailward_common::config::{Config, LoggingConfig};
use mailward_core::dns::{DnsResolver, SystemDnsResolver};
use mailward_core::domain::DomainAuthority;
use mailward_core::inbound::{HttpInboundApi, MailRouter, MailSync};
use mailward_core::notify::{LogMailer, LogNotifier};
use mailward_core::spam::SpamScanner;
use mailward_storage::db::DatabasePool;
use mailward_storage::file::LocalStorage;
use mailward_storage::repository::{
    DbAliasRepository, DbDomainRepository, DbMailboxRepository, DbMessageRepository,
    DbScanLogRepository, DbSyncStateRepository, DomainRepository, MessageRepository,
    ScanLogRepository,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    info!("Starting Mailward...");

    // Initialize database
    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.init_schema().await?;

    // Initialize file storage
    let file_storage = Arc::new(LocalStorage::new(&config.storage)?);

    // Repositories
    let domains = Arc::new(DbDomainRepository::new(db_pool.clone()));
    let mailboxes = Arc::new(DbMailboxRepository::new(db_pool.clone()));
    let aliases = Arc::new(DbAliasRepository::new(db_pool.clone()));
    let messages = Arc::new(DbMessageRepository::new(db_pool.clone()));
    let scan_logs = Arc::new(DbScanLogRepository::new(db_pool.clone()));
    let sync_state = Arc::new(DbSyncStateRepository::new(db_pool.clone()));

    // DNS authority over configured records
    let authority = DomainAuthority::new(config.dns.clone(), config.servers.clone());
    let resolver = SystemDnsResolver::new(&config.dns.nameservers)?;

    // Inbound routing pipeline
    let router = Arc::new(MailRouter::new(
        domains.clone(),
        mailboxes,
        aliases,
        messages.clone(),
        file_storage,
        Arc::new(LogNotifier),
        Arc::new(LogMailer),
        config.server.hostname.clone(),
        config.notifications.send_on_reject,
    ));

    let api = Arc::new(HttpInboundApi::new(
        &config.sync.api_url,
        config.sync.api_key.as_deref(),
    ));
    let mut sync = MailSync::new(api, router, sync_state, config.sync.max_failures);
    if config.spam.enabled {
        let scanner = Arc::new(SpamScanner::new(config.spam.clone()));
        sync = sync.with_scanner(scanner, scan_logs.clone());
        info!(
            mode = %config.spam.scanning_mode,
            host = %config.spam.host,
            port = config.spam.port,
            "Spam scanning enabled"
        );
    } else {
        info!("Spam scanning disabled");
    }

    info!(
        interval_secs = config.sync.poll_interval_secs,
        api_url = %config.sync.api_url,
        "Mailward started"
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.sync.poll_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = sync.run_cycle().await {
                    error!("Inbound sync cycle failed: {}", e);
                }
                verify_pending_domains(&authority, &resolver, domains.as_ref()).await;
                sweep_scan_logs(scan_logs.as_ref(), config.spam.log_retention_days).await;
                sweep_rejected_messages(messages.as_ref(), config.sync.rejected_retention_days)
                    .await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Mailward shutdown complete");

    Ok(())
}

/// Re-check DNS for active domains that have not verified yet and persist
/// the outcome. Verification failures only affect the domain under check.
async fn verify_pending_domains(
    authority: &DomainAuthority,
    resolver: &dyn DnsResolver,
    domains: &dyn DomainRepository,
) {
    let pending = match domains.list_unverified().await {
        Ok(pending) => pending,
        Err(e) => {
            error!("Failed to list unverified domains: {}", e);
            return;
        }
    };

    for mut domain in pending {
        let report = authority.verify_domain(resolver, &mut domain).await;
        if !report.all_verified {
            info!(
                domain = %domain.domain_name,
                mismatches = report.mismatches.len(),
                "Domain verification still pending"
            );
        }
        if let Err(e) = domains.update(&domain).await {
            error!(domain = %domain.domain_name, "Failed to persist verification: {}", e);
        }
    }
}

/// Drop scan logs past the retention window
async fn sweep_scan_logs(scan_logs: &dyn ScanLogRepository, retention_days: u32) {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    match scan_logs.clear_older_than(cutoff).await {
        Ok(0) => {}
        Ok(dropped) => info!(dropped, "Expired scan logs removed"),
        Err(e) => warn!("Scan log retention sweep failed: {}", e),
    }
}

/// Drop rejected messages past the retention window
async fn sweep_rejected_messages(messages: &dyn MessageRepository, retention_days: u32) {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    match messages.clear_rejected_older_than(cutoff).await {
        Ok(0) => {}
        Ok(dropped) => info!(dropped, "Expired rejected messages removed"),
        Err(e) => warn!("Rejected message retention sweep failed: {}", e),
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
