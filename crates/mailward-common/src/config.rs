//! Configuration for Mailward

use crate::types::ScanningMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identity
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Attachment storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// DNS and DKIM defaults
    #[serde(default)]
    pub dns: DnsConfig,

    /// Incoming/outgoing mail servers published in DNS
    #[serde(default)]
    pub servers: ServersConfig,

    /// Spam scanning configuration
    #[serde(default)]
    pub spam: SpamConfig,

    /// Inbound fetch loop configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Notification configuration
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Hostname used in diagnostics and the bounce sender
    #[serde(default = "default_hostname")]
    pub hostname: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
        }
    }
}

fn default_hostname() -> String {
    "localhost".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL
    pub url: String,

    /// Maximum connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

/// Attachment storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Base path for extracted attachments
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("/var/lib/mailward/attachments")
}

/// DNS and DKIM defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Root domain of the mail service, used for the SPF include host
    #[serde(default = "default_primary_domain")]
    pub primary_domain: String,

    /// Host label the per-domain SPF record includes
    #[serde(default = "default_spf_host")]
    pub spf_host: String,

    /// TTL applied to synthesized records
    #[serde(default = "default_ttl")]
    pub default_ttl: u32,

    /// DKIM selector used when a domain does not set one
    #[serde(default = "default_dkim_selector")]
    pub default_dkim_selector: String,

    /// DKIM key size used when a domain does not set one
    #[serde(default = "default_dkim_bits")]
    pub default_dkim_bits: u32,

    /// Nameservers queried during verification; empty uses the system resolver
    #[serde(default)]
    pub nameservers: Vec<String>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            primary_domain: default_primary_domain(),
            spf_host: default_spf_host(),
            default_ttl: default_ttl(),
            default_dkim_selector: default_dkim_selector(),
            default_dkim_bits: default_dkim_bits(),
            nameservers: Vec::new(),
        }
    }
}

fn default_primary_domain() -> String {
    "localhost".to_string()
}

fn default_spf_host() -> String {
    "spf".to_string()
}

fn default_ttl() -> u32 {
    300
}

fn default_dkim_selector() -> String {
    "mw1".to_string()
}

fn default_dkim_bits() -> u32 {
    2048
}

/// Incoming mail server published as an MX target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingServerConfig {
    /// Server FQDN
    pub server: String,

    /// MX priority
    #[serde(default = "default_mx_priority")]
    pub priority: u16,
}

fn default_mx_priority() -> u16 {
    10
}

/// Outgoing mail server published in the server-wide SPF record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutgoingServerConfig {
    /// Server FQDN
    pub server: String,

    /// IPv4 address for the A record
    pub ipv4: Option<String>,

    /// IPv6 address for the AAAA record
    pub ipv6: Option<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Mail server inventory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersConfig {
    #[serde(default)]
    pub incoming: Vec<IncomingServerConfig>,

    #[serde(default)]
    pub outgoing: Vec<OutgoingServerConfig>,
}

/// Spam scanning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamConfig {
    /// Enable spam scanning
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// spamd host
    #[serde(default = "default_spamd_host")]
    pub host: String,

    /// spamd port
    #[serde(default = "default_spamd_port")]
    pub port: u16,

    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-read idle timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    /// Scanning strategy
    #[serde(default = "default_scanning_mode")]
    pub scanning_mode: ScanningMode,

    /// Hybrid mode: rescan the original when the stripped score reaches this
    #[serde(default = "default_hybrid_threshold")]
    pub hybrid_threshold: f64,

    /// Score above which an inbound message is spam
    #[serde(default = "default_max_inbound_score")]
    pub max_inbound_score: f64,

    /// Score above which an outbound message is spam
    #[serde(default = "default_max_outbound_score")]
    pub max_outbound_score: f64,

    /// Days scan logs are kept before the retention sweep drops them
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_spamd_host(),
            port: default_spamd_port(),
            connect_timeout_secs: default_connect_timeout(),
            read_timeout_secs: default_read_timeout(),
            scanning_mode: default_scanning_mode(),
            hybrid_threshold: default_hybrid_threshold(),
            max_inbound_score: default_max_inbound_score(),
            max_outbound_score: default_max_outbound_score(),
            log_retention_days: default_log_retention_days(),
        }
    }
}

fn default_spamd_host() -> String {
    "127.0.0.1".to_string()
}

fn default_spamd_port() -> u16 {
    783
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    10
}

fn default_scanning_mode() -> ScanningMode {
    ScanningMode::Hybrid
}

fn default_hybrid_threshold() -> f64 {
    3.0
}

fn default_max_inbound_score() -> f64 {
    5.0
}

fn default_max_outbound_score() -> f64 {
    3.0
}

fn default_log_retention_days() -> u32 {
    90
}

/// Inbound fetch loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base URL of the upstream inbound API
    #[serde(default = "default_sync_api_url")]
    pub api_url: String,

    /// API key sent with fetch requests
    pub api_key: Option<String>,

    /// Seconds between scheduled fetch cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Batch failures tolerated before yielding back to the scheduler
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,

    /// Days rejected messages are kept before the retention sweep drops them
    #[serde(default = "default_rejected_retention_days")]
    pub rejected_retention_days: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: default_sync_api_url(),
            api_key: None,
            poll_interval_secs: default_poll_interval(),
            max_failures: default_max_failures(),
            rejected_retention_days: default_rejected_retention_days(),
        }
    }
}

fn default_sync_api_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_poll_interval() -> u64 {
    60
}

fn default_max_failures() -> u32 {
    3
}

fn default_rejected_retention_days() -> u32 {
    30
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    /// Send a bounce-style notice to the sender of a rejected message
    #[serde(default = "default_true")]
    pub send_on_reject: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            send_on_reject: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load() -> crate::Result<Self> {
        let paths = [
            std::path::PathBuf::from("./config.toml"),
            std::path::PathBuf::from("/etc/mailward/config.toml"),
        ];

        for path in paths {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Err(crate::Error::Config(
            "No configuration file found".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let spam = SpamConfig::default();
        assert_eq!(spam.port, 783);
        assert_eq!(spam.connect_timeout_secs, 30);
        assert_eq!(spam.read_timeout_secs, 10);
        assert_eq!(spam.scanning_mode, ScanningMode::Hybrid);

        let dns = DnsConfig::default();
        assert_eq!(dns.default_dkim_bits, 2048);
        assert_eq!(dns.default_ttl, 300);

        let sync = SyncConfig::default();
        assert_eq!(sync.max_failures, 3);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[server]
hostname = "mail.example.com"

[database]
url = "postgres://localhost/mailward"

[dns]
primary_domain = "example.com"
spf_host = "spf"

[[servers.incoming]]
server = "mx1.example.com"
priority = 10

[[servers.outgoing]]
server = "out1.example.com"
ipv4 = "203.0.113.5"

[spam]
scanning_mode = "exclude_attachments"
max_inbound_score = 4.5
"#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.server.hostname, "mail.example.com");
        assert_eq!(config.dns.primary_domain, "example.com");
        assert_eq!(config.servers.incoming.len(), 1);
        assert_eq!(config.servers.outgoing[0].ipv4.as_deref(), Some("203.0.113.5"));
        assert!(config.servers.outgoing[0].enabled);
        assert_eq!(config.spam.scanning_mode, ScanningMode::ExcludeAttachments);
        assert_eq!(config.spam.max_inbound_score, 4.5);
        assert_eq!(config.spam.max_outbound_score, 3.0);
    }
}
