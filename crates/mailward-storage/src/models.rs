//! Database models

use chrono::{DateTime, Utc};
use mailward_common::types::{
    DnsRecord, MailFolder, MessageRecipient, MessageStatus, ScanningMode,
};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Mail domain aggregate, owner of its DKIM key material and DNS record set
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Domain {
    pub id: Uuid,
    /// Lowercase FQDN, unique
    pub domain_name: String,
    pub dkim_selector: String,
    pub dkim_bits: i32,
    /// PEM body with armor and whitespace stripped, ready for TXT embedding
    pub dkim_private_key: Option<String>,
    pub dkim_public_key: Option<String>,
    pub active: bool,
    /// True iff every record in `dns_records` matched at the last verify pass
    pub verified: bool,
    /// Ordered record set, rebuilt wholesale on key or selector changes
    pub dns_records: Json<Vec<DnsRecord>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Domain {
    /// Create a new inactive record set for a domain
    pub fn new(domain_name: &str, dkim_selector: &str, dkim_bits: i32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            domain_name: domain_name.to_lowercase(),
            dkim_selector: dkim_selector.to_string(),
            dkim_bits,
            dkim_private_key: None,
            dkim_public_key: None,
            active: true,
            verified: false,
            dns_records: Json(Vec::new()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Mailbox model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Mailbox {
    pub id: Uuid,
    /// Full address, unique
    pub address: String,
    pub display_name: Option<String>,
    pub domain_name: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Alias model - fans an address out to member mailboxes
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Alias {
    pub id: Uuid,
    /// Full address, unique
    pub address: String,
    pub enabled: bool,
    /// Member mailbox addresses, in configured order
    pub members: Json<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One spam scan attempt, immutable once scored
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SpamScanLog {
    pub id: Uuid,
    /// The text actually scanned (stripped in exclude-attachments mode)
    pub message: String,
    pub source_ip: Option<String>,
    pub source_host: Option<String>,
    pub scanning_mode: String,
    pub hybrid_threshold: f64,
    /// Raw protocol reply from spamd
    pub spamd_response: String,
    pub spam_score: f64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub created_at: DateTime<Utc>,
}

impl SpamScanLog {
    /// Get scanning mode enum
    pub fn scanning_mode_enum(&self) -> Option<ScanningMode> {
        self.scanning_mode.parse().ok()
    }
}

/// An inbound message routed to a mailbox, or a single rejection record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Id of the fetch-batch entry that produced this message
    pub log_reference: String,
    /// Mailbox address the message was routed to
    pub receiver: String,
    pub domain_name: String,
    /// Raw MIME text
    pub message: String,
    pub is_spam: bool,
    pub is_rejected: bool,
    pub rejection_message: Option<String>,
    pub sender: Option<String>,
    pub display_name: Option<String>,
    pub subject: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    /// Stored message this one replies to, resolved by message-id lookup
    pub in_reply_to_message: Option<Uuid>,
    pub reply_to: Option<String>,
    pub recipients: Json<Vec<MessageRecipient>>,
    pub spf: Option<String>,
    pub dkim: Option<String>,
    pub dmarc: Option<String>,
    pub from_ip: Option<String>,
    pub from_host: Option<String>,
    pub body_html: Option<String>,
    pub body_plain: Option<String>,
    pub message_size: i64,
    pub folder: String,
    pub status: String,
    /// Date header of the message itself
    pub created_at: Option<DateTime<Utc>>,
    /// When the upstream server received it
    pub received_at: Option<DateTime<Utc>>,
    /// When the fetch loop pulled it
    pub fetched_at: DateTime<Utc>,
    /// When routing finalized it
    pub processed_at: DateTime<Utc>,
    /// received_at - created_at, seconds
    pub received_after: Option<f64>,
    /// fetched_at - received_at, seconds
    pub fetched_after: Option<f64>,
    /// processed_at - fetched_at, seconds
    pub processed_after: Option<f64>,
}

impl IncomingMessage {
    /// Get folder enum
    pub fn folder_enum(&self) -> Option<MailFolder> {
        match self.folder.as_str() {
            "inbox" => Some(MailFolder::Inbox),
            "spam" => Some(MailFolder::Spam),
            _ => None,
        }
    }

    /// Get status enum
    pub fn status_enum(&self) -> Option<MessageStatus> {
        match self.status.as_str() {
            "accepted" => Some(MessageStatus::Accepted),
            "rejected" => Some(MessageStatus::Rejected),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_domain_new_is_unverified() {
        let domain = Domain::new("Example.COM", "mw1", 2048);
        assert_eq!(domain.domain_name, "example.com");
        assert!(!domain.verified);
        assert!(domain.dns_records.0.is_empty());
        assert!(domain.dkim_private_key.is_none());
    }

    #[test]
    fn test_scan_log_mode_enum() {
        let log = SpamScanLog {
            id: Uuid::now_v7(),
            message: String::new(),
            source_ip: None,
            source_host: None,
            scanning_mode: "hybrid".to_string(),
            hybrid_threshold: 3.0,
            spamd_response: String::new(),
            spam_score: 0.1,
            started_at: Utc::now(),
            completed_at: Utc::now(),
            duration_secs: 0.0,
            created_at: Utc::now(),
        };
        assert_eq!(log.scanning_mode_enum(), Some(ScanningMode::Hybrid));
    }
}
