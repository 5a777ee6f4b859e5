//! Common types for Mailward

use serde::{Deserialize, Serialize};

/// Email address split into local part and domain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmailAddress {
    pub local: String,
    pub domain: String,
}

impl EmailAddress {
    /// Create a new email address
    pub fn new(local: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            domain: domain.into(),
        }
    }

    /// Parse an email address from a string
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.splitn(2, '@').collect();
        if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
            Some(Self::new(parts[0], parts[1].to_lowercase()))
        } else {
            None
        }
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}

impl std::str::FromStr for EmailAddress {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::Error::Validation("Invalid email address".to_string()))
    }
}

/// DNS record category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DnsRecordCategory {
    /// SPF/DKIM/DMARC records published per sending domain
    Sending,
    /// MX records pointing a domain at the incoming servers
    Receiving,
    /// A/AAAA/SPF records for the mail servers themselves
    Server,
}

impl std::fmt::Display for DnsRecordCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsRecordCategory::Sending => write!(f, "sending"),
            DnsRecordCategory::Receiving => write!(f, "receiving"),
            DnsRecordCategory::Server => write!(f, "server"),
        }
    }
}

/// DNS record type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DnsRecordType {
    #[serde(rename = "TXT")]
    Txt,
    A,
    #[serde(rename = "AAAA")]
    Aaaa,
    #[serde(rename = "MX")]
    Mx,
}

impl std::fmt::Display for DnsRecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnsRecordType::Txt => write!(f, "TXT"),
            DnsRecordType::A => write!(f, "A"),
            DnsRecordType::Aaaa => write!(f, "AAAA"),
            DnsRecordType::Mx => write!(f, "MX"),
        }
    }
}

/// A single DNS record expected to be published for a domain or server.
///
/// Records are owned by their parent aggregate (domain or settings) as an
/// ordered list and are rebuilt wholesale whenever key material or the
/// selector changes. Callers never create these individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub category: DnsRecordCategory,
    pub record_type: DnsRecordType,
    pub host: String,
    pub value: String,
    pub ttl: u32,
    /// MX only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,
    #[serde(default)]
    pub verified: bool,
}

impl DnsRecord {
    /// True for DKIM public key TXT records, which tolerate chunked values
    pub fn is_dkim(&self) -> bool {
        self.record_type == DnsRecordType::Txt && self.host.contains("._domainkey.")
    }
}

/// Spam scanning strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanningMode {
    /// Scan the message unmodified
    Full,
    /// Strip attachment parts before scanning
    ExcludeAttachments,
    /// Scan stripped first, rescan the original if the score is inconclusive
    Hybrid,
}

impl std::fmt::Display for ScanningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanningMode::Full => write!(f, "full"),
            ScanningMode::ExcludeAttachments => write!(f, "exclude_attachments"),
            ScanningMode::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for ScanningMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ScanningMode::Full),
            "exclude_attachments" => Ok(ScanningMode::ExcludeAttachments),
            "hybrid" => Ok(ScanningMode::Hybrid),
            _ => Err(format!("Invalid scanning mode: {}", s)),
        }
    }
}

/// Direction a message travels, for threshold selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// Mailbox folder an accepted message lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailFolder {
    Inbox,
    Spam,
}

impl std::fmt::Display for MailFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MailFolder::Inbox => write!(f, "inbox"),
            MailFolder::Spam => write!(f, "spam"),
        }
    }
}

/// Terminal routing status of an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Accepted,
    Rejected,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageStatus::Accepted => write!(f, "accepted"),
            MessageStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// Address header a recipient came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientKind {
    To,
    Cc,
    Bcc,
}

impl std::fmt::Display for RecipientKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecipientKind::To => write!(f, "to"),
            RecipientKind::Cc => write!(f, "cc"),
            RecipientKind::Bcc => write!(f, "bcc"),
        }
    }
}

/// Structured recipient of an accepted message, in header order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecipient {
    pub kind: RecipientKind,
    pub address: String,
    pub display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_email_address_parse() {
        let addr = EmailAddress::parse("user@Example.COM").unwrap();
        assert_eq!(addr.local, "user");
        assert_eq!(addr.domain, "example.com");
        assert_eq!(addr.to_string(), "user@example.com");

        assert!(EmailAddress::parse("no-at-sign").is_none());
        assert!(EmailAddress::parse("@example.com").is_none());
        assert!(EmailAddress::parse("user@").is_none());
    }

    #[test]
    fn test_dns_record_is_dkim() {
        let record = DnsRecord {
            category: DnsRecordCategory::Sending,
            record_type: DnsRecordType::Txt,
            host: "mw1._domainkey.example.com".to_string(),
            value: "v=DKIM1;k=rsa;p=abc".to_string(),
            ttl: 300,
            priority: None,
            verified: false,
        };
        assert!(record.is_dkim());

        let spf = DnsRecord {
            host: "example.com".to_string(),
            value: "v=spf1 ~all".to_string(),
            ..record.clone()
        };
        assert!(!spf.is_dkim());
    }

    #[test]
    fn test_dns_record_type_serde() {
        let json = serde_json::to_string(&DnsRecordType::Aaaa).unwrap();
        assert_eq!(json, "\"AAAA\"");
        let parsed: DnsRecordType = serde_json::from_str("\"TXT\"").unwrap();
        assert_eq!(parsed, DnsRecordType::Txt);
    }

    #[test]
    fn test_scanning_mode_round_trip() {
        for mode in [
            ScanningMode::Full,
            ScanningMode::ExcludeAttachments,
            ScanningMode::Hybrid,
        ] {
            assert_eq!(mode.to_string().parse::<ScanningMode>().unwrap(), mode);
        }
    }
}
