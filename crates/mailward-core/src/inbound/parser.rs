//! Metadata extraction from raw inbound messages

use chrono::{DateTime, Utc};
use mail_parser::{Message, MessageParser, MimeHeaders};
use mailward_common::types::{MessageRecipient, RecipientKind};
use mailward_common::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

/// Attachment pulled out of a message, pending file storage
#[derive(Debug, Clone)]
pub struct ParsedAttachment {
    pub filename: String,
    pub data: Vec<u8>,
}

/// Everything routing and storage need from a raw message
#[derive(Debug, Clone, Default)]
pub struct ParsedMessage {
    /// Address the upstream server delivered the message to
    pub delivered_to: Option<String>,
    pub sender: Option<String>,
    pub display_name: Option<String>,
    pub subject: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub reply_to: Option<String>,
    pub recipients: Vec<MessageRecipient>,
    pub spf: Option<String>,
    pub dkim: Option<String>,
    pub dmarc: Option<String>,
    /// Client address from the first Received header
    pub from_ip: Option<String>,
    pub from_host: Option<String>,
    /// Date header
    pub created_at: Option<DateTime<Utc>>,
    /// Upstream Received-At header, RFC 3339
    pub received_at: Option<DateTime<Utc>>,
    pub body_html: Option<String>,
    pub body_plain: Option<String>,
    pub size: i64,
    pub attachments: Vec<ParsedAttachment>,
}

/// Parse a raw message into its routing and display metadata
pub fn parse_message(raw: &str) -> Result<ParsedMessage> {
    let message = MessageParser::default()
        .parse(raw.as_bytes())
        .ok_or_else(|| Error::Validation("Message could not be parsed".to_string()))?;

    let (display_name, sender) = message
        .from()
        .and_then(|a| a.first())
        .map(|addr| {
            (
                addr.name().map(|n| n.to_string()),
                addr.address().map(|a| a.to_string()),
            )
        })
        .unwrap_or((None, None));

    let reply_to = message
        .reply_to()
        .and_then(|a| a.first())
        .and_then(|addr| addr.address())
        .map(|a| a.to_string());

    let (from_host, from_ip) = message
        .header_raw("Received")
        .map(parse_received)
        .unwrap_or((None, None));

    let (spf, dkim, dmarc) = message
        .header_raw("Authentication-Results")
        .map(parse_authentication_results)
        .unwrap_or((None, None, None));

    let received_at = message
        .header_raw("Received-At")
        .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let created_at = message
        .date()
        .and_then(|d| DateTime::from_timestamp(d.to_timestamp(), 0));

    let attachments = message
        .attachments()
        .map(|part| ParsedAttachment {
            filename: part
                .attachment_name()
                .unwrap_or("attachment")
                .to_string(),
            data: part.contents().to_vec(),
        })
        .collect();

    Ok(ParsedMessage {
        delivered_to: message
            .header_raw("Delivered-To")
            .map(|v| v.trim().to_string()),
        sender,
        display_name,
        subject: message.subject().map(|s| s.to_string()),
        message_id: message.message_id().map(|s| s.to_string()),
        in_reply_to: message.in_reply_to().as_text().map(|s| s.to_string()),
        reply_to,
        recipients: collect_recipients(&message),
        spf,
        dkim,
        dmarc,
        from_ip,
        from_host,
        created_at,
        received_at,
        body_html: message.body_html(0).map(|b| b.to_string()),
        body_plain: message.body_text(0).map(|b| b.to_string()),
        size: raw.len() as i64,
        attachments,
    })
}

fn collect_recipients(message: &Message) -> Vec<MessageRecipient> {
    let mut recipients = Vec::new();
    for (kind, header) in [
        (RecipientKind::To, message.to()),
        (RecipientKind::Cc, message.cc()),
        (RecipientKind::Bcc, message.bcc()),
    ] {
        let Some(list) = header else { continue };
        for addr in list.iter() {
            if let Some(address) = addr.address() {
                recipients.push(MessageRecipient {
                    kind,
                    address: address.to_string(),
                    display_name: addr.name().map(|n| n.to_string()),
                });
            }
        }
    }
    recipients
}

static RECEIVED_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Mine the sending host and address out of a Received header value,
/// e.g. `from mail.example.com (mail.example.com [203.0.113.5]) by ...`
fn parse_received(value: &str) -> (Option<String>, Option<String>) {
    let pattern = RECEIVED_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)from\s+(\S+)\s+\((?:\S+\s+)?\[([^\]]+)\]").expect("received pattern")
    });
    match pattern.captures(value) {
        Some(caps) => (
            Some(caps[1].to_string()),
            Some(caps[2].to_string()),
        ),
        None => (None, None),
    }
}

static AUTH_PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();

/// Pull the spf/dkim/dmarc outcomes out of Authentication-Results
fn parse_authentication_results(value: &str) -> (Option<String>, Option<String>, Option<String>) {
    let [spf, dkim, dmarc] = AUTH_PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?i)\bspf=([a-z]+)").expect("spf pattern"),
            Regex::new(r"(?i)\bdkim=([a-z]+)").expect("dkim pattern"),
            Regex::new(r"(?i)\bdmarc=([a-z]+)").expect("dmarc pattern"),
        ]
    });
    let outcome = |pattern: &Regex| {
        pattern
            .captures(value)
            .map(|caps| caps[1].to_lowercase())
    };
    (outcome(spf), outcome(dkim), outcome(dmarc))
}
