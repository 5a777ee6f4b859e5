//! Notification and outbound delivery seams
//!
//! Routing publishes events and rejection notices through these traits;
//! the defaults only record them in the log.

use async_trait::async_trait;
use mail_builder::MessageBuilder;
use mailward_common::{Error, Result};
use mailward_storage::models::IncomingMessage;
use tracing::info;

/// Event sink for accepted and rejected messages
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Called after a message has been committed to the store
    async fn message_received(&self, message: &IncomingMessage) -> Result<()>;
}

/// Default notifier, logs the event
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn message_received(&self, message: &IncomingMessage) -> Result<()> {
        info!(
            id = %message.id,
            receiver = %message.receiver,
            folder = %message.folder,
            status = %message.status,
            "Message received"
        );
        Ok(())
    }
}

/// Delivery seam for messages the pipeline originates, such as
/// rejection notices. Actual transport lives outside this crate.
#[async_trait]
pub trait OutboundMailer: Send + Sync {
    async fn send(&self, to: &str, raw_message: &str) -> Result<()>;
}

/// Default mailer, logs the handoff
pub struct LogMailer;

#[async_trait]
impl OutboundMailer for LogMailer {
    async fn send(&self, to: &str, raw_message: &str) -> Result<()> {
        info!(to = %to, bytes = raw_message.len(), "Outbound message handed off");
        Ok(())
    }
}

/// Build the bounce-style notice returned to the sender of a rejected
/// message: the rejection text plus the original headers for reference.
pub fn rejection_notice(
    hostname: &str,
    to: &str,
    original_subject: Option<&str>,
    rejection_message: &str,
    original_headers: &str,
) -> Result<String> {
    let subject = format!("Undeliverable: {}", original_subject.unwrap_or(""));
    let html = format!(
        "<p>Your message could not be delivered.</p>\
         <pre>{}</pre>\
         <p>Original message headers:</p>\
         <pre>{}</pre>",
        escape_html(rejection_message),
        escape_html(original_headers)
    );

    let from_address = format!("mailer-daemon@{}", hostname);
    MessageBuilder::new()
        .from(("Mail Delivery System", from_address.as_str()))
        .to(to)
        .subject(subject)
        .html_body(html)
        .write_to_string()
        .map_err(|e| Error::Internal(format!("Failed to build rejection notice: {}", e)))
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}
