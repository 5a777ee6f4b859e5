//! Routing of fetched inbound messages to mailboxes

use crate::inbound::parser::{parse_message, ParsedMessage};
use crate::notify::{rejection_notice, Notifier, OutboundMailer};
use chrono::{DateTime, Utc};
use mailward_common::types::{EmailAddress, MailFolder, MessageStatus};
use mailward_common::{Error, Result};
use mailward_storage::file::{attachment_path, FileStorage};
use mailward_storage::models::IncomingMessage;
use mailward_storage::repository::{
    AliasRepository, DomainRepository, MailboxRepository, MessageRepository,
};
use sqlx::types::Json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Fixed rejection status for every refused recipient
pub const REJECTION_MESSAGE: &str = "550 5.4.1 Recipient address rejected: Access denied.";

/// One fetched mail awaiting routing
#[derive(Debug, Clone)]
pub struct InboundMail {
    /// Upstream log id; together with the receiver it is the dedup key
    pub log_reference: String,
    /// Raw MIME text
    pub message: String,
    /// Upstream spam verdict
    pub is_spam: bool,
    /// When the fetch loop pulled this mail
    pub fetched_at: DateTime<Utc>,
}

/// What happened for one mailbox during routing
#[derive(Debug, Clone)]
pub struct Delivery {
    pub receiver: String,
    /// Stored message id; absent when the store absorbed a duplicate
    pub message_id: Option<Uuid>,
    pub duplicate: bool,
}

/// Result of routing one fetched mail
#[derive(Debug, Clone, Default)]
pub struct RoutingOutcome {
    pub deliveries: Vec<Delivery>,
    pub rejected: bool,
}

/// Classifies each fetched mail against domain, alias and mailbox state
/// and persists the result.
pub struct MailRouter {
    domains: Arc<dyn DomainRepository>,
    mailboxes: Arc<dyn MailboxRepository>,
    aliases: Arc<dyn AliasRepository>,
    messages: Arc<dyn MessageRepository>,
    files: Arc<dyn FileStorage>,
    notifier: Arc<dyn Notifier>,
    mailer: Arc<dyn OutboundMailer>,
    hostname: String,
    send_on_reject: bool,
}

impl MailRouter {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        domains: Arc<dyn DomainRepository>,
        mailboxes: Arc<dyn MailboxRepository>,
        aliases: Arc<dyn AliasRepository>,
        messages: Arc<dyn MessageRepository>,
        files: Arc<dyn FileStorage>,
        notifier: Arc<dyn Notifier>,
        mailer: Arc<dyn OutboundMailer>,
        hostname: String,
        send_on_reject: bool,
    ) -> Self {
        Self {
            domains,
            mailboxes,
            aliases,
            messages,
            files,
            notifier,
            mailer,
            hostname,
            send_on_reject,
        }
    }

    /// Route one fetched mail.
    ///
    /// The receiver comes from the Delivered-To header. An inactive or
    /// unknown domain, a disabled mailbox, or an unknown address all
    /// produce a single rejection record; an enabled alias fans out over
    /// its enabled members, with per-member failures isolated; an enabled
    /// mailbox gets a single accepted record. Re-routing the same mail is
    /// absorbed by the store's uniqueness constraint.
    pub async fn route(&self, mail: &InboundMail) -> Result<RoutingOutcome> {
        let parsed = parse_message(&mail.message)?;
        let receiver = parsed
            .delivered_to
            .clone()
            .ok_or_else(|| Error::Validation("Message has no Delivered-To header".to_string()))?;
        let address = EmailAddress::parse(&receiver).ok_or_else(|| {
            Error::Validation(format!("Invalid Delivered-To address: {}", receiver))
        })?;
        let canonical = address.to_string();

        if !self.domains.is_active(&address.domain).await? {
            debug!(domain = %address.domain, "Domain unknown or inactive");
            return self.reject(mail, &parsed, &canonical, &address.domain).await;
        }

        if let Some(alias) = self.aliases.get_by_address(&canonical).await? {
            if alias.enabled {
                return self
                    .fan_out(mail, &parsed, &alias.members.0, &address.domain, &canonical)
                    .await;
            }
        }

        match self.mailboxes.get_by_address(&canonical).await? {
            Some(mailbox) if mailbox.enabled => {
                let delivery = self
                    .deliver(mail, &parsed, &canonical, &address.domain)
                    .await?;
                Ok(RoutingOutcome {
                    deliveries: vec![delivery],
                    rejected: false,
                })
            }
            _ => self.reject(mail, &parsed, &canonical, &address.domain).await,
        }
    }

    /// Deliver to every enabled member of an alias. A failing member does
    /// not stop the others; with no enabled member at all the mail is
    /// rejected like any unknown address.
    async fn fan_out(
        &self,
        mail: &InboundMail,
        parsed: &ParsedMessage,
        members: &[String],
        domain_name: &str,
        alias_address: &str,
    ) -> Result<RoutingOutcome> {
        let mut outcome = RoutingOutcome::default();
        let mut any_enabled = false;

        for member in members {
            match self.mailboxes.is_enabled(member).await {
                Ok(true) => {
                    any_enabled = true;
                    match self.deliver(mail, parsed, member, domain_name).await {
                        Ok(delivery) => outcome.deliveries.push(delivery),
                        Err(e) => {
                            warn!(member = %member, alias = %alias_address, "Alias delivery failed: {}", e)
                        }
                    }
                }
                Ok(false) => debug!(member = %member, "Skipping disabled alias member"),
                Err(e) => warn!(member = %member, "Alias member lookup failed: {}", e),
            }
        }

        if !any_enabled {
            return self.reject(mail, parsed, alias_address, domain_name).await;
        }
        Ok(outcome)
    }

    async fn deliver(
        &self,
        mail: &InboundMail,
        parsed: &ParsedMessage,
        receiver: &str,
        domain_name: &str,
    ) -> Result<Delivery> {
        let record = self
            .build_message(mail, parsed, receiver, domain_name, false)
            .await;

        match self.messages.create(&record).await {
            Ok(()) => {
                self.store_attachments(record.id, parsed).await;
                if let Err(e) = self.notifier.message_received(&record).await {
                    warn!(id = %record.id, "Notification failed: {}", e);
                }
                info!(
                    receiver = %receiver,
                    log = %mail.log_reference,
                    folder = %record.folder,
                    "Message accepted"
                );
                Ok(Delivery {
                    receiver: receiver.to_string(),
                    message_id: Some(record.id),
                    duplicate: false,
                })
            }
            Err(e) if e.is_duplicate() => {
                warn!(
                    receiver = %receiver,
                    log = %mail.log_reference,
                    "Duplicate delivery absorbed"
                );
                Ok(Delivery {
                    receiver: receiver.to_string(),
                    message_id: None,
                    duplicate: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn reject(
        &self,
        mail: &InboundMail,
        parsed: &ParsedMessage,
        receiver: &str,
        domain_name: &str,
    ) -> Result<RoutingOutcome> {
        let record = self
            .build_message(mail, parsed, receiver, domain_name, true)
            .await;

        match self.messages.create(&record).await {
            Ok(()) => {
                if let Err(e) = self.notifier.message_received(&record).await {
                    warn!(id = %record.id, "Notification failed: {}", e);
                }
                info!(receiver = %receiver, log = %mail.log_reference, "Message rejected");
                self.send_rejection_notice(mail, parsed).await;
            }
            Err(e) if e.is_duplicate() => {
                warn!(
                    receiver = %receiver,
                    log = %mail.log_reference,
                    "Duplicate rejection absorbed"
                );
            }
            Err(e) => return Err(e),
        }

        Ok(RoutingOutcome {
            deliveries: Vec::new(),
            rejected: true,
        })
    }

    /// Best-effort bounce notice back to the originator, preferring the
    /// Reply-To address over the sender; failures only log
    async fn send_rejection_notice(&self, mail: &InboundMail, parsed: &ParsedMessage) {
        if !self.send_on_reject {
            return;
        }
        let Some(recipient) = parsed.reply_to.as_deref().or(parsed.sender.as_deref()) else {
            return;
        };

        let notice = rejection_notice(
            &self.hostname,
            recipient,
            parsed.subject.as_deref(),
            REJECTION_MESSAGE,
            header_section(&mail.message),
        );
        match notice {
            Ok(notice) => {
                if let Err(e) = self.mailer.send(recipient, &notice).await {
                    warn!(to = %recipient, "Rejection notice delivery failed: {}", e);
                }
            }
            Err(e) => warn!(to = %recipient, "Rejection notice build failed: {}", e),
        }
    }

    async fn build_message(
        &self,
        mail: &InboundMail,
        parsed: &ParsedMessage,
        receiver: &str,
        domain_name: &str,
        rejected: bool,
    ) -> IncomingMessage {
        let processed_at = Utc::now();

        let in_reply_to_message = match &parsed.in_reply_to {
            Some(message_id) => match self.messages.find_by_message_id(message_id).await {
                Ok(found) => found,
                Err(e) => {
                    warn!(message_id = %message_id, "Reply lookup failed: {}", e);
                    None
                }
            },
            None => None,
        };

        let folder = if mail.is_spam {
            MailFolder::Spam
        } else {
            MailFolder::Inbox
        };
        let status = if rejected {
            MessageStatus::Rejected
        } else {
            MessageStatus::Accepted
        };

        IncomingMessage {
            id: Uuid::now_v7(),
            log_reference: mail.log_reference.clone(),
            receiver: receiver.to_string(),
            domain_name: domain_name.to_string(),
            message: mail.message.clone(),
            is_spam: mail.is_spam,
            is_rejected: rejected,
            rejection_message: rejected.then(|| REJECTION_MESSAGE.to_string()),
            sender: parsed.sender.clone(),
            display_name: parsed.display_name.clone(),
            subject: parsed.subject.clone(),
            message_id: parsed.message_id.clone(),
            in_reply_to: parsed.in_reply_to.clone(),
            in_reply_to_message,
            reply_to: parsed.reply_to.clone(),
            recipients: Json(parsed.recipients.clone()),
            spf: parsed.spf.clone(),
            dkim: parsed.dkim.clone(),
            dmarc: parsed.dmarc.clone(),
            from_ip: parsed.from_ip.clone(),
            from_host: parsed.from_host.clone(),
            body_html: parsed.body_html.clone(),
            body_plain: parsed.body_plain.clone(),
            message_size: parsed.size,
            folder: folder.to_string(),
            status: status.to_string(),
            created_at: parsed.created_at,
            received_at: parsed.received_at,
            fetched_at: mail.fetched_at,
            processed_at,
            received_after: match (parsed.created_at, parsed.received_at) {
                (Some(created), Some(received)) => Some(seconds_between(created, received)),
                _ => None,
            },
            fetched_after: parsed
                .received_at
                .map(|received| seconds_between(received, mail.fetched_at)),
            processed_after: Some(seconds_between(mail.fetched_at, processed_at)),
        }
    }

    async fn store_attachments(&self, message_id: Uuid, parsed: &ParsedMessage) {
        for (index, attachment) in parsed.attachments.iter().enumerate() {
            let path = attachment_path(&message_id, index, &attachment.filename);
            if let Err(e) = self.files.store(&path, &attachment.data).await {
                warn!(path = %path, "Attachment store failed: {}", e);
            }
        }
    }
}

/// Elapsed seconds from `earlier` to `later`, negative when out of order
fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

/// Header section of a raw message, without the body
fn header_section(message: &str) -> &str {
    if let Some(i) = message.find("\r\n\r\n") {
        &message[..i]
    } else if let Some(i) = message.find("\n\n") {
        &message[..i]
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbound::testutil::{fixture, mail_for};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_accepts_enabled_mailbox() {
        let fx = fixture(true);
        let outcome = fx
            .router
            .route(&mail_for("alice@example.com", false))
            .await
            .unwrap();

        assert!(!outcome.rejected);
        assert_eq!(outcome.deliveries.len(), 1);

        let rows = fx.messages.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.receiver, "alice@example.com");
        assert_eq!(row.status, "accepted");
        assert_eq!(row.folder, "inbox");
        assert_eq!(row.sender.as_deref(), Some("bob@sender.net"));
        assert_eq!(row.subject.as_deref(), Some("hello"));
        assert!(!row.is_rejected);
        assert!(row.rejection_message.is_none());
    }

    #[tokio::test]
    async fn test_spam_verdict_selects_spam_folder() {
        let fx = fixture(true);
        fx.router
            .route(&mail_for("alice@example.com", true))
            .await
            .unwrap();

        let rows = fx.messages.rows.lock().unwrap();
        assert_eq!(rows[0].folder, "spam");
        assert!(rows[0].is_spam);
        assert_eq!(rows[0].status, "accepted");
    }

    #[tokio::test]
    async fn test_rejects_unknown_domain() {
        let fx = fixture(true);
        let outcome = fx
            .router
            .route(&mail_for("alice@elsewhere.net", false))
            .await
            .unwrap();

        assert!(outcome.rejected);
        let rows = fx.messages.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_rejected);
        assert_eq!(rows[0].status, "rejected");
        assert_eq!(
            rows[0].rejection_message.as_deref(),
            Some("550 5.4.1 Recipient address rejected: Access denied.")
        );
        // Metadata is still extracted for the rejection record
        assert_eq!(rows[0].sender.as_deref(), Some("bob@sender.net"));
    }

    #[tokio::test]
    async fn test_rejects_disabled_mailbox() {
        let fx = fixture(false);
        let outcome = fx
            .router
            .route(&mail_for("carol@example.com", false))
            .await
            .unwrap();
        assert!(outcome.rejected);
    }

    #[tokio::test]
    async fn test_rejects_unknown_address() {
        let fx = fixture(false);
        let outcome = fx
            .router
            .route(&mail_for("nobody@example.com", false))
            .await
            .unwrap();
        assert!(outcome.rejected);
        assert!(fx.mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_alias_fans_out_to_enabled_members() {
        let fx = fixture(true);
        let outcome = fx
            .router
            .route(&mail_for("team@example.com", false))
            .await
            .unwrap();

        assert!(!outcome.rejected);
        let receivers: Vec<&str> = outcome
            .deliveries
            .iter()
            .map(|d| d.receiver.as_str())
            .collect();
        // carol is disabled and skipped
        assert_eq!(receivers, vec!["alice@example.com", "bob@example.com"]);

        let rows = fx.messages.rows.lock().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.log_reference == "LOG-0001"));
    }

    #[tokio::test]
    async fn test_rerouting_is_absorbed_as_duplicate() {
        let fx = fixture(true);
        let mail = mail_for("alice@example.com", false);

        let first = fx.router.route(&mail).await.unwrap();
        let second = fx.router.route(&mail).await.unwrap();

        assert!(!first.deliveries[0].duplicate);
        assert!(second.deliveries[0].duplicate);
        assert!(second.deliveries[0].message_id.is_none());
        assert_eq!(fx.messages.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejection_notice_goes_to_sender() {
        let fx = fixture(true);
        fx.router
            .route(&mail_for("nobody@example.com", false))
            .await
            .unwrap();

        let sent = fx.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "bob@sender.net");
        assert!(sent[0].1.contains("Undeliverable: hello"));
        assert!(sent[0].1.contains("mailer-daemon@mail.mailward.net"));
    }

    #[tokio::test]
    async fn test_retention_sweep_drops_only_old_rejected_messages() {
        let fx = fixture(false);
        fx.router
            .route(&mail_for("alice@example.com", false))
            .await
            .unwrap();
        let mut rejected = mail_for("nobody@example.com", false);
        rejected.log_reference = "LOG-0002".to_string();
        fx.router.route(&rejected).await.unwrap();

        let cutoff = Utc::now() + chrono::Duration::days(1);
        let dropped = fx.messages.clear_rejected_older_than(cutoff).await.unwrap();

        assert_eq!(dropped, 1);
        let rows = fx.messages.rows.lock().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].is_rejected);
    }

    #[tokio::test]
    async fn test_rejection_notice_prefers_reply_to() {
        let fx = fixture(true);
        let mut mail = mail_for("nobody@example.com", false);
        mail.message = mail.message.replace(
            "Subject: hello",
            "Reply-To: replies@sender.net\r\nSubject: hello",
        );

        fx.router.route(&mail).await.unwrap();

        let sent = fx.mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "replies@sender.net");
    }

    #[tokio::test]
    async fn test_latency_deltas() {
        let fx = fixture(true);
        fx.router
            .route(&mail_for("alice@example.com", false))
            .await
            .unwrap();

        let rows = fx.messages.rows.lock().unwrap();
        let row = &rows[0];
        // Date 10:15:00, Received-At 10:16:00, fetched 10:16:45
        assert_eq!(row.received_after, Some(60.0));
        assert_eq!(row.fetched_after, Some(45.0));
        assert!(row.processed_after.unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn test_reply_threading_resolves_stored_message() {
        let fx = fixture(true);
        fx.router
            .route(&mail_for("alice@example.com", false))
            .await
            .unwrap();
        let original_id = fx.messages.rows.lock().unwrap()[0].id;

        let mut reply = mail_for("alice@example.com", false);
        reply.log_reference = "LOG-0002".to_string();
        reply.message = reply
            .message
            .replace("Message-ID: <m1@sender.net>", "Message-ID: <m2@sender.net>\r\nIn-Reply-To: <m1@sender.net>");
        fx.router.route(&reply).await.unwrap();

        let rows = fx.messages.rows.lock().unwrap();
        assert_eq!(rows[1].in_reply_to.as_deref(), Some("m1@sender.net"));
        assert_eq!(rows[1].in_reply_to_message, Some(original_id));
    }

    #[tokio::test]
    async fn test_attachments_land_in_file_storage() {
        let fx = fixture(true);
        let mut mail = mail_for("alice@example.com", false);
        mail.message = "Delivered-To: alice@example.com\r\n\
From: bob@sender.net\r\n\
To: alice@example.com\r\n\
Subject: with file\r\n\
Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: text/plain\r\n\
\r\n\
see attachment\r\n\
--b1\r\n\
Content-Type: text/csv\r\n\
Content-Disposition: attachment; filename=\"data.csv\"\r\n\
\r\n\
a,b\r\n1,2\r\n\
--b1--\r\n"
            .to_string();

        fx.router.route(&mail).await.unwrap();

        let stored = fx.files.stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored.keys().next().unwrap().ends_with("/0_data.csv"));
    }

    #[test]
    fn test_seconds_between() {
        let a = Utc.with_ymd_and_hms(2026, 8, 29, 10, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1500);
        assert_eq!(seconds_between(a, b), 1.5);
        assert_eq!(seconds_between(b, a), -1.5);
    }

    #[test]
    fn test_header_section() {
        assert_eq!(
            header_section("A: 1\r\nB: 2\r\n\r\nbody"),
            "A: 1\r\nB: 2"
        );
        assert_eq!(header_section("no body at all"), "no body at all");
    }
}
