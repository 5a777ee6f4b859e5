//! In-memory doubles for routing and sync tests

use crate::inbound::router::{InboundMail, MailRouter};
use crate::notify::{LogNotifier, OutboundMailer};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use mailward_common::{Error, Result};
use mailward_storage::file::FileStorage;
use mailward_storage::models::{Alias, Domain, IncomingMessage, Mailbox};
use mailward_storage::repository::{
    AliasRepository, DomainRepository, MailboxRepository, MessageRepository,
};
use sqlx::types::Json;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub struct MemDomains {
    pub active: HashSet<String>,
}

#[async_trait]
impl DomainRepository for MemDomains {
    async fn create(&self, _domain: &Domain) -> Result<()> {
        Ok(())
    }
    async fn update(&self, _domain: &Domain) -> Result<()> {
        Ok(())
    }
    async fn get(&self, _id: Uuid) -> Result<Option<Domain>> {
        Ok(None)
    }
    async fn get_by_name(&self, _domain_name: &str) -> Result<Option<Domain>> {
        Ok(None)
    }
    async fn is_active(&self, domain_name: &str) -> Result<bool> {
        Ok(self.active.contains(domain_name))
    }
    async fn list_active(&self) -> Result<Vec<Domain>> {
        Ok(Vec::new())
    }
    async fn list_unverified(&self) -> Result<Vec<Domain>> {
        Ok(Vec::new())
    }
}

pub struct MemMailboxes {
    pub enabled: HashMap<String, bool>,
}

#[async_trait]
impl MailboxRepository for MemMailboxes {
    async fn create(&self, _mailbox: &Mailbox) -> Result<()> {
        Ok(())
    }
    async fn get_by_address(&self, address: &str) -> Result<Option<Mailbox>> {
        Ok(self.enabled.get(address).map(|enabled| Mailbox {
            id: Uuid::now_v7(),
            address: address.to_string(),
            display_name: None,
            domain_name: address.split('@').nth(1).unwrap_or("").to_string(),
            enabled: *enabled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }))
    }
    async fn is_enabled(&self, address: &str) -> Result<bool> {
        Ok(self.enabled.get(address).copied().unwrap_or(false))
    }
    async fn list_by_domain(&self, _domain_name: &str) -> Result<Vec<Mailbox>> {
        Ok(Vec::new())
    }
}

pub struct MemAliases {
    pub aliases: HashMap<String, Alias>,
}

#[async_trait]
impl AliasRepository for MemAliases {
    async fn create(&self, _alias: &Alias) -> Result<()> {
        Ok(())
    }
    async fn get_by_address(&self, address: &str) -> Result<Option<Alias>> {
        Ok(self.aliases.get(address).cloned())
    }
}

pub struct MemMessages {
    pub rows: Mutex<Vec<IncomingMessage>>,
}

impl MemMessages {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl MessageRepository for MemMessages {
    async fn create(&self, message: &IncomingMessage) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if rows
            .iter()
            .any(|r| r.receiver == message.receiver && r.log_reference == message.log_reference)
        {
            return Err(Error::Duplicate(format!(
                "{} / {}",
                message.receiver, message.log_reference
            )));
        }
        rows.push(message.clone());
        Ok(())
    }
    async fn get(&self, id: Uuid) -> Result<Option<IncomingMessage>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }
    async fn find_by_message_id(&self, message_id: &str) -> Result<Option<Uuid>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.message_id.as_deref() == Some(message_id))
            .map(|r| r.id))
    }
    async fn clear_rejected_older_than(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| !(r.is_rejected && r.processed_at < cutoff));
        Ok((before - rows.len()) as u64)
    }
}

pub struct MemFiles {
    pub stored: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemFiles {
    pub fn new() -> Self {
        Self {
            stored: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl FileStorage for MemFiles {
    async fn store(&self, path: &str, data: &[u8]) -> Result<String> {
        self.stored
            .lock()
            .unwrap()
            .insert(path.to_string(), data.to_vec());
        Ok(path.to_string())
    }
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.stored
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }
    async fn delete(&self, _path: &str) -> Result<()> {
        Ok(())
    }
    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.stored.lock().unwrap().contains_key(path))
    }
}

pub struct MemMailer {
    pub sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl OutboundMailer for MemMailer {
    async fn send(&self, to: &str, raw_message: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), raw_message.to_string()));
        Ok(())
    }
}

pub struct Fixture {
    pub router: Arc<MailRouter>,
    pub messages: Arc<MemMessages>,
    pub files: Arc<MemFiles>,
    pub mailer: Arc<MemMailer>,
}

/// Router over an active example.com with mailboxes alice (enabled),
/// bob (enabled) and carol (disabled), and a team@ alias over all three.
pub fn fixture(send_on_reject: bool) -> Fixture {
    let domains = Arc::new(MemDomains {
        active: ["example.com".to_string()].into_iter().collect(),
    });
    let mailboxes = Arc::new(MemMailboxes {
        enabled: [
            ("alice@example.com".to_string(), true),
            ("bob@example.com".to_string(), true),
            ("carol@example.com".to_string(), false),
        ]
        .into_iter()
        .collect(),
    });
    let aliases = Arc::new(MemAliases {
        aliases: [(
            "team@example.com".to_string(),
            Alias {
                id: Uuid::now_v7(),
                address: "team@example.com".to_string(),
                enabled: true,
                members: Json(vec![
                    "alice@example.com".to_string(),
                    "bob@example.com".to_string(),
                    "carol@example.com".to_string(),
                ]),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        )]
        .into_iter()
        .collect(),
    });
    let messages = Arc::new(MemMessages::new());
    let files = Arc::new(MemFiles::new());
    let mailer = Arc::new(MemMailer {
        sent: Mutex::new(Vec::new()),
    });

    let router = Arc::new(MailRouter::new(
        domains,
        mailboxes,
        aliases,
        messages.clone(),
        files.clone(),
        Arc::new(LogNotifier),
        mailer.clone(),
        "mail.mailward.net".to_string(),
        send_on_reject,
    ));

    Fixture {
        router,
        messages,
        files,
        mailer,
    }
}

pub fn raw_message(delivered_to: &str) -> String {
    format!(
        "Delivered-To: {}\r\n\
Received: from out.sender.net (out.sender.net [203.0.113.9]) by mx1.mailward.net\r\n\
Received-At: 2026-08-29T10:16:00+00:00\r\n\
From: Bob Sender <bob@sender.net>\r\n\
To: {}\r\n\
Subject: hello\r\n\
Message-ID: <m1@sender.net>\r\n\
Date: Sat, 29 Aug 2026 10:15:00 +0000\r\n\
Content-Type: text/plain\r\n\
\r\n\
hi there\r\n",
        delivered_to, delivered_to
    )
}

pub fn mail_for(delivered_to: &str, is_spam: bool) -> InboundMail {
    InboundMail {
        log_reference: "LOG-0001".to_string(),
        message: raw_message(delivered_to),
        is_spam,
        fetched_at: Utc.with_ymd_and_hms(2026, 8, 29, 10, 16, 45).unwrap(),
    }
}
