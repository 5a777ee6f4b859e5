//! Repository layer

pub mod aliases;
pub mod domains;
pub mod mailboxes;
pub mod messages;
pub mod scan_logs;
pub mod sync_state;

pub use aliases::{AliasRepository, DbAliasRepository};
pub use domains::{DbDomainRepository, DomainRepository};
pub use mailboxes::{DbMailboxRepository, MailboxRepository};
pub use messages::{DbMessageRepository, MessageRepository};
pub use scan_logs::{DbScanLogRepository, ScanLogRepository};
pub use sync_state::{DbSyncStateRepository, SyncStateRepository};
