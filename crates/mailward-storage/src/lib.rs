//! Mailward Storage - Database and file storage
//!
//! This crate persists the Mailward aggregates (domains, mailboxes, aliases,
//! spam scan logs, incoming messages) behind repository traits, and stores
//! extracted attachment blobs on the local filesystem.

pub mod db;
pub mod file;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use file::{FileStorage, LocalStorage};
pub use models::*;
pub use repository::*;
