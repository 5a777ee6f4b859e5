//! Mailward core library
//!
//! The trust and ingestion pipeline: domain DNS authority, the spamd
//! scan client, and inbound message routing with its fetch loop.

pub mod dns;
pub mod domain;
pub mod inbound;
pub mod notify;
pub mod spam;
