//! Spam scanning: the spamd wire client and the scanning strategies

mod client;
mod scanner;

pub use client::{ScanError, Spamd, SpamdClient, SpamdResponse};
pub use scanner::{strip_attachments, SpamScanner};
