//! Domain authority: DKIM key material, DNS record synthesis and verification

mod authority;
mod keys;

pub use authority::{DomainAuthority, RecordMismatch, VerifyReport};
pub use keys::{generate_dkim_keypair, DkimKeypair};
