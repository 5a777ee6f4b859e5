//! DKIM keypair generation

use mailward_common::{Error, Result};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};

/// PEM bodies with armor lines and whitespace stripped, ready for storage
/// and for embedding in a DKIM TXT record.
#[derive(Debug, Clone)]
pub struct DkimKeypair {
    pub private_key: String,
    pub public_key: String,
}

/// Generate a fresh RSA keypair for DKIM signing.
///
/// The private key is PKCS#1, the public key SPKI, both base64 without
/// armor. Key sizes below 1024 bits are refused before any generation work.
pub fn generate_dkim_keypair(bits: u32) -> Result<DkimKeypair> {
    if bits < 1024 {
        return Err(Error::Validation(format!(
            "DKIM key size must be at least 1024 bits, got {}",
            bits
        )));
    }

    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, bits as usize)
        .map_err(|e| Error::Internal(format!("RSA key generation failed: {}", e)))?;
    let public = RsaPublicKey::from(&private);

    let private_pem = private
        .to_pkcs1_pem(LineEnding::LF)
        .map_err(|e| Error::Internal(format!("Failed to encode private key: {}", e)))?
        .to_string();
    let public_pem = public
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| Error::Internal(format!("Failed to encode public key: {}", e)))?;

    Ok(DkimKeypair {
        private_key: strip_armor(&private_pem),
        public_key: strip_armor(&public_pem),
    })
}

/// Drop PEM armor lines and join the base64 into a single line
fn strip_armor(pem: &str) -> String {
    pem.lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_rejects_small_keys() {
        let err = generate_dkim_keypair(512).unwrap_err();
        assert!(err.to_string().contains("1024"));
    }

    #[test]
    fn test_generated_keys_have_no_armor() {
        let keypair = generate_dkim_keypair(1024).unwrap();
        assert!(!keypair.private_key.contains("-----"));
        assert!(!keypair.public_key.contains("-----"));
        assert!(!keypair.public_key.contains('\n'));
        assert!(!keypair.public_key.is_empty());
    }

    #[test]
    fn test_strip_armor() {
        let pem = "-----BEGIN PUBLIC KEY-----\nabc\ndef\n-----END PUBLIC KEY-----\n";
        assert_eq!(strip_armor(pem), "abcdef");
    }
}
