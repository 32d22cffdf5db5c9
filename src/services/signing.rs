//! Signed activation tokens
//!
//! A token is `"{username}:{signature}"` where the signature is the unpadded
//! base64url HMAC-SHA256 of the username under the site secret.

use data_encoding::BASE64URL_NOPAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// The token was malformed or its signature does not match
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bad signature")]
pub struct BadSignature;

/// Signs and verifies usernames with a shared secret
#[derive(Clone)]
pub struct Signer {
    mac: HmacSha256,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer").finish_non_exhaustive()
    }
}

impl Signer {
    pub fn new(secret: impl AsRef<[u8]>) -> anyhow::Result<Self> {
        let mac = HmacSha256::new_from_slice(secret.as_ref())
            .map_err(|e| anyhow::anyhow!("Invalid signing key: {}", e))?;
        Ok(Self { mac })
    }

    /// Produce `"{value}:{signature}"`
    pub fn sign(&self, value: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        let signature = BASE64URL_NOPAD.encode(&mac.finalize().into_bytes());
        format!("{}:{}", value, signature)
    }

    /// Verify a signed token and return the value it carries.
    ///
    /// The signature comparison runs in constant time.
    pub fn unsign(&self, token: &str) -> Result<String, BadSignature> {
        let (value, signature) = token.rsplit_once(':').ok_or(BadSignature)?;
        let signature = BASE64URL_NOPAD
            .decode(signature.as_bytes())
            .map_err(|_| BadSignature)?;

        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        mac.verify_slice(&signature).map_err(|_| BadSignature)?;

        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sign_and_unsign() {
        let signer = Signer::new("secret").unwrap();
        let token = signer.sign("alice");

        assert!(token.starts_with("alice:"));
        assert!(!token.contains('='));
        assert_eq!(signer.unsign(&token), Ok("alice".to_string()));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let signer = Signer::new("secret").unwrap();
        let token = signer.sign("alice");
        let forged = token.replacen("alice", "mallory", 1);

        assert_eq!(signer.unsign(&forged), Err(BadSignature));
        assert_eq!(signer.unsign("alice"), Err(BadSignature));
        assert_eq!(signer.unsign("alice:***"), Err(BadSignature));
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = Signer::new("one").unwrap().sign("alice");
        assert_eq!(Signer::new("two").unwrap().unsign(&token), Err(BadSignature));
    }

    proptest! {
        #[test]
        fn any_username_roundtrips(username in "[\\w.@+-]{1,40}") {
            let signer = Signer::new("k").unwrap();
            prop_assert_eq!(signer.unsign(&signer.sign(&username)), Ok(username));
        }
    }
}
