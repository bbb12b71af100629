//! Sealed cookie payloads.
//!
//! Session cookies and anti-forgery markers are sealed with AES-256-GCM under a
//! key derived from the configured secret. The cookie value is
//! `base64url(nonce || ciphertext || tag)`, so any modification fails to open
//! instead of decoding to different content.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

/// Plaintext prefix of every anti-forgery marker.
pub const MARKER_PREFIX: &str = "No XSRF Allowed";

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("cookie value is not valid base64")]
    Encoding,
    #[error("sealed value is too short")]
    Truncated,
    #[error("sealed value failed authentication")]
    Tampered,
    #[error("sealing failed")]
    Seal,
    #[error("session payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
}

/// The decrypted content of a session cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Username of the identity the session belongs to.
    pub user: String,
    /// Issued-at, milliseconds since the epoch.
    pub when: i64,
}

impl Session {
    /// A session for `user` issued now.
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into(), when: now_millis() }
    }

    /// A copy of this session with a fresh issued-at.
    pub fn refreshed(&self) -> Self {
        Self { user: self.user.clone(), when: now_millis() }
    }

    pub fn is_expired(&self, now_millis: i64, timeout_millis: i64) -> bool {
        self.when.saturating_add(timeout_millis) < now_millis
    }
}

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Symmetric, tamper-evident encoding of small payloads into cookie values.
#[derive(Clone)]
pub struct SessionCodec {
    cipher: Aes256Gcm,
}

impl SessionCodec {
    pub fn new(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(&digest);
        Self { cipher: Aes256Gcm::new(key) }
    }

    pub fn encode(&self, session: &Session) -> Result<String, CodecError> {
        let json = serde_json::to_vec(session)?;
        self.seal(&json)
    }

    pub fn decode(&self, value: &str) -> Result<Session, CodecError> {
        let plain = self.open(value)?;
        Ok(serde_json::from_slice(&plain)?)
    }

    /// Mints a fresh anti-forgery marker. It carries no identity.
    pub fn mint_marker(&self) -> Result<String, CodecError> {
        let plain = format!("{}{}", MARKER_PREFIX, chrono::Utc::now().to_rfc3339());
        self.seal(plain.as_bytes())
    }

    /// True when `value` opens under our key to an anti-forgery marker.
    pub fn is_marker(&self, value: &str) -> bool {
        match self.open(value) {
            Ok(plain) => plain.starts_with(MARKER_PREFIX.as_bytes()),
            Err(e) => {
                tracing::debug!("Anti-forgery value did not open: {}", e);
                false
            }
        }
    }

    fn seal(&self, plain: &[u8]) -> Result<String, CodecError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self.cipher.encrypt(nonce, plain).map_err(|_| CodecError::Seal)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    fn open(&self, value: &str) -> Result<Vec<u8>, CodecError> {
        let raw = URL_SAFE_NO_PAD.decode(value.trim()).map_err(|_| CodecError::Encoding)?;
        if raw.len() <= NONCE_LEN {
            return Err(CodecError::Truncated);
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| CodecError::Tampered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> SessionCodec {
        SessionCodec::new("12345678901234567890123456789012")
    }

    #[test]
    fn round_trips_sessions() {
        let c = codec();
        for s in [
            Session { user: "slavik".into(), when: 0 },
            Session { user: "tok*-*a@b.io".into(), when: 1_700_000_000_000 },
            Session { user: "ünï cödé".into(), when: i64::MAX },
        ] {
            let sealed = c.encode(&s).unwrap();
            assert_eq!(c.decode(&sealed).unwrap(), s);
        }
    }

    #[test]
    fn encoding_is_randomized() {
        let c = codec();
        let s = Session { user: "slavik".into(), when: 42 };
        assert_ne!(c.encode(&s).unwrap(), c.encode(&s).unwrap());
    }

    #[test]
    fn any_modified_character_fails_to_decode() {
        let c = codec();
        let sealed = c.encode(&Session { user: "slavik".into(), when: 42 }).unwrap();
        for i in 0..sealed.len() {
            let mut bytes = sealed.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert!(c.decode(&tampered).is_err(), "byte {} flipped still decoded", i);
        }
    }

    #[test]
    fn rejects_garbage_and_foreign_keys() {
        let c = codec();
        assert!(matches!(c.decode("not base64 !!"), Err(CodecError::Encoding)));
        assert!(matches!(c.decode("AAAA"), Err(CodecError::Truncated)));

        let other = SessionCodec::new("another secret");
        let sealed = other.encode(&Session::new("slavik")).unwrap();
        assert!(matches!(c.decode(&sealed), Err(CodecError::Tampered)));
    }

    #[test]
    fn rejects_non_session_payloads() {
        let c = codec();
        let marker = c.mint_marker().unwrap();
        assert!(matches!(c.decode(&marker), Err(CodecError::Payload(_))));
    }

    #[test]
    fn markers_are_recognized_only_under_our_key() {
        let c = codec();
        let marker = c.mint_marker().unwrap();
        assert!(c.is_marker(&marker));
        assert!(!SessionCodec::new("other").is_marker(&marker));

        let session = c.encode(&Session::new("slavik")).unwrap();
        assert!(!c.is_marker(&session));
    }

    #[test]
    fn expiry_is_measured_from_issued_at() {
        let s = Session { user: "u".into(), when: 1_000 };
        assert!(!s.is_expired(1_500, 500));
        assert!(s.is_expired(1_501, 500));
    }
}
