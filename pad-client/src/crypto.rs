//! Content encryption for pad events.
//!
//! Relays never see pad text: event content is a [`PadPayload`] encrypted
//! with XChaCha20-Poly1305 under a key derived from the pad id, then
//! base64-encoded for the wire.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use hkdf::Hkdf;
use sha2::Sha256;

use pad_types::{PadId, PadPayload};

use crate::error::ClientError;

/// Domain separation for the content key derivation.
const CONTENT_KEY_SALT: &[u8] = b"driftpad-content-key-v1";

/// XChaCha20 nonce length in bytes, prepended to each ciphertext.
const NONCE_LEN: usize = 24;

/// Poly1305 authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Symmetric key protecting one pad's content.
///
/// Derived from the pad id alone: anyone holding the shareable id can
/// read the pad. That is the deliberate trade-off of this scheme; writes
/// are gated by the signing key, reads by knowing the id. Relays, which
/// see only ids they are queried for, still learn nothing of the text.
#[derive(Clone)]
pub struct ContentKey([u8; 32]);

impl ContentKey {
    /// Derive the content key for a pad.
    pub fn derive(pad_id: &PadId) -> Self {
        let hkdf = Hkdf::<Sha256>::new(Some(CONTENT_KEY_SALT), pad_id.to_string().as_bytes());
        let mut key = [0u8; 32];
        hkdf.expand(b"content", &mut key)
            .expect("HKDF expand failed");
        Self(key)
    }

    /// Encrypt a payload into wire form: base64 of nonce followed by
    /// ciphertext, under a fresh random nonce.
    pub fn seal(&self, payload: &PadPayload) -> Result<String, ClientError> {
        let plaintext = payload.to_bytes()?;
        let mut nonce = [0u8; NONCE_LEN];
        getrandom::getrandom(&mut nonce).expect("getrandom failed");

        let cipher = XChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| ClientError::Crypto(format!("bad key length: {e}")))?;
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|e| ClientError::Crypto(format!("encryption failed: {e}")))?;

        let mut combined = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        combined.extend_from_slice(&nonce);
        combined.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(combined))
    }

    /// Decrypt wire-form content. Fails closed: any malformed, tampered,
    /// or foreign-key content yields `None`.
    pub fn open(&self, content: &str) -> Option<PadPayload> {
        let combined = URL_SAFE_NO_PAD.decode(content).ok()?;
        if combined.len() < NONCE_LEN + TAG_LEN {
            return None;
        }
        let (nonce, ciphertext) = combined.split_at(NONCE_LEN);
        let cipher = XChaCha20Poly1305::new_from_slice(&self.0).ok()?;
        let plaintext = cipher.decrypt(XNonce::from_slice(nonce), ciphertext).ok()?;
        PadPayload::from_bytes(&plaintext).ok()
    }
}

// Intentionally opaque debug to avoid logging key material.
impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey(REDACTED)")
    }
}
