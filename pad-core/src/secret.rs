//! The pad's signing-key seed.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A 32-byte Ed25519 seed.
///
/// Holding the seed grants write access to the pad. It moves between
/// devices through the explicit import flow; at rest it lives only inside
/// the session vault's ciphertext.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretSeed([u8; 32]);

impl SecretSeed {
    /// Generate a fresh random seed.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        getrandom::getrandom(&mut bytes).expect("getrandom failed");
        Self(bytes)
    }

    /// Create from raw bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from 64 hex characters, the format used by the import flow.
    pub fn from_hex(s: &str) -> Option<Self> {
        let decoded = hex::decode(s.trim()).ok()?;
        let bytes: [u8; 32] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Encode as hex for display to the user. The string is the write
    /// credential; showing it is an explicit export.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

// Intentionally opaque debug to avoid logging seeds
impl std::fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretSeed([REDACTED])")
    }
}
