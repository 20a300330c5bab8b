//! Pad signing identity.
//!
//! A pad is identified by its Ed25519 verifying key: the pad id is a
//! short encoding of the key's leading bytes, and only the holder of the
//! matching signing key can publish content under that id.

use std::fmt;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use pad_core::SecretSeed;
use pad_types::PadId;

use crate::error::ClientError;

/// A signing identity bound to one pad.
#[derive(Clone)]
pub struct PadIdentity {
    pad_id: PadId,
    signing_key: SigningKey,
}

impl PadIdentity {
    /// Mint a brand-new pad with a freshly generated key.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let pad_id = PadId::from_public_key(&signing_key.verifying_key().to_bytes());
        Self {
            pad_id,
            signing_key,
        }
    }

    /// Rebuild the identity from an exported seed.
    ///
    /// When `expected` is given, the key must derive exactly that pad id;
    /// a mismatch is rejected rather than repaired, since a wrong seed can
    /// never produce events readable under the expected pad.
    pub fn from_seed(seed: &SecretSeed, expected: Option<&PadId>) -> Result<Self, ClientError> {
        let signing_key = SigningKey::from_bytes(seed.as_bytes());
        let pad_id = PadId::from_public_key(&signing_key.verifying_key().to_bytes());
        if let Some(expected) = expected {
            if *expected != pad_id {
                return Err(ClientError::IdentityMismatch {
                    expected: expected.to_string(),
                    derived: pad_id.to_string(),
                });
            }
        }
        Ok(Self {
            pad_id,
            signing_key,
        })
    }

    /// The pad this identity writes to.
    pub fn pad_id(&self) -> PadId {
        self.pad_id
    }

    /// The signing key, for building events.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// The full 32-byte verifying key.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Export the seed for storage or transfer to another device.
    pub fn seed(&self) -> SecretSeed {
        SecretSeed::from_bytes(self.signing_key.to_bytes())
    }
}

// Intentionally opaque debug to avoid logging the signing key.
impl fmt::Debug for PadIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PadIdentity")
            .field("pad_id", &self.pad_id)
            .field("signing_key", &"REDACTED")
            .finish()
    }
}
