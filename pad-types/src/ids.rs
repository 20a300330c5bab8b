//! Identity types for driftpad.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::WireError;

/// Number of public-key bytes that feed the pad identifier.
pub const PAD_ID_PREFIX_LEN: usize = 8;

/// Length of the encoded pad identifier string.
///
/// 8 bytes of URL-safe base64 without padding is always 11 characters.
pub const PAD_ID_LEN: usize = 11;

/// The public identifier of a pad.
///
/// Derived deterministically from the first [`PAD_ID_PREFIX_LEN`] bytes of
/// the pad's Ed25519 verifying key, displayed as URL-safe base64. Anyone
/// holding the string can locate and read the pad; only the holder of the
/// signing key can write to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PadId([u8; PAD_ID_PREFIX_LEN]);

impl PadId {
    /// Derive the pad identifier from a 32-byte verifying key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let mut prefix = [0u8; PAD_ID_PREFIX_LEN];
        prefix.copy_from_slice(&public_key[..PAD_ID_PREFIX_LEN]);
        Self(prefix)
    }

    /// Parse a pad identifier from its string form.
    ///
    /// Rejects anything that is not the canonical encoding: wrong length,
    /// bad alphabet, or a string that does not round-trip.
    pub fn parse(s: &str) -> Result<Self, WireError> {
        if s.len() != PAD_ID_LEN {
            return Err(WireError::InvalidId(format!(
                "pad id must be {PAD_ID_LEN} characters, got {}",
                s.len()
            )));
        }
        let decoded = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| WireError::InvalidId(format!("pad id is not base64: {e}")))?;
        if decoded.len() != PAD_ID_PREFIX_LEN {
            return Err(WireError::InvalidId(format!(
                "pad id decodes to {} bytes, expected {PAD_ID_PREFIX_LEN}",
                decoded.len()
            )));
        }
        let mut prefix = [0u8; PAD_ID_PREFIX_LEN];
        prefix.copy_from_slice(&decoded);
        let candidate = Self(prefix);
        if candidate.to_string() != s {
            return Err(WireError::InvalidId(
                "pad id is not in canonical form".to_string(),
            ));
        }
        Ok(candidate)
    }

    /// Get the raw prefix bytes of this PadId.
    pub fn as_bytes(&self) -> &[u8; PAD_ID_PREFIX_LEN] {
        &self.0
    }
}

impl fmt::Display for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", URL_SAFE_NO_PAD.encode(self.0))
    }
}

impl fmt::Debug for PadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PadId({self})")
    }
}

impl Serialize for PadId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PadId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PadId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A unique identifier for an event, computed over its canonical form.
///
/// 32 bytes of SHA-256, displayed as lowercase hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId([u8; 32]);

impl EventId {
    /// Compute the identifier of a canonical signing form.
    pub fn digest(canonical: &[u8]) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(canonical);
        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }

    /// Parse an EventId from its hex string form.
    pub fn parse(s: &str) -> Result<Self, WireError> {
        let decoded =
            hex::decode(s).map_err(|e| WireError::InvalidId(format!("event id: {e}")))?;
        if decoded.len() != 32 {
            return Err(WireError::InvalidId(format!(
                "event id decodes to {} bytes, expected 32",
                decoded.len()
            )));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }

    /// Get the raw bytes of this EventId.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", &self.to_string()[..8])
    }
}

impl Serialize for EventId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        EventId::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A per-engine client identifier.
///
/// Carried as an event tag so a writer can recognize its own events when
/// relays echo them back. UUID v4 format.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(uuid::Uuid);

impl ClientId {
    /// Create a new random ClientId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a ClientId from its string form.
    pub fn parse(s: &str) -> Result<Self, WireError> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| WireError::InvalidId(format!("client id: {e}")))
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientId({})", self.0)
    }
}

/// A subscription identifier, unique per open subscription on a socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubId(String);

impl SubId {
    /// Mint a fresh subscription identifier.
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an existing identifier string.
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// View the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
