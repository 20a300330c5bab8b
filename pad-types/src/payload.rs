//! The pad content payload.
//!
//! This is the plaintext that gets encrypted into a content event's
//! `content` field. The embedded timestamp, not relay delivery order,
//! decides which payload wins.

use serde::{Deserialize, Serialize};

use crate::WireError;

/// Decrypted pad content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadPayload {
    /// The full text of the pad.
    pub text: String,
    /// Client wall-clock milliseconds when the text was captured.
    pub timestamp_ms: u64,
}

impl PadPayload {
    /// Create a payload.
    pub fn new(text: String, timestamp_ms: u64) -> Self {
        Self { text, timestamp_ms }
    }

    /// Serialize to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        rmp_serde::to_vec(self).map_err(WireError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, WireError> {
        rmp_serde::from_slice(bytes).map_err(WireError::Deserialization)
    }
}
