//! Error types for the driftpad wire format.

use thiserror::Error;

/// Errors that can occur while encoding or decoding wire data.
#[derive(Debug, Error)]
pub enum WireError {
    /// MessagePack serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] rmp_serde::encode::Error),

    /// MessagePack deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] rmp_serde::decode::Error),

    /// JSON encoding or decoding failed
    #[error("json error: {0}")]
    Json(#[source] serde_json::Error),

    /// A relay frame did not match any known shape
    #[error("malformed frame: {0}")]
    Frame(String),

    /// An identifier failed to parse
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// Key material had the wrong length or encoding
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// Event signature or id did not check out
    #[error("invalid signature")]
    InvalidSignature,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = WireError::InvalidId("too short".to_string());
        assert_eq!(err.to_string(), "invalid identifier: too short");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<WireError>();
    }
}
