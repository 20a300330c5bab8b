//! Error types for the client library.

use thiserror::Error;

use crate::socket::SocketError;
use pad_types::WireError;

/// Errors surfaced by the client library.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Wire-format encoding or decoding failed.
    #[error("wire format error: {0}")]
    Wire(#[from] WireError),

    /// A relay socket operation failed.
    #[error("relay socket error: {0}")]
    Socket(#[from] SocketError),

    /// Local storage I/O failed.
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    /// A persisted record could not be encoded.
    #[error("record encoding error: {0}")]
    Record(#[from] serde_json::Error),

    /// Content or vault encryption failed.
    #[error("encryption error: {0}")]
    Crypto(String),

    /// The keystore refused or failed an operation.
    #[error("keystore error: {0}")]
    KeyStore(String),

    /// A secret key does not derive the pad id it was presented for.
    #[error("identity mismatch: key derives pad {derived}, expected {expected}")]
    IdentityMismatch {
        /// The pad id the caller claimed.
        expected: String,
        /// The pad id the key actually derives.
        derived: String,
    },

    /// An edit was attempted without write rights to the pad.
    #[error("pad is read-only for this session")]
    ReadOnly,

    /// The sync engine has already shut down.
    #[error("sync engine is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_detail() {
        let err = ClientError::IdentityMismatch {
            expected: "AAAAAAAAAAA".to_string(),
            derived: "BBBBBBBBBBB".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("AAAAAAAAAAA"));
        assert!(text.contains("BBBBBBBBBBB"));
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ClientError>();
    }
}
