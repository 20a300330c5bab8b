//! Relay socket abstraction.
//!
//! The client talks to relays through the [`RelayConnector`] and
//! [`RelaySocket`] traits so that the sync engine, the selector, and the
//! prober can run against an in-memory network in tests and against real
//! WebSocket relays in production.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pad_types::{ClientFrame, RelayFrame};

pub mod mock;
pub mod ws;

pub use mock::{MockConnector, MockNetwork};
pub use ws::WsConnector;

/// Errors from relay socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The connection could not be established.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// The socket is not connected.
    #[error("not connected")]
    NotConnected,

    /// The relay closed the connection.
    #[error("connection closed")]
    Closed,

    /// A frame could not be sent.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// A frame could not be received.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// The operation did not complete in time.
    #[error("operation timed out")]
    Timeout,
}

/// Self-declared relay capabilities, served as a JSON document over HTTP.
///
/// Every field is optional on the wire; a relay that serves no document at
/// all is treated as making no claims.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayInfo {
    /// Human-readable relay name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Relay demands payment before accepting events.
    #[serde(default)]
    pub payment_required: bool,

    /// Relay demands authentication before accepting events.
    #[serde(default)]
    pub auth_required: bool,

    /// Largest event content the relay accepts, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_content_length: Option<u64>,
}

impl RelayInfo {
    /// Whether the declared capabilities disqualify the relay for pad
    /// traffic. A missing document never disqualifies; only explicit
    /// claims do.
    pub fn unsuitable(&self, min_content_len: u64) -> bool {
        if self.payment_required || self.auth_required {
            return true;
        }
        match self.max_content_length {
            Some(max) => max < min_content_len,
            None => false,
        }
    }
}

/// A live, bidirectional connection to one relay.
#[async_trait]
pub trait RelaySocket: Send + Sync {
    /// Send one client frame.
    async fn send(&self, frame: ClientFrame) -> Result<(), SocketError>;

    /// Receive the next relay frame. Returns [`SocketError::Closed`] once
    /// the relay hangs up.
    async fn recv(&self) -> Result<RelayFrame, SocketError>;

    /// Whether the connection is still usable.
    fn is_open(&self) -> bool;

    /// Close the connection.
    async fn close(&self) -> Result<(), SocketError>;
}

/// Opens sockets and fetches capability documents.
#[async_trait]
pub trait RelayConnector: Send + Sync {
    /// The socket type this connector produces.
    type Socket: RelaySocket + 'static;

    /// Open a socket to the relay at `url`.
    async fn open(&self, url: &str) -> Result<Self::Socket, SocketError>;

    /// Fetch the relay's capability document. `None` when the relay does
    /// not serve one or the fetch fails; absence is not an error.
    async fn fetch_info(&self, url: &str) -> Option<RelayInfo>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_capability_document_makes_no_claims() {
        let info = RelayInfo::default();
        assert!(!info.unsuitable(16 * 1024));
    }

    #[test]
    fn payment_or_auth_disqualifies() {
        let paid = RelayInfo {
            payment_required: true,
            ..RelayInfo::default()
        };
        let gated = RelayInfo {
            auth_required: true,
            ..RelayInfo::default()
        };
        assert!(paid.unsuitable(16 * 1024));
        assert!(gated.unsuitable(16 * 1024));
    }

    #[test]
    fn small_content_limit_disqualifies() {
        let cramped = RelayInfo {
            max_content_length: Some(1024),
            ..RelayInfo::default()
        };
        let roomy = RelayInfo {
            max_content_length: Some(64 * 1024),
            ..RelayInfo::default()
        };
        assert!(cramped.unsuitable(16 * 1024));
        assert!(!roomy.unsuitable(16 * 1024));
    }

    #[test]
    fn info_parses_partial_documents() {
        let info: RelayInfo = serde_json::from_str(r#"{"name":"test relay"}"#)
            .expect("partial document should parse");
        assert_eq!(info.name.as_deref(), Some("test relay"));
        assert!(!info.payment_required);
        assert_eq!(info.max_content_length, None);
    }
}
