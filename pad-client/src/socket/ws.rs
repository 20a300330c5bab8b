//! WebSocket relay connector backed by tokio-tungstenite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use pad_types::{ClientFrame, RelayFrame};

use super::{RelayConnector, RelayInfo, RelaySocket, SocketError};

const INFO_FETCH_TIMEOUT: Duration = Duration::from_secs(3);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector that opens real WebSocket connections to relays.
#[derive(Clone, Default)]
pub struct WsConnector {
    http: reqwest::Client,
}

impl WsConnector {
    /// Create a connector with a fresh HTTP client for capability fetches.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RelayConnector for WsConnector {
    type Socket = WsSocket;

    async fn open(&self, url: &str) -> Result<WsSocket, SocketError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| SocketError::ConnectFailed(e.to_string()))?;
        let (sink, stream) = stream.split();
        Ok(WsSocket {
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
            open: AtomicBool::new(true),
        })
    }

    async fn fetch_info(&self, url: &str) -> Option<RelayInfo> {
        let http_url = ws_to_http(url)?;
        let response = self
            .http
            .get(&http_url)
            .header("Accept", "application/nostr+json")
            .timeout(INFO_FETCH_TIMEOUT)
            .send()
            .await
            .ok()?;
        response.json::<RelayInfo>().await.ok()
    }
}

/// Map a relay WebSocket URL to the HTTP URL serving its capability
/// document.
fn ws_to_http(url: &str) -> Option<String> {
    if let Some(rest) = url.strip_prefix("wss://") {
        Some(format!("https://{rest}"))
    } else {
        url.strip_prefix("ws://").map(|rest| format!("http://{rest}"))
    }
}

/// One live WebSocket connection to a relay.
pub struct WsSocket {
    sink: Mutex<SplitSink<WsStream, Message>>,
    stream: Mutex<SplitStream<WsStream>>,
    open: AtomicBool,
}

#[async_trait]
impl RelaySocket for WsSocket {
    async fn send(&self, frame: ClientFrame) -> Result<(), SocketError> {
        if !self.is_open() {
            return Err(SocketError::NotConnected);
        }
        let text = frame
            .to_text()
            .map_err(|e| SocketError::SendFailed(e.to_string()))?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text)).await.map_err(|e| {
            self.open.store(false, Ordering::Release);
            SocketError::SendFailed(e.to_string())
        })
    }

    async fn recv(&self) -> Result<RelayFrame, SocketError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => match RelayFrame::from_text(&text) {
                    Ok(frame) => return Ok(frame),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping malformed relay frame");
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    self.open.store(false, Ordering::Release);
                    return Err(SocketError::Closed);
                }
                Some(Ok(_)) => {
                    // Ping, pong, and binary frames carry nothing for us.
                }
                Some(Err(e)) => {
                    self.open.store(false, Ordering::Release);
                    return Err(SocketError::ReceiveFailed(e.to_string()));
                }
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<(), SocketError> {
        self.open.store(false, Ordering::Release);
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        Ok(())
    }
}
