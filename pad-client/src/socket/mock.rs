//! In-memory relay network for tests.
//!
//! [`MockNetwork`] models a set of relays with stored events, live
//! subscriptions, capability documents, and injectable faults. Cloning a
//! network or a [`MockConnector`] shares the same state, so tests can
//! drive the relays from one handle while the client under test uses
//! another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pad_core::normalize_url;
use pad_types::{ClientFrame, Filter, RelayEvent, RelayFrame, SubId};

use super::{RelayConnector, RelayInfo, RelaySocket, SocketError};

/// A shared in-memory relay network.
#[derive(Clone, Default)]
pub struct MockNetwork {
    inner: Arc<Mutex<NetworkInner>>,
}

#[derive(Default)]
struct NetworkInner {
    relays: HashMap<String, RelayState>,
    next_socket: u64,
}

struct RelayState {
    online: bool,
    latency: Duration,
    info: Option<RelayInfo>,
    stored: Vec<RelayEvent>,
    sockets: HashMap<u64, mpsc::UnboundedSender<RelayFrame>>,
    subs: Vec<SubEntry>,
    open_count: u64,
    subscribe_count: u64,
    publish_count: u64,
    fail_next_publish: bool,
}

struct SubEntry {
    socket: u64,
    sub_id: SubId,
    filters: Vec<Filter>,
}

impl RelayState {
    fn new() -> Self {
        Self {
            online: true,
            latency: Duration::ZERO,
            info: None,
            stored: Vec::new(),
            sockets: HashMap::new(),
            subs: Vec::new(),
            open_count: 0,
            subscribe_count: 0,
            publish_count: 0,
            fail_next_publish: false,
        }
    }

    /// Store an event, honoring kind ranges: 20000-29999 is ephemeral
    /// (never stored), 10000-19999 and 30000-39999 replace any older
    /// event with the same author, kind, and `d` tag.
    fn store(&mut self, event: RelayEvent) {
        let kind = event.kind;
        if (20000..30000).contains(&kind) {
            return;
        }
        let replaceable = (10000..20000).contains(&kind) || (30000..40000).contains(&kind);
        if replaceable {
            let existing = self.stored.iter().position(|e| {
                e.kind == kind
                    && e.author == event.author
                    && e.tag_value("d") == event.tag_value("d")
            });
            if let Some(pos) = existing {
                if self.stored[pos].created_at_ms <= event.created_at_ms {
                    self.stored[pos] = event;
                }
                return;
            }
        }
        self.stored.push(event);
    }

    /// Events already stored that a fresh subscription should replay,
    /// newest first, honoring each filter's limit.
    fn replay(&self, filters: &[Filter]) -> Vec<RelayEvent> {
        let mut selected: Vec<RelayEvent> = Vec::new();
        for filter in filters {
            let mut matches: Vec<RelayEvent> = self
                .stored
                .iter()
                .filter(|e| filter.matches(e))
                .cloned()
                .collect();
            matches.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
            if let Some(limit) = filter.limit {
                matches.truncate(limit as usize);
            }
            for event in matches {
                if !selected.iter().any(|s| s.id == event.id) {
                    selected.push(event);
                }
            }
        }
        selected
    }

    /// Drop sockets whose receiving side is gone, along with their subs.
    fn prune_dead(&mut self) {
        let dead: Vec<u64> = self
            .sockets
            .iter()
            .filter(|(_, tx)| tx.is_closed())
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            self.sockets.remove(&id);
            self.subs.retain(|s| s.socket != id);
        }
    }
}

impl MockNetwork {
    /// Create an empty network with no relays.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring a relay online at `url`.
    pub fn add_relay(&self, url: &str) {
        let mut inner = self.lock();
        inner.relays.insert(normalize_url(url), RelayState::new());
    }

    /// Toggle a relay's reachability. Going offline severs every open
    /// socket on it.
    pub fn set_offline(&self, url: &str, offline: bool) {
        let mut inner = self.lock();
        if let Some(relay) = inner.relays.get_mut(&normalize_url(url)) {
            relay.online = !offline;
            if offline {
                relay.sockets.clear();
                relay.subs.clear();
            }
        }
    }

    /// Delay socket opens to this relay, simulating slow links.
    pub fn set_latency(&self, url: &str, latency: Duration) {
        let mut inner = self.lock();
        if let Some(relay) = inner.relays.get_mut(&normalize_url(url)) {
            relay.latency = latency;
        }
    }

    /// Serve a capability document for this relay.
    pub fn set_info(&self, url: &str, info: RelayInfo) {
        let mut inner = self.lock();
        if let Some(relay) = inner.relays.get_mut(&normalize_url(url)) {
            relay.info = Some(info);
        }
    }

    /// Inject an event directly into a relay's store, bypassing sockets.
    pub fn seed_event(&self, url: &str, event: RelayEvent) {
        let mut inner = self.lock();
        if let Some(relay) = inner.relays.get_mut(&normalize_url(url)) {
            relay.store(event);
        }
    }

    /// Make the next publish on this relay fail at the transport level.
    pub fn fail_next_publish(&self, url: &str) {
        let mut inner = self.lock();
        if let Some(relay) = inner.relays.get_mut(&normalize_url(url)) {
            relay.fail_next_publish = true;
        }
    }

    /// Events currently stored on a relay.
    pub fn stored_events(&self, url: &str) -> Vec<RelayEvent> {
        let inner = self.lock();
        inner
            .relays
            .get(&normalize_url(url))
            .map(|r| r.stored.clone())
            .unwrap_or_default()
    }

    /// How many sockets were opened to this relay.
    pub fn open_count(&self, url: &str) -> u64 {
        self.lock()
            .relays
            .get(&normalize_url(url))
            .map(|r| r.open_count)
            .unwrap_or(0)
    }

    /// How many subscription requests this relay handled.
    pub fn subscribe_count(&self, url: &str) -> u64 {
        self.lock()
            .relays
            .get(&normalize_url(url))
            .map(|r| r.subscribe_count)
            .unwrap_or(0)
    }

    /// How many publishes this relay handled.
    pub fn publish_count(&self, url: &str) -> u64 {
        self.lock()
            .relays
            .get(&normalize_url(url))
            .map(|r| r.publish_count)
            .unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NetworkInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn latency_of(&self, url: &str) -> Result<Duration, SocketError> {
        let inner = self.lock();
        match inner.relays.get(url) {
            Some(relay) if relay.online => Ok(relay.latency),
            Some(_) => Err(SocketError::ConnectFailed(format!("{url} is offline"))),
            None => Err(SocketError::ConnectFailed(format!("{url} is unreachable"))),
        }
    }

    fn info_of(&self, url: &str) -> Option<RelayInfo> {
        self.lock().relays.get(url).and_then(|r| r.info.clone())
    }

    fn attach(&self, url: &str) -> Result<MockSocket, SocketError> {
        let mut inner = self.lock();
        let id = inner.next_socket;
        inner.next_socket += 1;
        let relay = match inner.relays.get_mut(url) {
            Some(relay) if relay.online => relay,
            _ => return Err(SocketError::ConnectFailed(format!("{url} is unreachable"))),
        };
        let (tx, rx) = mpsc::unbounded_channel();
        relay.sockets.insert(id, tx);
        relay.open_count += 1;
        Ok(MockSocket {
            url: url.to_string(),
            id,
            network: self.clone(),
            open: AtomicBool::new(true),
            incoming: tokio::sync::Mutex::new(rx),
        })
    }

    fn handle_frame(&self, url: &str, socket: u64, frame: ClientFrame) -> Result<(), SocketError> {
        let mut inner = self.lock();
        let relay = match inner.relays.get_mut(url) {
            Some(relay) if relay.online && relay.sockets.contains_key(&socket) => relay,
            _ => return Err(SocketError::NotConnected),
        };
        match frame {
            ClientFrame::Publish(event) => {
                relay.publish_count += 1;
                if relay.fail_next_publish {
                    relay.fail_next_publish = false;
                    return Err(SocketError::SendFailed("injected publish failure".into()));
                }
                relay.prune_dead();
                let event_id = event.id;
                relay.store(event.clone());
                let deliveries: Vec<(u64, SubId)> = relay
                    .subs
                    .iter()
                    .filter(|sub| sub.filters.iter().any(|f| f.matches(&event)))
                    .map(|sub| (sub.socket, sub.sub_id.clone()))
                    .collect();
                for (target, sub_id) in deliveries {
                    if let Some(tx) = relay.sockets.get(&target) {
                        let _ = tx.send(RelayFrame::Event {
                            sub_id,
                            event: event.clone(),
                        });
                    }
                }
                if let Some(tx) = relay.sockets.get(&socket) {
                    let _ = tx.send(RelayFrame::Accepted {
                        event_id,
                        ok: true,
                        message: String::new(),
                    });
                }
            }
            ClientFrame::Subscribe { sub_id, filters } => {
                relay.subscribe_count += 1;
                let replay = relay.replay(&filters);
                if let Some(tx) = relay.sockets.get(&socket) {
                    for event in replay {
                        let _ = tx.send(RelayFrame::Event {
                            sub_id: sub_id.clone(),
                            event,
                        });
                    }
                    let _ = tx.send(RelayFrame::EndOfStored {
                        sub_id: sub_id.clone(),
                    });
                }
                relay.subs.push(SubEntry {
                    socket,
                    sub_id,
                    filters,
                });
            }
            ClientFrame::Unsubscribe { sub_id } => {
                relay
                    .subs
                    .retain(|s| !(s.socket == socket && s.sub_id == sub_id));
            }
        }
        Ok(())
    }

    fn detach(&self, url: &str, socket: u64) {
        let mut inner = self.lock();
        if let Some(relay) = inner.relays.get_mut(url) {
            relay.sockets.remove(&socket);
            relay.subs.retain(|s| s.socket != socket);
        }
    }
}

/// A socket attached to one relay in a [`MockNetwork`].
pub struct MockSocket {
    url: String,
    id: u64,
    network: MockNetwork,
    open: AtomicBool,
    incoming: tokio::sync::Mutex<mpsc::UnboundedReceiver<RelayFrame>>,
}

#[async_trait]
impl RelaySocket for MockSocket {
    async fn send(&self, frame: ClientFrame) -> Result<(), SocketError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(SocketError::NotConnected);
        }
        self.network.handle_frame(&self.url, self.id, frame)
    }

    async fn recv(&self) -> Result<RelayFrame, SocketError> {
        let mut incoming = self.incoming.lock().await;
        match incoming.recv().await {
            Some(frame) => Ok(frame),
            None => {
                self.open.store(false, Ordering::Release);
                Err(SocketError::Closed)
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    async fn close(&self) -> Result<(), SocketError> {
        self.open.store(false, Ordering::Release);
        self.network.detach(&self.url, self.id);
        Ok(())
    }
}

/// Connector producing sockets into a [`MockNetwork`].
#[derive(Clone)]
pub struct MockConnector {
    network: MockNetwork,
}

impl MockConnector {
    /// Attach a connector to an existing network.
    pub fn new(network: &MockNetwork) -> Self {
        Self {
            network: network.clone(),
        }
    }
}

#[async_trait]
impl RelayConnector for MockConnector {
    type Socket = MockSocket;

    async fn open(&self, url: &str) -> Result<MockSocket, SocketError> {
        let url = normalize_url(url);
        let latency = self.network.latency_of(&url)?;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.network.attach(&url)
    }

    async fn fetch_info(&self, url: &str) -> Option<RelayInfo> {
        self.network.info_of(&normalize_url(url))
    }
}
