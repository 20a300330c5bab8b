//! Relay connection pool.
//!
//! The client keeps at most one connection per relay URL, shared by
//! probing, sync, and invalidation. A [`SharedConn`] multiplexes any
//! number of subscriptions over that one socket: a dispatcher task reads
//! frames and routes them to subscribers by subscription id. Connections
//! are reference counted and close when the last holder releases them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use pad_core::normalize_url;
use pad_types::{ClientFrame, Filter, RelayEvent, RelayFrame, SubId};

use crate::socket::{RelayConnector, RelaySocket, SocketError};

/// What a subscription yields.
#[derive(Debug, Clone)]
pub enum SubMessage {
    /// An event matching the subscription's filters.
    Event(RelayEvent),
    /// The relay finished replaying stored events; all further events
    /// are live.
    EndOfStored,
}

type SubRegistry = Arc<StdMutex<HashMap<SubId, mpsc::UnboundedSender<SubMessage>>>>;

/// One pooled connection to a relay, shared by all acquirers.
pub struct SharedConn<S: RelaySocket> {
    url: String,
    socket: Arc<S>,
    subs: SubRegistry,
    dispatcher: StdMutex<Option<JoinHandle<()>>>,
}

impl<S: RelaySocket + 'static> SharedConn<S> {
    fn start(url: String, socket: S) -> Self {
        let socket = Arc::new(socket);
        let subs: SubRegistry = Arc::new(StdMutex::new(HashMap::new()));
        let dispatcher = tokio::spawn(dispatch_loop(url.clone(), socket.clone(), subs.clone()));
        Self {
            url,
            socket,
            subs,
            dispatcher: StdMutex::new(Some(dispatcher)),
        }
    }

    /// The normalized relay URL this connection serves.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether the underlying socket is still usable.
    pub fn is_open(&self) -> bool {
        self.socket.is_open()
    }

    /// Publish one event on this connection.
    pub async fn publish(&self, event: RelayEvent) -> Result<(), SocketError> {
        self.socket.send(ClientFrame::Publish(event)).await
    }

    /// Open a subscription over this connection.
    pub async fn subscribe(&self, filters: Vec<Filter>) -> Result<Subscription<S>, SocketError> {
        let sub_id = SubId::fresh();
        let (tx, rx) = mpsc::unbounded_channel();
        lock_registry(&self.subs).insert(sub_id.clone(), tx);
        let frame = ClientFrame::Subscribe {
            sub_id: sub_id.clone(),
            filters,
        };
        if let Err(e) = self.socket.send(frame).await {
            lock_registry(&self.subs).remove(&sub_id);
            return Err(e);
        }
        Ok(Subscription {
            sub_id,
            rx,
            socket: self.socket.clone(),
            subs: self.subs.clone(),
        })
    }

    async fn shutdown(&self) {
        let handle = {
            let mut dispatcher = lock_dispatcher(&self.dispatcher);
            dispatcher.take()
        };
        if let Some(handle) = handle {
            handle.abort();
        }
        let _ = self.socket.close().await;
        lock_registry(&self.subs).clear();
    }
}

fn lock_registry(
    subs: &SubRegistry,
) -> std::sync::MutexGuard<'_, HashMap<SubId, mpsc::UnboundedSender<SubMessage>>> {
    subs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lock_dispatcher(
    dispatcher: &StdMutex<Option<JoinHandle<()>>>,
) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    dispatcher
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reads frames off one socket and routes them to subscribers.
async fn dispatch_loop<S: RelaySocket>(url: String, socket: Arc<S>, subs: SubRegistry) {
    loop {
        match socket.recv().await {
            Ok(RelayFrame::Event { sub_id, event }) => {
                let tx = lock_registry(&subs).get(&sub_id).cloned();
                if let Some(tx) = tx {
                    if tx.send(SubMessage::Event(event)).is_err() {
                        lock_registry(&subs).remove(&sub_id);
                    }
                }
            }
            Ok(RelayFrame::EndOfStored { sub_id }) => {
                let tx = lock_registry(&subs).get(&sub_id).cloned();
                if let Some(tx) = tx {
                    let _ = tx.send(SubMessage::EndOfStored);
                }
            }
            Ok(RelayFrame::Accepted {
                event_id,
                ok,
                message,
            }) => {
                if !ok {
                    tracing::debug!(url = %url, event_id = %event_id, message = %message, "relay rejected event");
                }
            }
            Ok(RelayFrame::Notice { message }) => {
                tracing::debug!(url = %url, message = %message, "relay notice");
            }
            Err(_) => break,
        }
    }
    // Connection gone. Dropping the senders wakes every subscriber.
    lock_registry(&subs).clear();
}

/// A live subscription on a [`SharedConn`].
pub struct Subscription<S: RelaySocket> {
    sub_id: SubId,
    rx: mpsc::UnboundedReceiver<SubMessage>,
    socket: Arc<S>,
    subs: SubRegistry,
}

impl<S: RelaySocket> Subscription<S> {
    /// The next message, or `None` once the subscription or connection
    /// is closed.
    pub async fn next(&mut self) -> Option<SubMessage> {
        self.rx.recv().await
    }

    /// Close the subscription, telling the relay to stop sending.
    pub async fn close(self) {
        lock_registry(&self.subs).remove(&self.sub_id);
        let frame = ClientFrame::Unsubscribe {
            sub_id: self.sub_id.clone(),
        };
        let _ = self.socket.send(frame).await;
    }
}

struct PoolEntry<S: RelaySocket> {
    conn: Arc<SharedConn<S>>,
    refs: usize,
}

/// Reference-counted registry of one connection per relay URL.
pub struct RelayPool<C: RelayConnector> {
    connector: C,
    conns: Mutex<HashMap<String, PoolEntry<C::Socket>>>,
}

impl<C: RelayConnector> RelayPool<C> {
    /// Create an empty pool over a connector.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            conns: Mutex::new(HashMap::new()),
        }
    }

    /// The connector, for capability fetches.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Acquire the shared connection for `url`, opening one if needed.
    /// Every successful acquire must be paired with a [`release`].
    ///
    /// [`release`]: RelayPool::release
    pub async fn acquire(&self, url: &str) -> Result<Arc<SharedConn<C::Socket>>, SocketError> {
        let url = normalize_url(url);
        {
            let mut conns = self.conns.lock().await;
            if let Some(entry) = conns.get_mut(&url) {
                if entry.conn.is_open() {
                    entry.refs += 1;
                    return Ok(entry.conn.clone());
                }
                conns.remove(&url);
            }
        }

        // Open outside the lock so slow relays do not serialize probes.
        let socket = self.connector.open(&url).await?;

        let mut conns = self.conns.lock().await;
        if let Some(entry) = conns.get_mut(&url) {
            if entry.conn.is_open() {
                // Lost the race to another acquirer; keep theirs.
                entry.refs += 1;
                let existing = entry.conn.clone();
                drop(conns);
                let _ = socket.close().await;
                return Ok(existing);
            }
            conns.remove(&url);
        }
        let conn = Arc::new(SharedConn::start(url.clone(), socket));
        conns.insert(
            url,
            PoolEntry {
                conn: conn.clone(),
                refs: 1,
            },
        );
        Ok(conn)
    }

    /// Drop one reference to `url`'s connection, closing it at zero.
    pub async fn release(&self, url: &str) {
        let url = normalize_url(url);
        let closing = {
            let mut conns = self.conns.lock().await;
            match conns.get_mut(&url) {
                Some(entry) => {
                    entry.refs = entry.refs.saturating_sub(1);
                    if entry.refs == 0 {
                        conns.remove(&url).map(|entry| entry.conn)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(conn) = closing {
            conn.shutdown().await;
        }
    }

    /// Acquire `url`, publish one event, and release. Returns whether the
    /// send went through; failures are logged, not propagated, since
    /// fan-out callers count deliveries rather than abort.
    pub async fn publish_once(
        &self,
        url: &str,
        event: RelayEvent,
        timeout: std::time::Duration,
    ) -> bool {
        let url = normalize_url(url);
        let conn = match tokio::time::timeout(timeout, self.acquire(&url)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "publish skipped, relay unreachable");
                return false;
            }
            Err(_) => {
                tracing::debug!(url = %url, "publish skipped, connect timed out");
                return false;
            }
        };
        let sent = match tokio::time::timeout(timeout, conn.publish(event)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::debug!(url = %url, error = %e, "publish failed");
                false
            }
            Err(_) => {
                tracing::debug!(url = %url, "publish timed out");
                false
            }
        };
        self.release(&url).await;
        sent
    }

    /// Close every connection regardless of reference counts.
    pub async fn shutdown(&self) {
        let drained: Vec<Arc<SharedConn<C::Socket>>> = {
            let mut conns = self.conns.lock().await;
            conns.drain().map(|(_, entry)| entry.conn).collect()
        };
        for conn in drained {
            conn.shutdown().await;
        }
    }

    /// Number of live pooled connections.
    pub async fn active(&self) -> usize {
        self.conns.lock().await.len()
    }

    /// Current reference count for a URL, zero if not pooled.
    pub async fn refs(&self, url: &str) -> usize {
        let conns = self.conns.lock().await;
        conns.get(&normalize_url(url)).map(|e| e.refs).unwrap_or(0)
    }
}
