//! The sync engine: debounced publishing and last-writer-wins adoption.
//!
//! One engine drives one pad. It runs as a single consumer task over a
//! message channel; edits, debounce firings, settled publishes, inbound
//! relay events, and shutdown all arrive as messages, so the state machine
//! never needs a lock. Observable changes fan out on a broadcast channel.
//!
//! A writer engine signs and publishes content; a viewer engine only
//! adopts. Either can be downgraded at runtime: a logout signal makes the
//! engine read-only for good, a same-device tab takeover pauses it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;

use pad_core::{EditorAction, EditorFlow, LwwRegister};
use pad_types::{
    ClientId, Filter, PadId, PadPayload, RelayEvent, Tag, APP_DISCRIMINATOR, KIND_PAD_CONTENT,
};

use crate::crypto::ContentKey;
use crate::error::ClientError;
use crate::identity::PadIdentity;
use crate::now_ms;
use crate::pool::{RelayPool, SubMessage};
use crate::socket::RelayConnector;

/// Pause between the last keystroke and the publish it triggers.
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// How long one relay may take to settle a publish attempt.
pub const PUBLISH_TIMEOUT: Duration = Duration::from_secs(4);

/// How long a reader may take to connect and subscribe to one relay.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(4);

/// Tunable engine timings. Tests shrink these; production uses defaults.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Debounce interval between an edit and its publish.
    pub debounce: Duration,
    /// Per-relay publish settle bound.
    pub publish_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: DEBOUNCE,
            publish_timeout: PUBLISH_TIMEOUT,
        }
    }
}

/// Observable engine state changes, broadcast to whoever listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A remote payload won last-writer-wins and is now the pad text.
    ContentAdopted {
        /// The adopted text.
        text: String,
        /// The payload's embedded client timestamp.
        timestamp_ms: u64,
    },
    /// A publish cycle settled across the whole selection.
    Published {
        /// The payload timestamp the publish carried.
        timestamp_ms: u64,
        /// Relays that took the event.
        delivered: usize,
        /// Relays attempted.
        attempted: usize,
    },
    /// A newer session took over; this engine is read-only from now on.
    Superseded,
    /// Another tab on this device took over; input is blocked.
    Paused,
}

enum EngineMsg {
    Edit { text: String },
    DebounceFired { generation: u64 },
    PublishSettled(Settled),
    Inbound(RelayEvent),
    Superseded,
    Pause,
    Shutdown,
}

struct Settled {
    text: String,
    timestamp_ms: u64,
    delivered: usize,
    attempted: usize,
}

enum Role {
    Writer {
        identity: PadIdentity,
        client_id: ClientId,
    },
    Viewer,
}

/// Handle to a running sync engine.
///
/// Dropping the handle shuts the engine down; [`SyncEngine::shutdown`] does
/// the same but waits for relay connections to be released.
pub struct SyncEngine {
    pad_id: PadId,
    writer: bool,
    blocked: Arc<AtomicBool>,
    msg_tx: mpsc::UnboundedSender<EngineMsg>,
    events_tx: broadcast::Sender<EngineEvent>,
    shutdown_tx: watch::Sender<bool>,
    task: StdMutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Start a writer engine: it holds the signing key and publishes edits
    /// to every relay in `urls`.
    pub fn writer<C: RelayConnector + 'static>(
        pool: Arc<RelayPool<C>>,
        urls: Vec<String>,
        identity: PadIdentity,
        config: EngineConfig,
    ) -> Self {
        let pad_id = identity.pad_id();
        let role = Role::Writer {
            client_id: ClientId::new(),
            identity,
        };
        Self::start(pool, urls, role, pad_id, config)
    }

    /// Start a viewer engine for a pad known only by its public id. It
    /// adopts content but cannot edit.
    pub fn viewer<C: RelayConnector + 'static>(
        pool: Arc<RelayPool<C>>,
        urls: Vec<String>,
        pad_id: PadId,
        config: EngineConfig,
    ) -> Self {
        Self::start(pool, urls, Role::Viewer, pad_id, config)
    }

    fn start<C: RelayConnector + 'static>(
        pool: Arc<RelayPool<C>>,
        urls: Vec<String>,
        role: Role,
        pad_id: PadId,
        config: EngineConfig,
    ) -> Self {
        let writer = matches!(role, Role::Writer { .. });
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let blocked = Arc::new(AtomicBool::new(false));

        // Writers can narrow server-side by author key; viewers subscribe
        // broadly by kind and discriminator and filter locally.
        let filter = match &role {
            Role::Writer { identity, .. } => Filter::new()
                .kind(KIND_PAD_CONTENT)
                .author(&identity.public_key())
                .d_tag(APP_DISCRIMINATOR),
            Role::Viewer => Filter::new()
                .kind(KIND_PAD_CONTENT)
                .d_tag(APP_DISCRIMINATOR),
        };
        let readers: Vec<JoinHandle<()>> = urls
            .iter()
            .map(|url| {
                tokio::spawn(read_relay(
                    pool.clone(),
                    url.clone(),
                    filter.clone(),
                    msg_tx.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();

        let mut flow = EditorFlow::new();
        if !urls.is_empty() {
            let (ready, _) = flow.on_relays_ready();
            flow = ready;
        }

        let state = EngineState {
            pool,
            urls,
            role,
            pad_id,
            content_key: ContentKey::derive(&pad_id),
            flow,
            lww: LwwRegister::new(),
            config,
            msg_tx: msg_tx.clone(),
            events_tx: events_tx.clone(),
            blocked: blocked.clone(),
        };
        let task = tokio::spawn(run_loop(state, msg_rx, readers));

        Self {
            pad_id,
            writer,
            blocked,
            msg_tx,
            events_tx,
            shutdown_tx,
            task: StdMutex::new(Some(task)),
        }
    }

    /// The pad this engine syncs.
    pub fn pad_id(&self) -> PadId {
        self.pad_id
    }

    /// Whether edits are currently refused: viewer mode, superseded, or
    /// paused by another tab.
    pub fn is_read_only(&self) -> bool {
        !self.writer || self.blocked.load(Ordering::Acquire)
    }

    /// Subscribe to engine state changes.
    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    /// Feed a local edit into the debounced publish cycle.
    pub fn edit(&self, text: String) -> Result<(), ClientError> {
        if self.is_read_only() {
            return Err(ClientError::ReadOnly);
        }
        self.msg_tx
            .send(EngineMsg::Edit { text })
            .map_err(|_| ClientError::Closed)
    }

    /// A newer session elsewhere invalidated this one. Irreversible;
    /// clearing the vault is the caller's job.
    pub fn superseded(&self) {
        let _ = self.msg_tx.send(EngineMsg::Superseded);
    }

    /// Another tab on this device took over editing. Input is blocked but
    /// the session stays intact.
    pub fn pause(&self) {
        let _ = self.msg_tx.send(EngineMsg::Pause);
    }

    /// Stop the engine and wait for its relay connections to be released.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.msg_tx.send(EngineMsg::Shutdown);
        let task = lock_task(&self.task).take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.msg_tx.send(EngineMsg::Shutdown);
    }
}

fn lock_task(
    task: &StdMutex<Option<JoinHandle<()>>>,
) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
    match task.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct EngineState<C: RelayConnector> {
    pool: Arc<RelayPool<C>>,
    urls: Vec<String>,
    role: Role,
    pad_id: PadId,
    content_key: ContentKey,
    flow: EditorFlow,
    lww: LwwRegister,
    config: EngineConfig,
    msg_tx: mpsc::UnboundedSender<EngineMsg>,
    events_tx: broadcast::Sender<EngineEvent>,
    blocked: Arc<AtomicBool>,
}

async fn run_loop<C: RelayConnector + 'static>(
    mut state: EngineState<C>,
    mut msg_rx: mpsc::UnboundedReceiver<EngineMsg>,
    readers: Vec<JoinHandle<()>>,
) {
    while let Some(msg) = msg_rx.recv().await {
        match msg {
            EngineMsg::Edit { text } => {
                // A downgrade may have landed after the edit was queued.
                if state.blocked.load(Ordering::Acquire) {
                    continue;
                }
                let (flow, actions) = std::mem::take(&mut state.flow).on_edit(text);
                state.flow = flow;
                state.apply(actions);
            }
            EngineMsg::DebounceFired { generation } => {
                let (flow, actions) = std::mem::take(&mut state.flow).on_debounce_fired(generation);
                state.flow = flow;
                state.apply(actions);
            }
            EngineMsg::PublishSettled(settled) => state.on_publish_settled(settled),
            EngineMsg::Inbound(event) => state.on_inbound(event),
            EngineMsg::Superseded => {
                state.blocked.store(true, Ordering::Release);
                tracing::info!(
                    pad = %state.pad_id,
                    "session superseded by a newer device, now read-only"
                );
                let _ = state.events_tx.send(EngineEvent::Superseded);
            }
            EngineMsg::Pause => {
                state.blocked.store(true, Ordering::Release);
                tracing::info!(pad = %state.pad_id, "another tab took over, input paused");
                let _ = state.events_tx.send(EngineEvent::Paused);
            }
            EngineMsg::Shutdown => break,
        }
    }
    // Readers exit on the shutdown watch; wait so their pool refs drop.
    for reader in readers {
        let _ = reader.await;
    }
}

impl<C: RelayConnector + 'static> EngineState<C> {
    fn apply(&mut self, actions: Vec<EditorAction>) {
        for action in actions {
            match action {
                EditorAction::ArmDebounce { generation } => {
                    let tx = self.msg_tx.clone();
                    let debounce = self.config.debounce;
                    tokio::spawn(async move {
                        tokio::time::sleep(debounce).await;
                        // Stale generations are dropped by the state machine.
                        let _ = tx.send(EngineMsg::DebounceFired { generation });
                    });
                }
                EditorAction::Publish { text } => self.start_publish(text),
                EditorAction::Skip { reason } => {
                    tracing::debug!(pad = %self.pad_id, ?reason, "publish skipped");
                }
            }
        }
    }

    fn start_publish(&mut self, text: String) {
        let Role::Writer {
            identity,
            client_id,
        } = &self.role
        else {
            return;
        };
        let timestamp_ms = now_ms();
        let payload = PadPayload::new(text.clone(), timestamp_ms);
        let content = match self.content_key.seal(&payload) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(pad = %self.pad_id, error = %e, "failed to seal pad content");
                return;
            }
        };
        let tags = vec![
            Tag::discriminator(APP_DISCRIMINATOR),
            Tag::client(client_id),
        ];
        let event = match RelayEvent::signed(
            KIND_PAD_CONTENT,
            tags,
            content,
            timestamp_ms,
            identity.signing_key(),
        ) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(pad = %self.pad_id, error = %e, "failed to sign content event");
                return;
            }
        };

        // Echoes of this publish, and anything older, lose the race from
        // this point on.
        self.lww.record_published(timestamp_ms, &text);

        let urls = self.urls.clone();
        let pool = self.pool.clone();
        let tx = self.msg_tx.clone();
        let timeout = self.config.publish_timeout;
        tokio::spawn(async move {
            let attempted = urls.len();
            let sends = join_all(
                urls.iter()
                    .map(|url| pool.publish_once(url, event.clone(), timeout)),
            )
            .await;
            let delivered = sends.into_iter().filter(|sent| *sent).count();
            let _ = tx.send(EngineMsg::PublishSettled(Settled {
                text,
                timestamp_ms,
                delivered,
                attempted,
            }));
        });
    }

    fn on_publish_settled(&mut self, settled: Settled) {
        if settled.delivered == 0 {
            tracing::warn!(
                pad = %self.pad_id,
                attempted = settled.attempted,
                "publish reached no relays"
            );
        } else {
            tracing::debug!(
                pad = %self.pad_id,
                delivered = settled.delivered,
                attempted = settled.attempted,
                "publish settled"
            );
        }
        let (flow, actions) = std::mem::take(&mut self.flow).on_publish_settled(settled.text);
        self.flow = flow;
        self.apply(actions);
        let _ = self.events_tx.send(EngineEvent::Published {
            timestamp_ms: settled.timestamp_ms,
            delivered: settled.delivered,
            attempted: settled.attempted,
        });
    }

    fn on_inbound(&mut self, event: RelayEvent) {
        if event.kind != KIND_PAD_CONTENT {
            return;
        }
        // Cheap fingerprint check before any signature work: the author
        // key must derive this pad's id.
        if event.author_pad_id() != self.pad_id {
            return;
        }
        if let Role::Writer { client_id, .. } = &self.role {
            let own = client_id.to_string();
            if event.tag_value("client") == Some(own.as_str()) {
                tracing::debug!(pad = %self.pad_id, "own event echoed back, ignored");
                return;
            }
        }
        if !event.verify() {
            tracing::debug!(pad = %self.pad_id, "content event failed verification, dropped");
            return;
        }
        let Some(payload) = self.content_key.open(&event.content) else {
            tracing::debug!(pad = %self.pad_id, "content event failed to decode, dropped");
            return;
        };
        if self.flow.is_mid_edit() {
            // Local edits win until the pending cycle republishes.
            tracing::debug!(pad = %self.pad_id, "remote content arrived mid-edit, dropped");
            return;
        }
        if !self.lww.offer(payload.timestamp_ms, &payload.text) {
            return;
        }
        let (flow, actions) = std::mem::take(&mut self.flow).on_remote_adopted(payload.text.clone());
        self.flow = flow;
        self.apply(actions);
        tracing::debug!(
            pad = %self.pad_id,
            timestamp_ms = payload.timestamp_ms,
            "adopted remote content"
        );
        let _ = self.events_tx.send(EngineEvent::ContentAdopted {
            text: payload.text,
            timestamp_ms: payload.timestamp_ms,
        });
    }
}

/// Subscribe to one relay and forward matching events into the engine
/// loop until shutdown.
async fn read_relay<C: RelayConnector + 'static>(
    pool: Arc<RelayPool<C>>,
    url: String,
    filter: Filter,
    tx: mpsc::UnboundedSender<EngineMsg>,
    mut shutdown: watch::Receiver<bool>,
) {
    let conn = match tokio::time::timeout(SUBSCRIBE_TIMEOUT, pool.acquire(&url)).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            tracing::debug!(url = %url, error = %e, "reader could not connect");
            return;
        }
        Err(_) => {
            tracing::debug!(url = %url, "reader connect timed out");
            return;
        }
    };
    let mut sub = match conn.subscribe(vec![filter]).await {
        Ok(sub) => sub,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "reader subscribe failed");
            pool.release(&url).await;
            return;
        }
    };
    loop {
        tokio::select! {
            message = sub.next() => match message {
                Some(SubMessage::Event(event)) => {
                    if tx.send(EngineMsg::Inbound(event)).is_err() {
                        break;
                    }
                }
                // Stored events are done; everything after is live.
                Some(SubMessage::EndOfStored) => {}
                None => {
                    tracing::debug!(url = %url, "reader subscription closed");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }
    sub.close().await;
    pool.release(&url).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::{MockConnector, MockNetwork};
    use pad_core::SecretSeed;

    const RELAY_A: &str = "wss://a.example";
    const RELAY_B: &str = "wss://b.example";

    fn test_identity(seed: u8) -> PadIdentity {
        PadIdentity::from_seed(&SecretSeed::from_bytes([seed; 32]), None)
            .expect("seed restores without an expected id")
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            debounce: Duration::from_millis(40),
            publish_timeout: Duration::from_secs(2),
        }
    }

    fn pool_on(network: &MockNetwork) -> Arc<RelayPool<MockConnector>> {
        Arc::new(RelayPool::new(MockConnector::new(network)))
    }

    /// A content event as another device of the same pad would publish it.
    fn remote_content(identity: &PadIdentity, text: &str, payload_ms: u64) -> RelayEvent {
        let key = ContentKey::derive(&identity.pad_id());
        let content = key
            .seal(&PadPayload::new(text.to_string(), payload_ms))
            .expect("seal should succeed");
        RelayEvent::signed(
            KIND_PAD_CONTENT,
            vec![
                Tag::discriminator(APP_DISCRIMINATOR),
                Tag::client(&ClientId::new()),
            ],
            content,
            payload_ms,
            identity.signing_key(),
        )
        .expect("signing should succeed")
    }

    fn decrypt_stored(network: &MockNetwork, url: &str, pad_id: &PadId) -> Vec<PadPayload> {
        let key = ContentKey::derive(pad_id);
        network
            .stored_events(url)
            .into_iter()
            .filter(|e| e.kind == KIND_PAD_CONTENT)
            .filter_map(|e| key.open(&e.content))
            .collect()
    }

    async fn recv_event(rx: &mut broadcast::Receiver<EngineEvent>) -> EngineEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("engine event within deadline")
            .expect("event channel open")
    }

    async fn wait_for_subscription(network: &MockNetwork, url: &str) {
        for _ in 0..200 {
            if network.subscribe_count(url) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no subscription appeared on {url}");
    }

    // ===== Debounced publishing =====

    #[tokio::test]
    async fn edit_publishes_after_debounce() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let identity = test_identity(1);
        let pad_id = identity.pad_id();
        let engine = SyncEngine::writer(
            pool_on(&network),
            vec![RELAY_A.to_string()],
            identity,
            fast_config(),
        );
        let mut events = engine.events();

        engine.edit("hello".to_string()).unwrap();

        match recv_event(&mut events).await {
            EngineEvent::Published {
                delivered,
                attempted,
                ..
            } => {
                assert_eq!(delivered, 1);
                assert_eq!(attempted, 1);
            }
            other => panic!("expected Published, got {other:?}"),
        }
        let payloads = decrypt_stored(&network, RELAY_A, &pad_id);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].text, "hello");
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn rapid_edits_collapse_into_one_publish() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let identity = test_identity(2);
        let pad_id = identity.pad_id();
        let engine = SyncEngine::writer(
            pool_on(&network),
            vec![RELAY_A.to_string()],
            identity,
            fast_config(),
        );
        let mut events = engine.events();

        engine.edit("hello".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.edit("hello world".to_string()).unwrap();

        recv_event(&mut events).await;
        assert_eq!(network.publish_count(RELAY_A), 1);
        let payloads = decrypt_stored(&network, RELAY_A, &pad_id);
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].text, "hello world");
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn unchanged_text_is_not_republished() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let engine = SyncEngine::writer(
            pool_on(&network),
            vec![RELAY_A.to_string()],
            test_identity(3),
            fast_config(),
        );
        let mut events = engine.events();

        engine.edit("same".to_string()).unwrap();
        recv_event(&mut events).await;

        engine.edit("same".to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(network.publish_count(RELAY_A), 1);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn empty_text_before_first_load_is_not_published() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let engine = SyncEngine::writer(
            pool_on(&network),
            vec![RELAY_A.to_string()],
            test_identity(4),
            fast_config(),
        );

        engine.edit(String::new()).unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(network.publish_count(RELAY_A), 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn publish_fans_out_and_accepts_partial_delivery() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        // RELAY_B never comes up.
        let engine = SyncEngine::writer(
            pool_on(&network),
            vec![RELAY_A.to_string(), RELAY_B.to_string()],
            test_identity(5),
            fast_config(),
        );
        let mut events = engine.events();

        engine.edit("partial".to_string()).unwrap();

        match recv_event(&mut events).await {
            EngineEvent::Published {
                delivered,
                attempted,
                ..
            } => {
                assert_eq!(delivered, 1);
                assert_eq!(attempted, 2);
            }
            other => panic!("expected Published, got {other:?}"),
        }
        engine.shutdown().await;
    }

    // ===== Adoption =====

    #[tokio::test]
    async fn viewer_adopts_newest_timestamp_regardless_of_arrival() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let identity = test_identity(6);
        let pool = pool_on(&network);
        let engine = SyncEngine::viewer(
            pool.clone(),
            vec![RELAY_A.to_string()],
            identity.pad_id(),
            fast_config(),
        );
        let mut events = engine.events();
        wait_for_subscription(&network, RELAY_A).await;

        // Newest first, then a stale one arrives late.
        let newer = remote_content(&identity, "newer", 2_000);
        let older = remote_content(&identity, "older", 1_500);
        assert!(pool.publish_once(RELAY_A, newer, PUBLISH_TIMEOUT).await);
        assert_eq!(
            recv_event(&mut events).await,
            EngineEvent::ContentAdopted {
                text: "newer".to_string(),
                timestamp_ms: 2_000,
            }
        );

        assert!(pool.publish_once(RELAY_A, older, PUBLISH_TIMEOUT).await);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn viewer_ignores_other_pads_content() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let ours = test_identity(7);
        let theirs = test_identity(8);
        network.seed_event(RELAY_A, remote_content(&theirs, "not ours", 3_000));

        let engine = SyncEngine::viewer(
            pool_on(&network),
            vec![RELAY_A.to_string()],
            ours.pad_id(),
            fast_config(),
        );
        let mut events = engine.events();
        wait_for_subscription(&network, RELAY_A).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn undecodable_content_is_discarded() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let identity = test_identity(9);
        let garbage = RelayEvent::signed(
            KIND_PAD_CONTENT,
            vec![
                Tag::discriminator(APP_DISCRIMINATOR),
                Tag::client(&ClientId::new()),
            ],
            "not even base64!!!".to_string(),
            1_000,
            identity.signing_key(),
        )
        .unwrap();
        network.seed_event(RELAY_A, garbage);

        let pool = pool_on(&network);
        let engine = SyncEngine::viewer(
            pool.clone(),
            vec![RELAY_A.to_string()],
            identity.pad_id(),
            fast_config(),
        );
        let mut events = engine.events();
        wait_for_subscription(&network, RELAY_A).await;

        // The garbage event is replayed and dropped; a valid one that
        // follows is adopted as usual.
        let valid = remote_content(&identity, "readable", 2_000);
        assert!(pool.publish_once(RELAY_A, valid, PUBLISH_TIMEOUT).await);
        assert_eq!(
            recv_event(&mut events).await,
            EngineEvent::ContentAdopted {
                text: "readable".to_string(),
                timestamp_ms: 2_000,
            }
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn writer_catches_up_from_stored_content() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let identity = test_identity(10);
        // A previous device published this before we started.
        network.seed_event(RELAY_A, remote_content(&identity, "from before", 5_000));

        let engine = SyncEngine::writer(
            pool_on(&network),
            vec![RELAY_A.to_string()],
            test_identity(10),
            fast_config(),
        );
        let mut events = engine.events();

        assert_eq!(
            recv_event(&mut events).await,
            EngineEvent::ContentAdopted {
                text: "from before".to_string(),
                timestamp_ms: 5_000,
            }
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn own_echo_is_not_readopted() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let engine = SyncEngine::writer(
            pool_on(&network),
            vec![RELAY_A.to_string()],
            test_identity(11),
            fast_config(),
        );
        let mut events = engine.events();
        wait_for_subscription(&network, RELAY_A).await;

        engine.edit("mine".to_string()).unwrap();
        recv_event(&mut events).await;

        // The relay fans our own event back to our subscription; it must
        // not come back as an adoption.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn mid_edit_blocks_remote_adoption() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let identity = test_identity(12);
        let pool = pool_on(&network);
        let engine = SyncEngine::writer(
            pool.clone(),
            vec![RELAY_A.to_string()],
            identity.clone(),
            EngineConfig {
                debounce: Duration::from_millis(200),
                publish_timeout: Duration::from_secs(2),
            },
        );
        let mut events = engine.events();
        wait_for_subscription(&network, RELAY_A).await;

        engine.edit("local typing".to_string()).unwrap();
        // A remote update lands while the debounce is still pending.
        let remote = remote_content(&identity, "remote clobber", now_ms() + 60_000);
        assert!(pool.publish_once(RELAY_A, remote, PUBLISH_TIMEOUT).await);

        // The local edit publishes; the remote payload was dropped, so no
        // adoption fires before the publish settles.
        match recv_event(&mut events).await {
            EngineEvent::Published { .. } => {}
            other => panic!("local edit should win, got {other:?}"),
        }
        engine.shutdown().await;
    }

    // ===== Downgrades =====

    #[tokio::test]
    async fn viewer_edits_are_rejected() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let engine = SyncEngine::viewer(
            pool_on(&network),
            vec![RELAY_A.to_string()],
            test_identity(13).pad_id(),
            fast_config(),
        );
        assert!(engine.is_read_only());
        assert!(matches!(
            engine.edit("nope".to_string()),
            Err(ClientError::ReadOnly)
        ));
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn superseded_engine_goes_read_only() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let engine = SyncEngine::writer(
            pool_on(&network),
            vec![RELAY_A.to_string()],
            test_identity(14),
            fast_config(),
        );
        let mut events = engine.events();
        assert!(!engine.is_read_only());

        engine.superseded();
        assert_eq!(recv_event(&mut events).await, EngineEvent::Superseded);
        assert!(engine.is_read_only());
        assert!(matches!(
            engine.edit("too late".to_string()),
            Err(ClientError::ReadOnly)
        ));
        assert_eq!(network.publish_count(RELAY_A), 0);
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn paused_engine_blocks_input() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let engine = SyncEngine::writer(
            pool_on(&network),
            vec![RELAY_A.to_string()],
            test_identity(15),
            fast_config(),
        );
        let mut events = engine.events();

        engine.pause();
        assert_eq!(recv_event(&mut events).await, EngineEvent::Paused);
        assert!(engine.is_read_only());
        assert!(matches!(
            engine.edit("blocked".to_string()),
            Err(ClientError::ReadOnly)
        ));
        engine.shutdown().await;
    }

    // ===== Lifecycle =====

    #[tokio::test]
    async fn shutdown_releases_relay_connections() {
        let network = MockNetwork::new();
        network.add_relay(RELAY_A);
        let pool = pool_on(&network);
        let engine = SyncEngine::writer(
            pool.clone(),
            vec![RELAY_A.to_string()],
            test_identity(16),
            fast_config(),
        );
        wait_for_subscription(&network, RELAY_A).await;
        assert_eq!(pool.refs(RELAY_A).await, 1);

        engine.shutdown().await;
        assert_eq!(pool.active().await, 0);
    }
}
