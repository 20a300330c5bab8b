//! Cross-device session invalidation.
//!
//! Importing a pad's secret key on a new device publishes a signed,
//! ephemeral logout signal. Any device holding an editor session for that
//! pad treats a signal timestamped strictly after its own session start as
//! a takeover: it reports the signal so the caller can clear the vault and
//! downgrade the engine. A signal at or before the session start is
//! presumed to be the session's own import echo, or stale, and is ignored.
//!
//! The signal is ephemeral: relays fan it out to live subscribers but do
//! not store it, so only devices online at import time see it. Offline
//! devices keep a now-dead key; their writes simply lose last-writer-wins
//! from then on.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use pad_types::{Filter, PadId, RelayEvent, Tag, KIND_PAD_LOGOUT, LOGOUT_CONTENT};

use crate::identity::PadIdentity;
use crate::now_ms;
use crate::pool::{RelayPool, SubMessage};
use crate::socket::RelayConnector;

/// How long one relay may take to settle a logout publish.
const LOGOUT_TIMEOUT: Duration = Duration::from_secs(4);

/// How long the watcher may take to connect and subscribe to one relay.
const WATCH_TIMEOUT: Duration = Duration::from_secs(4);

/// A takeover observed on the relay network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogoutSignal {
    /// The pad whose sessions are invalidated.
    pub pad_id: PadId,
    /// When the new device imported the key.
    pub created_at_ms: u64,
}

/// Publish the logout signal that invalidates every other device's session
/// for this pad. Returns how many relays took it; zero is reported, not an
/// error, since delivery is inherently best effort.
pub async fn announce_takeover<C: RelayConnector>(
    pool: &RelayPool<C>,
    urls: &[String],
    identity: &PadIdentity,
) -> usize {
    let pad_id = identity.pad_id();
    let event = match RelayEvent::signed(
        KIND_PAD_LOGOUT,
        vec![Tag::pad(&pad_id)],
        LOGOUT_CONTENT.to_string(),
        now_ms(),
        identity.signing_key(),
    ) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(pad = %pad_id, error = %e, "failed to build logout signal");
            return 0;
        }
    };
    let sends = join_all(
        urls.iter()
            .map(|url| pool.publish_once(url, event.clone(), LOGOUT_TIMEOUT)),
    )
    .await;
    let delivered = sends.into_iter().filter(|sent| *sent).count();
    tracing::info!(
        pad = %pad_id,
        delivered,
        attempted = urls.len(),
        "published logout signal"
    );
    delivered
}

/// Watches the pad's relay set for a logout signal that supersedes the
/// local session.
pub struct InvalidationWatcher {
    rx: mpsc::Receiver<LogoutSignal>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl InvalidationWatcher {
    /// Start watching `urls` for logout signals on `pad_id` newer than the
    /// local session's start time.
    pub fn start<C: RelayConnector + 'static>(
        pool: Arc<RelayPool<C>>,
        urls: Vec<String>,
        pad_id: PadId,
        session_created_at_ms: u64,
    ) -> Self {
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let tasks = urls
            .into_iter()
            .map(|url| {
                tokio::spawn(watch_relay(
                    pool.clone(),
                    url,
                    pad_id,
                    session_created_at_ms,
                    tx.clone(),
                    shutdown_rx.clone(),
                ))
            })
            .collect();
        Self {
            rx,
            shutdown_tx,
            tasks,
        }
    }

    /// Wait until a newer session supersedes this one. Returns `None` when
    /// every relay watch has ended without a signal.
    pub async fn superseded(&mut self) -> Option<LogoutSignal> {
        self.rx.recv().await
    }

    /// Stop watching and release the relay connections.
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
    }
}

/// Watch one relay for a valid, strictly-newer logout signal. Sends at
/// most one signal, then ends.
async fn watch_relay<C: RelayConnector + 'static>(
    pool: Arc<RelayPool<C>>,
    url: String,
    pad_id: PadId,
    session_created_at_ms: u64,
    tx: mpsc::Sender<LogoutSignal>,
    mut shutdown: watch::Receiver<bool>,
) {
    let conn = match tokio::time::timeout(WATCH_TIMEOUT, pool.acquire(&url)).await {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => {
            tracing::debug!(url = %url, error = %e, "logout watch could not connect");
            return;
        }
        Err(_) => {
            tracing::debug!(url = %url, "logout watch connect timed out");
            return;
        }
    };
    let filter = Filter::new()
        .kind(KIND_PAD_LOGOUT)
        .pad_tag(&pad_id)
        .since_ms(session_created_at_ms);
    let mut sub = match conn.subscribe(vec![filter]).await {
        Ok(sub) => sub,
        Err(e) => {
            tracing::debug!(url = %url, error = %e, "logout watch subscribe failed");
            pool.release(&url).await;
            return;
        }
    };
    loop {
        tokio::select! {
            message = sub.next() => match message {
                Some(SubMessage::Event(event)) => {
                    if let Some(signal) = validate(&event, &pad_id, session_created_at_ms) {
                        let _ = tx.send(signal).await;
                        break;
                    }
                }
                Some(SubMessage::EndOfStored) => {}
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }
    sub.close().await;
    pool.release(&url).await;
}

/// Check a candidate logout event against the local session. The signer's
/// key must derive the pad id; the pad tag alone proves nothing.
fn validate(
    event: &RelayEvent,
    pad_id: &PadId,
    session_created_at_ms: u64,
) -> Option<LogoutSignal> {
    if event.kind != KIND_PAD_LOGOUT {
        return None;
    }
    if event.author_pad_id() != *pad_id {
        tracing::debug!(pad = %pad_id, "logout signal from a foreign key, ignored");
        return None;
    }
    if event.content != LOGOUT_CONTENT {
        tracing::debug!(pad = %pad_id, "logout signal with unexpected content, ignored");
        return None;
    }
    if !event.verify() {
        tracing::debug!(pad = %pad_id, "logout signal failed verification, ignored");
        return None;
    }
    if event.created_at_ms <= session_created_at_ms {
        // Our own import echo, or an older takeover we already survived.
        tracing::debug!(
            pad = %pad_id,
            signal_ms = event.created_at_ms,
            session_ms = session_created_at_ms,
            "logout signal not newer than this session, ignored"
        );
        return None;
    }
    Some(LogoutSignal {
        pad_id: *pad_id,
        created_at_ms: event.created_at_ms,
    })
}
