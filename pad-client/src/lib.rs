//! # pad-client
//!
//! Client library for driftpad: sync one encrypted text pad over open
//! relays that anyone can run and nobody has to trust.
//!
//! The pieces, bottom to top:
//!
//! - **Transport**: [`RelaySocket`]/[`RelayConnector`] abstract the wire,
//!   with a real WebSocket implementation and an in-process mock network
//! - **Pool**: [`RelayPool`] refcounts one shared connection per relay and
//!   multiplexes subscriptions over it
//! - **Probing**: [`probe`] measures reachability and latency, and screens
//!   out relays that demand payment or auth
//! - **Selection**: [`RelaySelector`] picks the pad's working relay set
//!   from bootstrap health, network discovery, and a local cache
//! - **Vault**: [`SessionVault`] keeps the signing key encrypted at rest
//!   behind a [`KeyStore`]
//! - **Engine**: [`SyncEngine`] debounces edits, publishes signed encrypted
//!   content, and resolves concurrent writes last-writer-wins
//! - **Invalidation**: [`announce_takeover`] and [`InvalidationWatcher`]
//!   retire older devices when the key moves; [`TabBus`] arbitrates
//!   writers inside one process
//!
//! ## Example
//!
//! ```ignore
//! use pad_client::{PadIdentity, RelayPool, RelaySelector, SyncEngine, WsConnector};
//!
//! let identity = PadIdentity::generate();
//! let selection = selector.select_for_writer(&identity).await;
//! let engine = SyncEngine::writer(pool, selection.urls(), identity, config);
//!
//! engine.edit("hello".to_string())?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod identity;
pub mod invalidate;
pub mod pool;
pub mod probe;
pub mod select;
pub mod socket;
pub mod store;
pub mod vault;

pub use bus::{should_pause, TabAnnounce, TabBus};
pub use crypto::ContentKey;
pub use engine::{EngineConfig, EngineEvent, SyncEngine, DEBOUNCE, PUBLISH_TIMEOUT};
pub use error::ClientError;
pub use identity::PadIdentity;
pub use invalidate::{announce_takeover, InvalidationWatcher, LogoutSignal};
pub use pool::{RelayPool, SharedConn, SubMessage, Subscription};
pub use probe::{probe, probe_screened, probe_with_timeout, ProbeOutcome, PROBE_TIMEOUT};
pub use select::{RelaySelector, BOOTSTRAP_QUORUM, CACHE_TTL, CANDIDATE_POOL_CAP};
pub use socket::{
    MockConnector, MockNetwork, RelayConnector, RelayInfo, RelaySocket, SocketError, WsConnector,
};
pub use store::LocalStore;
pub use vault::{KeyHandle, KeyStore, SessionRecord, SessionVault, SoftKeyStore};

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Event timestamps come from here; last-writer-wins tolerates skewed
/// clocks, so a coarse reading is fine.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
