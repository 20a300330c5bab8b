//! Shared command context: data directory, bootstrap relays, transport.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use pad_client::{
    LocalStore, MockConnector, MockNetwork, RelayPool, SessionVault, SoftKeyStore, WsConnector,
};
use pad_core::{Provenance, RelaySelection};

/// Relays every client falls back to when nothing better is known.
pub const DEFAULT_BOOTSTRAP: &[&str] = &[
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.primal.net",
];

/// Everything a command needs besides its own arguments.
pub struct CliContext {
    /// Where the vault and relay cache live.
    pub data_dir: PathBuf,
    /// Bootstrap relay set after applying `--relay` overrides.
    pub bootstrap: Vec<String>,
    /// Use the in-process relay network instead of real sockets.
    pub mock: bool,
}

impl CliContext {
    /// Resolve global flags into a context.
    pub fn new(data_dir: PathBuf, relays: Vec<String>, mock: bool) -> Self {
        let bootstrap = if relays.is_empty() {
            DEFAULT_BOOTSTRAP.iter().map(|s| s.to_string()).collect()
        } else {
            relays
        };
        Self {
            data_dir,
            bootstrap,
            mock,
        }
    }

    /// Open the local store under the data directory.
    pub async fn store(&self) -> Result<Arc<LocalStore>> {
        Ok(Arc::new(LocalStore::open(self.data_dir.clone()).await?))
    }

    /// Open the session vault over an already-open store.
    pub async fn vault(&self, store: Arc<LocalStore>) -> Result<SessionVault<SoftKeyStore>> {
        let keystore = SoftKeyStore::load(store.clone()).await?;
        Ok(SessionVault::new(store, keystore))
    }

    /// An in-process relay network with every bootstrap relay up.
    ///
    /// The network lives only as long as this process, so `--mock` exercises
    /// the full pipeline without anything crossing a real socket.
    pub fn mock_pool(&self) -> Arc<RelayPool<MockConnector>> {
        let network = MockNetwork::new();
        for url in &self.bootstrap {
            network.add_relay(url);
        }
        Arc::new(RelayPool::new(MockConnector::new(&network)))
    }

    /// A pool over real WebSocket relays.
    pub fn ws_pool(&self) -> Arc<RelayPool<WsConnector>> {
        Arc::new(RelayPool::new(WsConnector::new()))
    }
}

/// One-line summary of a relay selection for command output.
pub fn relay_summary(selection: &RelaySelection) -> String {
    let label = match selection.provenance {
        Provenance::Bootstrap => "bootstrap",
        Provenance::Discovered => "discovered",
        Provenance::Cached => "cached",
    };
    format!("{} relay(s), {label}", selection.len())
}
