//! Same-device tab arbitration.
//!
//! Two tabs on one device can hold editor sessions for the same pad. That
//! is not a genuine multi-device takeover, so it never goes through the
//! network logout signal: the newer tab announces itself on a device-local
//! broadcast and the older tab pauses input, keeping its session intact.
//!
//! The bus is handed through context, one per device scope. Tests create
//! as many scopes as they need; nothing here is a process-wide global.

use tokio::sync::broadcast;

use pad_types::{ClientId, PadId};

/// A takeover announcement from a tab opening an editor session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabAnnounce {
    /// The pad the announcing tab is editing.
    pub pad_id: PadId,
    /// The announcing tab.
    pub tab: ClientId,
    /// When the announcing tab's editor session started.
    pub started_at_ms: u64,
}

impl TabAnnounce {
    /// Build an announcement for a tab's editor session.
    pub fn new(pad_id: PadId, tab: ClientId, started_at_ms: u64) -> Self {
        Self {
            pad_id,
            tab,
            started_at_ms,
        }
    }
}

/// Device-local broadcast connecting every tab in one device scope.
#[derive(Debug, Clone)]
pub struct TabBus {
    tx: broadcast::Sender<TabAnnounce>,
}

impl TabBus {
    /// A fresh bus with no listeners.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Announce this tab's editor session to every listening tab.
    pub fn announce(&self, announce: TabAnnounce) {
        let _ = self.tx.send(announce);
    }

    /// Listen for announcements from other tabs. Only announcements made
    /// after this call are delivered.
    pub fn listen(&self) -> broadcast::Receiver<TabAnnounce> {
        self.tx.subscribe()
    }
}

impl Default for TabBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `ours` must pause input after hearing `theirs` announce.
///
/// Only a different tab editing the same pad competes. The older session
/// yields: strictly smaller start time, with the tab id breaking exact
/// ties so exactly one side pauses.
pub fn should_pause(ours: &TabAnnounce, theirs: &TabAnnounce) -> bool {
    if ours.pad_id != theirs.pad_id || ours.tab == theirs.tab {
        return false;
    }
    match ours.started_at_ms.cmp(&theirs.started_at_ms) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Equal => ours.tab.to_string() < theirs.tab.to_string(),
        std::cmp::Ordering::Greater => false,
    }
}
