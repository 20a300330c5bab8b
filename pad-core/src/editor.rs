//! Debounced publish state machine for the pad editor.
//!
//! This module provides a pure, side-effect-free state machine for the
//! writer's publish cycle. It takes editor and timer events as input and
//! produces a new state plus actions for pad-client to execute.
//!
//! The actual I/O (arming timers, publishing events) is performed by
//! pad-client, not by this module. This enables instant unit testing
//! without a relay network.

/// Phase of the publish cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Nothing pending; remote adoption is allowed.
    Idle,
    /// An edit is waiting for its debounce to elapse.
    PendingDebounce,
    /// A publish is in flight.
    Publishing,
}

/// Why a debounce firing did not publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The relay selection is empty or still resolving.
    RelaysNotReady,
    /// The text equals the last synced content.
    Unchanged,
    /// The text is empty and no content has ever loaded, so blank cannot
    /// be told apart from not-yet-loaded.
    EmptyBeforeFirstLoad,
}

/// Actions to be executed by pad-client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorAction {
    /// (Re)arm the debounce timer; any prior arm is superseded.
    ArmDebounce {
        /// Generation to echo back in the firing.
        generation: u64,
    },
    /// Publish this text to the selection.
    Publish {
        /// The full pad text.
        text: String,
    },
    /// The firing was swallowed by a guard.
    Skip {
        /// Which guard swallowed it.
        reason: SkipReason,
    },
}

/// Writer publish machine - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorFlow {
    phase: Phase,
    /// Text the editor currently shows.
    text: String,
    /// Text most recently published or adopted, None before first sync.
    last_synced: Option<String>,
    /// True once any content has been published or adopted.
    has_loaded: bool,
    /// True while the relay selection is resolved and non-empty.
    relays_ready: bool,
    /// Debounce generation; a firing carrying an older value is stale.
    generation: u64,
}

impl EditorFlow {
    /// A fresh machine with an empty editor and unresolved relays.
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            text: String::new(),
            last_synced: None,
            has_loaded: false,
            relays_ready: false,
            generation: 0,
        }
    }

    /// The user changed the editor text.
    ///
    /// Always supersedes any pending debounce: the returned arm carries a
    /// new generation and earlier firings become stale.
    pub fn on_edit(mut self, text: String) -> (Self, Vec<EditorAction>) {
        self.text = text;
        self.phase = Phase::PendingDebounce;
        self.generation += 1;
        let generation = self.generation;
        (self, vec![EditorAction::ArmDebounce { generation }])
    }

    /// The debounce timer fired.
    pub fn on_debounce_fired(mut self, generation: u64) -> (Self, Vec<EditorAction>) {
        if generation != self.generation || self.phase != Phase::PendingDebounce {
            return (self, vec![]);
        }
        if !self.relays_ready {
            // Stay pending; on_relays_ready re-arms.
            return (
                self,
                vec![EditorAction::Skip {
                    reason: SkipReason::RelaysNotReady,
                }],
            );
        }
        if Some(&self.text) == self.last_synced.as_ref() {
            self.phase = Phase::Idle;
            return (
                self,
                vec![EditorAction::Skip {
                    reason: SkipReason::Unchanged,
                }],
            );
        }
        if self.text.is_empty() && !self.has_loaded {
            self.phase = Phase::Idle;
            return (
                self,
                vec![EditorAction::Skip {
                    reason: SkipReason::EmptyBeforeFirstLoad,
                }],
            );
        }
        self.phase = Phase::Publishing;
        let text = self.text.clone();
        (self, vec![EditorAction::Publish { text }])
    }

    /// All per-relay publish attempts settled (partial delivery counts).
    pub fn on_publish_settled(mut self, text: String) -> (Self, Vec<EditorAction>) {
        self.last_synced = Some(text);
        self.has_loaded = true;
        if self.phase == Phase::Publishing {
            self.phase = Phase::Idle;
        }
        (self, vec![])
    }

    /// A remote payload won last-writer-wins and was adopted.
    ///
    /// Callers must check [`EditorFlow::is_mid_edit`] first; adoption while
    /// an edit is pending would clobber the user's typing.
    pub fn on_remote_adopted(mut self, text: String) -> (Self, Vec<EditorAction>) {
        self.text = text.clone();
        self.last_synced = Some(text);
        self.has_loaded = true;
        (self, vec![])
    }

    /// The relay selection resolved to a non-empty set.
    ///
    /// A pending edit that was blocked on relays gets a fresh arm.
    pub fn on_relays_ready(mut self) -> (Self, Vec<EditorAction>) {
        self.relays_ready = true;
        if self.phase == Phase::PendingDebounce {
            self.generation += 1;
            let generation = self.generation;
            return (self, vec![EditorAction::ArmDebounce { generation }]);
        }
        (self, vec![])
    }

    /// The relay selection was torn down or is being recomputed.
    pub fn on_relays_lost(mut self) -> (Self, Vec<EditorAction>) {
        self.relays_ready = false;
        (self, vec![])
    }

    /// Whether a local edit cycle is in progress. Remote payloads must not
    /// be adopted while this holds; local edits win until republished.
    pub fn is_mid_edit(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Current editor text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True once any content has been published or adopted.
    pub fn has_loaded(&self) -> bool {
        self.has_loaded
    }
}

impl Default for EditorFlow {
    fn default() -> Self {
        Self::new()
    }
}
