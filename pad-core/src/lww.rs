//! Last-writer-wins register for pad content.
//!
//! Relays deliver events in whatever order they like, possibly duplicated
//! across the selection. The register keeps only the payload with the
//! greatest embedded client timestamp; everything else is discarded. The
//! timestamp comes from the writing client's wall clock, so cross-device
//! clock skew can misorder writes. That risk is accepted, not corrected.

/// Tracks the highest content timestamp seen for one pad.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LwwRegister {
    latest_ms: Option<u64>,
    text: Option<String>,
}

impl LwwRegister {
    /// An empty register that has seen nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a payload. Returns true and adopts it iff its timestamp
    /// strictly exceeds every timestamp seen so far; an equal timestamp
    /// loses.
    pub fn offer(&mut self, timestamp_ms: u64, text: &str) -> bool {
        match self.latest_ms {
            Some(latest) if timestamp_ms <= latest => false,
            _ => {
                self.latest_ms = Some(timestamp_ms);
                self.text = Some(text.to_string());
                true
            }
        }
    }

    /// Record our own publish so that echoes of it, and anything older,
    /// lose the race.
    pub fn record_published(&mut self, timestamp_ms: u64, text: &str) {
        if self.latest_ms.map_or(true, |latest| timestamp_ms > latest) {
            self.latest_ms = Some(timestamp_ms);
            self.text = Some(text.to_string());
        }
    }

    /// The highest timestamp seen, if any.
    pub fn latest_ms(&self) -> Option<u64> {
        self.latest_ms
    }

    /// The authoritative text, if any payload has been adopted.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }
}
