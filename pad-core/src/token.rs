//! Generation-counter cancellation tokens.
//!
//! Switching pads or recomputing the relay set must not let already-in-flight
//! work apply its results to the new context. A task captures the generation
//! when it starts; advancing the counter marks every outstanding capture
//! stale, and stale completions are dropped at the point of application.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The owning side of a cancellation scope.
#[derive(Debug, Clone, Default)]
pub struct GenerationToken {
    current: Arc<AtomicU64>,
}

impl GenerationToken {
    /// A new scope at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the current generation for a piece of in-flight work.
    pub fn capture(&self) -> Generation {
        Generation {
            current: Arc::clone(&self.current),
            value: self.current.load(Ordering::Acquire),
        }
    }

    /// Invalidate every outstanding capture.
    pub fn advance(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    /// The current generation number.
    pub fn value(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// A captured generation held by in-flight work.
#[derive(Debug, Clone)]
pub struct Generation {
    current: Arc<AtomicU64>,
    value: u64,
}

impl Generation {
    /// Whether the scope has moved on since this capture.
    pub fn is_stale(&self) -> bool {
        self.current.load(Ordering::Acquire) != self.value
    }

    /// The generation number captured.
    pub fn value(&self) -> u64 {
        self.value
    }
}
