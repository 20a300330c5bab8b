//! # pad-core
//!
//! Pure synchronization logic for driftpad. No I/O, no async runtime types;
//! every decision the sync engine makes is testable here in microseconds.
//!
//! - [`EditorFlow`] - The debounced publish state machine
//! - [`LwwRegister`] - Last-writer-wins content resolution
//! - [`RelayEndpoint`], [`RelaySelection`], [`rank`] - Relay ranking
//! - [`GenerationToken`] - Cancellation of stale in-flight work
//! - [`SecretSeed`] - The pad's signing-key seed

#![warn(missing_docs)]
#![warn(clippy::all)]

mod editor;
mod lww;
mod relay;
mod secret;
mod token;

pub use editor::{EditorAction, EditorFlow, Phase, SkipReason};
pub use lww::LwwRegister;
pub use relay::{
    normalize_url, rank, Provenance, RelayEndpoint, RelaySelection, SELECTION_TARGET,
};
pub use secret::SecretSeed;
pub use token::{Generation, GenerationToken};
