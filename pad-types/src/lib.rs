//! # pad-types
//!
//! Wire format types for the driftpad relay sync protocol.
//!
//! This crate provides the foundational types used across all driftpad
//! crates:
//! - [`PadId`], [`ClientId`], [`EventId`], [`SubId`] - Identity types
//! - [`RelayEvent`], [`Tag`] - Signed events and their tags
//! - [`ClientFrame`], [`RelayFrame`], [`Filter`] - Socket frames
//! - [`PadPayload`] - Decrypted pad content
//! - [`WireError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod frames;
mod ids;
mod payload;

pub use error::WireError;
pub use event::{
    RelayEvent, Tag, APP_DISCRIMINATOR, KIND_PAD_CONTENT, KIND_PAD_LOGOUT, KIND_PAD_RELAYS,
    KIND_RELAY_DIRECTORY, KIND_RELAY_PREFS, LOGOUT_CONTENT,
};
pub use frames::{ClientFrame, Filter, RelayFrame};
pub use ids::{ClientId, EventId, PadId, SubId, PAD_ID_LEN, PAD_ID_PREFIX_LEN};
pub use payload::PadPayload;
