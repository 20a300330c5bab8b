//! CLI command implementations.

pub mod create;
pub mod edit;
pub mod import;
pub mod logout;
pub mod show;
pub mod status;
