//! # Berth Server
//!
//! REST API over the orchestrators: create, update, destroy and inspect
//! projects and environments.

pub mod api;

pub use api::{router, AppState};

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
