//! # Berth Utils
//!
//! Shared configuration loading and logging setup for Berth.

pub mod config;
pub mod logging;

pub use config::Config;

/// Utils version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
