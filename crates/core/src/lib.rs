//! # Berth Core
//!
//! Core types and orchestration primitives for Berth: the error taxonomy,
//! the resource-name codec, and the retry/poll executors every provider
//! mutation goes through.

pub mod env;
pub mod error;
pub mod name;
pub mod retry;

pub use env::{AppDefinition, EnvironmentDescription, EnvironmentId, ProjectDescription, ProjectId};
pub use error::{Error, Result};
pub use name::{TagFilter, TagKey};
pub use retry::{retry, retry_with, wait_for, RetryPolicy};

/// Core version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
