//! # Berth Orchestrator
//!
//! The resource lifecycle core: project scaffolding with discover-or-create
//! semantics, the PR/deployment environment state machine, readiness and
//! zero-downtime rotation helpers, and the expiry reaper. All provider state
//! is read live through tag scans on every entry point; there is no local
//! cache or store.

pub mod environment;
pub mod project;
pub mod readiness;
pub mod reaper;
pub mod rotation;

pub use environment::{DestroyReport, EnvironmentOrchestrator};
pub use project::{ProjectHandle, ProjectOrchestrator};
pub use reaper::{Reaper, ReaperConfig, ReaperHandle};

use berth_core::retry::RetryPolicy;
use berth_utils::config::OrchestratorSettings;
use std::time::Duration;

/// Retry envelope for one provider mutation, from the configured budgets
pub(crate) fn mutation_policy(settings: &OrchestratorSettings, label: &str) -> RetryPolicy {
    RetryPolicy::new(label)
        .with_attempts(settings.retry_attempts)
        .with_initial_delay(Duration::from_millis(settings.retry_initial_delay_ms))
        .with_multiplier(settings.retry_multiplier)
}

/// Orchestrator version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
