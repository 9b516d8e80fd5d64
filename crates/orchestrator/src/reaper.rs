//! Expiry reaper
//!
//! Preview environments carry a `ttl` tag: a wall-clock millisecond
//! timestamp after which they should stop existing. The reaper scans every
//! managed instance on a fixed interval, collects the expired PR
//! environments and drives the normal destroy path for each. One failed
//! teardown never stops the rest of the cycle.

use crate::environment::EnvironmentOrchestrator;
use berth_core::env::{EnvironmentId, ProjectId};
use berth_core::name::{self, TagKey};
use berth_core::Result;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Reaper loop configuration
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Time between scan cycles
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
        }
    }
}

/// The background expiry loop
pub struct Reaper;

impl Reaper {
    /// Spawn the loop. The returned handle owns the timer: dropping it or
    /// calling [`ReaperHandle::stop`] ends the loop. There is no process-wide
    /// reaper state; every `start` call is its own loop with its own handle.
    pub fn start(config: ReaperConfig, environments: EnvironmentOrchestrator) -> ReaperHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => {
                        debug!("reaper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match run_cycle(&environments).await {
                            Ok(0) => debug!("reaper cycle complete, nothing expired"),
                            Ok(reaped) => info!(reaped, "reaper cycle complete"),
                            Err(err) => warn!("reaper cycle failed: {err}"),
                        }
                    }
                }
            }
        });
        ReaperHandle {
            stop: Some(stop_tx),
            task,
        }
    }
}

/// Handle to a running reaper loop
pub struct ReaperHandle {
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Signal the loop to exit. Idempotent; a second call is a no-op.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Whether `stop` has already been called
    pub fn is_stopped(&self) -> bool {
        self.stop.is_none()
    }

    /// Stop and wait for the loop to wind down
    pub async fn shutdown(mut self) {
        self.stop();
        let _ = self.task.await;
    }
}

/// One scan-and-destroy pass, callable without the timer.
///
/// Only PR environments expire: an instance qualifies when it is not
/// terminated, carries a `pr` tag, and carries a numeric `ttl` strictly
/// below the current wall-clock time. Deployments and untagged environments
/// are immortal until explicitly destroyed.
pub async fn run_cycle(environments: &EnvironmentOrchestrator) -> Result<u32> {
    let instances = environments
        .provider()
        .instances()
        .describe(&name::marker_filter())
        .await?;
    let now = Utc::now().timestamp_millis();

    let mut expired: Vec<(ProjectId, EnvironmentId)> = Vec::new();
    for instance in &instances {
        if instance.state.is_terminal() {
            continue;
        }
        let tags = name::tag_map(&instance.tags);
        let Some(pid) = tags.get(&TagKey::Pid) else {
            continue;
        };
        let Some(pr) = tags.get(&TagKey::Pr) else {
            continue;
        };
        let Some(ttl) = tags.get(&TagKey::Ttl).and_then(|t| t.parse::<i64>().ok()) else {
            continue;
        };
        if ttl >= now {
            continue;
        }
        let Ok(pid) = ProjectId::new(pid.clone()) else {
            continue;
        };
        let Ok(pr) = pr.parse::<u32>() else {
            continue;
        };
        let key = (pid, EnvironmentId::Pr(pr));
        if !expired.contains(&key) {
            expired.push(key);
        }
    }

    let mut reaped = 0;
    for (pid, id) in expired {
        info!(%pid, %id, "reaping expired environment");
        match environments.destroy(&pid, &id).await {
            Ok(report) if report.is_clean() => reaped += 1,
            Ok(report) => {
                warn!(%pid, %id, failures = report.failures.len(), "reaped with failures, will retry next cycle");
            }
            Err(err) => warn!(%pid, %id, "failed to reap environment: {err}"),
        }
    }
    Ok(reaped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_cloud::LocalProvider;
    use berth_core::env::AppDefinition;
    use berth_utils::config::OrchestratorSettings;
    use std::sync::Arc;

    fn test_settings() -> OrchestratorSettings {
        OrchestratorSettings {
            retry_attempts: 2,
            retry_initial_delay_ms: 1,
            retry_multiplier: 1.0,
            poll_interval_ms: 1,
            poll_max_attempts: 10,
            ..OrchestratorSettings::default()
        }
    }

    fn orchestrator(provider: Arc<LocalProvider>) -> EnvironmentOrchestrator {
        EnvironmentOrchestrator::new(provider, test_settings(), "preview.example.com")
    }

    fn expired_app() -> AppDefinition {
        AppDefinition::new("nginx:latest", 80)
            .with_expires_at(Utc::now() - chrono::Duration::hours(1))
    }

    #[tokio::test]
    async fn test_cycle_reaps_only_expired_pr_environments() {
        let provider = Arc::new(LocalProvider::new());
        let environments = orchestrator(provider);
        let pid = ProjectId::new("demo").unwrap();

        environments
            .create(&pid, &EnvironmentId::Pr(1), &expired_app())
            .await
            .unwrap();
        environments
            .create(
                &pid,
                &EnvironmentId::Pr(2),
                &AppDefinition::new("nginx:latest", 80),
            )
            .await
            .unwrap();
        environments
            .create(
                &pid,
                &EnvironmentId::deployment("beta").unwrap(),
                &expired_app(),
            )
            .await
            .unwrap();

        let reaped = run_cycle(&environments).await.unwrap();
        assert_eq!(reaped, 1);

        assert!(!environments.exists(&pid, &EnvironmentId::Pr(1)).await.unwrap());
        assert!(environments.exists(&pid, &EnvironmentId::Pr(2)).await.unwrap());
        assert!(environments
            .exists(&pid, &EnvironmentId::deployment("beta").unwrap())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_handle_stop_is_idempotent() {
        let provider = Arc::new(LocalProvider::new());
        let environments = orchestrator(provider);

        let mut handle = Reaper::start(
            ReaperConfig {
                interval: Duration::from_millis(10),
            },
            environments,
        );
        assert!(!handle.is_stopped());
        handle.stop();
        assert!(handle.is_stopped());
        handle.stop();
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_started_loop_reaps_on_its_interval() {
        let provider = Arc::new(LocalProvider::new());
        let environments = orchestrator(provider);
        let pid = ProjectId::new("demo").unwrap();
        environments
            .create(&pid, &EnvironmentId::Pr(7), &expired_app())
            .await
            .unwrap();

        let handle = Reaper::start(
            ReaperConfig {
                interval: Duration::from_millis(5),
            },
            environments.clone(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        assert!(!environments.exists(&pid, &EnvironmentId::Pr(7)).await.unwrap());
    }
}
