//! End-to-end lifecycle tests against the in-memory provider

use berth_cloud::provider::Clusters;
use berth_cloud::LocalProvider;
use berth_core::env::{AppDefinition, EnvironmentId, ProjectId};
use berth_orchestrator::{reaper, EnvironmentOrchestrator};
use berth_utils::config::OrchestratorSettings;
use chrono::Utc;
use std::sync::Arc;

fn test_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        retry_attempts: 2,
        retry_initial_delay_ms: 1,
        retry_multiplier: 1.0,
        poll_interval_ms: 1,
        poll_max_attempts: 20,
        ..OrchestratorSettings::default()
    }
}

fn orchestrator(provider: Arc<LocalProvider>) -> EnvironmentOrchestrator {
    EnvironmentOrchestrator::new(provider, test_settings(), "preview.example.com")
}

#[tokio::test]
async fn full_lifecycle_create_update_destroy() {
    let provider = Arc::new(LocalProvider::with_boot_polls(2));
    let environments = orchestrator(provider.clone());
    let pid = ProjectId::new("demo").unwrap();
    let id = EnvironmentId::Pr(5);

    // create: project scaffolding comes up with the environment
    let app = AppDefinition::new("registry/demo:abc123", 8080).with_sha("abc123");
    let description = environments.create(&pid, &id, &app).await.unwrap();
    assert!(description.ready);
    assert_eq!(description.cluster, "berth-pid-demo--pr-5");
    assert_eq!(
        description.dns_name.as_deref(),
        Some("demo-pr-5.preview.example.com")
    );
    assert!(description.public_ip.is_some());

    let project = environments.projects().describe(&pid).await.unwrap();
    assert!(project.subnet_id.is_some());
    assert_eq!(project.environments, vec![id.clone()]);

    // the project cannot be destroyed while the environment is open
    let err = environments.projects().destroy(&pid).await.unwrap_err();
    assert!(matches!(err, berth_core::Error::Conflict(_)));

    // update rotates into the alternate slot and drains the old one
    let updated = environments
        .update(&pid, &id, &app.clone().with_sha("def456"))
        .await
        .unwrap();
    assert!(updated.ready);
    assert_eq!(updated.cluster, "berth-pid-demo--pr-5-alt");
    assert!(provider.get("berth-pid-demo--pr-5").await.unwrap().is_none());

    // a second rotation swaps back to the primary name
    let again = environments.update(&pid, &id, &app).await.unwrap();
    assert_eq!(again.cluster, "berth-pid-demo--pr-5");

    // destroy is clean and the project can now be torn down
    let report = environments.destroy(&pid, &id).await.unwrap();
    assert!(report.is_clean(), "unexpected failures: {:?}", report.failures);
    assert!(!environments.exists(&pid, &id).await.unwrap());
    environments.projects().destroy(&pid).await.unwrap();
}

#[tokio::test]
async fn create_routes_to_update_when_already_present() {
    let provider = Arc::new(LocalProvider::new());
    let environments = orchestrator(provider);
    let pid = ProjectId::new("demo").unwrap();
    let id = EnvironmentId::deployment("beta").unwrap();

    let app = AppDefinition::new("registry/demo:v1", 80);
    let first = environments.create(&pid, &id, &app).await.unwrap();
    assert_eq!(first.cluster, "berth-pid-demo--deployment-beta");

    // same identity again: no recreation, the rotation machinery runs
    let second = environments.create(&pid, &id, &app).await.unwrap();
    assert_eq!(second.cluster, "berth-pid-demo--deployment-beta-alt");
}

#[tokio::test]
async fn destroy_keeps_going_past_step_failures() {
    let provider = Arc::new(LocalProvider::new());
    let environments = orchestrator(provider.clone());
    let pid = ProjectId::new("demo").unwrap();
    let id = EnvironmentId::Pr(9);

    environments
        .create(&pid, &id, &AppDefinition::new("registry/demo:v1", 80))
        .await
        .unwrap();

    // Exhaust the DNS removal retry budget; everything after it must still run
    provider.inject_failure("dns.destroy", 2).await;
    let report = environments.destroy(&pid, &id).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].step, "dns.destroy");
    assert!(!environments.exists(&pid, &id).await.unwrap());
}

#[tokio::test]
async fn reaper_cycle_isolates_per_environment_failures() {
    let provider = Arc::new(LocalProvider::new());
    let environments = orchestrator(provider.clone());
    let pid = ProjectId::new("demo").unwrap();

    let expired = AppDefinition::new("registry/demo:v1", 80)
        .with_expires_at(Utc::now() - chrono::Duration::hours(1));
    environments
        .create(&pid, &EnvironmentId::Pr(1), &expired)
        .await
        .unwrap();
    environments
        .create(&pid, &EnvironmentId::Pr(2), &expired)
        .await
        .unwrap();

    // The first environment's instance termination will exhaust its budget
    provider.inject_failure("instance.destroy", 2).await;

    let reaped = reaper::run_cycle(&environments).await.unwrap();
    assert_eq!(reaped, 1);

    // the second environment went down even though the first one's teardown failed
    assert!(environments.exists(&pid, &EnvironmentId::Pr(1)).await.unwrap());
    assert!(!environments.exists(&pid, &EnvironmentId::Pr(2)).await.unwrap());

    // a later cycle reconciles the survivor
    let reaped = reaper::run_cycle(&environments).await.unwrap();
    assert_eq!(reaped, 1);
    assert!(!environments.exists(&pid, &EnvironmentId::Pr(1)).await.unwrap());
}
