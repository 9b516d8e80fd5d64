//! PR / deployment environment orchestrator
//!
//! One environment is a firewall rule-set, a container cluster, a fleet of
//! instances, a container service, a DNS record and optionally a load
//! balancer, all discovered by tags and named by the codec. Create is
//! sequenced and aborts on the first failure; destroy is the opposite: a
//! list of independently-caught steps that always runs to the end, so a
//! half-destroyed environment can never block its own cleanup.

use crate::project::{ProjectHandle, ProjectOrchestrator};
use crate::readiness;
use crate::rotation::{select_rotation_slot, Slot, SlotProbe};
use crate::mutation_policy;
use berth_cloud::model::{
    ClusterSpec, DnsRecordSpec, FirewallSpec, InstanceState, InstanceSpec, LoadBalancerSpec,
    ParameterSpec, ServiceSpec,
};
use berth_cloud::CloudProvider;
use berth_core::env::{self, AppDefinition, EnvironmentDescription, EnvironmentId, ProjectId};
use berth_core::error::not_found;
use berth_core::name::TagKey;
use berth_core::retry::{retry, wait_for};
use berth_core::{name, Result};
use berth_utils::config::OrchestratorSettings;
use chrono::TimeZone;
use futures::future::BoxFuture;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tag recording which cluster an instance was launched for
const CLUSTER_TAG: &str = "cluster";

/// One teardown step that failed; the rest of the teardown still ran
#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub step: String,
    pub message: String,
}

/// Outcome of a best-effort teardown
#[derive(Debug, Default, Clone, Serialize)]
pub struct DestroyReport {
    pub failures: Vec<StepFailure>,
}

impl DestroyReport {
    /// Whether every step succeeded
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Full lifecycle orchestration for PR and deployment environments
#[derive(Clone)]
pub struct EnvironmentOrchestrator {
    provider: Arc<dyn CloudProvider>,
    projects: ProjectOrchestrator,
    settings: OrchestratorSettings,
    domain: String,
}

impl EnvironmentOrchestrator {
    /// Create a new environment orchestrator
    pub fn new(
        provider: Arc<dyn CloudProvider>,
        settings: OrchestratorSettings,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            projects: ProjectOrchestrator::new(provider.clone(), settings.clone()),
            provider,
            settings,
            domain: domain.into(),
        }
    }

    /// The project orchestrator this environment orchestrator ensures through
    pub fn projects(&self) -> &ProjectOrchestrator {
        &self.projects
    }

    /// The underlying provider
    pub fn provider(&self) -> &Arc<dyn CloudProvider> {
        &self.provider
    }

    /// DNS name an environment is published under
    pub fn dns_name(&self, pid: &ProjectId, id: &EnvironmentId) -> String {
        format!("{}-{}.{}", pid, id, self.domain)
    }

    /// Stand up an environment, or route to [`update`](Self::update) when it
    /// already exists.
    ///
    /// The existence check is a live tag scan and is racy by design: two
    /// concurrent creates for the same identity can both pass it and both
    /// provision. There is no distributed lock here; the duplicate is rare
    /// and reconciled by the next destroy.
    pub async fn create(
        &self,
        pid: &ProjectId,
        id: &EnvironmentId,
        app: &AppDefinition,
    ) -> Result<EnvironmentDescription> {
        app.validate()?;
        let project = self.projects.ensure(pid).await?;

        if self.exists(pid, id).await? {
            info!(%pid, %id, "environment already exists, updating instead");
            return self.update(pid, id, app).await;
        }

        self.provision(&project, pid, id, app).await
    }

    /// Whether any live trace of the environment exists
    pub async fn exists(&self, pid: &ProjectId, id: &EnvironmentId) -> Result<bool> {
        let instances = self
            .provider
            .instances()
            .describe(&env::environment_filter(pid, id))
            .await?;
        if instances.iter().any(|i| !i.state.is_terminal()) {
            return Ok(true);
        }

        let base = env::environment_name(pid, id);
        if self.provider.clusters().get(&base).await?.is_some() {
            return Ok(true);
        }
        Ok(self
            .provider
            .clusters()
            .get(&Slot::Alternate.cluster_name(&base))
            .await?
            .is_some())
    }

    /// Fresh provisioning of an absent environment
    async fn provision(
        &self,
        project: &ProjectHandle,
        pid: &ProjectId,
        id: &EnvironmentId,
        app: &AppDefinition,
    ) -> Result<EnvironmentDescription> {
        info!(%pid, %id, image = %app.image, "creating environment");
        let tags = env::standard_tags(pid, Some(id), Some(app));
        let base = env::environment_name(pid, id);

        // Independent siblings: the firewall rule-set and the cluster don't
        // need each other, so they are issued concurrently and joined.
        let mut open_ports = self.settings.open_ports.clone();
        if !open_ports.contains(&app.container_port) {
            open_ports.push(app.container_port);
        }
        let firewall_spec = FirewallSpec {
            name: base.clone(),
            network_id: Some(project.network.id.clone()),
            open_ports,
            tags: tags.clone(),
        };
        let cluster_spec = ClusterSpec {
            name: base.clone(),
            tags: tags.clone(),
        };
        let (firewall, cluster) = tokio::try_join!(
            retry(mutation_policy(&self.settings, "firewall.create"), || {
                self.provider.firewalls().create(firewall_spec.clone())
            }),
            retry(mutation_policy(&self.settings, "cluster.create"), || {
                self.provider.clusters().create(cluster_spec.clone())
            }),
        )?;

        let instances = self
            .launch_instances(project, app, &base, &cluster.name, &firewall.id, &tags)
            .await?;
        debug!(count = instances.len(), "instances requested");

        self.wait_cluster_instances(pid, id, &cluster.name, InstanceState::Running)
            .await?;

        let public_ip = self.first_public_ip(pid, id).await;
        let published = self
            .publish(pid, id, app, project, &base, public_ip.as_deref())
            .await;
        debug!(?published, "environment published");

        let service_spec = self.service_spec(&base, &cluster.name, app, &tags);
        retry(mutation_policy(&self.settings, "service.create"), || {
            self.provider.services().create(service_spec.clone())
        })
        .await?;

        self.stash_app_definition(&base, app).await?;

        info!(%pid, %id, "environment ready");
        self.describe(pid, id).await
    }

    /// Re-register the app against the unoccupied rotation slot, swap DNS,
    /// then drain the old slot. Network resources are reused, not recreated.
    pub async fn update(
        &self,
        pid: &ProjectId,
        id: &EnvironmentId,
        app: &AppDefinition,
    ) -> Result<EnvironmentDescription> {
        app.validate()?;
        let project = self.projects.ensure(pid).await?;
        let base = env::environment_name(pid, id);
        let alt = Slot::Alternate.cluster_name(&base);

        let clusters = SlotProbe {
            primary: self.provider.clusters().get(&base).await?.is_some(),
            alternate: self.provider.clusters().get(&alt).await?.is_some(),
        };
        let services = SlotProbe {
            primary: self.provider.services().get(&base, &base).await?.is_some(),
            alternate: self.provider.services().get(&alt, &base).await?.is_some(),
        };
        let target = select_rotation_slot(clusters, services)?;
        let old_cluster = target.other().cluster_name(&base);
        let new_cluster = target.cluster_name(&base);
        info!(%pid, %id, from = %old_cluster, to = %new_cluster, "rotating environment");

        let tags = env::standard_tags(pid, Some(id), Some(app));
        let cluster_spec = ClusterSpec {
            name: new_cluster.clone(),
            tags: tags.clone(),
        };
        let cluster = retry(mutation_policy(&self.settings, "cluster.create"), || {
            self.provider.clusters().create(cluster_spec.clone())
        })
        .await?;

        let firewall_id = self.environment_firewall_id(pid, id, &base).await?;
        self.launch_instances(&project, app, &base, &cluster.name, &firewall_id, &tags)
            .await?;
        self.wait_cluster_instances(pid, id, &cluster.name, InstanceState::Running)
            .await?;

        let public_ip = self.cluster_public_ip(pid, id, &cluster.name).await;
        let dns_name = self
            .publish(pid, id, app, &project, &base, public_ip.as_deref())
            .await;
        debug!(?dns_name, "traffic swapped to new slot");

        let service_spec = self.service_spec(&base, &cluster.name, app, &tags);
        retry(mutation_policy(&self.settings, "service.create"), || {
            self.provider.services().create(service_spec.clone())
        })
        .await?;

        self.stash_app_definition(&base, app).await?;

        // Old slot drains best-effort: its failures never fail the update
        for failure in self.teardown_slot(pid, id, &base, &old_cluster).await {
            warn!(step = %failure.step, "old slot teardown step failed: {}", failure.message);
        }

        self.describe(pid, id).await
    }

    /// Best-effort teardown: every step individually caught, all steps always
    /// attempted, failures collected instead of raised.
    pub async fn destroy(&self, pid: &ProjectId, id: &EnvironmentId) -> Result<DestroyReport> {
        info!(%pid, %id, "destroying environment");
        let base = env::environment_name(pid, id);
        let alt = Slot::Alternate.cluster_name(&base);
        let dns_name = self.dns_name(pid, id);

        let steps: Vec<(&'static str, BoxFuture<'_, Result<()>>)> = vec![
            ("dns.destroy", Box::pin(self.remove_dns(dns_name))),
            (
                "loadbalancer.destroy",
                Box::pin(self.remove_load_balancer(base.clone())),
            ),
            (
                "service.destroy",
                Box::pin(self.remove_services(base.clone(), alt.clone())),
            ),
            (
                "instances.terminate",
                Box::pin(self.terminate_instances(pid.clone(), id.clone())),
            ),
            (
                "cluster.destroy",
                Box::pin(self.remove_clusters(base.clone(), alt.clone())),
            ),
            (
                "parameter.destroy",
                Box::pin(self.remove_parameter(base.clone())),
            ),
            (
                "firewall.destroy",
                Box::pin(self.remove_firewall(pid.clone(), base.clone())),
            ),
        ];

        let mut report = DestroyReport::default();
        for (label, step) in steps {
            if let Err(err) = step.await {
                warn!(step = label, "teardown step failed, continuing: {err}");
                report.failures.push(StepFailure {
                    step: label.to_string(),
                    message: err.to_string(),
                });
            }
        }

        if report.is_clean() {
            info!(%pid, %id, "environment destroyed");
        } else {
            warn!(%pid, %id, failures = report.failures.len(), "environment destroyed with failures");
        }
        Ok(report)
    }

    /// Live view of one environment
    pub async fn describe(&self, pid: &ProjectId, id: &EnvironmentId) -> Result<EnvironmentDescription> {
        let base = env::environment_name(pid, id);
        let alt = Slot::Alternate.cluster_name(&base);

        let cluster = match self.provider.clusters().get(&base).await? {
            Some(cluster) => Some(cluster),
            None => self.provider.clusters().get(&alt).await?,
        };

        let instances = self
            .provider
            .instances()
            .describe(&env::environment_filter(pid, id))
            .await?;
        let live: Vec<_> = instances.iter().filter(|i| !i.state.is_terminal()).collect();

        let Some(cluster) = cluster else {
            if live.is_empty() {
                return Err(not_found(format!("no environment {id} in project {pid}")));
            }
            // Instances without a cluster: a partially-built or
            // partially-destroyed environment.
            return Ok(EnvironmentDescription {
                pid: pid.clone(),
                id: id.clone(),
                cluster: String::new(),
                instance_ids: live.iter().map(|i| i.id.to_string()).collect(),
                public_ip: live.iter().find_map(|i| i.public_ip.clone()),
                dns_name: None,
                ready: false,
                expires_at: expiry_of(live.first().map(|i| &i.tags)),
            });
        };

        let dns_name = match self.provider.load_balancers().describe(&base).await? {
            Some(lb) => lb.dns_name,
            None => self
                .provider
                .dns()
                .describe(&self.dns_name(pid, id))
                .await?
                .map(|r| r.name),
        };

        let ready = !live.is_empty() && live.iter().all(|i| i.is_running());
        Ok(EnvironmentDescription {
            pid: pid.clone(),
            id: id.clone(),
            cluster: cluster.name,
            instance_ids: live.iter().map(|i| i.id.to_string()).collect(),
            public_ip: live.iter().find_map(|i| i.public_ip.clone()),
            dns_name,
            ready,
            expires_at: expiry_of(live.first().map(|i| &i.tags)),
        })
    }

    /// Environments currently open in a project
    pub async fn list(&self, pid: &ProjectId) -> Result<Vec<EnvironmentId>> {
        self.projects.open_environments(pid).await
    }

    // ---- create/update building blocks ----

    async fn launch_instances(
        &self,
        project: &ProjectHandle,
        app: &AppDefinition,
        base: &str,
        cluster: &str,
        firewall_id: &str,
        tags: &HashMap<String, String>,
    ) -> Result<Vec<berth_cloud::Instance>> {
        let mut instance_tags = tags.clone();
        instance_tags.insert(CLUSTER_TAG.to_string(), cluster.to_string());
        let spec = InstanceSpec {
            name: base.to_string(),
            image_id: self.settings.image_id.clone(),
            instance_type: self.settings.instance_type.clone(),
            subnet_id: Some(project.subnet.id.clone()),
            firewall_id: Some(firewall_id.to_string()),
            count: app.desired_count,
            tags: instance_tags,
        };
        retry(mutation_policy(&self.settings, "instance.create"), || {
            self.provider.instances().create(spec.clone())
        })
        .await
    }

    /// Poll until every instance of `cluster` reports `target`
    async fn wait_cluster_instances(
        &self,
        pid: &ProjectId,
        id: &EnvironmentId,
        cluster: &str,
        target: InstanceState,
    ) -> Result<()> {
        let filter = env::environment_filter(pid, id).with(CLUSTER_TAG, cluster);
        let label = format!("instances.{target}");
        wait_for(
            &label,
            Duration::from_millis(self.settings.poll_interval_ms),
            self.settings.poll_max_attempts,
            || {
                let filter = filter.clone();
                async move {
                    let instances = self.provider.instances().describe(&filter).await?;
                    readiness::ensure_all_in_state(&instances, target)
                }
            },
        )
        .await
    }

    async fn first_public_ip(&self, pid: &ProjectId, id: &EnvironmentId) -> Option<String> {
        match self
            .provider
            .instances()
            .describe(&env::environment_filter(pid, id))
            .await
        {
            Ok(instances) => instances
                .iter()
                .filter(|i| i.is_running())
                .find_map(|i| i.public_ip.clone()),
            Err(err) => {
                warn!("could not read back instance addresses: {err}");
                None
            }
        }
    }

    async fn cluster_public_ip(
        &self,
        pid: &ProjectId,
        id: &EnvironmentId,
        cluster: &str,
    ) -> Option<String> {
        let filter = env::environment_filter(pid, id).with(CLUSTER_TAG, cluster);
        match self.provider.instances().describe(&filter).await {
            Ok(instances) => instances
                .iter()
                .filter(|i| i.is_running())
                .find_map(|i| i.public_ip.clone()),
            Err(err) => {
                warn!("could not read back instance addresses: {err}");
                None
            }
        }
    }

    /// Publish the environment's address: a load balancer when requested,
    /// otherwise an A record on the first instance. DNS failures are logged
    /// and swallowed; an unreachable name never aborts provisioning.
    async fn publish(
        &self,
        pid: &ProjectId,
        id: &EnvironmentId,
        app: &AppDefinition,
        project: &ProjectHandle,
        base: &str,
        public_ip: Option<&str>,
    ) -> Option<String> {
        if app.load_balancer {
            let spec = LoadBalancerSpec {
                name: base.to_string(),
                subnet_ids: vec![project.subnet.id.clone()],
                tags: env::standard_tags(pid, Some(id), Some(app)),
            };
            match retry(mutation_policy(&self.settings, "loadbalancer.create"), || {
                self.provider.load_balancers().create(spec.clone())
            })
            .await
            {
                Ok(lb) => return lb.dns_name,
                Err(err) => {
                    warn!("load balancer creation failed, continuing: {err}");
                    return None;
                }
            }
        }

        let Some(ip) = public_ip else {
            warn!(%pid, %id, "no public address to publish");
            return None;
        };
        let dns_name = self.dns_name(pid, id);
        let spec = DnsRecordSpec {
            name: dns_name.clone(),
            value: ip.to_string(),
            ttl_seconds: 60,
        };
        match retry(mutation_policy(&self.settings, "dns.create"), || {
            self.provider.dns().create(spec.clone())
        })
        .await
        {
            Ok(_) => Some(dns_name),
            Err(err) => {
                warn!("DNS record creation failed, continuing: {err}");
                None
            }
        }
    }

    fn service_spec(
        &self,
        base: &str,
        cluster: &str,
        app: &AppDefinition,
        tags: &HashMap<String, String>,
    ) -> ServiceSpec {
        ServiceSpec {
            name: base.to_string(),
            cluster: cluster.to_string(),
            image: app.image.clone(),
            container_port: app.container_port,
            env: app.env.clone(),
            cpu: app.cpu,
            memory: app.memory,
            desired_count: app.desired_count,
            tags: tags.clone(),
        }
    }

    /// Record the app definition so later describes and updates can show
    /// what is deployed.
    async fn stash_app_definition(&self, base: &str, app: &AppDefinition) -> Result<()> {
        let value = serde_json::to_string(app)?;
        let spec = ParameterSpec {
            name: format!("/{base}/appdef"),
            value,
            secret: false,
        };
        retry(mutation_policy(&self.settings, "parameter.create"), || {
            self.provider.parameters().create(spec.clone())
        })
        .await?;
        Ok(())
    }

    /// The environment's own firewall rule-set, created at provision time
    async fn environment_firewall_id(
        &self,
        pid: &ProjectId,
        id: &EnvironmentId,
        base: &str,
    ) -> Result<String> {
        self.provider
            .firewalls()
            .describe(&env::environment_filter(pid, id))
            .await?
            .into_iter()
            .find(|f| f.name == base)
            .map(|f| f.id)
            .ok_or_else(|| not_found(format!("no firewall rule-set named {base}")))
    }

    // ---- teardown steps ----

    async fn remove_dns(&self, dns_name: String) -> Result<()> {
        if self.provider.dns().describe(&dns_name).await?.is_none() {
            return Ok(());
        }
        retry(mutation_policy(&self.settings, "dns.destroy"), || {
            self.provider.dns().destroy(&dns_name)
        })
        .await?;
        Ok(())
    }

    async fn remove_load_balancer(&self, base: String) -> Result<()> {
        let Some(lb) = self.provider.load_balancers().describe(&base).await? else {
            return Ok(());
        };
        retry(mutation_policy(&self.settings, "loadbalancer.destroy"), || {
            self.provider.load_balancers().destroy(&lb.id)
        })
        .await?;
        Ok(())
    }

    async fn remove_services(&self, base: String, alt: String) -> Result<()> {
        let mut first_failure = None;
        for cluster in [&base, &alt] {
            if self.provider.services().get(cluster, &base).await?.is_none() {
                continue;
            }
            let result = retry(mutation_policy(&self.settings, "service.destroy"), || {
                self.provider.services().destroy(cluster, &base)
            })
            .await;
            if let Err(err) = result {
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn terminate_instances(&self, pid: ProjectId, id: EnvironmentId) -> Result<()> {
        let filter = env::environment_filter(&pid, &id);
        let instances = self.provider.instances().describe(&filter).await?;
        let live: Vec<_> = instances
            .into_iter()
            .filter(|i| !i.state.is_terminal())
            .collect();
        if live.is_empty() {
            return Ok(());
        }

        for instance in &live {
            retry(mutation_policy(&self.settings, "instance.destroy"), || {
                self.provider.instances().destroy(&instance.id)
            })
            .await?;
        }

        // All of them, both slots: target state is terminal either way
        wait_for(
            "instances.terminated",
            Duration::from_millis(self.settings.poll_interval_ms),
            self.settings.poll_max_attempts,
            || {
                let filter = filter.clone();
                async move {
                    let instances = self.provider.instances().describe(&filter).await?;
                    readiness::ensure_all_in_state(&instances, InstanceState::Terminated)
                }
            },
        )
        .await
    }

    async fn remove_clusters(&self, base: String, alt: String) -> Result<()> {
        let mut first_failure = None;
        for cluster in [&base, &alt] {
            if self.provider.clusters().get(cluster).await?.is_none() {
                continue;
            }
            let result = retry(mutation_policy(&self.settings, "cluster.destroy"), || {
                self.provider.clusters().destroy(cluster)
            })
            .await;
            if let Err(err) = result {
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn remove_parameter(&self, base: String) -> Result<()> {
        let param_name = format!("/{base}/appdef");
        retry(mutation_policy(&self.settings, "parameter.destroy"), || {
            self.provider.parameters().destroy(&param_name)
        })
        .await?;
        Ok(())
    }

    async fn remove_firewall(&self, pid: ProjectId, base: String) -> Result<()> {
        let firewalls = self
            .provider
            .firewalls()
            .describe(&env::project_filter(&pid))
            .await?;
        let Some(firewall) = firewalls.into_iter().find(|f| f.name == base) else {
            return Ok(());
        };
        retry(mutation_policy(&self.settings, "firewall.destroy"), || {
            self.provider.firewalls().destroy(&firewall.id)
        })
        .await?;
        Ok(())
    }

    /// Drain one rotation slot after an update; purely best-effort
    async fn teardown_slot(
        &self,
        pid: &ProjectId,
        id: &EnvironmentId,
        base: &str,
        cluster: &str,
    ) -> Vec<StepFailure> {
        let mut failures = Vec::new();

        let filter = env::environment_filter(pid, id).with(CLUSTER_TAG, cluster);
        match self.provider.instances().describe(&filter).await {
            Ok(instances) => {
                for instance in instances.iter().filter(|i| !i.state.is_terminal()) {
                    if let Err(err) = self.provider.instances().destroy(&instance.id).await {
                        failures.push(StepFailure {
                            step: "instances.terminate".to_string(),
                            message: err.to_string(),
                        });
                    }
                }
            }
            Err(err) => failures.push(StepFailure {
                step: "instances.describe".to_string(),
                message: err.to_string(),
            }),
        }

        if let Err(err) = self.provider.services().destroy(cluster, base).await {
            failures.push(StepFailure {
                step: "service.destroy".to_string(),
                message: err.to_string(),
            });
        }
        if let Err(err) = self.provider.clusters().destroy(cluster).await {
            failures.push(StepFailure {
                step: "cluster.destroy".to_string(),
                message: err.to_string(),
            });
        }
        failures
    }
}

/// Expiry timestamp from an instance's `ttl` tag, if any
fn expiry_of(tags: Option<&HashMap<String, String>>) -> Option<chrono::DateTime<chrono::Utc>> {
    let tags = name::tag_map(tags?);
    let millis = tags.get(&TagKey::Ttl)?.parse::<i64>().ok()?;
    chrono::Utc.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_cloud::LocalProvider;

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

    #[tokio::test]
    async fn test_dns_name_format() {
        let orchestrator = orchestrator(Arc::new(LocalProvider::new()));
        let pid = ProjectId::new("demo").unwrap();
        assert_eq!(
            orchestrator.dns_name(&pid, &EnvironmentId::Pr(5)),
            "demo-pr-5.preview.example.com"
        );
        assert_eq!(
            orchestrator.dns_name(&pid, &EnvironmentId::deployment("beta").unwrap()),
            "demo-beta.preview.example.com"
        );
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_app() {
        let orchestrator = orchestrator(Arc::new(LocalProvider::new()));
        let pid = ProjectId::new("demo").unwrap();
        let err = orchestrator
            .create(&pid, &EnvironmentId::Pr(1), &AppDefinition::new("", 80))
            .await
            .unwrap_err();
        assert!(matches!(err, berth_core::Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_describe_absent_environment_is_not_found() {
        let orchestrator = orchestrator(Arc::new(LocalProvider::new()));
        let pid = ProjectId::new("demo").unwrap();
        let err = orchestrator
            .describe(&pid, &EnvironmentId::Pr(404))
            .await
            .unwrap_err();
        assert!(matches!(err, berth_core::Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_exists_ignores_terminated_instances() {
        let provider = Arc::new(LocalProvider::new());
        let orchestrator = orchestrator(provider.clone());
        let pid = ProjectId::new("demo").unwrap();
        let id = EnvironmentId::Pr(9);

        let app = AppDefinition::new("nginx:latest", 80);
        orchestrator.create(&pid, &id, &app).await.unwrap();
        assert!(orchestrator.exists(&pid, &id).await.unwrap());

        orchestrator.destroy(&pid, &id).await.unwrap();
        assert!(!orchestrator.exists(&pid, &id).await.unwrap());
    }
}
