//! Project orchestrator
//!
//! A project owns exactly one network, one subnet, one firewall rule-set,
//! one image repository and one identity. [`ProjectOrchestrator::ensure`] is
//! discover-or-create for each of them, so re-running it after a partial
//! failure is always safe. Destruction is guarded: a project with open
//! environments cannot be torn down.

use crate::mutation_policy;
use berth_cloud::model::{
    FirewallRuleSet, FirewallSpec, Identity, IdentitySpec, Network, NetworkSpec, Repository,
    RepositorySpec, Subnet, SubnetSpec,
};
use berth_cloud::CloudProvider;
use berth_core::env::{self, EnvironmentId, ProjectDescription, ProjectId};
use berth_core::error::{conflict, not_found};
use berth_core::name;
use berth_core::retry::retry;
use berth_core::Result;
use berth_utils::config::OrchestratorSettings;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Live handles to a project's scaffolding
#[derive(Debug, Clone)]
pub struct ProjectHandle {
    pub pid: ProjectId,
    pub network: Network,
    pub subnet: Subnet,
    pub firewall: FirewallRuleSet,
    pub repository: Repository,
    pub identity: Identity,
}

/// Discover-or-create orchestration of per-project scaffolding
#[derive(Clone)]
pub struct ProjectOrchestrator {
    provider: Arc<dyn CloudProvider>,
    settings: OrchestratorSettings,
}

impl ProjectOrchestrator {
    /// Create a new project orchestrator
    pub fn new(provider: Arc<dyn CloudProvider>, settings: OrchestratorSettings) -> Self {
        Self { provider, settings }
    }

    /// Find or build the project's scaffolding.
    ///
    /// Creation order matters: network, then firewall rule-set and image
    /// repository, then the subnet (last, because it is associated to the
    /// rule-set), then the identity. Any failure aborts the whole call; a
    /// half-built project surfaces as an error and the next `ensure` picks
    /// up where this one stopped.
    pub async fn ensure(&self, pid: &ProjectId) -> Result<ProjectHandle> {
        let filter = env::project_filter(pid);
        let tags = env::standard_tags(pid, None, None);
        let project_name = env::project_name(pid);

        let network = match self
            .provider
            .networks()
            .describe(&filter)
            .await?
            .into_iter()
            .next()
        {
            Some(network) => {
                debug!(%pid, network = %network.id, "found existing network");
                network
            }
            None => {
                info!(%pid, "creating network");
                let spec = NetworkSpec {
                    cidr: self.settings.network_cidr.clone(),
                    tags: tags.clone(),
                };
                retry(mutation_policy(&self.settings, "network.create"), || {
                    self.provider.networks().create(spec.clone())
                })
                .await?
            }
        };

        let firewall = match self
            .provider
            .firewalls()
            .describe(&filter)
            .await?
            .into_iter()
            .find(|f| f.name == project_name)
        {
            Some(firewall) => firewall,
            None => {
                info!(%pid, "creating firewall rule-set");
                let spec = FirewallSpec {
                    name: project_name.clone(),
                    network_id: Some(network.id.clone()),
                    open_ports: self.settings.open_ports.clone(),
                    tags: tags.clone(),
                };
                retry(mutation_policy(&self.settings, "firewall.create"), || {
                    self.provider.firewalls().create(spec.clone())
                })
                .await?
            }
        };

        let repository = match self.provider.repositories().describe(&project_name).await? {
            Some(repository) => repository,
            None => {
                info!(%pid, "creating image repository");
                let spec = RepositorySpec {
                    name: project_name.clone(),
                    tags: tags.clone(),
                };
                retry(mutation_policy(&self.settings, "repository.create"), || {
                    self.provider.repositories().create(spec.clone())
                })
                .await?
            }
        };

        let subnet = match self
            .provider
            .subnets()
            .describe(&filter)
            .await?
            .into_iter()
            .next()
        {
            Some(subnet) => subnet,
            None => {
                info!(%pid, "creating subnet");
                let spec = SubnetSpec {
                    network_id: network.id.clone(),
                    cidr: self.settings.subnet_cidr.clone(),
                    firewall_id: Some(firewall.id.clone()),
                    tags: tags.clone(),
                };
                retry(mutation_policy(&self.settings, "subnet.create"), || {
                    self.provider.subnets().create(spec.clone())
                })
                .await?
            }
        };

        let identity = match self.provider.identities().describe(&project_name).await? {
            Some(identity) => identity,
            None => {
                info!(%pid, "creating identity");
                let spec = IdentitySpec {
                    user_name: project_name.clone(),
                    tags: tags.clone(),
                };
                retry(mutation_policy(&self.settings, "identity.create"), || {
                    self.provider.identities().create(spec.clone())
                })
                .await?
            }
        };

        Ok(ProjectHandle {
            pid: pid.clone(),
            network,
            subnet,
            firewall,
            repository,
            identity,
        })
    }

    /// Tear down the project scaffolding: subnet first, then the firewall
    /// rule-set. Refuses while any environment still references the project;
    /// the check is a live tag scan, never a cached count.
    pub async fn destroy(&self, pid: &ProjectId) -> Result<()> {
        let open = self.open_environments(pid).await?;
        if !open.is_empty() {
            return Err(conflict(format!(
                "project {pid} still has {} open environment(s)",
                open.len()
            )));
        }

        let filter = env::project_filter(pid);
        let subnet = self
            .provider
            .subnets()
            .describe(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("no subnet tagged pid={pid}")))?;

        info!(%pid, subnet = %subnet.id, "destroying project scaffolding");
        retry(mutation_policy(&self.settings, "subnet.destroy"), || {
            self.provider.subnets().destroy(&subnet.id)
        })
        .await?;

        let project_name = env::project_name(pid);
        match self
            .provider
            .firewalls()
            .describe(&filter)
            .await?
            .into_iter()
            .find(|f| f.name == project_name)
        {
            Some(firewall) => {
                retry(mutation_policy(&self.settings, "firewall.destroy"), || {
                    self.provider.firewalls().destroy(&firewall.id)
                })
                .await?;
            }
            None => warn!(%pid, "no project firewall rule-set found, skipping"),
        }

        Ok(())
    }

    /// Live view of the project
    pub async fn describe(&self, pid: &ProjectId) -> Result<ProjectDescription> {
        let filter = env::project_filter(pid);
        let project_name = env::project_name(pid);

        let network = self
            .provider
            .networks()
            .describe(&filter)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| not_found(format!("no network tagged pid={pid}")))?;

        let subnet_id = self
            .provider
            .subnets()
            .describe(&filter)
            .await?
            .into_iter()
            .next()
            .map(|s| s.id);
        let firewall_id = self
            .provider
            .firewalls()
            .describe(&filter)
            .await?
            .into_iter()
            .find(|f| f.name == project_name)
            .map(|f| f.id);
        let repository_uri = self
            .provider
            .repositories()
            .describe(&project_name)
            .await?
            .and_then(|r| r.uri);

        Ok(ProjectDescription {
            pid: pid.clone(),
            network_id: network.id,
            subnet_id,
            firewall_id,
            repository_uri,
            environments: self.open_environments(pid).await?,
        })
    }

    /// Every project with a Berth-managed network
    pub async fn list(&self) -> Result<Vec<ProjectId>> {
        let networks = self
            .provider
            .networks()
            .describe(&name::marker_filter())
            .await?;
        let mut pids = Vec::new();
        for network in networks {
            let tags = name::tag_map(&network.tags);
            if let Some(pid) = tags.get(&name::TagKey::Pid) {
                if let Ok(pid) = ProjectId::new(pid.clone()) {
                    if !pids.contains(&pid) {
                        pids.push(pid);
                    }
                }
            }
        }
        Ok(pids)
    }

    /// Environments that still reference the project, from a live instance
    /// scan. Terminated instances do not count.
    pub async fn open_environments(&self, pid: &ProjectId) -> Result<Vec<EnvironmentId>> {
        let instances = self
            .provider
            .instances()
            .describe(&env::project_filter(pid))
            .await?;
        let mut ids = Vec::new();
        for instance in instances {
            if instance.state.is_terminal() {
                continue;
            }
            let tags = name::tag_map(&instance.tags);
            if let Some(id) = EnvironmentId::from_tags(&tags) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        Ok(ids)
    }
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

    fn orchestrator() -> (Arc<LocalProvider>, ProjectOrchestrator) {
        let provider = Arc::new(LocalProvider::new());
        let orchestrator = ProjectOrchestrator::new(provider.clone(), test_settings());
        (provider, orchestrator)
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let (_, projects) = orchestrator();
        let pid = ProjectId::new("demo").unwrap();

        let first = projects.ensure(&pid).await.unwrap();
        let second = projects.ensure(&pid).await.unwrap();
        assert_eq!(first.network.id, second.network.id);
        assert_eq!(first.subnet.id, second.subnet.id);
        assert_eq!(first.firewall.id, second.firewall.id);

        assert_eq!(projects.list().await.unwrap(), vec![pid]);
    }

    #[tokio::test]
    async fn test_ensure_survives_transient_create_failure() {
        let (provider, projects) = orchestrator();
        provider.inject_failure("network.create", 1).await;

        let pid = ProjectId::new("demo").unwrap();
        let handle = projects.ensure(&pid).await.unwrap();
        assert!(!handle.network.id.is_empty());
    }

    #[tokio::test]
    async fn test_ensure_aborts_when_budget_exhausted() {
        let (provider, projects) = orchestrator();
        provider.inject_failure("subnet.create", 3).await;

        let pid = ProjectId::new("demo").unwrap();
        let err = projects.ensure(&pid).await.unwrap_err();
        assert!(err.to_string().contains("subnet.create"));

        // Re-running picks up the already-created pieces and finishes
        let handle = projects.ensure(&pid).await.unwrap();
        assert!(!handle.subnet.id.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_without_subnet_is_not_found() {
        let (_, projects) = orchestrator();
        let pid = ProjectId::new("ghost").unwrap();
        let err = projects.destroy(&pid).await.unwrap_err();
        assert!(matches!(err, berth_core::Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_destroy_removes_scaffolding() {
        let (_, projects) = orchestrator();
        let pid = ProjectId::new("demo").unwrap();
        projects.ensure(&pid).await.unwrap();

        projects.destroy(&pid).await.unwrap();
        let description = projects.describe(&pid).await.unwrap();
        assert!(description.subnet_id.is_none());
        assert!(description.firewall_id.is_none());
    }
}
