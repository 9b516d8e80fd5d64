//! Local in-memory provider
//!
//! Backs the test suites with the same four-verb surface as the real cloud,
//! plus two knobs the suites need: a boot delay measured in describe calls
//! (so readiness polling has something to poll) and scripted failures per
//! operation label (so teardown resilience can be exercised).

use crate::model::*;
use crate::provider::*;
use async_trait::async_trait;
use berth_core::error::{not_found, provider};
use berth_core::name::TagFilter;
use berth_core::Result;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

struct LocalInstance {
    instance: Instance,
    boot_polls_left: u32,
}

#[derive(Default)]
struct State {
    networks: Vec<Network>,
    subnets: Vec<Subnet>,
    firewalls: Vec<FirewallRuleSet>,
    instances: Vec<LocalInstance>,
    clusters: Vec<Cluster>,
    services: Vec<Service>,
    records: Vec<DnsRecord>,
    load_balancers: Vec<LoadBalancer>,
    identities: Vec<Identity>,
    repositories: Vec<Repository>,
    parameters: Vec<Parameter>,
    /// op label -> remaining scripted failures
    failures: HashMap<String, u32>,
    task_definition_rev: u32,
    ip_counter: u8,
}

/// In-memory cloud provider for tests
pub struct LocalProvider {
    state: Mutex<State>,
    boot_polls: u32,
}

impl LocalProvider {
    /// Provider whose instances are running as soon as they are described
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            boot_polls: 0,
        }
    }

    /// Provider whose instances stay pending for `polls` describe calls
    pub fn with_boot_polls(polls: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            boot_polls: polls,
        }
    }

    /// Script the next `times` calls of `op` to fail
    pub async fn inject_failure(&self, op: &str, times: u32) {
        let mut state = self.state.lock().await;
        *state.failures.entry(op.to_string()).or_insert(0) += times;
    }

    fn fail_if_scripted(state: &mut State, op: &str) -> Result<()> {
        if let Some(remaining) = state.failures.get_mut(op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(provider(op, "injected failure"));
            }
        }
        Ok(())
    }

    fn short_id(prefix: &str) -> String {
        format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Networks for LocalProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Network>> {
        let state = self.state.lock().await;
        Ok(state
            .networks
            .iter()
            .filter(|n| filter.matches(&n.tags))
            .cloned()
            .collect())
    }

    async fn create(&self, spec: NetworkSpec) -> Result<Network> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "network.create")?;
        let network = Network {
            id: Self::short_id("vpc"),
            cidr: spec.cidr,
            tags: spec.tags,
        };
        state.networks.push(network.clone());
        Ok(network)
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "network.destroy")?;
        state.networks.retain(|n| n.id != id);
        Ok(())
    }
}

#[async_trait]
impl Subnets for LocalProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Subnet>> {
        let state = self.state.lock().await;
        Ok(state
            .subnets
            .iter()
            .filter(|s| filter.matches(&s.tags))
            .cloned()
            .collect())
    }

    async fn create(&self, spec: SubnetSpec) -> Result<Subnet> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "subnet.create")?;
        let subnet = Subnet {
            id: Self::short_id("subnet"),
            network_id: spec.network_id,
            cidr: spec.cidr,
            tags: spec.tags,
        };
        state.subnets.push(subnet.clone());
        Ok(subnet)
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "subnet.destroy")?;
        state.subnets.retain(|s| s.id != id);
        Ok(())
    }
}

#[async_trait]
impl Firewalls for LocalProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<FirewallRuleSet>> {
        let state = self.state.lock().await;
        Ok(state
            .firewalls
            .iter()
            .filter(|f| filter.matches(&f.tags))
            .cloned()
            .collect())
    }

    async fn create(&self, spec: FirewallSpec) -> Result<FirewallRuleSet> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "firewall.create")?;
        let firewall = FirewallRuleSet {
            id: Self::short_id("sg"),
            name: spec.name,
            network_id: spec.network_id,
            tags: spec.tags,
        };
        state.firewalls.push(firewall.clone());
        Ok(firewall)
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "firewall.destroy")?;
        state.firewalls.retain(|f| f.id != id);
        Ok(())
    }
}

#[async_trait]
impl Instances for LocalProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Instance>> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "instance.describe")?;
        let mut out = Vec::new();
        for entry in state.instances.iter_mut() {
            if entry.instance.state == InstanceState::Pending {
                if entry.boot_polls_left == 0 {
                    entry.instance.state = InstanceState::Running;
                } else {
                    entry.boot_polls_left -= 1;
                }
            }
            if filter.matches(&entry.instance.tags) {
                out.push(entry.instance.clone());
            }
        }
        Ok(out)
    }

    async fn create(&self, spec: InstanceSpec) -> Result<Vec<Instance>> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "instance.create")?;
        let mut created = Vec::new();
        for _ in 0..spec.count.max(1) {
            state.ip_counter = state.ip_counter.wrapping_add(1);
            let mut instance =
                Instance::new(InstanceId::new(Self::short_id("i")), spec.name.clone());
            instance.tags = spec.tags.clone();
            instance.public_ip = Some(format!("203.0.113.{}", state.ip_counter));
            instance.private_ip = Some(format!("10.0.1.{}", state.ip_counter));
            instance.launched_at = Some(Utc::now());
            created.push(instance.clone());
            state.instances.push(LocalInstance {
                instance,
                boot_polls_left: self.boot_polls,
            });
        }
        Ok(created)
    }

    async fn destroy(&self, id: &InstanceId) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "instance.destroy")?;
        for entry in state.instances.iter_mut() {
            if &entry.instance.id == id {
                entry.instance.state = InstanceState::Terminated;
            }
        }
        Ok(())
    }

    async fn list(&self, filter: &TagFilter) -> Result<Vec<InstanceId>> {
        let instances = Instances::describe(self, filter).await?;
        Ok(instances.into_iter().map(|i| i.id).collect())
    }
}

#[async_trait]
impl Clusters for LocalProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Cluster>> {
        let state = self.state.lock().await;
        Ok(state
            .clusters
            .iter()
            .filter(|c| filter.matches(&c.tags))
            .cloned()
            .collect())
    }

    async fn get(&self, name: &str) -> Result<Option<Cluster>> {
        let state = self.state.lock().await;
        Ok(state.clusters.iter().find(|c| c.name == name).cloned())
    }

    async fn create(&self, spec: ClusterSpec) -> Result<Cluster> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "cluster.create")?;
        if let Some(existing) = state.clusters.iter().find(|c| c.name == spec.name) {
            return Ok(existing.clone());
        }
        let cluster = Cluster {
            arn: Some(format!("arn:local:cluster/{}", spec.name)),
            name: spec.name,
            tags: spec.tags,
        };
        state.clusters.push(cluster.clone());
        Ok(cluster)
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "cluster.destroy")?;
        state.clusters.retain(|c| c.name != name);
        state.services.retain(|s| s.cluster != name);
        Ok(())
    }
}

#[async_trait]
impl Services for LocalProvider {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Service>> {
        let state = self.state.lock().await;
        Ok(state
            .services
            .iter()
            .filter(|s| filter.matches(&s.tags))
            .cloned()
            .collect())
    }

    async fn get(&self, cluster: &str, name: &str) -> Result<Option<Service>> {
        let state = self.state.lock().await;
        Ok(state
            .services
            .iter()
            .find(|s| s.cluster == cluster && s.name == name)
            .cloned())
    }

    async fn create(&self, spec: ServiceSpec) -> Result<Service> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "service.create")?;
        state.task_definition_rev += 1;
        let service = Service {
            name: spec.name.clone(),
            cluster: spec.cluster.clone(),
            task_definition: format!("{}:{}", spec.name, state.task_definition_rev),
            desired_count: spec.desired_count,
            tags: spec.tags,
        };
        state
            .services
            .retain(|s| !(s.cluster == spec.cluster && s.name == spec.name));
        state.services.push(service.clone());
        Ok(service)
    }

    async fn destroy(&self, cluster: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "service.destroy")?;
        state
            .services
            .retain(|s| !(s.cluster == cluster && s.name == name));
        Ok(())
    }
}

#[async_trait]
impl DnsRecords for LocalProvider {
    async fn describe(&self, name: &str) -> Result<Option<DnsRecord>> {
        let state = self.state.lock().await;
        Ok(state.records.iter().find(|r| r.name == name).cloned())
    }

    async fn create(&self, spec: DnsRecordSpec) -> Result<DnsRecord> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "dns.create")?;
        let record = DnsRecord {
            name: spec.name,
            record_type: "A".to_string(),
            value: spec.value,
            ttl_seconds: spec.ttl_seconds,
        };
        state.records.retain(|r| r.name != record.name);
        state.records.push(record.clone());
        Ok(record)
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "dns.destroy")?;
        if !state.records.iter().any(|r| r.name == name) {
            return Err(not_found(format!("no DNS record named {name}")));
        }
        state.records.retain(|r| r.name != name);
        Ok(())
    }
}

#[async_trait]
impl LoadBalancers for LocalProvider {
    async fn describe(&self, name: &str) -> Result<Option<LoadBalancer>> {
        let state = self.state.lock().await;
        Ok(state
            .load_balancers
            .iter()
            .find(|l| l.name == name)
            .cloned())
    }

    async fn create(&self, spec: LoadBalancerSpec) -> Result<LoadBalancer> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "lb.create")?;
        let lb = LoadBalancer {
            id: Self::short_id("lb"),
            dns_name: Some(format!("{}.lb.local", spec.name)),
            name: spec.name,
            tags: spec.tags,
        };
        state.load_balancers.push(lb.clone());
        Ok(lb)
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "lb.destroy")?;
        state.load_balancers.retain(|l| l.id != id);
        Ok(())
    }
}

#[async_trait]
impl Identities for LocalProvider {
    async fn describe(&self, user_name: &str) -> Result<Option<Identity>> {
        let state = self.state.lock().await;
        Ok(state
            .identities
            .iter()
            .find(|i| i.user_name == user_name)
            .cloned())
    }

    async fn create(&self, spec: IdentitySpec) -> Result<Identity> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "identity.create")?;
        let identity = Identity {
            user_name: spec.user_name,
            access_key_id: Some(Self::short_id("AKIA")),
            secret_access_key: Some(Uuid::new_v4().simple().to_string()),
            tags: spec.tags,
        };
        state
            .identities
            .retain(|i| i.user_name != identity.user_name);
        state.identities.push(identity.clone());
        Ok(identity)
    }

    async fn destroy(&self, user_name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "identity.destroy")?;
        state.identities.retain(|i| i.user_name != user_name);
        Ok(())
    }
}

#[async_trait]
impl Repositories for LocalProvider {
    async fn describe(&self, name: &str) -> Result<Option<Repository>> {
        let state = self.state.lock().await;
        Ok(state.repositories.iter().find(|r| r.name == name).cloned())
    }

    async fn create(&self, spec: RepositorySpec) -> Result<Repository> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "repository.create")?;
        let repository = Repository {
            uri: Some(format!("local.registry/{}", spec.name)),
            name: spec.name,
            tags: spec.tags,
        };
        state.repositories.push(repository.clone());
        Ok(repository)
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "repository.destroy")?;
        state.repositories.retain(|r| r.name != name);
        Ok(())
    }
}

#[async_trait]
impl Parameters for LocalProvider {
    async fn describe(&self, name: &str) -> Result<Option<Parameter>> {
        let state = self.state.lock().await;
        Ok(state.parameters.iter().find(|p| p.name == name).cloned())
    }

    async fn create(&self, spec: ParameterSpec) -> Result<Parameter> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "parameter.create")?;
        let parameter = Parameter {
            name: spec.name,
            value: spec.value,
        };
        state.parameters.retain(|p| p.name != parameter.name);
        state.parameters.push(parameter.clone());
        Ok(parameter)
    }

    async fn destroy(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        Self::fail_if_scripted(&mut state, "parameter.destroy")?;
        state.parameters.retain(|p| p.name != name);
        Ok(())
    }
}

impl CloudProvider for LocalProvider {
    fn networks(&self) -> &dyn Networks {
        self
    }
    fn subnets(&self) -> &dyn Subnets {
        self
    }
    fn firewalls(&self) -> &dyn Firewalls {
        self
    }
    fn instances(&self) -> &dyn Instances {
        self
    }
    fn clusters(&self) -> &dyn Clusters {
        self
    }
    fn services(&self) -> &dyn Services {
        self
    }
    fn dns(&self) -> &dyn DnsRecords {
        self
    }
    fn load_balancers(&self) -> &dyn LoadBalancers {
        self
    }
    fn identities(&self) -> &dyn Identities {
        self
    }
    fn repositories(&self) -> &dyn Repositories {
        self
    }
    fn parameters(&self) -> &dyn Parameters {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn tags(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_tag_filtered_describe() {
        let provider = LocalProvider::new();
        Networks::create(
            &provider,
            NetworkSpec {
                cidr: "10.0.0.0/16".to_string(),
                tags: tags(&[("berth", "managed"), ("pid", "demo")]),
            },
        )
        .await
        .unwrap();

        let filter = TagFilter::new().with("pid", "demo");
        assert_eq!(Networks::describe(&provider, &filter).await.unwrap().len(), 1);

        let filter = TagFilter::new().with("pid", "other");
        assert!(Networks::describe(&provider, &filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_instance_boot_delay() {
        let provider = LocalProvider::with_boot_polls(1);
        Instances::create(
            &provider,
            InstanceSpec {
                name: "berth-pid-demo--pr-1".to_string(),
                image_id: "ami-test".to_string(),
                instance_type: "t3.micro".to_string(),
                subnet_id: None,
                firewall_id: None,
                count: 1,
                tags: tags(&[("pid", "demo")]),
            },
        )
        .await
        .unwrap();

        let filter = TagFilter::new().with("pid", "demo");
        let first = Instances::describe(&provider, &filter).await.unwrap();
        assert_eq!(first[0].state, InstanceState::Pending);

        let second = Instances::describe(&provider, &filter).await.unwrap();
        assert_eq!(second[0].state, InstanceState::Running);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let provider = LocalProvider::new();
        provider.inject_failure("dns.create", 1).await;

        let spec = DnsRecordSpec {
            name: "demo-pr-1.preview.example.com".to_string(),
            value: "203.0.113.1".to_string(),
            ttl_seconds: 60,
        };
        assert!(DnsRecords::create(&provider, spec.clone()).await.is_err());
        assert!(DnsRecords::create(&provider, spec).await.is_ok());
    }

    #[tokio::test]
    async fn test_service_upsert_bumps_revision() {
        let provider = LocalProvider::new();
        let spec = ServiceSpec {
            name: "web".to_string(),
            cluster: "c1".to_string(),
            image: "nginx:1".to_string(),
            container_port: 80,
            env: HashMap::new(),
            cpu: None,
            memory: None,
            desired_count: 1,
            tags: HashMap::new(),
        };
        let first = Services::create(&provider, spec.clone()).await.unwrap();
        let second = Services::create(&provider, spec).await.unwrap();
        assert_ne!(first.task_definition, second.task_definition);

        let found = Services::get(&provider, "c1", "web").await.unwrap();
        assert_eq!(found.unwrap().task_definition, second.task_definition);
    }
}
