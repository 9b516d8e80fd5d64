//! Cloud provider traits
//!
//! Every primitive the orchestrators touch is reached through one of these
//! four-verb APIs. The orchestrators never depend on a concrete SDK type:
//! they discover by tag filter, create from a typed spec, and destroy by id.

use crate::model::*;
use async_trait::async_trait;
use berth_core::name::TagFilter;
use berth_core::Result;

/// Virtual networks
#[async_trait]
pub trait Networks: Send + Sync {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Network>>;
    async fn create(&self, spec: NetworkSpec) -> Result<Network>;
    async fn destroy(&self, id: &str) -> Result<()>;
}

/// Subnets
#[async_trait]
pub trait Subnets: Send + Sync {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Subnet>>;
    async fn create(&self, spec: SubnetSpec) -> Result<Subnet>;
    async fn destroy(&self, id: &str) -> Result<()>;
}

/// Firewall rule-sets
#[async_trait]
pub trait Firewalls: Send + Sync {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<FirewallRuleSet>>;
    async fn create(&self, spec: FirewallSpec) -> Result<FirewallRuleSet>;
    async fn destroy(&self, id: &str) -> Result<()>;
}

/// Virtual machines
#[async_trait]
pub trait Instances: Send + Sync {
    /// Instances matching the filter, including recently terminated ones
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Instance>>;
    async fn create(&self, spec: InstanceSpec) -> Result<Vec<Instance>>;
    async fn destroy(&self, id: &InstanceId) -> Result<()>;
    async fn list(&self, filter: &TagFilter) -> Result<Vec<InstanceId>>;
}

/// Container clusters
#[async_trait]
pub trait Clusters: Send + Sync {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Cluster>>;
    /// Describe-by-name; `None` when the cluster does not exist
    async fn get(&self, name: &str) -> Result<Option<Cluster>>;
    async fn create(&self, spec: ClusterSpec) -> Result<Cluster>;
    async fn destroy(&self, name: &str) -> Result<()>;
}

/// Container services
#[async_trait]
pub trait Services: Send + Sync {
    async fn describe(&self, filter: &TagFilter) -> Result<Vec<Service>>;
    /// Describe-by-name within a cluster; `None` when absent
    async fn get(&self, cluster: &str, name: &str) -> Result<Option<Service>>;
    /// Register or re-register; same name upserts the definition
    async fn create(&self, spec: ServiceSpec) -> Result<Service>;
    async fn destroy(&self, cluster: &str, name: &str) -> Result<()>;
}

/// DNS records in the managed zone
#[async_trait]
pub trait DnsRecords: Send + Sync {
    async fn describe(&self, name: &str) -> Result<Option<DnsRecord>>;
    /// Upsert an A record
    async fn create(&self, spec: DnsRecordSpec) -> Result<DnsRecord>;
    async fn destroy(&self, name: &str) -> Result<()>;
}

/// Load balancers, keyed by their codec-generated name
#[async_trait]
pub trait LoadBalancers: Send + Sync {
    async fn describe(&self, name: &str) -> Result<Option<LoadBalancer>>;
    async fn create(&self, spec: LoadBalancerSpec) -> Result<LoadBalancer>;
    async fn destroy(&self, id: &str) -> Result<()>;
}

/// Identity/credential pairs
#[async_trait]
pub trait Identities: Send + Sync {
    async fn describe(&self, user_name: &str) -> Result<Option<Identity>>;
    async fn create(&self, spec: IdentitySpec) -> Result<Identity>;
    async fn destroy(&self, user_name: &str) -> Result<()>;
}

/// Container image repositories, keyed by their codec-generated name
#[async_trait]
pub trait Repositories: Send + Sync {
    async fn describe(&self, name: &str) -> Result<Option<Repository>>;
    async fn create(&self, spec: RepositorySpec) -> Result<Repository>;
    async fn destroy(&self, name: &str) -> Result<()>;
}

/// Structured key-value store
#[async_trait]
pub trait Parameters: Send + Sync {
    async fn describe(&self, name: &str) -> Result<Option<Parameter>>;
    async fn create(&self, spec: ParameterSpec) -> Result<Parameter>;
    async fn destroy(&self, name: &str) -> Result<()>;
}

/// Aggregate of every per-resource API.
///
/// All cloud backends implement this to integrate with Berth; orchestrators
/// hold an `Arc<dyn CloudProvider>` and nothing else.
pub trait CloudProvider: Send + Sync {
    fn networks(&self) -> &dyn Networks;
    fn subnets(&self) -> &dyn Subnets;
    fn firewalls(&self) -> &dyn Firewalls;
    fn instances(&self) -> &dyn Instances;
    fn clusters(&self) -> &dyn Clusters;
    fn services(&self) -> &dyn Services;
    fn dns(&self) -> &dyn DnsRecords;
    fn load_balancers(&self) -> &dyn LoadBalancers;
    fn identities(&self) -> &dyn Identities;
    fn repositories(&self) -> &dyn Repositories;
    fn parameters(&self) -> &dyn Parameters;
}
