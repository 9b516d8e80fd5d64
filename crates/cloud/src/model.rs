//! Resource models crossing the provider boundary
//!
//! Orchestrators only ever read the documented id / tag / address fields of
//! these models; everything else is provider detail carried for operators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique instance identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Create from string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Instance state as the provider reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceState {
    /// Instance is being created
    Pending,
    /// Instance is running
    Running,
    /// Instance is stopping
    Stopping,
    /// Instance is stopped
    Stopped,
    /// Instance is being terminated
    Terminating,
    /// Instance has been terminated
    Terminated,
    /// Provider reported something we do not model
    Unknown,
}

impl InstanceState {
    /// Whether the instance will never serve traffic again
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceState::Terminated)
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceState::Pending => write!(f, "pending"),
            InstanceState::Running => write!(f, "running"),
            InstanceState::Stopping => write!(f, "stopping"),
            InstanceState::Stopped => write!(f, "stopped"),
            InstanceState::Terminating => write!(f, "terminating"),
            InstanceState::Terminated => write!(f, "terminated"),
            InstanceState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Virtual machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub name: String,
    pub state: InstanceState,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub tags: HashMap<String, String>,
    pub launched_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// New instance in the pending state
    pub fn new(id: InstanceId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            state: InstanceState::Pending,
            public_ip: None,
            private_ip: None,
            tags: HashMap::new(),
            launched_at: None,
        }
    }

    /// Check if instance is running
    pub fn is_running(&self) -> bool {
        self.state == InstanceState::Running
    }
}

/// Virtual network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    pub id: String,
    pub cidr: String,
    pub tags: HashMap<String, String>,
}

/// Subnet within a network
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub network_id: String,
    pub cidr: String,
    pub tags: HashMap<String, String>,
}

/// Firewall rule-set (security group)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirewallRuleSet {
    pub id: String,
    pub name: String,
    pub network_id: Option<String>,
    pub tags: HashMap<String, String>,
}

/// Container cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    pub arn: Option<String>,
    pub tags: HashMap<String, String>,
}

/// Container service registered against a cluster
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub cluster: String,
    pub task_definition: String,
    pub desired_count: u32,
    pub tags: HashMap<String, String>,
}

/// DNS record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsRecord {
    pub name: String,
    pub record_type: String,
    pub value: String,
    pub ttl_seconds: i64,
}

/// Load balancer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    pub dns_name: Option<String>,
    pub tags: HashMap<String, String>,
}

/// Identity/credential pair scoped to a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_name: String,
    pub access_key_id: Option<String>,
    /// Only populated on creation; the provider never returns it again
    pub secret_access_key: Option<String>,
    pub tags: HashMap<String, String>,
}

/// Container image repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    pub uri: Option<String>,
    pub tags: HashMap<String, String>,
}

/// Entry in the structured key-value store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

// ---- creation parameter structs ----
//
// One typed struct per provider call, validated at construction sites rather
// than assembled as loose key-value bags.

/// Parameters for creating a network
#[derive(Debug, Clone)]
pub struct NetworkSpec {
    pub cidr: String,
    pub tags: HashMap<String, String>,
}

/// Parameters for creating a subnet. The subnet is associated to the
/// already-created firewall rule-set, so it is provisioned last.
#[derive(Debug, Clone)]
pub struct SubnetSpec {
    pub network_id: String,
    pub cidr: String,
    pub firewall_id: Option<String>,
    pub tags: HashMap<String, String>,
}

/// Parameters for creating a firewall rule-set
#[derive(Debug, Clone)]
pub struct FirewallSpec {
    pub name: String,
    pub network_id: Option<String>,
    pub open_ports: Vec<u16>,
    pub tags: HashMap<String, String>,
}

/// Parameters for launching instances
#[derive(Debug, Clone)]
pub struct InstanceSpec {
    pub name: String,
    pub image_id: String,
    pub instance_type: String,
    pub subnet_id: Option<String>,
    pub firewall_id: Option<String>,
    pub count: u32,
    pub tags: HashMap<String, String>,
}

/// Parameters for creating a cluster
#[derive(Debug, Clone)]
pub struct ClusterSpec {
    pub name: String,
    pub tags: HashMap<String, String>,
}

/// Parameters for registering a service; re-registering under the same name
/// upserts the definition.
#[derive(Debug, Clone)]
pub struct ServiceSpec {
    pub name: String,
    pub cluster: String,
    pub image: String,
    pub container_port: u16,
    pub env: HashMap<String, String>,
    pub cpu: Option<f64>,
    pub memory: Option<f64>,
    pub desired_count: u32,
    pub tags: HashMap<String, String>,
}

/// Parameters for upserting a DNS record
#[derive(Debug, Clone)]
pub struct DnsRecordSpec {
    pub name: String,
    pub value: String,
    pub ttl_seconds: i64,
}

/// Parameters for creating a load balancer
#[derive(Debug, Clone)]
pub struct LoadBalancerSpec {
    pub name: String,
    pub subnet_ids: Vec<String>,
    pub tags: HashMap<String, String>,
}

/// Parameters for creating an identity
#[derive(Debug, Clone)]
pub struct IdentitySpec {
    pub user_name: String,
    pub tags: HashMap<String, String>,
}

/// Parameters for creating an image repository
#[derive(Debug, Clone)]
pub struct RepositorySpec {
    pub name: String,
    pub tags: HashMap<String, String>,
}

/// Parameters for writing a key-value entry
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: String,
    pub value: String,
    pub secret: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id() {
        let id = InstanceId::new("i-1234567890abcdef0");
        assert_eq!(id.as_str(), "i-1234567890abcdef0");
        assert_eq!(id.to_string(), "i-1234567890abcdef0");
    }

    #[test]
    fn test_instance_state() {
        assert_eq!(InstanceState::Running.to_string(), "running");
        assert!(InstanceState::Terminated.is_terminal());
        assert!(!InstanceState::Stopping.is_terminal());
    }

    #[test]
    fn test_instance() {
        let instance = Instance::new(InstanceId::new("i-test"), "berth-pid-demo--pr-5");
        assert_eq!(instance.state, InstanceState::Pending);
        assert!(!instance.is_running());
    }
}
