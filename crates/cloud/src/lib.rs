//! # Berth Cloud
//!
//! The provider boundary: one small four-verb API per cloud primitive
//! (describe / create / destroy / list), aggregated behind [`CloudProvider`].
//! Ships an AWS implementation and an in-memory local implementation used by
//! tests.

pub mod aws;
pub mod local;
pub mod model;
pub mod provider;

pub use local::LocalProvider;
pub use model::{
    Cluster, DnsRecord, FirewallRuleSet, Identity, Instance, InstanceId, InstanceState,
    LoadBalancer, Network, Parameter, Repository, Service, Subnet,
};
pub use provider::CloudProvider;

/// Cloud module version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
