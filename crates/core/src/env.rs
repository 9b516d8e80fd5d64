//! Project and environment identity and description types

use crate::error::{validation, Result};
use crate::name::{self, NameMap, TagKey, MARKER_KEY, MARKER_VALUE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Project identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(String);

impl ProjectId {
    /// Create a project id, rejecting empty input before any I/O happens
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(validation("project id must not be empty"));
        }
        Ok(Self(id))
    }

    /// Get id as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which environment of a project: a pull-request preview or a named
/// deployment. The two are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvironmentId {
    /// Disposable preview mirroring one pull request
    Pr(u32),
    /// Longer-lived named deployment (e.g. "beta")
    Deployment(String),
}

impl EnvironmentId {
    /// Deployment id, rejecting empty names
    pub fn deployment(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(validation("deployment name must not be empty"));
        }
        Ok(Self::Deployment(name))
    }

    /// The vocabulary key this discriminant is tagged under
    pub fn tag_key(&self) -> TagKey {
        match self {
            EnvironmentId::Pr(_) => TagKey::Pr,
            EnvironmentId::Deployment(_) => TagKey::Deployment,
        }
    }

    /// The tag value for this discriminant
    pub fn tag_value(&self) -> String {
        match self {
            EnvironmentId::Pr(n) => n.to_string(),
            EnvironmentId::Deployment(name) => name.clone(),
        }
    }

    /// Rebuild an id from a decoded tag map, preferring the PR discriminant
    pub fn from_tags(tags: &NameMap) -> Option<Self> {
        if let Some(pr) = tags.get(&TagKey::Pr) {
            return pr.parse().ok().map(EnvironmentId::Pr);
        }
        tags.get(&TagKey::Deployment)
            .cloned()
            .map(EnvironmentId::Deployment)
    }
}

impl std::fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnvironmentId::Pr(n) => write!(f, "pr-{n}"),
            EnvironmentId::Deployment(name) => write!(f, "{name}"),
        }
    }
}

impl std::str::FromStr for EnvironmentId {
    type Err = crate::error::Error;

    /// Parse the display form back: `pr-5` is a PR, anything else is a
    /// deployment name.
    fn from_str(s: &str) -> Result<Self> {
        if let Some(number) = s.strip_prefix("pr-") {
            if let Ok(number) = number.parse() {
                return Ok(EnvironmentId::Pr(number));
            }
        }
        EnvironmentId::deployment(s)
    }
}

/// What to run inside an environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppDefinition {
    /// Container image reference
    pub image: String,

    /// Port the container listens on
    pub container_port: u16,

    /// Environment variables for the container
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// CPU cores per task
    pub cpu: Option<f64>,

    /// Memory in GB per task
    pub memory: Option<f64>,

    /// Instances to run
    pub desired_count: u32,

    /// Source revision this definition was built from
    pub sha: Option<String>,

    /// Expiry; environments past this moment are reaped
    pub expires_at: Option<DateTime<Utc>>,

    /// Front the environment with a load balancer
    #[serde(default)]
    pub load_balancer: bool,
}

impl AppDefinition {
    /// New definition with defaults: one instance, no expiry
    pub fn new(image: impl Into<String>, container_port: u16) -> Self {
        Self {
            image: image.into(),
            container_port,
            env: HashMap::new(),
            cpu: None,
            memory: None,
            desired_count: 1,
            sha: None,
            expires_at: None,
            load_balancer: false,
        }
    }

    /// Add an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set instance count
    pub fn with_desired_count(mut self, count: u32) -> Self {
        self.desired_count = count;
        self
    }

    /// Set the source revision
    pub fn with_sha(mut self, sha: impl Into<String>) -> Self {
        self.sha = Some(sha.into());
        self
    }

    /// Set the expiry timestamp
    pub fn with_expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Front with a load balancer
    pub fn with_load_balancer(mut self, enabled: bool) -> Self {
        self.load_balancer = enabled;
        self
    }

    /// Validate before any provider call is issued
    pub fn validate(&self) -> Result<()> {
        if self.image.trim().is_empty() {
            return Err(validation("app image must not be empty"));
        }
        if self.desired_count == 0 {
            return Err(validation("desired_count must be at least 1"));
        }
        Ok(())
    }
}

/// Identity tags written on every resource an environment owns.
///
/// The marker tag plus `pid`, the PR/deployment discriminant, the creation
/// time, and (when the environment expires) the `ttl` the reaper consumes.
pub fn standard_tags(
    pid: &ProjectId,
    env: Option<&EnvironmentId>,
    app: Option<&AppDefinition>,
) -> HashMap<String, String> {
    let mut tags = HashMap::new();
    tags.insert(MARKER_KEY.to_string(), MARKER_VALUE.to_string());
    tags.insert(TagKey::Pid.as_str().to_string(), pid.as_str().to_string());
    tags.insert(
        TagKey::Time.as_str().to_string(),
        Utc::now().timestamp_millis().to_string(),
    );
    if let Some(env) = env {
        tags.insert(env.tag_key().as_str().to_string(), env.tag_value());
    }
    if let Some(app) = app {
        if let Some(sha) = &app.sha {
            tags.insert(TagKey::Sha.as_str().to_string(), sha.clone());
        }
        if let Some(expires_at) = app.expires_at {
            tags.insert(
                TagKey::Ttl.as_str().to_string(),
                expires_at.timestamp_millis().to_string(),
            );
        }
    }
    tags
}

/// Encoded resource name for project-scoped resources
pub fn project_name(pid: &ProjectId) -> String {
    let mut map = NameMap::new();
    map.insert(TagKey::Pid, pid.as_str().to_string());
    name::generate(&map)
}

/// Encoded resource name for environment-scoped resources
pub fn environment_name(pid: &ProjectId, env: &EnvironmentId) -> String {
    let mut map = NameMap::new();
    map.insert(TagKey::Pid, pid.as_str().to_string());
    map.insert(env.tag_key(), env.tag_value());
    name::generate(&map)
}

/// Filter selecting a project's resources
pub fn project_filter(pid: &ProjectId) -> crate::name::TagFilter {
    name::marker_filter().with(TagKey::Pid.as_str(), pid.as_str())
}

/// Filter selecting one environment's resources
pub fn environment_filter(pid: &ProjectId, env: &EnvironmentId) -> crate::name::TagFilter {
    project_filter(pid).with(env.tag_key().as_str(), env.tag_value())
}

/// Live view of a project's scaffolding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDescription {
    pub pid: ProjectId,
    pub network_id: String,
    pub subnet_id: Option<String>,
    pub firewall_id: Option<String>,
    pub repository_uri: Option<String>,
    pub environments: Vec<EnvironmentId>,
}

/// Live view of one environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentDescription {
    pub pid: ProjectId,
    pub id: EnvironmentId,
    pub cluster: String,
    pub instance_ids: Vec<String>,
    pub public_ip: Option<String>,
    pub dns_name: Option<String>,
    pub ready: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_validation() {
        assert!(ProjectId::new("demo").is_ok());
        assert!(ProjectId::new("").is_err());
        assert!(ProjectId::new("   ").is_err());
    }

    #[test]
    fn test_environment_id_tags() {
        let pr = EnvironmentId::Pr(5);
        assert_eq!(pr.tag_key(), TagKey::Pr);
        assert_eq!(pr.tag_value(), "5");
        assert_eq!(pr.to_string(), "pr-5");

        let dep = EnvironmentId::deployment("beta").unwrap();
        assert_eq!(dep.tag_key(), TagKey::Deployment);
        assert_eq!(dep.to_string(), "beta");

        assert!(EnvironmentId::deployment("").is_err());
    }

    #[test]
    fn test_environment_name_round_trip() {
        let pid = ProjectId::new("my-project").unwrap();
        let env = EnvironmentId::Pr(5);
        let encoded = environment_name(&pid, &env);
        let parsed = name::parse(&encoded).unwrap();
        assert_eq!(parsed.get(&TagKey::Pid).unwrap(), "my-project");
        assert_eq!(EnvironmentId::from_tags(&parsed), Some(EnvironmentId::Pr(5)));
    }

    #[test]
    fn test_standard_tags_carry_ttl() {
        let pid = ProjectId::new("demo").unwrap();
        let env = EnvironmentId::Pr(7);
        let app = AppDefinition::new("nginx:latest", 80)
            .with_sha("abc123")
            .with_expires_at(Utc::now());

        let tags = standard_tags(&pid, Some(&env), Some(&app));
        assert_eq!(tags.get(MARKER_KEY).unwrap(), MARKER_VALUE);
        assert_eq!(tags.get("pid").unwrap(), "demo");
        assert_eq!(tags.get("pr").unwrap(), "7");
        assert_eq!(tags.get("sha").unwrap(), "abc123");
        assert!(tags.contains_key("ttl"));
        assert!(tags.contains_key("time"));
    }

    #[test]
    fn test_app_definition_validation() {
        assert!(AppDefinition::new("nginx:latest", 80).validate().is_ok());
        assert!(AppDefinition::new("", 80).validate().is_err());
        assert!(AppDefinition::new("nginx", 80)
            .with_desired_count(0)
            .validate()
            .is_err());
    }
}
