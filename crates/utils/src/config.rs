//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API server configuration
    pub server: ServerSettings,

    /// Cloud provider configuration
    pub cloud: CloudSettings,

    /// Orchestration defaults (network layout, instance sizing, budgets)
    pub orchestrator: OrchestratorSettings,

    /// Expiry reaper configuration
    pub reaper: ReaperSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSettings {
    /// Provider region
    pub region: String,

    /// Hosted DNS zone the environment records are written into
    pub hosted_zone_id: String,

    /// Domain suffix for environment DNS names (e.g. "preview.example.com")
    pub domain: String,
}

/// Defaults applied to every provisioned project and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    pub network_cidr: String,
    pub subnet_cidr: String,
    pub instance_type: String,
    pub image_id: String,
    pub open_ports: Vec<u16>,

    /// Retry budget for provider mutations
    pub retry_attempts: u32,
    pub retry_initial_delay_ms: u64,
    pub retry_multiplier: f64,

    /// Fixed-interval poll budget for state transitions
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaperSettings {
    pub enabled: bool,
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            cloud: CloudSettings {
                region: "us-east-1".to_string(),
                hosted_zone_id: String::new(),
                domain: "preview.example.com".to_string(),
            },
            orchestrator: OrchestratorSettings::default(),
            reaper: ReaperSettings {
                enabled: true,
                interval_secs: 300,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            network_cidr: "10.0.0.0/16".to_string(),
            subnet_cidr: "10.0.1.0/24".to_string(),
            instance_type: "t3.micro".to_string(),
            image_id: "ami-0c55b159cbfafe1f0".to_string(),
            open_ports: vec![22, 80, 443],
            retry_attempts: 5,
            retry_initial_delay_ms: 500,
            retry_multiplier: 2.0,
            poll_interval_ms: 5_000,
            poll_max_attempts: 60,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment or defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let config_path =
            std::env::var("BERTH_CONFIG").unwrap_or_else(|_| "berth.yaml".to_string());

        if std::path::Path::new(&config_path).exists() {
            Self::load(PathBuf::from(config_path))
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.orchestrator.retry_attempts, 5);
        assert!(config.reaper.enabled);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.cloud.region, config.cloud.region);
        assert_eq!(parsed.orchestrator.open_ports, config.orchestrator.open_ports);
    }
}
