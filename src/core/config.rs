//! Configuration for the agent and collector binaries.
//!
//! Both configs are built by the CLI layer with the usual precedence:
//! CLI arguments over environment variables over an optional YAML file over
//! defaults. Everything here is plain data with validation; no component
//! reads configuration from globals.

use crate::core::{Result, VigilError};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Delivery transport selected at construction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Http,
    Grpc,
}

impl std::str::FromStr for Transport {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "http" => Ok(Transport::Http),
            "grpc" => Ok(Transport::Grpc),
            other => Err(VigilError::config(format!("unknown transport: {other}"))),
        }
    }
}

/// Agent pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Collector address the delivery clients push to.
    pub server_address: String,
    /// Interval between sampling ticks.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Interval between report-timer fires.
    #[serde(with = "humantime_serde")]
    pub report_interval: Duration,
    /// Size of the delivery worker pool (minimum 1).
    pub rate_limit: usize,
    /// Shared secret for the HashSHA256 body signature, if any.
    pub secret_key: Option<String>,
    /// Wire transport for the delivery client.
    pub transport: Transport,
    /// Capacity of the snapshot buffer between the poll and report timers.
    pub snapshot_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            server_address: "http://localhost:8080".to_string(),
            poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(10),
            rate_limit: 3,
            secret_key: None,
            transport: Transport::Http,
            snapshot_buffer: 64,
        }
    }
}

impl AgentConfig {
    /// Validates interval and pool settings.
    pub fn validate(&self) -> Result<()> {
        if self.server_address.is_empty() {
            return Err(VigilError::config("server address must not be empty"));
        }
        if self.poll_interval.is_zero() {
            return Err(VigilError::config("poll interval must be positive"));
        }
        if self.report_interval.is_zero() {
            return Err(VigilError::config("report interval must be positive"));
        }
        if self.rate_limit == 0 {
            return Err(VigilError::config("rate limit must be at least 1"));
        }
        if self.snapshot_buffer == 0 {
            return Err(VigilError::config("snapshot buffer must be at least 1"));
        }
        Ok(())
    }
}

/// Collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// HTTP listen address.
    pub listen_address: SocketAddr,
    /// GRPC listen address, if the RPC ingest surface is enabled.
    pub grpc_address: Option<SocketAddr>,
    /// Snapshot save cadence; zero selects synchronous save after every
    /// mutation.
    #[serde(with = "humantime_serde")]
    pub store_interval: Duration,
    /// Snapshot file path for the file-backed store.
    pub file_path: Option<PathBuf>,
    /// Load the snapshot file on startup.
    pub restore: bool,
    /// SQLite DSN for the relational store. Takes precedence over
    /// `file_path` when both are set.
    pub database_dsn: Option<String>,
    /// Shared secret for validating the HashSHA256 header.
    pub secret_key: Option<String>,
    /// CIDR allow-list applied to X-Real-IP before ingest.
    pub trusted_subnet: Option<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        CollectorConfig {
            listen_address: "0.0.0.0:8080".parse().expect("valid default listen address"),
            grpc_address: None,
            store_interval: Duration::from_secs(300),
            file_path: None,
            restore: true,
            database_dsn: None,
            secret_key: None,
            trusted_subnet: None,
        }
    }
}

impl CollectorConfig {
    /// Validates the subnet spec and storage selection.
    pub fn validate(&self) -> Result<()> {
        if let Some(subnet) = &self.trusted_subnet {
            subnet
                .parse::<ip_network::IpNetwork>()
                .map_err(|e| VigilError::config(format!("invalid trusted subnet {subnet}: {e}")))?;
        }
        if let Some(path) = &self.file_path {
            if path.as_os_str().is_empty() {
                return Err(VigilError::config("snapshot file path must not be empty"));
            }
        }
        Ok(())
    }

    /// True when the file store should flush after every mutation instead
    /// of on a timer.
    pub fn sync_save(&self) -> bool {
        self.store_interval.is_zero()
    }
}

/// Parses a YAML document into a config section.
pub fn from_yaml<T: for<'de> Deserialize<'de>>(content: &str) -> Result<T> {
    serde_yaml::from_str(content).map_err(|e| VigilError::config(format!("invalid YAML config: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        AgentConfig::default().validate().unwrap();
        CollectorConfig::default().validate().unwrap();
    }

    #[test]
    fn test_agent_rejects_zero_rate_limit() {
        let config = AgentConfig {
            rate_limit: 0,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_collector_rejects_bad_subnet() {
        let config = CollectorConfig {
            trusted_subnet: Some("not-a-subnet".to_string()),
            ..CollectorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_agent_config() {
        let yaml = r#"
server_address: "http://collector:9090"
poll_interval: 1s
report_interval: 5s
rate_limit: 2
transport: grpc
"#;
        let config: AgentConfig = from_yaml(yaml).unwrap();
        assert_eq!(config.server_address, "http://collector:9090");
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.report_interval, Duration::from_secs(5));
        assert_eq!(config.rate_limit, 2);
        assert_eq!(config.transport, Transport::Grpc);
        // Untouched fields keep their defaults.
        assert_eq!(config.snapshot_buffer, 64);
    }

    #[test]
    fn test_sync_save_mode() {
        let config = CollectorConfig {
            store_interval: Duration::ZERO,
            ..CollectorConfig::default()
        };
        assert!(config.sync_save());
        assert!(!CollectorConfig::default().sync_save());
    }
}
