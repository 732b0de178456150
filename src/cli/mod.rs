//! Command-line interfaces for the agent and collector binaries.
//!
//! Both parsers follow the same precedence: CLI arguments over environment
//! variables over an optional YAML config file over defaults. Flags left
//! unset fall through to the next layer instead of clobbering it.

use crate::core::{config, AgentConfig, CollectorConfig, Result, Transport, VigilError};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::watch;

/// Metrics agent: samples the local host and pushes batches to a collector.
#[derive(Parser, Debug)]
#[command(name = "vigil-agent")]
#[command(version, about, long_about = None)]
pub struct AgentCli {
    /// Collector address to push to
    #[arg(short = 'a', long, env = "VIGIL_SERVER_ADDRESS")]
    pub server_address: Option<String>,

    /// Sampling interval, e.g. 2s
    #[arg(short = 'p', long, env = "VIGIL_POLL_INTERVAL", value_parser = parse_duration)]
    pub poll_interval: Option<std::time::Duration>,

    /// Reporting interval, e.g. 10s
    #[arg(short = 'r', long, env = "VIGIL_REPORT_INTERVAL", value_parser = parse_duration)]
    pub report_interval: Option<std::time::Duration>,

    /// Number of concurrent delivery workers
    #[arg(short = 'l', long, env = "VIGIL_RATE_LIMIT")]
    pub rate_limit: Option<usize>,

    /// Shared secret for body signing
    #[arg(short = 'k', long, env = "VIGIL_SECRET_KEY")]
    pub secret_key: Option<String>,

    /// Delivery transport: http or grpc
    #[arg(short = 't', long, env = "VIGIL_TRANSPORT")]
    pub transport: Option<Transport>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, env = "VIGIL_DEBUG")]
    pub debug: bool,
}

/// Metrics collector: accepts pushed batches and serves the merged store.
#[derive(Parser, Debug)]
#[command(name = "vigil-collector")]
#[command(version, about, long_about = None)]
pub struct CollectorCli {
    /// HTTP listen address
    #[arg(short = 'a', long, env = "VIGIL_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// GRPC listen address (enables the RPC ingest surface)
    #[arg(short = 'g', long, env = "VIGIL_GRPC_ADDRESS")]
    pub grpc_address: Option<SocketAddr>,

    /// Snapshot save cadence; 0s saves synchronously after every mutation
    #[arg(short = 'i', long, env = "VIGIL_STORE_INTERVAL", value_parser = parse_duration)]
    pub store_interval: Option<std::time::Duration>,

    /// Snapshot file path for the file-backed store
    #[arg(short = 'f', long, env = "VIGIL_FILE_STORAGE_PATH")]
    pub file_path: Option<PathBuf>,

    /// Skip loading the snapshot file on startup
    #[arg(long, env = "VIGIL_NO_RESTORE")]
    pub no_restore: bool,

    /// Database DSN for the relational store
    #[arg(short = 'd', long, env = "VIGIL_DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Shared secret for validating body signatures
    #[arg(short = 'k', long, env = "VIGIL_SECRET_KEY")]
    pub secret_key: Option<String>,

    /// CIDR allow-list applied to X-Real-IP
    #[arg(short = 's', long, env = "VIGIL_TRUSTED_SUBNET")]
    pub trusted_subnet: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, env = "VIGIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, env = "VIGIL_DEBUG")]
    pub debug: bool,
}

fn parse_duration(s: &str) -> std::result::Result<std::time::Duration, String> {
    // Accept both humantime forms ("10s") and bare seconds ("10").
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(std::time::Duration::from_secs(secs));
    }
    humantime::parse_duration(s).map_err(|e| format!("invalid duration {s:?}: {e}"))
}

/// Installs the tracing subscriber with the usual EnvFilter override.
pub fn init_logging(debug: bool) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact(),
        )
        .try_init()
        .map_err(|e| VigilError::config(format!("failed to initialize logging: {e}")))?;

    Ok(())
}

async fn load_yaml_config<T>(path: &Option<PathBuf>) -> Result<Option<T>>
where
    T: for<'de> serde::Deserialize<'de>,
{
    let Some(path) = path else {
        return Ok(None);
    };
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        VigilError::config(format!("failed to read config file {}: {e}", path.display()))
    })?;
    tracing::info!(path = %path.display(), "loaded configuration file");
    Ok(Some(config::from_yaml(&content)?))
}

impl AgentCli {
    pub fn parse_args() -> Self {
        AgentCli::parse()
    }

    /// Builds the effective config from file plus CLI/env overrides.
    pub async fn load_config(&self) -> Result<AgentConfig> {
        let mut config: AgentConfig = load_yaml_config(&self.config).await?.unwrap_or_default();

        if let Some(address) = &self.server_address {
            config.server_address = address.clone();
        }
        if let Some(interval) = self.poll_interval {
            config.poll_interval = interval;
        }
        if let Some(interval) = self.report_interval {
            config.report_interval = interval;
        }
        if let Some(limit) = self.rate_limit {
            config.rate_limit = limit;
        }
        if let Some(key) = &self.secret_key {
            config.secret_key = Some(key.clone());
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }

        config.validate()?;
        Ok(config)
    }
}

impl CollectorCli {
    pub fn parse_args() -> Self {
        CollectorCli::parse()
    }

    /// Builds the effective config from file plus CLI/env overrides.
    pub async fn load_config(&self) -> Result<CollectorConfig> {
        let mut config: CollectorConfig = load_yaml_config(&self.config).await?.unwrap_or_default();

        if let Some(address) = self.listen_address {
            config.listen_address = address;
        }
        if let Some(address) = self.grpc_address {
            config.grpc_address = Some(address);
        }
        if let Some(interval) = self.store_interval {
            config.store_interval = interval;
        }
        if let Some(path) = &self.file_path {
            config.file_path = Some(path.clone());
        }
        if self.no_restore {
            config.restore = false;
        }
        if let Some(dsn) = &self.database_dsn {
            config.database_dsn = Some(dsn.clone());
        }
        if let Some(key) = &self.secret_key {
            config.secret_key = Some(key.clone());
        }
        if let Some(subnet) = &self.trusted_subnet {
            config.trusted_subnet = Some(subnet.clone());
        }

        config.validate()?;
        Ok(config)
    }
}

/// Builds a cancellation signal flipped on Ctrl-C.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %error, "failed to listen for shutdown signal");
            return;
        }
        tracing::info!("shutdown signal received");
        let _ = tx.send(true);
    });
    rx
}

/// Agent binary entry point.
pub async fn run_agent() -> Result<()> {
    let cli = AgentCli::parse_args();
    init_logging(cli.debug)?;
    let config = cli.load_config().await?;
    crate::agent::run(config, shutdown_signal()).await
}

/// Collector binary entry point.
pub async fn run_collector() -> Result<()> {
    let cli = CollectorCli::parse_args();
    init_logging(cli.debug)?;
    let config = cli.load_config().await?;
    crate::collector::run(config, shutdown_signal()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_forms() {
        assert_eq!(parse_duration("10").unwrap(), std::time::Duration::from_secs(10));
        assert_eq!(parse_duration("2s").unwrap(), std::time::Duration::from_secs(2));
        assert_eq!(
            parse_duration("500ms").unwrap(),
            std::time::Duration::from_millis(500)
        );
        assert!(parse_duration("nope").is_err());
    }

    #[tokio::test]
    async fn test_agent_cli_overrides_defaults() {
        let cli = AgentCli::try_parse_from([
            "vigil-agent",
            "-a",
            "http://collector:9090",
            "-p",
            "1s",
            "-l",
            "5",
        ])
        .unwrap();
        let config = cli.load_config().await.unwrap();
        assert_eq!(config.server_address, "http://collector:9090");
        assert_eq!(config.poll_interval, std::time::Duration::from_secs(1));
        assert_eq!(config.rate_limit, 5);
        // Unset flags keep their defaults.
        assert_eq!(config.report_interval, std::time::Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_collector_cli_sync_save() {
        let cli =
            CollectorCli::try_parse_from(["vigil-collector", "-i", "0", "-f", "/tmp/m.json"])
                .unwrap();
        let config = cli.load_config().await.unwrap();
        assert!(config.sync_save());
        assert_eq!(config.file_path.as_deref(), Some(std::path::Path::new("/tmp/m.json")));
    }

    #[tokio::test]
    async fn test_missing_config_file_is_an_error() {
        let cli = AgentCli::try_parse_from(["vigil-agent", "-c", "/nonexistent/vigil.yaml"])
            .unwrap();
        assert!(cli.load_config().await.is_err());
    }
}
