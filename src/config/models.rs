//! Process configuration for the gateway.
//!
//! These types map directly to YAML / JSON / TOML configuration files and to
//! `INGRESS_GATEWAY_*` environment variables. Every field has a default, so an
//! empty file (or none at all) yields a runnable configuration.
use std::{
    net::{AddrParseError, IpAddr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use serde::{Deserialize, Serialize};

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `ingress_gateway=debug,info`
    pub level: String,
    /// JSON lines when true, human readable output otherwise
    pub json: bool,
    /// Include span context in JSON output
    pub include_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
            include_spans: false,
        }
    }
}

/// Main server configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address both listeners bind to
    pub host: String,
    /// Plain HTTP port
    pub port: u16,
    /// TLS port
    pub tls_port: u16,
    /// Cluster manifest: a file path, or an `http(s)://` URL to poll
    pub cluster_source: String,
    /// Quiet period after the last change before the routing table is rebuilt
    pub quiescence_window: String,
    /// Poll interval for HTTP cluster sources
    pub poll_interval: String,
    /// Unconditional rebuild period; also retries after failed rebuilds
    pub resync_interval: String,
    /// Upper bound for draining in-flight requests on shutdown
    pub shutdown_timeout: String,
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
            tls_port: 443,
            cluster_source: "cluster.yaml".to_string(),
            quiescence_window: "1s".to_string(),
            poll_interval: "10s".to_string(),
            resync_interval: "60s".to_string(),
            shutdown_timeout: "30s".to_string(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Where cluster state comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterSource {
    File(PathBuf),
    Http(String),
}

impl ClusterSource {
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            ClusterSource::Http(source.to_string())
        } else {
            ClusterSource::File(PathBuf::from(source))
        }
    }
}

impl ServerConfig {
    pub fn bind_ip(&self) -> Result<IpAddr, AddrParseError> {
        self.host.parse()
    }

    pub fn plain_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.port))
    }

    pub fn tls_addr(&self) -> Result<SocketAddr, AddrParseError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.tls_port))
    }

    pub fn source_kind(&self) -> ClusterSource {
        ClusterSource::parse(&self.cluster_source)
    }

    pub fn quiescence_window_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.quiescence_window)
    }

    pub fn poll_interval_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.poll_interval)
    }

    pub fn resync_interval_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.resync_interval)
    }

    pub fn shutdown_timeout_duration(&self) -> Result<Duration, humantime::DurationError> {
        humantime::parse_duration(&self.shutdown_timeout)
    }
}
