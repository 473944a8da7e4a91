//! Controller configuration
//!
//! Built once at startup from environment variables and shared by reference
//! with every service.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::service::distribution::DEFAULT_HTTP_THRESHOLD;

/// A deployable service known to the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    pub name: String,
    /// Artifact used by catalog-wide deploys
    pub artifact_path: PathBuf,
    pub target_nodes: Vec<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Coordination store URL (e.g., "redis://127.0.0.1:6379")
    pub redis_url: String,

    /// Maximum pooled store connections
    pub redis_pool_size: usize,

    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Base URL agents use to download HTTP-distributed artifacts
    pub public_base_url: String,

    /// Directory mounted by every node for SHARED_STORAGE transfers
    pub shared_dir: PathBuf,

    /// Directory served under /artifacts for HTTP transfers
    pub serve_dir: PathBuf,

    /// Where every deployed version is kept for rollback
    pub backup_dir: PathBuf,

    /// Where uploaded artifacts land
    pub upload_dir: PathBuf,

    /// Relative build references are resolved against this directory
    pub artifact_root: PathBuf,

    /// Artifacts at or above this size go over HTTP
    pub http_threshold: u64,

    /// When false, the SHARED_STORAGE band falls through to HTTP
    pub shared_storage_enabled: bool,

    /// Versions kept per service
    pub max_versions: usize,

    /// How long a rollback waits for every node to finish
    pub rollback_timeout: Duration,

    pub rollback_poll_interval: Duration,

    /// Agent report interval; nodes silent for three intervals are stale
    pub report_interval: Duration,

    pub services: Vec<ServiceDefinition>,
}

impl Config {
    /// Creates a new configuration with defaults rooted at `data_dir`
    pub fn new(redis_url: String, data_dir: &Path) -> Self {
        Self {
            redis_url,
            redis_pool_size: 16,
            bind_addr: "0.0.0.0:8080".to_string(),
            public_base_url: "http://localhost:8080".to_string(),
            shared_dir: data_dir.join("shared"),
            serve_dir: data_dir.join("deploy"),
            backup_dir: data_dir.join("backup"),
            upload_dir: data_dir.join("upload"),
            artifact_root: data_dir.join("builds"),
            http_threshold: DEFAULT_HTTP_THRESHOLD,
            shared_storage_enabled: true,
            max_versions: 20,
            rollback_timeout: Duration::from_secs(300),
            rollback_poll_interval: Duration::from_secs(2),
            report_interval: Duration::from_secs(30),
            services: Vec::new(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - REDIS_URL (optional, default: redis://127.0.0.1:6379)
    /// - CONVOY_DATA_DIR (optional, default: /var/lib/convoy)
    /// - CONTROLLER_BIND_ADDR (optional, default: 0.0.0.0:8080)
    /// - PUBLIC_BASE_URL (optional, default: http://localhost:8080)
    /// - SHARED_DIR, SERVE_DIR, BACKUP_DIR, UPLOAD_DIR, ARTIFACT_ROOT (optional)
    /// - HTTP_THRESHOLD_BYTES (optional, default: 524288000)
    /// - SHARED_STORAGE_ENABLED (optional, default: true)
    /// - MAX_VERSIONS (optional, default: 20)
    /// - ROLLBACK_TIMEOUT (optional, seconds, default: 300)
    /// - REPORT_INTERVAL (optional, seconds, default: 30)
    /// - SERVICES_FILE (optional, JSON array of service definitions)
    pub fn from_env() -> anyhow::Result<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let data_dir = std::env::var("CONVOY_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/var/lib/convoy"));

        let mut config = Self::new(redis_url, &data_dir);

        if let Ok(addr) = std::env::var("CONTROLLER_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(url) = std::env::var("PUBLIC_BASE_URL") {
            config.public_base_url = url.trim_end_matches('/').to_string();
        }

        let dir = |name: &str, default: PathBuf| {
            std::env::var(name).map(PathBuf::from).unwrap_or(default)
        };
        config.shared_dir = dir("SHARED_DIR", config.shared_dir);
        config.serve_dir = dir("SERVE_DIR", config.serve_dir);
        config.backup_dir = dir("BACKUP_DIR", config.backup_dir);
        config.upload_dir = dir("UPLOAD_DIR", config.upload_dir);
        config.artifact_root = dir("ARTIFACT_ROOT", config.artifact_root);

        config.redis_pool_size = std::env::var("REDIS_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(config.redis_pool_size);

        config.http_threshold = std::env::var("HTTP_THRESHOLD_BYTES")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_HTTP_THRESHOLD);

        config.shared_storage_enabled = std::env::var("SHARED_STORAGE_ENABLED")
            .ok()
            .and_then(|s| s.parse::<bool>().ok())
            .unwrap_or(true);

        config.max_versions = std::env::var("MAX_VERSIONS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(config.max_versions);

        config.rollback_timeout = std::env::var("ROLLBACK_TIMEOUT")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.rollback_timeout);

        config.report_interval = std::env::var("REPORT_INTERVAL")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(config.report_interval);

        if let Ok(path) = std::env::var("SERVICES_FILE") {
            config.services = load_services(Path::new(&path))?;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.redis_url.is_empty() {
            anyhow::bail!("redis_url cannot be empty");
        }

        if !self.public_base_url.starts_with("http://")
            && !self.public_base_url.starts_with("https://")
        {
            anyhow::bail!("public_base_url must start with http:// or https://");
        }

        if self.http_threshold <= crate::service::distribution::INLINE_LIMIT {
            anyhow::bail!("http_threshold must be larger than the inline limit");
        }

        if self.max_versions < 2 {
            anyhow::bail!("max_versions must be at least 2 to allow rollback");
        }

        if self.rollback_poll_interval.is_zero() || self.report_interval.is_zero() {
            anyhow::bail!("intervals must be greater than 0");
        }

        for service in &self.services {
            convoy_core::keys::validate_segment("service name", &service.name)?;
            if service.target_nodes.is_empty() {
                anyhow::bail!("service {} has no target nodes", service.name);
            }
        }

        Ok(())
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDefinition> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Heartbeat age after which a node is reported stale
    pub fn stale_after(&self) -> Duration {
        self.report_interval * 3
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            "redis://127.0.0.1:6379".to_string(),
            Path::new("/var/lib/convoy"),
        )
    }
}

fn load_services(path: &Path) -> anyhow::Result<Vec<ServiceDefinition>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read services file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse services file {}", path.display()))
}
