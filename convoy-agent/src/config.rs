//! Agent configuration
//!
//! Node identity, coordination store connection, polling and process
//! lifecycle timeouts, and the optional catalog of managed services.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A service this node manages, with its optional health signals
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManagedService {
    pub name: String,
    #[serde(default)]
    pub port: Option<u16>,
    /// Endpoint whose body must contain `UP`
    #[serde(default)]
    pub health_url: Option<String>,
}

/// Agent configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier of this node; also names its task queue
    pub node_id: String,

    /// Human-readable node name
    pub node_name: String,

    pub redis_url: String,
    pub redis_pool_size: usize,

    /// Root of the managed service directories (`<work_dir>/<service>`)
    pub work_dir: PathBuf,

    /// Upper bound on one blocking queue pop
    pub poll_timeout: Duration,

    /// How often node and health snapshots are pushed
    pub report_interval: Duration,

    pub max_parallel_tasks: usize,

    pub start_timeout: Duration,

    /// Grace period between SIGTERM and SIGKILL
    pub stop_timeout: Duration,

    /// Settle delay between stop and start on restart
    pub restart_delay: Duration,

    /// How long post-start health verification keeps retrying
    pub health_retry_window: Duration,
    pub health_retry_interval: Duration,

    /// HTTP artifact download timeouts
    pub connect_timeout: Duration,
    pub read_timeout: Duration,

    pub services: HashMap<String, ManagedService>,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(node_id: String, redis_url: String) -> Self {
        Self {
            node_name: node_id.clone(),
            node_id,
            redis_url,
            redis_pool_size: 8,
            work_dir: PathBuf::from("/tmp/agent"),
            poll_timeout: Duration::from_secs(1),
            report_interval: Duration::from_secs(30),
            max_parallel_tasks: 2,
            start_timeout: Duration::from_secs(60),
            stop_timeout: Duration::from_secs(30),
            restart_delay: Duration::from_secs(2),
            health_retry_window: Duration::from_secs(30),
            health_retry_interval: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(60),
            services: HashMap::new(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - NODE_ID (required)
    /// - NODE_NAME (optional, default: NODE_ID)
    /// - REDIS_URL (optional, default: redis://127.0.0.1:6379)
    /// - WORK_DIR (optional, default: /tmp/agent)
    /// - POLL_TIMEOUT (optional, seconds, default: 1)
    /// - REPORT_INTERVAL (optional, seconds, default: 30)
    /// - MAX_PARALLEL_TASKS (optional, default: 2)
    /// - START_TIMEOUT, STOP_TIMEOUT, RESTART_DELAY (optional, seconds)
    /// - HEALTH_RETRY_WINDOW (optional, seconds, default: 30)
    /// - SERVICES_FILE (optional, JSON array of managed services)
    pub fn from_env() -> anyhow::Result<Self> {
        let node_id = std::env::var("NODE_ID")
            .map_err(|_| anyhow::anyhow!("NODE_ID environment variable not set"))?;
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let mut config = Self::new(node_id, redis_url);

        if let Ok(name) = std::env::var("NODE_NAME") {
            config.node_name = name;
        }
        if let Ok(dir) = std::env::var("WORK_DIR") {
            config.work_dir = PathBuf::from(dir);
        }

        let secs = |name: &str, default: Duration| {
            std::env::var(name)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };
        config.poll_timeout = secs("POLL_TIMEOUT", config.poll_timeout);
        config.report_interval = secs("REPORT_INTERVAL", config.report_interval);
        config.start_timeout = secs("START_TIMEOUT", config.start_timeout);
        config.stop_timeout = secs("STOP_TIMEOUT", config.stop_timeout);
        config.restart_delay = secs("RESTART_DELAY", config.restart_delay);
        config.health_retry_window = secs("HEALTH_RETRY_WINDOW", config.health_retry_window);

        config.max_parallel_tasks = std::env::var("MAX_PARALLEL_TASKS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(config.max_parallel_tasks);

        if let Ok(path) = std::env::var("SERVICES_FILE") {
            for service in load_services(Path::new(&path))? {
                config.services.insert(service.name.clone(), service);
            }
        }

        Ok(config)
    }

    /// Adds a managed service definition
    pub fn with_service(mut self, service: ManagedService) -> Self {
        self.services.insert(service.name.clone(), service);
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_id.is_empty() {
            anyhow::bail!("node_id cannot be empty");
        }

        convoy_core::keys::validate_segment("node id", &self.node_id)?;
        for name in self.services.keys() {
            convoy_core::keys::validate_segment("service name", name)?;
        }

        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            anyhow::bail!("redis_url must start with redis:// or rediss://");
        }

        if self.poll_timeout.is_zero() {
            anyhow::bail!("poll_timeout must be greater than 0");
        }

        if self.report_interval.is_zero() {
            anyhow::bail!("report_interval must be greater than 0");
        }

        if self.max_parallel_tasks == 0 {
            anyhow::bail!("max_parallel_tasks must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            uuid::Uuid::new_v4().to_string(),
            "redis://127.0.0.1:6379".to_string(),
        )
    }
}

/// Reads a JSON array of managed services
pub fn load_services(path: &Path) -> anyhow::Result<Vec<ManagedService>> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    let services: Vec<ManagedService> = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("invalid services file {}: {}", path.display(), e))?;
    Ok(services)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.poll_timeout, Duration::from_secs(1));
        assert_eq!(config.report_interval, Duration::from_secs(30));
        assert_eq!(config.max_parallel_tasks, 2);
        assert_eq!(config.node_name, config.node_id);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.node_id = "node:1".to_string();
        assert!(config.validate().is_err());

        config.node_id = "node-1".to_string();
        config.redis_url = "http://localhost".to_string();
        assert!(config.validate().is_err());

        config.redis_url = "redis://localhost:6379".to_string();
        config.max_parallel_tasks = 0;
        assert!(config.validate().is_err());

        config.max_parallel_tasks = 1;
        assert!(config.validate().is_ok());

        config.node_id = "../n1".to_string();
        assert!(config.validate().is_err());

        config.node_id = "node-1".to_string();
        let config = config.with_service(ManagedService {
            name: "/etc".to_string(),
            port: None,
            health_url: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_services() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        std::fs::write(
            &path,
            r#"[{"name": "api", "port": 8081, "health_url": "http://127.0.0.1:8081/health"},
                {"name": "worker"}]"#,
        )
        .unwrap();

        let services = load_services(&path).unwrap();
        assert_eq!(services.len(), 2);
        assert_eq!(services[0].port, Some(8081));
        assert_eq!(services[1].port, None);

        let config = Config::default().with_service(services[1].clone());
        assert!(config.services.contains_key("worker"));
    }
}
