//! Node and health snapshot types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use super::service::ServiceRuntime;

/// Health verdict for a node or service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthVerdict {
    Healthy,
    Unhealthy,
    Unknown,
}

impl fmt::Display for HealthVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Healthy => "HEALTHY",
            Self::Unhealthy => "UNHEALTHY",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Individual health signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthSignal {
    ProcessAlive,
    PortOpen,
    Endpoint,
}

impl fmt::Display for HealthSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ProcessAlive => "process",
            Self::PortOpen => "port",
            Self::Endpoint => "endpoint",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalResult {
    pub signal: HealthSignal,
    pub passed: bool,
    pub detail: String,
}

impl SignalResult {
    pub fn pass(signal: HealthSignal, detail: impl Into<String>) -> Self {
        Self {
            signal,
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(signal: HealthSignal, detail: impl Into<String>) -> Self {
        Self {
            signal,
            passed: false,
            detail: detail.into(),
        }
    }
}

/// Health of one service, with every configured signal reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub service_name: String,
    pub healthy: bool,
    pub signals: Vec<SignalResult>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    /// Healthy only if every signal passed
    pub fn from_signals(service_name: impl Into<String>, signals: Vec<SignalResult>) -> Self {
        Self {
            service_name: service_name.into(),
            healthy: !signals.is_empty() && signals.iter().all(|s| s.passed),
            signals,
            checked_at: Utc::now(),
        }
    }

    pub fn failed(&self) -> impl Iterator<Item = &SignalResult> {
        self.signals.iter().filter(|s| !s.passed)
    }

    /// `port: connection refused; endpoint: ...`, or `healthy`
    pub fn describe(&self) -> String {
        if self.healthy {
            return "healthy".to_string();
        }
        self.failed()
            .map(|s| format!("{}: {}", s.signal, s.detail))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Periodic node snapshot pushed by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub node_id: String,
    pub node_name: String,
    /// RUNNING, PARTIAL, STOPPED or NONE across managed services
    pub service_status: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceRuntime>,
    pub cpu_usage: f32,
    pub memory_usage: f32,
    pub health_status: HealthVerdict,
    pub last_heartbeat: DateTime<Utc>,
    pub last_deploy_time: Option<DateTime<Utc>>,
    pub last_deploy_version: Option<String>,
    pub uptime_secs: u64,
}

impl NodeStatus {
    /// Whether the last heartbeat is older than `max_age`
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        let age = now.signed_duration_since(self.last_heartbeat);
        age.to_std().map(|a| a > max_age).unwrap_or(false)
    }
}

/// Periodic health snapshot pushed by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub node_id: String,
    pub status: HealthVerdict,
    pub check_time: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub reports: Vec<HealthReport>,
    pub last_deploy_time: Option<DateTime<Utc>>,
    pub last_deploy_version: Option<String>,
}

impl HealthStatus {
    /// Folds service reports into a node verdict; no services means UNKNOWN
    pub fn verdict(reports: &[HealthReport]) -> HealthVerdict {
        if reports.is_empty() {
            HealthVerdict::Unknown
        } else if reports.iter().all(|r| r.healthy) {
            HealthVerdict::Healthy
        } else {
            HealthVerdict::Unhealthy
        }
    }
}
