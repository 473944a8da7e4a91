//! Health checks
//!
//! Combines process liveness, a TCP port check and an optional HTTP
//! endpoint into one report per service. Every configured signal is
//! reported on its own so a failing check names the signal that failed.

use async_trait::async_trait;
use convoy_core::domain::node::{HealthReport, HealthSignal, SignalResult};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{Instant, sleep, timeout};
use tracing::debug;

use crate::config::{Config, ManagedService};

const CHECK_TIMEOUT: Duration = Duration::from_secs(3);

/// Source of process liveness for a service
#[async_trait]
pub trait ProcessLiveness: Send + Sync {
    /// PID of the live process, if any
    async fn live_pid(&self, service: &str) -> Option<u32>;
}

/// Whether something accepts TCP connections on `127.0.0.1:port`
pub async fn port_open(port: u16, within: Duration) -> bool {
    matches!(
        timeout(within, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

pub struct HealthChecker {
    liveness: Arc<dyn ProcessLiveness>,
    services: HashMap<String, ManagedService>,
    http: reqwest::Client,
}

impl HealthChecker {
    pub fn new(config: &Config, liveness: Arc<dyn ProcessLiveness>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(CHECK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            liveness,
            services: config.services.clone(),
            http,
        }
    }

    /// Runs every configured signal for `service`
    pub async fn check_health(&self, service: &str) -> HealthReport {
        let mut signals = Vec::with_capacity(3);

        signals.push(match self.liveness.live_pid(service).await {
            Some(pid) => SignalResult::pass(HealthSignal::ProcessAlive, format!("pid {}", pid)),
            None => SignalResult::fail(HealthSignal::ProcessAlive, "process not running"),
        });

        let definition = self.services.get(service);

        if let Some(port) = definition.and_then(|s| s.port) {
            signals.push(if port_open(port, CHECK_TIMEOUT).await {
                SignalResult::pass(HealthSignal::PortOpen, format!("port {} open", port))
            } else {
                SignalResult::fail(
                    HealthSignal::PortOpen,
                    format!("port {} not accepting connections", port),
                )
            });
        }

        if let Some(url) = definition.and_then(|s| s.health_url.as_deref()) {
            signals.push(self.check_endpoint(url).await);
        }

        let report = HealthReport::from_signals(service, signals);
        debug!("Health of {}: {}", service, report.describe());
        report
    }

    /// Re-checks until healthy or the window closes; returns the last report
    pub async fn verify(&self, service: &str, window: Duration, interval: Duration) -> HealthReport {
        let deadline = Instant::now() + window;
        loop {
            let report = self.check_health(service).await;
            if report.healthy || Instant::now() >= deadline {
                return report;
            }
            sleep(interval).await;
        }
    }

    async fn check_endpoint(&self, url: &str) -> SignalResult {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                return SignalResult::fail(HealthSignal::Endpoint, format!("{}: {}", url, e));
            }
        };

        let status = response.status();
        match response.text().await {
            Ok(body) if status.is_success() && body.contains("UP") => {
                SignalResult::pass(HealthSignal::Endpoint, format!("{} reports UP", url))
            }
            Ok(_) => SignalResult::fail(
                HealthSignal::Endpoint,
                format!("{} returned {} without UP", url, status),
            ),
            Err(e) => SignalResult::fail(HealthSignal::Endpoint, format!("{}: {}", url, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    struct FixedPid(Option<u32>);

    #[async_trait]
    impl ProcessLiveness for FixedPid {
        async fn live_pid(&self, _service: &str) -> Option<u32> {
            self.0
        }
    }

    fn checker(service: ManagedService, pid: Option<u32>) -> HealthChecker {
        let config = Config::default().with_service(service);
        HealthChecker::new(&config, Arc::new(FixedPid(pid)))
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_alive_process_with_closed_port_is_unhealthy() {
        let port = closed_port().await;
        let checker = checker(
            ManagedService {
                name: "api".to_string(),
                port: Some(port),
                health_url: None,
            },
            Some(42),
        );

        let report = checker.check_health("api").await;
        assert!(!report.healthy);
        assert_eq!(report.signals.len(), 2);

        let failed: Vec<_> = report.failed().map(|s| s.signal).collect();
        assert_eq!(failed, vec![HealthSignal::PortOpen]);
    }

    #[tokio::test]
    async fn test_open_port_and_up_endpoint_is_healthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let body = r#"{"status":"UP"}"#;
                let response = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        let checker = checker(
            ManagedService {
                name: "api".to_string(),
                port: Some(port),
                health_url: Some(format!("http://127.0.0.1:{}/health", port)),
            },
            Some(42),
        );

        let report = checker.check_health("api").await;
        assert!(report.healthy, "{}", report.describe());
        assert_eq!(report.signals.len(), 3);
    }

    #[tokio::test]
    async fn test_dead_process_fails_within_window() {
        let checker = checker(
            ManagedService {
                name: "worker".to_string(),
                port: None,
                health_url: None,
            },
            None,
        );

        let report = checker
            .verify("worker", Duration::from_millis(100), Duration::from_millis(20))
            .await;
        assert!(!report.healthy);
        assert_eq!(report.describe(), "process: process not running");
    }
}
