//! Process lifecycle manager
//!
//! Starts, stops and supervises managed services. Each service runs as a
//! detached process group under `<work_dir>/<service>` with its output
//! appended to `<service>.log` and its PID recorded in `<service>.pid`.
//!
//! State per service lives behind its own async mutex: operations on one
//! service serialize, different services never contend.

use async_trait::async_trait;
use convoy_core::domain::service::{ServiceRuntime, ServiceState};
use convoy_core::{Error, Result, keys};
use dashmap::DashMap;
use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use super::health::{ProcessLiveness, port_open};
use crate::config::Config;

const READINESS_POLL: Duration = Duration::from_millis(200);
const EXIT_POLL: Duration = Duration::from_millis(100);
const KILL_WAIT: Duration = Duration::from_secs(5);

struct ServiceSlot {
    state: ServiceState,
    child: Option<Child>,
    pid: Option<u32>,
    last_error: Option<String>,
}

impl Default for ServiceSlot {
    fn default() -> Self {
        Self {
            state: ServiceState::Stopped,
            child: None,
            pid: None,
            last_error: None,
        }
    }
}

pub struct ProcessManager {
    work_dir: PathBuf,
    ports: HashMap<String, u16>,
    configured: BTreeSet<String>,
    start_timeout: Duration,
    stop_timeout: Duration,
    restart_delay: Duration,
    slots: DashMap<String, Arc<Mutex<ServiceSlot>>>,
}

impl ProcessManager {
    pub fn new(config: &Config) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            ports: config
                .services
                .values()
                .filter_map(|s| s.port.map(|p| (s.name.clone(), p)))
                .collect(),
            configured: config.services.keys().cloned().collect(),
            start_timeout: config.start_timeout,
            stop_timeout: config.stop_timeout,
            restart_delay: config.restart_delay,
            slots: DashMap::new(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn service_dir(&self, service: &str) -> PathBuf {
        self.work_dir.join(service)
    }

    pub fn pid_file(&self, service: &str) -> PathBuf {
        self.service_dir(service).join(format!("{}.pid", service))
    }

    pub fn log_file(&self, service: &str) -> PathBuf {
        self.service_dir(service).join(format!("{}.log", service))
    }

    /// Configured services plus any service this manager has touched
    pub fn managed_services(&self) -> Vec<String> {
        let mut names = self.configured.clone();
        names.extend(self.slots.iter().map(|e| e.key().clone()));
        names.into_iter().collect()
    }

    fn slot(&self, service: &str) -> Arc<Mutex<ServiceSlot>> {
        self.slots
            .entry(service.to_string())
            .or_default()
            .value()
            .clone()
    }

    /// Starts a service and returns its PID; a no-op if already running
    pub async fn start(&self, service: &str) -> Result<u32> {
        keys::validate_segment("service name", service)?;
        let slot = self.slot(service);
        let mut slot = slot.lock().await;
        self.start_locked(service, &mut slot).await
    }

    /// Stops a service: SIGTERM, then SIGKILL after the grace period
    pub async fn stop(&self, service: &str) -> Result<()> {
        keys::validate_segment("service name", service)?;
        let slot = self.slot(service);
        let mut slot = slot.lock().await;
        self.stop_locked(service, &mut slot).await
    }

    /// Stops, waits the settle delay, starts again
    pub async fn restart(&self, service: &str) -> Result<u32> {
        keys::validate_segment("service name", service)?;
        let slot = self.slot(service);
        let mut slot = slot.lock().await;

        self.stop_locked(service, &mut slot).await?;
        sleep(self.restart_delay).await;

        self.start_locked(service, &mut slot).await.map_err(|e| {
            Error::process(format!(
                "{} stopped but failed to start: {}",
                service,
                e.message()
            ))
        })
    }

    /// Reconciles the in-memory handle with the PID file
    ///
    /// A PID file whose process is gone is removed.
    pub async fn is_running(&self, service: &str) -> bool {
        if keys::validate_segment("service name", service).is_err() {
            return false;
        }
        let slot = self.slot(service);
        let mut slot = slot.lock().await;
        self.refresh(service, &mut slot).await.is_some()
    }

    pub async fn runtime(&self, service: &str) -> ServiceRuntime {
        let slot = self.slot(service);
        let mut slot = slot.lock().await;
        let pid = self.refresh(service, &mut slot).await;

        ServiceRuntime {
            service_name: service.to_string(),
            state: slot.state,
            pid,
            pid_file: self.pid_file(service),
            running: pid.is_some(),
            healthy: None,
            last_error: slot.last_error.clone(),
        }
    }

    /// Reconciles every service directory that holds a PID file
    ///
    /// Called once at agent start so the first snapshot is accurate.
    pub async fn recover(&self) -> Vec<String> {
        let mut candidates: BTreeSet<String> = self.configured.clone();

        match tokio::fs::read_dir(&self.work_dir).await {
            Ok(mut entries) => {
                while let Ok(Some(entry)) = entries.next_entry().await {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if keys::validate_segment("service name", &name).is_err() {
                        continue;
                    }
                    if tokio::fs::try_exists(self.pid_file(&name))
                        .await
                        .unwrap_or(false)
                    {
                        candidates.insert(name);
                    }
                }
            }
            Err(e) => debug!("Cannot scan {}: {}", self.work_dir.display(), e),
        }

        let mut running = Vec::new();
        for service in candidates {
            if self.is_running(&service).await {
                info!("Recovered running service {}", service);
                running.push(service);
            }
        }
        running
    }

    async fn start_locked(&self, service: &str, slot: &mut ServiceSlot) -> Result<u32> {
        if let Some(pid) = self.refresh(service, slot).await {
            debug!("{} already running (pid {})", service, pid);
            slot.state = ServiceState::Running;
            return Ok(pid);
        }

        slot.state = ServiceState::Starting;
        slot.last_error = None;

        match self.launch(service, slot).await {
            Ok(pid) => {
                slot.state = ServiceState::Running;
                info!("Started {} (pid {})", service, pid);
                Ok(pid)
            }
            Err(e) => {
                slot.state = ServiceState::Error;
                slot.last_error = Some(e.message().to_string());
                warn!("Failed to start {}: {}", service, e);
                Err(e)
            }
        }
    }

    async fn launch(&self, service: &str, slot: &mut ServiceSlot) -> Result<u32> {
        let dir = self.service_dir(service);
        let mut command = launch_command(&dir, service)?;

        let log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file(service))
            .map_err(|e| Error::process(format!("failed to open log for {}: {}", service, e)))?;
        let stderr = log
            .try_clone()
            .map_err(|e| Error::process(format!("failed to open log for {}: {}", service, e)))?;

        command
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr))
            .process_group(0);

        let child = command
            .spawn()
            .map_err(|e| Error::process(format!("failed to launch {}: {}", service, e)))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::process(format!("{} exited before reporting a pid", service)))?;

        slot.child = Some(child);
        slot.pid = Some(pid);

        if let Err(e) = tokio::fs::write(self.pid_file(service), pid.to_string()).await {
            self.kill_now(service, slot, pid).await;
            return Err(Error::process(format!(
                "failed to write pid file for {}: {}",
                service, e
            )));
        }

        self.await_ready(service, slot, pid).await?;
        Ok(pid)
    }

    /// Polls until the process is alive and, with a port configured,
    /// accepting connections
    async fn await_ready(&self, service: &str, slot: &mut ServiceSlot, pid: u32) -> Result<()> {
        let deadline = Instant::now() + self.start_timeout;

        loop {
            sleep(READINESS_POLL).await;

            if !child_alive(slot, pid) {
                slot.child = None;
                slot.pid = None;
                self.remove_pid_file(service).await;
                return Err(Error::process(format!(
                    "{} exited during startup (see {})",
                    service,
                    self.log_file(service).display()
                )));
            }

            let ready = match self.ports.get(service) {
                Some(port) => port_open(*port, READINESS_POLL).await,
                None => true,
            };
            if ready {
                return Ok(());
            }

            if Instant::now() >= deadline {
                self.kill_now(service, slot, pid).await;
                return Err(Error::process(format!(
                    "startup timeout: {} not ready after {}s",
                    service,
                    self.start_timeout.as_secs()
                )));
            }
        }
    }

    async fn stop_locked(&self, service: &str, slot: &mut ServiceSlot) -> Result<()> {
        let Some(pid) = self.refresh(service, slot).await else {
            debug!("{} is not running", service);
            slot.state = ServiceState::Stopped;
            return Ok(());
        };

        slot.state = ServiceState::Stopping;
        info!("Stopping {} (pid {})", service, pid);

        send_signal(pid, Signal::SIGTERM);
        if !wait_exit(slot, pid, self.stop_timeout).await {
            warn!(
                "{} still alive after {}s, sending SIGKILL",
                service,
                self.stop_timeout.as_secs()
            );
            send_signal(pid, Signal::SIGKILL);
            if !wait_exit(slot, pid, KILL_WAIT).await {
                let message = format!("failed to stop {} (pid {})", service, pid);
                slot.state = ServiceState::Error;
                slot.last_error = Some(message.clone());
                return Err(Error::process(message));
            }
        }

        slot.child = None;
        slot.pid = None;
        slot.state = ServiceState::Stopped;
        self.remove_pid_file(service).await;
        info!("Stopped {}", service);
        Ok(())
    }

    async fn kill_now(&self, service: &str, slot: &mut ServiceSlot, pid: u32) {
        send_signal(pid, Signal::SIGKILL);
        if !wait_exit(slot, pid, KILL_WAIT).await {
            warn!("{} (pid {}) survived SIGKILL", service, pid);
        }
        slot.child = None;
        slot.pid = None;
        self.remove_pid_file(service).await;
    }

    /// Returns the live PID, clearing handle and PID file when the process is gone
    async fn refresh(&self, service: &str, slot: &mut ServiceSlot) -> Option<u32> {
        let exited = match slot.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => return slot.pid,
                Ok(Some(status)) => Some(format!("exited with {}", status)),
                Err(e) => Some(format!("wait failed: {}", e)),
            },
            None => None,
        };
        slot.child = None;

        if exited.is_none() {
            if let Some(pid) = self.read_pid(service).await {
                if pid_alive(pid) {
                    slot.pid = Some(pid);
                    if slot.state != ServiceState::Starting {
                        slot.state = ServiceState::Running;
                    }
                    return Some(pid);
                }
                debug!("Removing stale pid file for {} (pid {})", service, pid);
            }
        }

        self.remove_pid_file(service).await;
        slot.pid = None;
        if slot.state == ServiceState::Running {
            match exited {
                Some(reason) => {
                    warn!("{} {}", service, reason);
                    slot.state = ServiceState::Error;
                    slot.last_error = Some(reason);
                }
                None => slot.state = ServiceState::Stopped,
            }
        }
        None
    }

    /// Only positive values that fit a `pid_t` count; anything else is stale
    async fn read_pid(&self, service: &str) -> Option<u32> {
        let raw = tokio::fs::read_to_string(self.pid_file(service)).await.ok()?;
        let pid = raw.trim().parse::<i32>().ok().filter(|pid| *pid > 0)?;
        u32::try_from(pid).ok()
    }

    async fn remove_pid_file(&self, service: &str) {
        match tokio::fs::remove_file(self.pid_file(service)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove pid file for {}: {}", service, e),
        }
    }
}

#[async_trait]
impl ProcessLiveness for ProcessManager {
    async fn live_pid(&self, service: &str) -> Option<u32> {
        let slot = self.slot(service);
        let mut slot = slot.lock().await;
        self.refresh(service, &mut slot).await
    }
}

/// `start.sh`, then a bare executable named after the service, then a jar
fn launch_command(dir: &Path, service: &str) -> Result<Command> {
    let script = dir.join("start.sh");
    if script.is_file() {
        let mut command = Command::new("sh");
        command.arg(script);
        return Ok(command);
    }

    let binary = dir.join(service);
    if binary.is_file() {
        return Ok(Command::new(binary));
    }

    let jar = dir.join(format!("{}.jar", service));
    if jar.is_file() {
        let mut command = Command::new("java");
        command.arg("-jar").arg(jar);
        return Ok(command);
    }

    Err(Error::not_found(format!(
        "no start.sh, executable or jar for {} in {}",
        service,
        dir.display()
    )))
}

/// Positive `pid_t`; zero and negative values address process groups
fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

fn pid_alive(pid: u32) -> bool {
    let Some(target) = to_pid(pid) else {
        return false;
    };
    match signal::kill(target, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

fn child_alive(slot: &mut ServiceSlot, pid: u32) -> bool {
    match slot.child.as_mut() {
        Some(child) => matches!(child.try_wait(), Ok(None)),
        None => pid_alive(pid),
    }
}

/// Signals the whole process group, falling back to the single PID
fn send_signal(pid: u32, sig: Signal) {
    let Some(target) = to_pid(pid) else {
        warn!("Refusing to send {:?} to invalid pid {}", sig, pid);
        return;
    };
    if signal::killpg(target, sig).is_err() {
        if let Err(e) = signal::kill(target, sig) {
            debug!("Failed to send {:?} to pid {}: {}", sig, pid, e);
        }
    }
}

async fn wait_exit(slot: &mut ServiceSlot, pid: u32, grace: Duration) -> bool {
    let deadline = Instant::now() + grace;
    loop {
        if !child_alive(slot, pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(EXIT_POLL).await;
    }
}
