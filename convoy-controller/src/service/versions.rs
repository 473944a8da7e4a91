//! Version Manager
//!
//! Per-service version history (newest first) plus a separate current
//! pointer. Every recorded version keeps a backup copy of its artifact so a
//! later rollback can redistribute it.

use chrono::Utc;
use convoy_core::domain::service::{RollbackHistory, ServiceVersion};
use convoy_core::{Error, Result, keys};
use convoy_store::CoordinationStore;
use convoy_store::json::{decode_list, to_json};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct VersionStore {
    store: Arc<dyn CoordinationStore>,
    backup_dir: PathBuf,
    max_versions: usize,
}

impl VersionStore {
    pub fn new(store: Arc<dyn CoordinationStore>, backup_dir: PathBuf, max_versions: usize) -> Self {
        Self {
            store,
            backup_dir,
            max_versions,
        }
    }

    /// Backs up the artifact, records a new version and makes it current
    pub async fn record(
        &self,
        service: &str,
        artifact: &Path,
        file_size: u64,
        checksum: &str,
        description: Option<String>,
    ) -> Result<ServiceVersion> {
        let created_at = Utc::now();
        let version = format!("v{}", created_at.timestamp_millis());
        let backup = self.backup_path(service, &version, artifact);

        tokio::fs::create_dir_all(&self.backup_dir).await.map_err(|e| {
            Error::transport(format!(
                "failed to create backup dir {}: {}",
                self.backup_dir.display(),
                e
            ))
        })?;
        tokio::fs::copy(artifact, &backup).await.map_err(|e| {
            Error::transport(format!(
                "failed to back up {} to {}: {}",
                artifact.display(),
                backup.display(),
                e
            ))
        })?;

        let mut entry = ServiceVersion {
            version: version.clone(),
            artifact_path: backup,
            file_size,
            checksum: checksum.to_string(),
            created_at,
            is_current: false,
            description,
        };

        let list_key = keys::service_versions(service);
        let payload = to_json(&list_key, &entry)?;
        self.store.lpush(&list_key, &payload).await?;
        self.prune(service).await?;
        self.store.expire(&list_key, keys::HISTORY_TTL).await?;
        self.set_current(service, &version).await?;

        info!("Recorded version {} of {}", version, service);
        entry.is_current = true;
        Ok(entry)
    }

    /// Newest first, with `is_current` derived from the pointer
    pub async fn list(&self, service: &str) -> Result<Vec<ServiceVersion>> {
        let key = keys::service_versions(service);
        let raw = self.store.lrange(&key, 0, -1).await?;
        let current = self.current(service).await?;

        let mut versions: Vec<ServiceVersion> = decode_list(&key, raw);
        for v in &mut versions {
            v.is_current = current.as_deref() == Some(v.version.as_str());
        }
        Ok(versions)
    }

    pub async fn current(&self, service: &str) -> Result<Option<String>> {
        let key = keys::current_version(service);
        let current = self.store.get(&key).await?;
        if current.is_some() {
            self.store.expire(&key, keys::HISTORY_TTL).await?;
        }
        Ok(current)
    }

    pub async fn set_current(&self, service: &str, version: &str) -> Result<()> {
        self.store
            .set_ex(&keys::current_version(service), keys::HISTORY_TTL, version)
            .await?;
        Ok(())
    }

    pub async fn find(&self, service: &str, version: &str) -> Result<Option<ServiceVersion>> {
        Ok(self
            .list(service)
            .await?
            .into_iter()
            .find(|v| v.version == version))
    }

    /// The version immediately older than the current one
    pub async fn previous(&self, service: &str) -> Result<ServiceVersion> {
        let versions = self.list(service).await?;
        let current = versions
            .iter()
            .position(|v| v.is_current)
            .ok_or_else(|| Error::not_found(format!("{} has no current version", service)))?;

        versions
            .into_iter()
            .nth(current + 1)
            .ok_or_else(|| Error::not_found(format!("no previous version of {} to roll back to", service)))
    }

    pub async fn push_rollback(&self, entry: &RollbackHistory) -> Result<()> {
        let key = keys::rollback_history(&entry.service_name);
        let payload = to_json(&key, entry)?;
        self.store.lpush(&key, &payload).await?;
        self.store.expire(&key, keys::HISTORY_TTL).await?;
        Ok(())
    }

    /// Newest first
    pub async fn rollback_history(&self, service: &str) -> Result<Vec<RollbackHistory>> {
        let key = keys::rollback_history(service);
        let raw = self.store.lrange(&key, 0, -1).await?;
        Ok(decode_list(&key, raw))
    }

    /// `<backup_dir>/<service>_<version><ext>`
    fn backup_path(&self, service: &str, version: &str, artifact: &Path) -> PathBuf {
        let ext = artifact
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        self.backup_dir.join(format!("{}_{}{}", service, version, ext))
    }

    /// Drops versions beyond `max_versions`, deleting their backups
    async fn prune(&self, service: &str) -> Result<()> {
        let key = keys::service_versions(service);
        let raw = self
            .store
            .lrange(&key, self.max_versions as isize, -1)
            .await?;
        if raw.is_empty() {
            return Ok(());
        }

        for old in decode_list::<ServiceVersion>(&key, raw) {
            if let Err(e) = tokio::fs::remove_file(&old.artifact_path).await {
                warn!(
                    "Failed to remove backup {} of pruned version {}: {}",
                    old.artifact_path.display(),
                    old.version,
                    e
                );
            }
        }
        self.store
            .ltrim(&key, 0, self.max_versions as isize - 1)
            .await?;
        Ok(())
    }
}
