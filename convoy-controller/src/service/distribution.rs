//! Artifact Distribution Engine
//!
//! Chooses a transfer method by artifact size and makes the bytes reachable
//! by the target nodes:
//! - INLINE: base64 blob in the coordination store
//! - SHARED_STORAGE: copy into a directory every node mounts
//! - HTTP: copy into the directory served under `/artifacts`

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;
use convoy_core::domain::artifact::ArtifactLocator;
use convoy_core::domain::task::DistributionMethod;
use convoy_core::{Error, Result, keys};
use convoy_store::CoordinationStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::config::Config;

/// Artifacts below this size travel inline (50 MiB)
pub const INLINE_LIMIT: u64 = 50 * 1024 * 1024;

/// Default lower bound of the HTTP band (500 MiB)
pub const DEFAULT_HTTP_THRESHOLD: u64 = 500 * 1024 * 1024;

/// Picks the transfer method for an artifact of `size` bytes
///
/// Bands are inclusive at the low end: exactly [`INLINE_LIMIT`] is
/// SHARED_STORAGE and exactly `http_threshold` is HTTP. With shared storage
/// disabled the middle band goes over HTTP.
pub fn select_method(size: u64, http_threshold: u64, shared_enabled: bool) -> DistributionMethod {
    if size < INLINE_LIMIT {
        DistributionMethod::Inline
    } else if size < http_threshold && shared_enabled {
        DistributionMethod::SharedStorage
    } else {
        DistributionMethod::Http
    }
}

/// `svc-a.jar` -> `svc-a_1700000000000.jar`
pub fn unique_name(file_name: &str, millis: i64) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_{}.{}", stem, millis, ext),
        _ => format!("{}_{}", file_name, millis),
    }
}

pub struct DistributionEngine {
    store: Arc<dyn CoordinationStore>,
    shared_dir: PathBuf,
    serve_dir: PathBuf,
    public_base_url: String,
    http_threshold: u64,
    shared_enabled: bool,
}

impl DistributionEngine {
    pub fn new(store: Arc<dyn CoordinationStore>, config: &Config) -> Self {
        Self {
            store,
            shared_dir: config.shared_dir.clone(),
            serve_dir: config.serve_dir.clone(),
            public_base_url: config.public_base_url.clone(),
            http_threshold: config.http_threshold,
            shared_enabled: config.shared_storage_enabled,
        }
    }

    pub fn select(&self, size: u64) -> DistributionMethod {
        select_method(size, self.http_threshold, self.shared_enabled)
    }

    /// Makes the artifact available to `nodes` and returns where to fetch it
    pub async fn distribute(
        &self,
        artifact: &Path,
        nodes: &[String],
        method: DistributionMethod,
    ) -> Result<ArtifactLocator> {
        if !tokio::fs::try_exists(artifact).await.unwrap_or(false) {
            return Err(Error::not_found(format!(
                "artifact file not found: {}",
                artifact.display()
            )));
        }

        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                Error::validation(format!("artifact path has no file name: {}", artifact.display()))
            })?;
        let name = unique_name(&file_name, Utc::now().timestamp_millis());

        let locator = match method {
            DistributionMethod::Inline => self.store_inline(artifact, &name).await?,
            DistributionMethod::SharedStorage => {
                let path = copy_into(artifact, &self.shared_dir, &name).await?;
                ArtifactLocator::Shared { path }
            }
            DistributionMethod::Http => {
                copy_into(artifact, &self.serve_dir, &name).await?;
                ArtifactLocator::Http {
                    url: format!("{}/artifacts/{}", self.public_base_url, name),
                }
            }
        };

        info!(
            "Distributed {} to {} node(s) via {} ({})",
            file_name,
            nodes.len(),
            method,
            locator
        );
        Ok(locator)
    }

    /// The blob expires with the queue TTL; agents delete it once every
    /// target node has recorded a receipt
    async fn store_inline(&self, artifact: &Path, name: &str) -> Result<ArtifactLocator> {
        let bytes = tokio::fs::read(artifact).await.map_err(|e| {
            Error::transport(format!("failed to read {}: {}", artifact.display(), e))
        })?;
        let encoded = STANDARD.encode(&bytes);
        self.store
            .set_ex(&keys::artifact_blob(name), keys::QUEUE_TTL, &encoded)
            .await?;
        Ok(ArtifactLocator::Inline {
            name: name.to_string(),
        })
    }
}

async fn copy_into(artifact: &Path, dir: &Path, name: &str) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::transport(format!("failed to create {}: {}", dir.display(), e)))?;

    let dir = tokio::fs::canonicalize(dir)
        .await
        .map_err(|e| Error::transport(format!("failed to resolve {}: {}", dir.display(), e)))?;
    let target = dir.join(name);

    tokio::fs::copy(artifact, &target).await.map_err(|e| {
        Error::transport(format!(
            "failed to copy {} to {}: {}",
            artifact.display(),
            target.display(),
            e
        ))
    })?;
    Ok(target)
}
