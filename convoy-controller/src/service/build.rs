//! Build provider
//!
//! Source checkout and compilation happen outside Convoy. The controller
//! only needs something that turns a project reference into an artifact
//! on local disk, or accepts an uploaded one.

use async_trait::async_trait;
use axum::body::Bytes;
use chrono::Utc;
use convoy_core::checksum::sha256_file;
use convoy_core::dto::artifact::ArtifactInfo;
use convoy_core::{Error, Result};
use futures::{Stream, StreamExt};
use std::path::{Component, Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use super::distribution::unique_name;

/// Upload body as it arrives off the wire
pub type UploadStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

#[async_trait]
pub trait BuildProvider: Send + Sync {
    /// Resolves a project reference to a built artifact
    async fn resolve_artifact(&self, project_ref: &str) -> Result<ArtifactInfo>;

    /// Streams an uploaded artifact to disk under a unique name
    async fn store_upload(&self, file_name: &str, body: UploadStream) -> Result<ArtifactInfo>;
}

/// Resolves references as paths (absolute, or relative to the artifact root)
pub struct LocalArtifactProvider {
    artifact_root: PathBuf,
    upload_dir: PathBuf,
}

impl LocalArtifactProvider {
    pub fn new(artifact_root: PathBuf, upload_dir: PathBuf) -> Self {
        Self {
            artifact_root,
            upload_dir,
        }
    }
}

#[async_trait]
impl BuildProvider for LocalArtifactProvider {
    async fn resolve_artifact(&self, project_ref: &str) -> Result<ArtifactInfo> {
        let reference = project_ref.trim();
        if reference.is_empty() {
            return Err(Error::validation("project reference cannot be empty"));
        }

        let path = Path::new(reference);
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(Error::validation(format!(
                "project reference may not contain '..': {}",
                reference
            )));
        }
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.artifact_root.join(path)
        };

        describe(&path).await
    }

    async fn store_upload(&self, file_name: &str, body: UploadStream) -> Result<ArtifactInfo> {
        if file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.starts_with('.')
        {
            return Err(Error::validation(format!("invalid file name '{}'", file_name)));
        }

        tokio::fs::create_dir_all(&self.upload_dir).await.map_err(|e| {
            Error::transport(format!("failed to create {}: {}", self.upload_dir.display(), e))
        })?;

        let target = self
            .upload_dir
            .join(unique_name(file_name, Utc::now().timestamp_millis()));

        let written = match write_stream(&target, body).await {
            Ok(0) => Err(Error::validation("uploaded artifact is empty")),
            other => other,
        };
        let written = match written {
            Ok(n) => n,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&target).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove partial upload {}: {}", target.display(), rm);
                    }
                }
                return Err(e);
            }
        };

        info!("Stored upload {} ({} bytes)", target.display(), written);
        describe(&target).await
    }
}

/// Copies the stream into a new file chunk by chunk; returns bytes written
async fn write_stream(target: &Path, mut body: UploadStream) -> Result<u64> {
    let write_err =
        |e: std::io::Error| Error::transport(format!("failed to write {}: {}", target.display(), e));

    let mut file = tokio::fs::File::create(target).await.map_err(write_err)?;
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk =
            chunk.map_err(|e| Error::transport(format!("upload interrupted: {}", e)))?;
        file.write_all(&chunk).await.map_err(write_err)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(write_err)?;
    Ok(written)
}

/// Size and checksum of an artifact on disk
pub async fn describe(path: &Path) -> Result<ArtifactInfo> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| Error::not_found(format!("artifact file not found: {}", path.display())))?;
    if !metadata.is_file() {
        return Err(Error::not_found(format!(
            "artifact is not a file: {}",
            path.display()
        )));
    }

    let owned = path.to_path_buf();
    let checksum = tokio::task::spawn_blocking(move || sha256_file(&owned))
        .await
        .map_err(|e| Error::transport(format!("checksum task failed: {}", e)))?
        .map_err(|e| Error::transport(format!("failed to read {}: {}", path.display(), e)))?;

    Ok(ArtifactInfo {
        path: path.display().to_string(),
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: metadata.len(),
        checksum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_relative_reference() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("builds/svc-a")).unwrap();
        std::fs::write(dir.path().join("builds/svc-a/svc-a.jar"), b"jar").unwrap();

        let provider =
            LocalArtifactProvider::new(dir.path().join("builds"), dir.path().join("upload"));
        let info = provider.resolve_artifact("svc-a/svc-a.jar").await.unwrap();
        assert_eq!(info.file_name, "svc-a.jar");
        assert_eq!(info.size, 3);
        assert_eq!(info.checksum.len(), 64);
    }

    #[tokio::test]
    async fn test_resolve_rejects_bad_references() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalArtifactProvider::new(dir.path().to_path_buf(), dir.path().join("u"));

        assert!(matches!(
            provider.resolve_artifact("../etc/passwd").await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            provider.resolve_artifact("missing.jar").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(provider.resolve_artifact(" ").await, Err(Error::Validation(_))));
    }

    fn chunks(parts: &[&'static str]) -> UploadStream {
        let items: Vec<std::io::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::from_static(p.as_bytes())))
            .collect();
        Box::pin(futures::stream::iter(items))
    }

    fn upload_dir_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_upload_streams_chunks_under_unique_name() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalArtifactProvider::new(dir.path().to_path_buf(), dir.path().join("u"));

        let info = provider
            .store_upload("svc-a.jar", chunks(&["by", "t", "es"]))
            .await
            .unwrap();
        assert!(info.file_name.starts_with("svc-a_"));
        assert!(info.file_name.ends_with(".jar"));
        assert_eq!(info.size, 5);
        assert_eq!(std::fs::read(&info.path).unwrap(), b"bytes");

        assert!(matches!(
            provider.store_upload("../x.jar", chunks(&["b"])).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_or_broken_upload_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = dir.path().join("u");
        let provider = LocalArtifactProvider::new(dir.path().to_path_buf(), upload_dir.clone());

        let err = provider.store_upload("x.jar", chunks(&[])).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(upload_dir_entries(&upload_dir), 0);

        let broken: UploadStream = Box::pin(futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("connection reset")),
        ]));
        let err = provider.store_upload("x.jar", broken).await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(upload_dir_entries(&upload_dir), 0);
    }
}
