//! Artifact receiver
//!
//! Materializes a task's artifact on local disk from whichever locator the
//! controller chose, then verifies size and checksum.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use convoy_core::checksum::sha256_file;
use convoy_core::domain::artifact::ArtifactLocator;
use convoy_core::domain::task::Task;
use convoy_core::{Error, Result, keys};
use convoy_store::CoordinationStore;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::config::Config;

pub struct ArtifactReceiver {
    store: Arc<dyn CoordinationStore>,
    http: reqwest::Client,
    node_id: String,
    staging_dir: PathBuf,
}

impl ArtifactReceiver {
    pub fn new(config: &Config, store: Arc<dyn CoordinationStore>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| Error::transport(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            store,
            http,
            node_id: config.node_id.clone(),
            staging_dir: config.work_dir.join(".staging"),
        })
    }

    /// Fetches the task's artifact into a per-task staging directory
    pub async fn receive(&self, task: &Task) -> Result<PathBuf> {
        let locator = task.artifact_locator.as_ref().ok_or_else(|| {
            Error::validation(format!("task {} carries no artifact", task.task_id))
        })?;
        let file_name = locator
            .file_name()
            .filter(|n| n != "." && n != ".." && !n.contains(['/', '\\']))
            .ok_or_else(|| {
                Error::validation(format!("cannot derive a file name from {}", locator))
            })?;

        let dir = self.staging_dir.join(&task.task_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::transport(format!("failed to create {}: {}", dir.display(), e)))?;
        let dest = dir.join(&file_name);

        debug!("Receiving {} via {}", locator, locator.method());
        match locator {
            ArtifactLocator::Inline { name } => self.receive_inline(task, name, &dest).await?,
            ArtifactLocator::Shared { path } => copy_shared(path, &dest).await?,
            ArtifactLocator::Http { url } => self.download(url, &dest).await?,
        }

        verify(&dest, task.artifact_size, task.checksum.as_deref()).await?;
        info!("Received {} for task {}", file_name, task.task_id);
        Ok(dest)
    }

    /// Removes the staging directory of a finished task
    pub async fn discard(&self, task_id: &str) {
        let dir = self.staging_dir.join(task_id);
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to clean {}: {}", dir.display(), e);
            }
        }
    }

    async fn receive_inline(&self, task: &Task, name: &str, dest: &Path) -> Result<()> {
        let blob_key = keys::artifact_blob(name);
        let encoded = self.store.get(&blob_key).await?.ok_or_else(|| {
            Error::not_found(format!("inline artifact {} missing or expired", name))
        })?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::transport(format!("inline artifact {} is corrupt: {}", name, e)))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| Error::transport(format!("failed to write {}: {}", dest.display(), e)))?;

        // The receipt that completes the target set deletes the blob
        let receipts_key = keys::artifact_receipts(name);
        self.store.sadd(&receipts_key, &self.node_id).await?;
        self.store.expire(&receipts_key, keys::QUEUE_TTL).await?;
        let received = self.store.smembers(&receipts_key).await?;
        if task
            .target_node_ids
            .iter()
            .all(|node| received.contains(node))
        {
            self.store.del(&blob_key).await?;
            self.store.del(&receipts_key).await?;
            debug!("All targets received {}, blob deleted", name);
        }
        Ok(())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::transport(format!("download of {} failed: {}", url, e)))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::transport(format!("failed to create {}: {}", dest.display(), e)))?;

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| Error::transport(format!("download of {} failed: {}", url, e)))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::transport(format!("failed to write {}: {}", dest.display(), e)))?;
        }
        file.flush()
            .await
            .map_err(|e| Error::transport(format!("failed to write {}: {}", dest.display(), e)))?;
        Ok(())
    }
}

async fn copy_shared(source: &Path, dest: &Path) -> Result<()> {
    if !tokio::fs::try_exists(source).await.unwrap_or(false) {
        return Err(Error::not_found(format!(
            "shared artifact not found: {}",
            source.display()
        )));
    }
    tokio::fs::copy(source, dest).await.map_err(|e| {
        Error::transport(format!("failed to copy {}: {}", source.display(), e))
    })?;
    Ok(())
}

/// Non-zero size, expected size when known, checksum when given
async fn verify(path: &Path, expected_size: Option<u64>, checksum: Option<&str>) -> Result<()> {
    let size = tokio::fs::metadata(path)
        .await
        .map_err(|e| Error::transport(format!("cannot stat {}: {}", path.display(), e)))?
        .len();

    if size == 0 {
        return Err(Error::validation(format!(
            "received artifact is empty: {}",
            path.display()
        )));
    }
    if let Some(expected) = expected_size {
        if expected != size {
            return Err(Error::transport(format!(
                "received {} bytes, expected {}",
                size, expected
            )));
        }
    }

    if let Some(expected) = checksum {
        let owned = path.to_path_buf();
        let actual = tokio::task::spawn_blocking(move || sha256_file(&owned))
            .await
            .map_err(|e| Error::process(format!("checksum task failed: {}", e)))?
            .map_err(|e| Error::transport(format!("cannot read {}: {}", path.display(), e)))?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Error::validation(format!(
                "checksum mismatch for {}: expected {}, got {}",
                path.display(),
                expected,
                actual
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use convoy_core::checksum::sha256_bytes;
    use convoy_core::domain::task::TaskAction;
    use convoy_store::MemoryStore;

    fn receiver(node: &str, work_dir: &Path, store: Arc<dyn CoordinationStore>) -> ArtifactReceiver {
        let mut config = Config::default();
        config.node_id = node.to_string();
        config.work_dir = work_dir.to_path_buf();
        ArtifactReceiver::new(&config, store).unwrap()
    }

    fn deploy_task(locator: ArtifactLocator, data: &[u8]) -> Task {
        Task::new(
            TaskAction::Deploy,
            "api",
            vec!["n1".to_string(), "n2".to_string()],
        )
        .with_artifact(locator, data.len() as u64, Some(sha256_bytes(data)))
    }

    #[tokio::test]
    async fn test_inline_blob_deleted_after_all_receipts() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let data = b"inline artifact bytes";
        let name = "api_1700000000000.bin";
        store
            .set(&keys::artifact_blob(name), &STANDARD.encode(data))
            .await
            .unwrap();

        let task = deploy_task(
            ArtifactLocator::Inline {
                name: name.to_string(),
            },
            data,
        );

        let first = receiver("n1", &dir.path().join("n1"), store.clone());
        let path = first.receive(&task).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), data);
        assert!(store.get(&keys::artifact_blob(name)).await.unwrap().is_some());

        let second = receiver("n2", &dir.path().join("n2"), store.clone());
        second.receive(&task).await.unwrap();
        assert!(store.get(&keys::artifact_blob(name)).await.unwrap().is_none());
        assert!(
            store
                .smembers(&keys::artifact_receipts(name))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_shared_copy_and_checksum_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let shared = dir.path().join("shared").join("api_1.jar");
        std::fs::create_dir_all(shared.parent().unwrap()).unwrap();
        std::fs::write(&shared, b"jar bytes").unwrap();

        let rx = receiver("n1", &dir.path().join("work"), store);

        let task = deploy_task(
            ArtifactLocator::Shared {
                path: shared.clone(),
            },
            b"jar bytes",
        );
        let path = rx.receive(&task).await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"jar bytes");

        let mut tampered = task.clone();
        tampered.checksum = Some(sha256_bytes(b"other bytes"));
        let err = rx.receive(&tampered).await.unwrap_err();
        assert!(err.message().contains("checksum mismatch"));

        rx.discard(&task.task_id).await;
        assert!(!dir.path().join("work/.staging").join(&task.task_id).exists());
    }

    /// Serves `body` at `/artifacts/<name>` and 404 for anything else
    async fn serve_artifact(name: &'static str, body: &'static [u8]) -> String {
        use tokio::io::AsyncReadExt;
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 2048];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).into_owned();
                let wanted = format!("GET /artifacts/{} ", name);
                let (head, payload): (&str, &[u8]) = if request.starts_with(&wanted) {
                    ("200 OK", body)
                } else {
                    ("404 Not Found", b"")
                };
                let header = format!(
                    "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    head,
                    payload.len()
                );
                let _ = socket.write_all(header.as_bytes()).await;
                let _ = socket.write_all(payload).await;
            }
        });
        base
    }

    #[tokio::test]
    async fn test_http_download_verifies_size_and_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let data: &'static [u8] = b"large artifact served over http";
        let base = serve_artifact("api_1.bin", data).await;
        let rx = receiver("n1", dir.path(), store);

        let task = deploy_task(
            ArtifactLocator::Http {
                url: format!("{}/artifacts/api_1.bin", base),
            },
            data,
        );
        let path = rx.receive(&task).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "api_1.bin");
        assert_eq!(std::fs::read(&path).unwrap(), data);
        assert_eq!(sha256_file(&path).unwrap(), sha256_bytes(data));

        let mut resized = task.clone();
        resized.artifact_size = Some(data.len() as u64 + 1);
        let err = rx.receive(&resized).await.unwrap_err();
        assert_eq!(err.code(), convoy_core::ErrorCode::TransportError);
    }

    #[tokio::test]
    async fn test_http_404_is_transport_error() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let base = serve_artifact("api_1.bin", b"bytes").await;
        let rx = receiver("n1", dir.path(), store);

        let task = deploy_task(
            ArtifactLocator::Http {
                url: format!("{}/artifacts/missing.bin", base),
            },
            b"bytes",
        );
        let err = rx.receive(&task).await.unwrap_err();
        assert_eq!(err.code(), convoy_core::ErrorCode::TransportError);
        assert!(err.message().contains("404"));
    }

    #[tokio::test]
    async fn test_dot_dot_file_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let rx = receiver("n1", dir.path(), store);

        let task = deploy_task(
            ArtifactLocator::Http {
                url: "http://127.0.0.1:9/artifacts/..".to_string(),
            },
            b"x",
        );
        let err = rx.receive(&task).await.unwrap_err();
        assert_eq!(err.code(), convoy_core::ErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn test_missing_inline_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn CoordinationStore> = Arc::new(MemoryStore::new());
        let rx = receiver("n1", dir.path(), store);

        let task = deploy_task(
            ArtifactLocator::Inline {
                name: "gone_1.bin".to_string(),
            },
            b"x",
        );
        let err = rx.receive(&task).await.unwrap_err();
        assert_eq!(err.code(), convoy_core::ErrorCode::NotFound);
    }
}
