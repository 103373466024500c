use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("Stage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File {filename} exceeds the maximum size of {limit} bytes")]
    TooLarge { filename: String, limit: usize },
}

/// An upload held on local disk while it is processed.
///
/// Owned by the pipeline run that receives it; the run releases `local_path`
/// exactly once whatever the outcome.
#[derive(Debug, Clone)]
pub struct StagedFile {
    pub stage_id: Uuid,
    pub owner_request_id: String,
    pub local_path: PathBuf,
    pub declared_name: String,
    pub declared_mime_type: String,
    pub byte_size: u64,
}

/// Transient local storage for uploads and derived assets.
#[async_trait]
pub trait TempStage: Send + Sync {
    /// Streams an incoming upload into a uniquely named stage file.
    async fn stage<'a>(
        &self,
        request_id: &str,
        declared_name: &str,
        declared_mime_type: &str,
        reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StagedFile, StageError>;

    /// Reserves a fresh path for a derived asset. The caller owns the path
    /// and must `release` it.
    fn allocate(&self, extension: &str) -> PathBuf;

    /// Deletes a stage path. Missing paths and I/O failures are logged, never returned.
    async fn release(&self, path: &Path);

    /// Deletes stage files older than `max_age`, returning how many were removed.
    async fn sweep(&self, max_age: Duration) -> anyhow::Result<usize>;
}

/// Stage backed by a directory shared across concurrent requests.
pub struct DiskStage {
    dir: PathBuf,
    max_file_size: usize,
}

impl DiskStage {
    pub async fn new(dir: impl Into<PathBuf>, max_file_size: usize) -> std::io::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir, max_file_size })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl TempStage for DiskStage {
    async fn stage<'a>(
        &self,
        request_id: &str,
        declared_name: &str,
        declared_mime_type: &str,
        mut reader: Box<dyn AsyncRead + Unpin + Send + 'a>,
    ) -> Result<StagedFile, StageError> {
        let stage_id = Uuid::new_v4();
        let local_path = self.dir.join(format!("upload-{}", stage_id));

        let mut file = tokio::fs::File::create(&local_path).await?;
        let mut buffer = vec![0u8; 64 * 1024];
        let mut total: u64 = 0;

        let written: Result<(), StageError> = async {
            loop {
                let n = reader.read(&mut buffer).await?;
                if n == 0 {
                    break;
                }
                total += n as u64;
                if total > self.max_file_size as u64 {
                    return Err(StageError::TooLarge {
                        filename: declared_name.to_string(),
                        limit: self.max_file_size,
                    });
                }
                file.write_all(&buffer[..n]).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        drop(file);
        if let Err(e) = written {
            self.release(&local_path).await;
            return Err(e);
        }

        tracing::debug!(
            "📥 Staged {} ({} bytes) at {}",
            declared_name,
            total,
            local_path.display()
        );

        Ok(StagedFile {
            stage_id,
            owner_request_id: request_id.to_string(),
            local_path,
            declared_name: declared_name.to_string(),
            declared_mime_type: declared_mime_type.to_string(),
            byte_size: total,
        })
    }

    fn allocate(&self, extension: &str) -> PathBuf {
        self.dir
            .join(format!("compressed-{}.{}", Uuid::new_v4(), extension))
    }

    async fn release(&self, path: &Path) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!("🧹 Released temp file {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Temp file {} already released", path.display())
            }
            Err(e) => tracing::warn!("⚠️ Failed to release temp file {}: {}", path.display(), e),
        }
    }

    async fn sweep(&self, max_age: Duration) -> anyhow::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let now = SystemTime::now();
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                _ => continue,
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|t| now.duration_since(t).ok())
                .unwrap_or_default();
            if age > max_age {
                self.release(&entry.path()).await;
                removed += 1;
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stage_writes_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let stage = DiskStage::new(dir.path(), 1024).await.unwrap();

        let a = stage
            .stage("req-1", "a.txt", "text/plain", Box::new(&b"hello"[..]))
            .await
            .unwrap();
        let b = stage
            .stage("req-1", "a.txt", "text/plain", Box::new(&b"hello"[..]))
            .await
            .unwrap();

        assert_ne!(a.local_path, b.local_path);
        assert_eq!(a.byte_size, 5);
        assert_eq!(tokio::fs::read(&a.local_path).await.unwrap(), b"hello");
        assert_eq!(a.owner_request_id, "req-1");
    }

    #[tokio::test]
    async fn test_stage_rejects_oversized_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let stage = DiskStage::new(dir.path(), 4).await.unwrap();

        let res = stage
            .stage("req-1", "big.bin", "application/zip", Box::new(&b"too large"[..]))
            .await;

        assert!(matches!(res, Err(StageError::TooLarge { limit: 4, .. })));
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        assert!(entries.next_entry().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let stage = DiskStage::new(dir.path(), 1024).await.unwrap();
        let staged = stage
            .stage("req-1", "a.txt", "text/plain", Box::new(&b"x"[..]))
            .await
            .unwrap();

        stage.release(&staged.local_path).await;
        stage.release(&staged.local_path).await;

        assert!(!staged.local_path.exists());
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let stage = DiskStage::new(dir.path(), 1024).await.unwrap();
        let staged = stage
            .stage("req-1", "a.txt", "text/plain", Box::new(&b"x"[..]))
            .await
            .unwrap();

        assert_eq!(stage.sweep(Duration::from_secs(3600)).await.unwrap(), 0);
        assert!(staged.local_path.exists());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(stage.sweep(Duration::from_millis(1)).await.unwrap(), 1);
        assert!(!staged.local_path.exists());
    }
}
