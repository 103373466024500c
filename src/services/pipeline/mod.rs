//! File ingestion pipeline.
//!
//! One file runs `classify -> compress -> upload -> persist -> release`. The
//! remote upload always precedes the record write because the record embeds
//! the returned locator, and every temp path a run creates is released on
//! every exit path. Batches run files in input order and stop starting new
//! files after the first failure; files already persisted stay persisted.

use sea_orm::DbErr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::UploadConfig;
use crate::services::classifier::TypeClassifier;
use crate::services::compressor::{ImageCompressor, ProcessedAsset};
use crate::services::remote_store::{RemoteObject, RemoteStore, UploadOptions};
use crate::services::repository::{FileRecord, FileRepository};
use crate::services::stage::{StagedFile, TempStage};

pub mod ingest;
pub mod reconcile;
pub mod replace;
pub mod types;

pub use types::{BatchResult, DeletePolicy, IngestionResult, PipelineError};

/// Policy for the superseded object during replacement.
pub const REPLACED_OBJECT_DELETE_POLICY: DeletePolicy = DeletePolicy::BestEffort;

/// Policy for the remote object of a deleted file.
pub const DELETED_FILE_DELETE_POLICY: DeletePolicy = DeletePolicy::BestEffort;

/// Policy for orphans removed by the reconciliation sweep.
pub const ORPHAN_DELETE_POLICY: DeletePolicy = DeletePolicy::Strict;

#[derive(Clone)]
pub struct IngestionPipeline {
    stage: Arc<dyn TempStage>,
    classifier: Arc<TypeClassifier>,
    compressor: Arc<ImageCompressor>,
    remote: Arc<dyn RemoteStore>,
    repo: Arc<dyn FileRepository>,
    remote_timeout: Duration,
    batch_concurrency: usize,
}

impl IngestionPipeline {
    pub fn new(
        config: &UploadConfig,
        stage: Arc<dyn TempStage>,
        remote: Arc<dyn RemoteStore>,
        repo: Arc<dyn FileRepository>,
    ) -> Self {
        Self {
            stage,
            classifier: Arc::new(TypeClassifier::new(&config.allowed_mimes)),
            compressor: Arc::new(ImageCompressor::from_config(config)),
            remote,
            repo,
            remote_timeout: config.remote_timeout,
            batch_concurrency: config.batch_concurrency.max(1),
        }
    }

    pub fn stage(&self) -> &Arc<dyn TempStage> {
        &self.stage
    }

    pub fn repository(&self) -> &Arc<dyn FileRepository> {
        &self.repo
    }

    /// Classifies and compresses a staged file. Derived assets are registered in `temps`.
    async fn prepare(
        &self,
        staged: &StagedFile,
        temps: &mut TempSet,
    ) -> Result<(ProcessedAsset, u64), PipelineError> {
        let classification = self
            .classifier
            .classify(&staged.declared_mime_type)
            .map_err(|e| PipelineError::unsupported(&staged.declared_name, e))?;

        let (asset, original_size) = self
            .compressor
            .compress(staged, classification.strategy, self.stage.as_ref())
            .await;
        if asset.derived {
            temps.track(asset.local_path.clone());
        }

        Ok((asset, original_size))
    }

    async fn upload_asset(
        &self,
        staged: &StagedFile,
        asset: &ProcessedAsset,
    ) -> Result<RemoteObject, PipelineError> {
        let opts = UploadOptions {
            content_type: asset.mime_type.clone(),
            extension: if asset.derived {
                Some("webp".to_string())
            } else {
                extension_of(&staged.declared_name)
            },
        };

        let uploaded = tokio::time::timeout(
            self.remote_timeout,
            self.remote.upload(&asset.local_path, &opts),
        )
        .await
        .unwrap_or_else(|_| {
            Err(anyhow::anyhow!(
                "upload timed out after {:?}",
                self.remote_timeout
            ))
        });

        uploaded.map_err(|source| PipelineError::RemoteUpload {
            filename: staged.declared_name.clone(),
            source,
        })
    }

    /// Deletes a remote object. Under `BestEffort` failures and timeouts are
    /// logged and `Ok` is returned.
    pub async fn delete_remote(
        &self,
        object_key: &str,
        policy: DeletePolicy,
    ) -> Result<(), PipelineError> {
        let res = tokio::time::timeout(self.remote_timeout, self.remote.delete(object_key))
            .await
            .unwrap_or_else(|_| {
                Err(anyhow::anyhow!(
                    "delete timed out after {:?}",
                    self.remote_timeout
                ))
            });

        match (res, policy) {
            (Ok(()), _) => {
                tracing::info!("🗑️ Deleted remote object {}", object_key);
                Ok(())
            }
            (Err(e), DeletePolicy::BestEffort) => {
                tracing::warn!("⚠️ Best-effort delete of {} failed: {}", object_key, e);
                Ok(())
            }
            (Err(source), DeletePolicy::Strict) => Err(PipelineError::RemoteDelete {
                object_key: object_key.to_string(),
                source,
            }),
        }
    }

    /// Removes a file: best-effort remote delete, then the record.
    pub async fn delete_file(&self, record: &FileRecord) -> Result<(), DbErr> {
        // Only a strict policy can fail here.
        let _ = self
            .delete_remote(&record.object_key, DELETED_FILE_DELETE_POLICY)
            .await;
        self.repo.delete(&record.id).await
    }
}

/// Temp paths owned by one pipeline run. Each path is tracked once and released once.
#[derive(Debug, Default)]
pub(crate) struct TempSet {
    paths: Vec<PathBuf>,
}

impl TempSet {
    pub(crate) fn new(staged: &Path) -> Self {
        Self {
            paths: vec![staged.to_path_buf()],
        }
    }

    pub(crate) fn track(&mut self, path: PathBuf) {
        if !self.paths.contains(&path) {
            self.paths.push(path);
        }
    }

    pub(crate) async fn release_all(self, stage: &dyn TempStage) {
        for path in &self.paths {
            stage.release(path).await;
        }
    }
}

fn extension_of(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("report.PDF"), Some("pdf".to_string()));
        assert_eq!(extension_of("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(extension_of("README"), None);
        assert_eq!(extension_of("weird.ex e"), None);
    }

    #[test]
    fn test_temp_set_tracks_each_path_once() {
        let mut temps = TempSet::new(Path::new("/tmp/a"));
        temps.track(PathBuf::from("/tmp/a"));
        temps.track(PathBuf::from("/tmp/b"));
        temps.track(PathBuf::from("/tmp/b"));
        assert_eq!(temps.paths.len(), 2);
    }

    #[test]
    fn test_delete_policies() {
        assert_eq!(REPLACED_OBJECT_DELETE_POLICY, DeletePolicy::BestEffort);
        assert_eq!(DELETED_FILE_DELETE_POLICY, DeletePolicy::BestEffort);
        assert_eq!(ORPHAN_DELETE_POLICY, DeletePolicy::Strict);
    }
}
