use tracing::Instrument;

use super::{
    IngestionPipeline, IngestionResult, PipelineError, REPLACED_OBJECT_DELETE_POLICY, TempSet,
};
use crate::services::repository::{FileChanges, FileRecord};
use crate::services::stage::StagedFile;

impl IngestionPipeline {
    /// Replaces the content of an existing record with a new upload.
    ///
    /// The caller has already checked ownership of `existing`. The new object
    /// is uploaded before the old one is deleted, so a failed upload leaves the
    /// record and its object untouched. A failed record update after the
    /// upload leaves the new object orphaned.
    pub async fn replace(
        &self,
        existing: &FileRecord,
        staged: StagedFile,
    ) -> Result<IngestionResult, PipelineError> {
        let span = tracing::info_span!(
            "replace_file",
            file_id = %existing.id,
            stage_id = %staged.stage_id,
            request_id = %staged.owner_request_id,
        );

        async {
            let mut temps = TempSet::new(&staged.local_path);
            let outcome = self.run_replace(existing, &staged, &mut temps).await;
            temps.release_all(self.stage.as_ref()).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_replace(
        &self,
        existing: &FileRecord,
        staged: &StagedFile,
        temps: &mut TempSet,
    ) -> Result<IngestionResult, PipelineError> {
        tracing::info!(
            "Replacing {} with {}",
            existing.filename,
            staged.declared_name
        );

        let (asset, original_size) = self.prepare(staged, temps).await?;
        let remote = self.upload_asset(staged, &asset).await?;

        self.delete_remote(&existing.object_key, REPLACED_OBJECT_DELETE_POLICY)
            .await?;

        let changes = FileChanges {
            filename: Some(staged.declared_name.clone()),
            url: Some(remote.url.clone()),
            object_key: Some(remote.object_key.clone()),
        };
        let file = self
            .repo
            .update(&existing.id, changes)
            .await
            .map_err(|source| {
                tracing::error!(
                    object_key = %remote.object_key,
                    "❌ Record update failed after upload; remote object is a reconciliation candidate: {}",
                    source
                );
                PipelineError::Persist {
                    filename: staged.declared_name.clone(),
                    object_key: remote.object_key.clone(),
                    source,
                }
            })?;

        Ok(IngestionResult {
            file,
            original_size,
            compressed_size: asset.byte_size,
        })
    }
}
