use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{BatchResult, IngestionPipeline, IngestionResult, PipelineError, TempSet};
use crate::services::stage::StagedFile;

impl IngestionPipeline {
    /// Runs one staged file through the pipeline. The staged file and any
    /// derived asset are released before this returns, whatever the outcome.
    pub async fn ingest_one(
        &self,
        staged: StagedFile,
        owner_id: &str,
    ) -> Result<IngestionResult, PipelineError> {
        let span = tracing::info_span!(
            "ingest_file",
            stage_id = %staged.stage_id,
            request_id = %staged.owner_request_id,
            filename = %staged.declared_name,
        );

        async {
            let mut temps = TempSet::new(&staged.local_path);
            let outcome = self.run_ingest(&staged, owner_id, &mut temps).await;
            temps.release_all(self.stage.as_ref()).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run_ingest(
        &self,
        staged: &StagedFile,
        owner_id: &str,
        temps: &mut TempSet,
    ) -> Result<IngestionResult, PipelineError> {
        tracing::info!(
            "Processing {} ({})",
            staged.declared_name,
            staged.declared_mime_type
        );

        let (asset, original_size) = self.prepare(staged, temps).await?;
        let remote = self.upload_asset(staged, &asset).await?;

        let file = self
            .repo
            .create(&staged.declared_name, &remote.url, &remote.object_key, owner_id)
            .await
            .map_err(|source| {
                tracing::error!(
                    object_key = %remote.object_key,
                    "❌ Record write failed after upload; remote object is a reconciliation candidate: {}",
                    source
                );
                PipelineError::Persist {
                    filename: staged.declared_name.clone(),
                    object_key: remote.object_key.clone(),
                    source,
                }
            })?;

        tracing::info!(
            "✅ Stored {} as {} ({:?})",
            staged.declared_name,
            remote.object_key,
            remote.resource_kind
        );

        Ok(IngestionResult {
            file,
            original_size,
            compressed_size: asset.byte_size,
        })
    }

    /// Ingests a batch in input order.
    ///
    /// After the first failure no further file is started and the error is
    /// returned; files that already completed stay uploaded and persisted, so
    /// a batch error means "zero or more files may have succeeded". Every
    /// staged file is released, including the ones never attempted.
    pub async fn ingest_batch(
        &self,
        files: Vec<StagedFile>,
        owner_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, PipelineError> {
        let total = files.len();
        let semaphore = Arc::new(Semaphore::new(self.batch_concurrency));
        let failed = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(total);
        let mut cancelled = false;
        let mut pending = files.into_iter();

        for staged in pending.by_ref() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };

            let Some(permit) = permit else {
                cancelled = true;
                self.stage.release(&staged.local_path).await;
                break;
            };
            if failed.load(Ordering::SeqCst) {
                self.stage.release(&staged.local_path).await;
                break;
            }

            let pipeline = self.clone();
            let owner_id = owner_id.to_string();
            let failed = failed.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let res = pipeline.ingest_one(staged, &owner_id).await;
                if res.is_err() {
                    failed.store(true, Ordering::SeqCst);
                }
                res
            }));
        }

        for staged in pending {
            self.stage.release(&staged.local_path).await;
        }

        let mut results = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(e) => tracing::error!("Ingestion task ended unexpectedly: {}", e),
            }
        }

        if let Some(e) = first_error {
            tracing::warn!(
                "Batch aborted: {} of {} file(s) were stored before the failure: {}",
                results.len(),
                total,
                e
            );
            return Err(e);
        }
        if cancelled {
            tracing::warn!(
                "Batch cancelled: {} of {} file(s) stored",
                results.len(),
                total
            );
            return Err(PipelineError::Cancelled {
                completed: results.len(),
            });
        }

        let success_count = results.len();
        Ok(BatchResult {
            results,
            success_count,
        })
    }
}
