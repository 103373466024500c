use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::{UploadConfig, WorkerConfig};
use crate::services::pipeline::IngestionPipeline;
use crate::services::stage::TempStage;

/// Periodic housekeeping: stale stage files and orphaned remote objects.
pub struct BackgroundWorker {
    pipeline: Arc<IngestionPipeline>,
    stage: Arc<dyn TempStage>,
    upload: UploadConfig,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        pipeline: Arc<IngestionPipeline>,
        upload: UploadConfig,
        config: WorkerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let stage = pipeline.stage().clone();
        Self {
            pipeline,
            stage,
            upload,
            config,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = sleep(self.config.sweep_interval) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    pub async fn perform_cleanup(&self) {
        tracing::info!("🧹 Running background cleanup tasks...");

        // 1. Stage files left behind by interrupted runs
        match self.stage.sweep(self.upload.stale_stage_age).await {
            Ok(0) => {}
            Ok(n) => tracing::info!("Removed {} stale stage file(s)", n),
            Err(e) => tracing::error!("Stage sweep failed: {}", e),
        }

        // 2. Remote objects without a record
        if let Err(e) = self.pipeline.reconcile_orphans(self.config.orphan_grace).await {
            tracing::error!("Reconciliation sweep failed: {}", e);
        }

        tracing::info!("✅ Background cleanup completed");
    }
}
