use anyhow::Result;
use chrono::Utc;
use std::time::Duration;

use super::{IngestionPipeline, ORPHAN_DELETE_POLICY};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub orphans: usize,
    pub deleted: usize,
}

impl IngestionPipeline {
    /// Deletes remote objects that no record references.
    ///
    /// Objects younger than `grace` are skipped so uploads whose record write is
    /// still in flight are never touched. Objects without a timestamp are skipped too.
    pub async fn reconcile_orphans(&self, grace: Duration) -> Result<ReconcileReport> {
        let listing = self.remote.list().await?;
        let cutoff = Utc::now() - chrono::Duration::from_std(grace)?;

        let candidates: Vec<_> = listing
            .into_iter()
            .filter(|o| o.last_modified.is_some_and(|t| t < cutoff))
            .collect();
        let keys: Vec<String> = candidates.iter().map(|o| o.object_key.clone()).collect();
        let referenced = self.repo.object_keys_present(&keys).await?;

        let mut report = ReconcileReport {
            scanned: candidates.len(),
            ..Default::default()
        };

        for key in keys.iter().filter(|k| !referenced.contains(*k)) {
            report.orphans += 1;
            match self.delete_remote(key, ORPHAN_DELETE_POLICY).await {
                Ok(()) => report.deleted += 1,
                Err(e) => tracing::warn!("Orphan {} not removed: {}", key, e),
            }
        }

        if report.orphans > 0 {
            tracing::info!(
                "🔎 Reconciliation: {} orphan(s) found, {} deleted",
                report.orphans,
                report.deleted
            );
        }

        Ok(report)
    }
}
