use sea_orm::DbErr;
use serde::Serialize;
use thiserror::Error;

use crate::services::classifier::UnsupportedType;
use crate::services::repository::FileRecord;

/// Whether a failed remote delete is propagated or only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletePolicy {
    BestEffort,
    Strict,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported file type: {mime_type} ({filename})")]
    UnsupportedType { filename: String, mime_type: String },

    #[error("Remote upload failed for {filename}: {source}")]
    RemoteUpload {
        filename: String,
        #[source]
        source: anyhow::Error,
    },

    /// The remote object was uploaded but no record references it.
    #[error("Failed to persist {filename} (orphaned object {object_key}): {source}")]
    Persist {
        filename: String,
        object_key: String,
        #[source]
        source: DbErr,
    },

    #[error("Remote delete failed for {object_key}: {source}")]
    RemoteDelete {
        object_key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Batch cancelled after {completed} file(s)")]
    Cancelled { completed: usize },
}

impl PipelineError {
    pub fn unsupported(filename: &str, err: UnsupportedType) -> Self {
        PipelineError::UnsupportedType {
            filename: filename.to_string(),
            mime_type: err.mime_type,
        }
    }

    /// True for the only client-input failure of the pipeline.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::UnsupportedType { .. })
    }
}

/// Outcome of one successfully ingested (or replaced) file.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    pub file: FileRecord,
    pub original_size: u64,
    pub compressed_size: u64,
}

impl IngestionResult {
    /// Percentage saved, one decimal. Zero when the original size is unknown.
    pub fn compression_ratio(&self) -> f64 {
        compression_ratio(self.original_size, self.compressed_size)
    }
}

pub fn compression_ratio(original_size: u64, compressed_size: u64) -> f64 {
    if original_size == 0 {
        return 0.0;
    }
    let saved = (original_size as f64 - compressed_size as f64) / original_size as f64 * 100.0;
    (saved * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchResult {
    pub results: Vec<IngestionResult>,
    pub success_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_ratio_rounds_to_one_decimal() {
        assert_eq!(compression_ratio(1000, 250), 75.0);
        assert_eq!(compression_ratio(3, 2), 33.3);
    }

    #[test]
    fn test_compression_ratio_zero_original() {
        assert_eq!(compression_ratio(0, 0), 0.0);
        assert_eq!(compression_ratio(0, 42), 0.0);
    }

    #[test]
    fn test_compression_ratio_can_be_negative() {
        assert_eq!(compression_ratio(100, 150), -50.0);
    }

    #[test]
    fn test_only_unsupported_type_is_client_error() {
        let unsupported = PipelineError::UnsupportedType {
            filename: "a.exe".to_string(),
            mime_type: "application/x-msdownload".to_string(),
        };
        let upload = PipelineError::RemoteUpload {
            filename: "a.png".to_string(),
            source: anyhow::anyhow!("quota"),
        };
        assert!(unsupported.is_client_error());
        assert!(!upload.is_client_error());
        assert!(!PipelineError::Cancelled { completed: 1 }.is_client_error());
    }
}
