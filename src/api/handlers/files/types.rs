use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::services::pipeline::IngestionResult;
use crate::services::repository::FileRecord;

/// Largest page size accepted by `GET /files`
pub const MAX_PAGE_SIZE: u64 = 100;

/// Largest page number accepted by `GET /files`; keeps the row offset within i64
pub const MAX_PAGE: u64 = i64::MAX as u64 / MAX_PAGE_SIZE;

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct FileResponse {
    pub id: String,
    pub filename: String,
    pub url: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl From<FileRecord> for FileResponse {
    fn from(record: FileRecord) -> Self {
        Self {
            id: record.id,
            filename: record.filename,
            url: record.url,
            user_id: record.user_id,
            created_at: record.created_at,
        }
    }
}

#[derive(Serialize, ToSchema, Debug)]
pub struct UploadedFileResponse {
    #[serde(flatten)]
    pub file: FileResponse,
    pub original_size: u64,
    pub compressed_size: u64,
    /// Percentage saved by compression, one decimal
    pub compression_ratio: f64,
}

impl From<IngestionResult> for UploadedFileResponse {
    fn from(result: IngestionResult) -> Self {
        let compression_ratio = result.compression_ratio();
        Self {
            file: result.file.into(),
            original_size: result.original_size,
            compressed_size: result.compressed_size,
            compression_ratio,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<UploadedFileResponse>,
    pub total_files: usize,
}

#[derive(Serialize, ToSchema)]
pub struct ReplaceResponse {
    pub message: String,
    pub file: UploadedFileResponse,
}

#[derive(Deserialize, ToSchema)]
pub struct RenameRequest {
    pub filename: String,
}

#[derive(Serialize, ToSchema)]
pub struct RenameResponse {
    pub message: String,
    pub file: FileResponse,
}

#[derive(Serialize, ToSchema)]
pub struct DeleteResponse {
    pub message: String,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ListFilesQuery {
    /// Case-insensitive filename filter
    pub search: Option<String>,
    /// 1-based page number (default 1)
    pub page: Option<u64>,
    /// Page size (default 10, at most 100)
    pub limit: Option<u64>,
}

#[derive(Serialize, ToSchema, Debug, PartialEq)]
pub struct Pagination {
    pub current: u64,
    pub total: u64,
    pub total_files: u64,
}

impl Pagination {
    pub fn new(current: u64, limit: u64, total_files: u64) -> Self {
        Self {
            current,
            total: total_files.div_ceil(limit.max(1)),
            total_files,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ListFilesResponse {
    pub files: Vec<FileResponse>,
    pub pagination: Pagination,
}

#[derive(Serialize, ToSchema)]
pub struct StatsResponse {
    pub total_files: u64,
    pub last_upload: Option<DateTime<Utc>>,
}
