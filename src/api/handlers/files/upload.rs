use crate::api::error::AppError;
use crate::api::middleware::request_id::RequestId;
use crate::services::stage::StagedFile;
use crate::utils::auth::Claims;
use crate::utils::validation::sanitize_filename;
use axum::{
    Extension, Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::types::*;

const DEFAULT_MIME: &str = "application/octet-stream";

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

fn request_id_of(request_id: Option<Extension<RequestId>>) -> String {
    request_id
        .map(|Extension(RequestId(id))| id)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Consumes the rest of the body so the client is not reset mid-upload.
async fn drain(multipart: &mut Multipart) {
    while let Ok(Some(mut field)) = multipart.next_field().await {
        while let Ok(Some(_)) = field.chunk().await {}
    }
}

/// Streams every multipart field named `field_name` into the stage.
///
/// On error the files staged so far are released and the remaining body is
/// drained before returning.
async fn stage_fields(
    state: &crate::AppState,
    request_id: &str,
    multipart: &mut Multipart,
    field_name: &str,
    max_files: usize,
) -> Result<Vec<StagedFile>, AppError> {
    let stage = state.pipeline.stage().clone();
    let mut staged: Vec<StagedFile> = Vec::new();

    let result: Result<(), AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() != Some(field_name) {
                continue;
            }
            if staged.len() >= max_files {
                return Err(AppError::BadRequest(format!(
                    "At most {} file(s) per request",
                    max_files
                )));
            }

            let declared_name = sanitize_filename(field.file_name().unwrap_or("unnamed"))
                .map_err(|e| AppError::BadRequest(e.message))?;
            let declared_mime = field
                .content_type()
                .unwrap_or(DEFAULT_MIME)
                .to_string();

            let reader = StreamReader::new(field.map_err(std::io::Error::other));
            let file = stage
                .stage(request_id, &declared_name, &declared_mime, Box::new(reader))
                .await?;
            staged.push(file);
        }
        Ok(())
    }
    .await;

    match result {
        Ok(()) => Ok(staged),
        Err(e) => {
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            for file in &staged {
                stage.release(&file.local_path).await;
            }
            drain(multipart).await;
            Err(e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/upload",
    request_body(content = Multipart, description = "One to twenty `files` parts"),
    responses(
        (status = 200, description = "Files uploaded", body = UploadResponse),
        (status = 400, description = "No files, too many files or unsupported type"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "File too large")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn upload_files(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    request_id: Option<Extension<RequestId>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let request_id = request_id_of(request_id);
    let max_files = state.config.upload.max_files_per_request;

    let staged = stage_fields(&state, &request_id, &mut multipart, "files", max_files).await?;
    if staged.is_empty() {
        return Err(AppError::BadRequest("No files provided".to_string()));
    }

    // Run the batch in its own task so a client disconnect cancels it through
    // the token instead of dropping it mid-file.
    let cancel = CancellationToken::new();
    let _on_disconnect = cancel.clone().drop_guard();
    let pipeline = state.pipeline.clone();
    let owner_id = claims.sub.clone();
    let batch = tokio::spawn(async move { pipeline.ingest_batch(staged, &owner_id, &cancel).await })
        .await
        .map_err(|e| AppError::Internal(format!("Upload task failed: {}", e)))??;

    Ok(Json(UploadResponse {
        message: "Files uploaded".to_string(),
        total_files: batch.success_count,
        files: batch
            .results
            .into_iter()
            .map(UploadedFileResponse::from)
            .collect(),
    }))
}

#[utoipa::path(
    put,
    path = "/files/{id}/replace",
    request_body(content = Multipart, description = "Replacement content in a `file` part"),
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File replaced", body = ReplaceResponse),
        (status = 400, description = "No file or unsupported type"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn replace_file(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    request_id: Option<Extension<RequestId>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<ReplaceResponse>, AppError> {
    let request_id = request_id_of(request_id);

    let Some(existing) = state.repo.find_owned(&id, &claims.sub).await? else {
        drain(&mut multipart).await;
        return Err(AppError::NotFound("File not found".to_string()));
    };

    let staged = stage_fields(&state, &request_id, &mut multipart, "file", 1)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::BadRequest("No file provided".to_string()))?;

    let result = state.pipeline.replace(&existing, staged).await?;

    Ok(Json(ReplaceResponse {
        message: "File replaced".to_string(),
        file: result.into(),
    }))
}
