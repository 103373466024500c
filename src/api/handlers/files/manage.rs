use crate::api::error::AppError;
use crate::services::repository::FileChanges;
use crate::utils::auth::Claims;
use crate::utils::validation::sanitize_filename;
use axum::{
    Extension, Json,
    extract::{Path, State},
};

use super::types::*;

#[utoipa::path(
    put,
    path = "/files/{id}",
    request_body = RenameRequest,
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File renamed", body = RenameResponse),
        (status = 400, description = "Filename is empty"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn rename_file(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<RenameResponse>, AppError> {
    let filename =
        sanitize_filename(&req.filename).map_err(|e| AppError::BadRequest(e.message))?;

    state
        .repo
        .find_owned(&id, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    let changes = FileChanges {
        filename: Some(filename),
        ..Default::default()
    };
    let file = state.repo.update(&id, changes).await?;

    Ok(Json(RenameResponse {
        message: "File renamed".to_string(),
        file: file.into(),
    }))
}

#[utoipa::path(
    delete,
    path = "/files/{id}",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File deleted", body = DeleteResponse),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    let record = state
        .repo
        .find_owned(&id, &claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("File not found".to_string()))?;

    state.pipeline.delete_file(&record).await?;

    Ok(Json(DeleteResponse {
        message: "File deleted".to_string(),
    }))
}
