use crate::api::error::AppError;
use crate::services::repository::{ListFilter, Page};
use crate::utils::auth::Claims;
use axum::{
    Extension, Json,
    extract::{Query, State},
};

use super::types::*;

#[utoipa::path(
    get,
    path = "/files",
    params(ListFilesQuery),
    responses(
        (status = 200, description = "Files of the current user, newest first", body = ListFilesResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<ListFilesResponse>, AppError> {
    let page = Page {
        page: query.page.unwrap_or(1).clamp(1, MAX_PAGE),
        limit: query.limit.unwrap_or(10).clamp(1, MAX_PAGE_SIZE),
    };
    let filter = ListFilter {
        search: query
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    };

    let (records, total) = state.repo.list(&claims.sub, &filter, page).await?;

    Ok(Json(ListFilesResponse {
        files: records.into_iter().map(FileResponse::from).collect(),
        pagination: Pagination::new(page.page, page.limit, total),
    }))
}

#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Upload statistics of the current user", body = StatsResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    ),
    tag = "files"
)]
pub async fn get_stats(
    State(state): State<crate::AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<StatsResponse>, AppError> {
    let stats = state.repo.stats(&claims.sub).await?;

    Ok(Json(StatsResponse {
        total_files: stats.total_files,
        last_upload: stats.last_upload,
    }))
}
