//! Batch archive handlers
//!
//! Archives are packaged in the background. Clients poll the task and follow its
//! `retrieval_reference` once it is completed.

use crate::auth::Caller;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::handlers::{attachment_disposition, stream_body};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use cofile_core::models::{
    ArchiveTaskList, ArchiveTaskResponse, CreateArchiveRequest, CreateArchiveResponse,
    ListArchivesQuery,
};
use cofile_core::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[utoipa::path(
    post,
    path = "/api/v1/archives",
    tag = "archives",
    request_body = CreateArchiveRequest,
    responses(
        (status = 202, description = "Archive task accepted", body = CreateArchiveResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "None of the files are accessible", body = ErrorResponse),
        (status = 503, description = "Archive queue is full", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_archive(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<CreateArchiveRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = state
        .archives
        .request_archive(caller.user_id, request)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(response)))
}

#[utoipa::path(
    get,
    path = "/api/v1/archives",
    tag = "archives",
    params(ListArchivesQuery),
    responses(
        (status = 200, description = "Caller's archive tasks, newest first", body = ArchiveTaskList)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_archives(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    query: Result<Query<ListArchivesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Query(query) = query?;
    let list = state.archives.list(caller.user_id, query).await?;
    Ok(Json(list))
}

#[utoipa::path(
    get,
    path = "/api/v1/archives/{task_id}",
    tag = "archives",
    params(
        ("task_id" = Uuid, Path, description = "Archive task ID")
    ),
    responses(
        (status = 200, description = "Archive task status", body = ArchiveTaskResponse),
        (status = 404, description = "Task not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_archive(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(task_id) = path?;
    let task = state.archives.status(caller.user_id, task_id).await?;
    Ok(Json(task))
}

#[utoipa::path(
    get,
    path = "/api/v1/archives/{task_id}/download",
    tag = "archives",
    params(
        ("task_id" = Uuid, Path, description = "Archive task ID")
    ),
    responses(
        (status = 200, description = "Zip container", content_type = "application/zip"),
        (status = 404, description = "Task not found or expired", body = ErrorResponse),
        (status = 409, description = "Archive is not completed", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, path), fields(user_id = %caller.user_id, operation = "download_archive"))]
pub async fn download_archive(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(task_id) = path?;
    let download = state.archives.open_download(caller.user_id, task_id).await?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/zip")
        .header(header::CONTENT_LENGTH, download.size)
        .header(
            header::CONTENT_DISPOSITION,
            attachment_disposition(&download.file_name),
        )
        .body(stream_body(download.stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}
