use crate::auth::Caller;
use crate::error::{ErrorResponse, HttpAppError};
use crate::handlers::{attachment_disposition, stream_body};
use crate::state::AppState;
use axum::{
    extract::{rejection::PathRejection, Path, State},
    http::{header, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use cofile_core::models::FileEntryResponse;
use cofile_core::AppError;
use std::sync::Arc;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}",
    tag = "files",
    params(
        ("id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File metadata", body = FileEntryResponse),
        (status = 404, description = "File not found or not readable by caller", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_file(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(id) = path?;
    let entry = state.files.get_file(caller.user_id, id).await?;
    Ok(Json(FileEntryResponse::from(entry)))
}

#[utoipa::path(
    get,
    path = "/api/v1/files/{id}/content",
    tag = "files",
    params(
        ("id" = Uuid, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File bytes", content_type = "application/octet-stream"),
        (status = 404, description = "File not found or not readable by caller", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, path), fields(user_id = %caller.user_id, operation = "download_file"))]
pub async fn download_file(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(id) = path?;
    let (entry, stream) = state.files.open_content(caller.user_id, id).await?;

    tracing::debug!(file_id = %id, size = entry.file_size, "Streaming file content");

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, entry.mime_type.as_str())
        .header(header::CONTENT_LENGTH, entry.file_size)
        .header(
            header::CONTENT_DISPOSITION,
            attachment_disposition(&entry.file_name),
        )
        .body(stream_body(stream))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}
