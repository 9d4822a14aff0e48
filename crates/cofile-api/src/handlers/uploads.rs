//! Chunked upload handlers
//!
//! Chunks are sent as raw request bodies with their MD5 in the `X-Chunk-Checksum`
//! header, in any order and any number of times.

use crate::auth::Caller;
use crate::constants::CHUNK_CHECKSUM_HEADER;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{BytesRejection, PathRejection},
        Path, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use cofile_core::models::{
    ChunkReceipt, FileEntryResponse, InitUploadRequest, InitUploadResponse, UploadProgress,
};
use cofile_core::AppError;
use cofile_services::IncomingChunk;
use std::sync::Arc;
use uuid::Uuid;

/// Start an upload session, or create the file at once when its content is already stored
#[utoipa::path(
    post,
    path = "/api/v1/uploads",
    tag = "uploads",
    request_body = InitUploadRequest,
    responses(
        (status = 201, description = "Upload session created", body = InitUploadResponse),
        (status = 200, description = "Content already stored; file created without transfer", body = InitUploadResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn init_upload(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    ValidatedJson(request): ValidatedJson<InitUploadRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = state.uploads.init(caller.user_id, request).await?;
    let status = match response {
        InitUploadResponse::Session(_) => StatusCode::CREATED,
        InitUploadResponse::Instant(_) => StatusCode::OK,
    };
    Ok((status, Json(response)))
}

/// Store one chunk
#[utoipa::path(
    put,
    path = "/api/v1/uploads/{session_id}/chunks/{index}",
    tag = "uploads",
    params(
        ("session_id" = Uuid, Path, description = "Upload session ID"),
        ("index" = u64, Path, description = "Zero-based chunk index"),
        ("X-Chunk-Checksum" = String, Header, description = "MD5 of the chunk body, hex")
    ),
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Chunk stored", body = ChunkReceipt),
        (status = 400, description = "Invalid index, size or checksum format", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Session is being finalized", body = ErrorResponse),
        (status = 413, description = "Chunk too large", body = ErrorResponse),
        (status = 422, description = "Checksum mismatch", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
#[tracing::instrument(skip(state, headers, body), fields(user_id = %caller.user_id))]
pub async fn upload_chunk(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    path: Result<Path<(Uuid, u64)>, PathRejection>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path((session_id, index)) = path?;
    let checksum = headers
        .get(CHUNK_CHECKSUM_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            AppError::InvalidInput(format!("Missing {} header", CHUNK_CHECKSUM_HEADER))
        })?
        .to_string();
    let data = body?;

    let receipt = state
        .uploads
        .upload_chunk(
            caller.user_id,
            IncomingChunk {
                session_id,
                index,
                data,
                checksum,
            },
        )
        .await?;
    Ok(Json(receipt))
}

/// Merge and verify the received chunks into a stored file
#[utoipa::path(
    post,
    path = "/api/v1/uploads/{session_id}/complete",
    tag = "uploads",
    params(
        ("session_id" = Uuid, Path, description = "Upload session ID")
    ),
    responses(
        (status = 201, description = "File created", body = FileEntryResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Chunks missing or already finalizing", body = ErrorResponse),
        (status = 422, description = "Merged content does not match the declared fingerprint", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn complete_upload(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(session_id) = path?;
    let entry = state.uploads.finalize(caller.user_id, session_id).await?;
    Ok((StatusCode::CREATED, Json(FileEntryResponse::from(entry))))
}

#[utoipa::path(
    get,
    path = "/api/v1/uploads/{session_id}",
    tag = "uploads",
    params(
        ("session_id" = Uuid, Path, description = "Upload session ID")
    ),
    responses(
        (status = 200, description = "Upload progress", body = UploadProgress),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_upload_progress(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(session_id) = path?;
    let progress = state.uploads.progress(caller.user_id, session_id).await?;
    Ok(Json(progress))
}

#[utoipa::path(
    delete,
    path = "/api/v1/uploads/{session_id}",
    tag = "uploads",
    params(
        ("session_id" = Uuid, Path, description = "Upload session ID")
    ),
    responses(
        (status = 204, description = "Upload cancelled"),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "Session is being finalized", body = ErrorResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn cancel_upload(
    caller: Caller,
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<impl IntoResponse, HttpAppError> {
    let Path(session_id) = path?;
    state.uploads.cancel(caller.user_id, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
