//! OpenAPI documentation, served at `/api/v1/openapi.json`

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error;
use crate::handlers;
use cofile_core::models;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Cofile API",
        version = "0.1.0",
        description = "Team file transfer: resumable chunked uploads with content deduplication, file access and asynchronous batch archives. All endpoints except /health are versioned under /api/v1/."
    ),
    paths(
        // Uploads
        handlers::uploads::init_upload,
        handlers::uploads::upload_chunk,
        handlers::uploads::complete_upload,
        handlers::uploads::get_upload_progress,
        handlers::uploads::cancel_upload,
        // Files
        handlers::files::get_file,
        handlers::files::download_file,
        // Archives
        handlers::archives::create_archive,
        handlers::archives::list_archives,
        handlers::archives::get_archive,
        handlers::archives::download_archive,
        // Health
        handlers::health::health_check,
    ),
    components(
        schemas(
            models::InitUploadRequest,
            models::InitUploadResponse,
            models::UploadSessionResponse,
            models::InstantUploadResponse,
            models::ChunkReceipt,
            models::UploadProgress,
            models::UploadStatus,
            models::FileEntryResponse,
            models::Placement,
            models::Visibility,
            models::CreateArchiveRequest,
            models::CreateArchiveResponse,
            models::ArchiveTaskResponse,
            models::ArchiveTaskList,
            models::ArchiveStatus,
            handlers::health::HealthResponse,
            error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "uploads", description = "Resumable chunked uploads"),
        (name = "files", description = "File metadata and content"),
        (name = "archives", description = "Asynchronous batch archives"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;
