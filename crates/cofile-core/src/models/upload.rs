use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::file::{FileEntryResponse, Placement, Visibility};
use crate::fingerprint::{ContentKey, Fingerprint};

/// Declared shape of an in-progress chunked upload.
///
/// Chunk receipt state is not part of this record; it is owned by the session
/// registry so it can be synchronized per session.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub file_name: String,
    pub declared_size: u64,
    pub fingerprint: Fingerprint,
    pub chunk_size: u64,
    pub total_chunks: u64,
    pub placement: Placement,
    pub visibility: Visibility,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn content_key(&self) -> ContentKey {
        ContentKey::new(self.fingerprint.clone(), self.declared_size)
    }

    /// Exact byte length chunk `index` must have. Every chunk is `chunk_size`
    /// except the last, which carries the remainder.
    pub fn expected_chunk_len(&self, index: u64) -> Option<u64> {
        if index >= self.total_chunks {
            return None;
        }
        if index + 1 == self.total_chunks {
            Some(self.declared_size - (self.total_chunks - 1) * self.chunk_size)
        } else {
            Some(self.chunk_size)
        }
    }
}

/// Request to start an upload
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct InitUploadRequest {
    /// Display name of the file
    #[validate(length(
        min = 1,
        max = 255,
        message = "File name must be between 1 and 255 characters"
    ))]
    pub file_name: String,
    /// Total size in bytes
    #[validate(range(min = 1, message = "File size must be at least 1 byte"))]
    pub file_size: u64,
    /// MD5 of the whole file (32 hex characters)
    #[validate(length(equal = 32, message = "Fingerprint must be 32 hex characters"))]
    pub fingerprint: String,
    /// Size of every chunk except the last
    #[validate(range(min = 1, message = "Chunk size must be at least 1 byte"))]
    pub chunk_size: u64,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
    #[serde(default)]
    pub task_id: Option<Uuid>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,
}

impl InitUploadRequest {
    pub fn placement(&self) -> Placement {
        Placement {
            folder_id: self.folder_id,
            workflow_id: self.workflow_id,
            task_id: self.task_id,
        }
    }
}

/// Result of starting an upload: either a session to send chunks to, or the
/// file that was created immediately because the content is already stored.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitUploadResponse {
    Session(UploadSessionResponse),
    Instant(InstantUploadResponse),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadSessionResponse {
    pub session_id: Uuid,
    pub total_chunks: u64,
    pub chunk_size: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InstantUploadResponse {
    pub file: FileEntryResponse,
}

/// Acknowledgement of a stored chunk
#[derive(Debug, Serialize, ToSchema)]
pub struct ChunkReceipt {
    pub session_id: Uuid,
    pub chunk_index: u64,
    pub received_count: u64,
    pub total_chunks: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Some chunks are still missing
    Uploading,
    /// Every chunk has arrived; the upload can be completed
    Ready,
    /// Completion is in progress
    Finalizing,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadProgress {
    pub session_id: Uuid,
    pub file_name: String,
    pub file_size: u64,
    pub received_count: u64,
    pub total_chunks: u64,
    pub uploaded_bytes: u64,
    pub percent: f64,
    pub status: UploadStatus,
    /// First missing chunk indices, capped
    pub missing_indices: Vec<u64>,
    pub created_at: DateTime<Utc>,
}
