//! Repository traits for the persistent metadata store

use chrono::{DateTime, Utc};
use cofile_core::models::{ArchiveStatus, ArchiveTask, ArchiveTransition, ContentRecord, FileEntry};
use cofile_core::{AppError, ContentKey};
use uuid::Uuid;

/// Deduplicated content records, unique per fingerprint and size
#[async_trait::async_trait]
pub trait ContentRepository: Send + Sync {
    async fn find_by_key(&self, key: &ContentKey) -> Result<Option<ContentRecord>, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<ContentRecord>, AppError>;

    /// Insert `record`, or return the record already stored under the same key.
    async fn insert_or_get(&self, record: ContentRecord) -> Result<ContentRecord, AppError>;

    async fn count(&self) -> Result<u64, AppError>;
}

/// User-facing file records
#[async_trait::async_trait]
pub trait FileRepository: Send + Sync {
    async fn create(&self, entry: FileEntry) -> Result<FileEntry, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<FileEntry>, AppError>;

    /// Fetch every existing record among `ids`. Order is not preserved.
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<FileEntry>, AppError>;

    async fn count(&self) -> Result<u64, AppError>;
}

/// Archive packaging tasks
#[async_trait::async_trait]
pub trait ArchiveTaskRepository: Send + Sync {
    async fn create(&self, task: ArchiveTask) -> Result<ArchiveTask, AppError>;

    async fn get(&self, id: Uuid) -> Result<Option<ArchiveTask>, AppError>;

    /// Atomically apply `transition` if the task's current status allows it.
    ///
    /// Returns `NotFound` for an unknown task and `InvalidState` when the current
    /// status does not permit the move.
    async fn transition(
        &self,
        id: Uuid,
        transition: ArchiveTransition,
    ) -> Result<ArchiveTask, AppError>;

    /// A requester's tasks, newest first, with the total count.
    async fn list_for_requester(
        &self,
        requester_id: Uuid,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<ArchiveTask>, u64), AppError>;

    /// Completed tasks whose expiry is at or before `now`.
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ArchiveTask>, AppError>;

    async fn list_by_status(&self, status: ArchiveStatus) -> Result<Vec<ArchiveTask>, AppError>;

    /// Returns whether a record was removed.
    async fn delete(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Status a task must be in for `transition` to apply
pub(crate) fn required_status(transition: &ArchiveTransition) -> ArchiveStatus {
    match transition {
        ArchiveTransition::Start => ArchiveStatus::Pending,
        ArchiveTransition::Complete { .. } | ArchiveTransition::Fail { .. } => {
            ArchiveStatus::Processing
        }
    }
}

pub(crate) fn rejected_transition(id: Uuid, from: ArchiveStatus, to: ArchiveStatus) -> AppError {
    AppError::InvalidState(format!(
        "Archive task {} cannot move from {} to {}",
        id, from, to
    ))
}
