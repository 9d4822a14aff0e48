//! Accepts batch archive requests and hands them to the worker pool

use std::collections::HashSet;
use std::sync::Arc;

use cofile_core::models::{ArchiveTask, CreateArchiveRequest, CreateArchiveResponse};
use cofile_core::AppError;
use cofile_db::{ArchiveTaskRepository, FileRepository};
use cofile_worker::ArchiveQueue;
use uuid::Uuid;
use validator::Validate;

use super::naming::archive_file_name;
use crate::permission::PermissionResolver;

#[derive(Clone)]
pub struct ArchiveTaskScheduler {
    files: Arc<dyn FileRepository>,
    archives: Arc<dyn ArchiveTaskRepository>,
    permissions: Arc<dyn PermissionResolver>,
    queue: ArchiveQueue,
    max_files: usize,
}

impl ArchiveTaskScheduler {
    pub fn new(
        files: Arc<dyn FileRepository>,
        archives: Arc<dyn ArchiveTaskRepository>,
        permissions: Arc<dyn PermissionResolver>,
        queue: ArchiveQueue,
        max_files: usize,
    ) -> Self {
        Self {
            files,
            archives,
            permissions,
            queue,
            max_files,
        }
    }

    /// Create a pending task for the files `requester` may read and queue it.
    #[tracing::instrument(skip(self, request), fields(requester_id = %requester, requested = request.file_ids.len()))]
    pub async fn schedule(
        &self,
        requester: Uuid,
        request: CreateArchiveRequest,
    ) -> Result<CreateArchiveResponse, AppError> {
        request.validate()?;

        let mut seen = HashSet::new();
        let requested: Vec<Uuid> = request
            .file_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect();
        if requested.len() > self.max_files {
            return Err(AppError::InvalidInput(format!(
                "An archive can contain at most {} files",
                self.max_files
            )));
        }

        let accepted = self.accessible_files(requester, &requested).await?;
        if accepted.is_empty() {
            return Err(AppError::NoAccessibleContent);
        }

        let name = archive_file_name(request.archive_name.as_deref());
        let task = self
            .archives
            .create(ArchiveTask::new_pending(requester, name, accepted))
            .await?;

        if let Err(e) = self.queue.try_enqueue(task.id) {
            // Nothing will ever pick the task up; don't leave it pending.
            if let Err(del) = self.archives.delete(task.id).await {
                tracing::error!(task_id = %task.id, error = %del, "Failed to discard unqueued archive task");
            }
            return Err(e.into());
        }

        tracing::info!(
            task_id = %task.id,
            accepted_count = task.file_ids.len(),
            dropped_count = requested.len() - task.file_ids.len(),
            "Archive task scheduled"
        );

        Ok(CreateArchiveResponse {
            task_id: task.id,
            accepted_count: task.file_ids.len(),
            status: task.status,
        })
    }

    /// Ids from `requested`, in request order, that exist and pass the permission check.
    async fn accessible_files(
        &self,
        requester: Uuid,
        requested: &[Uuid],
    ) -> Result<Vec<Uuid>, AppError> {
        let found = self.files.get_many(requested).await?;
        let mut accepted = Vec::with_capacity(requested.len());
        for id in requested {
            let Some(entry) = found.iter().find(|f| f.id == *id) else {
                continue;
            };
            if entry.is_active() && self.permissions.can_read(requester, entry).await? {
                accepted.push(*id);
            }
        }
        Ok(accepted)
    }
}
