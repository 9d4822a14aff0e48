//! Archive job handler trait
//!
//! The services layer implements this for its archive builder. The pool holds a
//! weak reference and calls `run_job` for each dequeued task id.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait ArchiveJobHandler: Send + Sync {
    /// Build the archive for `task_id`. The handler records the task outcome itself;
    /// an `Err` here only reports a failure to record it.
    async fn run_job(self: Arc<Self>, task_id: Uuid) -> Result<()>;

    /// Called when the job for `task_id` panicked or was aborted before it could
    /// record an outcome.
    async fn job_crashed(self: Arc<Self>, task_id: Uuid, reason: String);
}
