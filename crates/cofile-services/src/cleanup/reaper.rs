use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cofile_core::AppError;
use cofile_db::ArchiveTaskRepository;
use cofile_storage::Storage;
use tokio::sync::Mutex;
use tokio::time::interval;

use crate::upload::UploadService;

/// Rows fetched per expired-archive batch
const EXPIRED_BATCH_SIZE: u32 = 100;

/// What one sweep removed
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub archives_removed: usize,
    pub sessions_expired: usize,
    pub staging_dirs_removed: usize,
}

/// Periodically reclaims expired archives, stale upload sessions and orphaned
/// staging directories.
pub struct ExpiryReaper {
    archives: Arc<dyn ArchiveTaskRepository>,
    storage: Arc<dyn Storage>,
    uploads: UploadService,
    session_ttl: Duration,
    sweep_interval: Duration,
    sweep_lock: Mutex<()>,
}

impl ExpiryReaper {
    pub fn new(
        archives: Arc<dyn ArchiveTaskRepository>,
        storage: Arc<dyn Storage>,
        uploads: UploadService,
        session_ttl: Duration,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            archives,
            storage,
            uploads,
            session_ttl,
            sweep_interval,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Start the background sweep loop.
    /// Returns a JoinHandle for graceful shutdown
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.sweep_interval);

            loop {
                ticker.tick().await;

                tracing::info!("Starting scheduled expiry sweep");

                match self.sweep().await {
                    Ok(Some(report)) => tracing::info!(
                        archives_removed = report.archives_removed,
                        sessions_expired = report.sessions_expired,
                        staging_dirs_removed = report.staging_dirs_removed,
                        "Expiry sweep completed"
                    ),
                    Ok(None) => tracing::debug!("Previous sweep still running, skipped"),
                    Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                }
            }
        })
    }

    /// Run one sweep. Returns `None` without doing anything if another sweep is
    /// in progress.
    #[tracing::instrument(skip(self), fields(cleanup.operation = "expiry_sweep"))]
    pub async fn sweep(&self) -> Result<Option<SweepReport>, AppError> {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            return Ok(None);
        };

        let archives_removed = self.remove_expired_archives().await?;

        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.session_ttl).unwrap_or(chrono::Duration::zero());
        let sessions_expired = self.uploads.expire_sessions_before(cutoff).await;

        let staging_dirs_removed = match self.uploads.remove_orphaned_staging(self.session_ttl).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, "Failed to remove orphaned staging directories");
                0
            }
        };

        Ok(Some(SweepReport {
            archives_removed,
            sessions_expired,
            staging_dirs_removed,
        }))
    }

    async fn remove_expired_archives(&self) -> Result<usize, AppError> {
        let mut removed = 0;
        loop {
            let expired = self
                .archives
                .list_expired(Utc::now(), EXPIRED_BATCH_SIZE)
                .await?;
            if expired.is_empty() {
                break;
            }

            let mut progressed = false;
            for task in &expired {
                if let Some(key) = &task.container_key {
                    // Missing objects are fine; anything else keeps the record for a retry.
                    if let Err(e) = self.storage.delete(key).await {
                        tracing::warn!(task_id = %task.id, storage_key = %key, error = %e, "Failed to delete expired archive");
                        continue;
                    }
                }
                if self.archives.delete(task.id).await? {
                    tracing::debug!(task_id = %task.id, "Expired archive removed");
                    removed += 1;
                }
                progressed = true;
            }

            if !progressed || expired.len() < EXPIRED_BATCH_SIZE as usize {
                break;
            }
        }
        Ok(removed)
    }
}
