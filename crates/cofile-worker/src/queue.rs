//! Archive queue: a bounded job queue drained by a fixed-size worker pool.
//!
//! Shutdown: [`ArchiveQueue::shutdown`] signals the pool to stop taking jobs; it does
//! not wait for in-flight jobs, and queued jobs are dropped. Task records of dropped
//! jobs stay `pending` and are re-enqueued on the next start.

use std::any::Any;
use std::sync::{Arc, Weak};

use cofile_core::{AppError, ArchiveConfig};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use uuid::Uuid;

use crate::context::ArchiveJobHandler;

#[derive(Clone, Debug)]
pub struct ArchiveQueueConfig {
    pub workers: usize,
    pub queue_depth: usize,
}

impl Default for ArchiveQueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_depth: 64,
        }
    }
}

impl From<&ArchiveConfig> for ArchiveQueueConfig {
    fn from(config: &ArchiveConfig) -> Self {
        Self {
            workers: config.workers,
            queue_depth: config.queue_depth,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("archive queue is full")]
    Full,
    #[error("archive queue is shut down")]
    Closed,
}

impl From<EnqueueError> for AppError {
    fn from(err: EnqueueError) -> Self {
        match err {
            EnqueueError::Full => AppError::QueueFull(
                "Too many archive requests are waiting; try again shortly".to_string(),
            ),
            EnqueueError::Closed => AppError::Internal(err.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct ArchiveQueue {
    jobs_tx: mpsc::Sender<Uuid>,
    shutdown_tx: mpsc::Sender<()>,
    config: ArchiveQueueConfig,
}

impl ArchiveQueue {
    /// Create the queue and spawn its worker pool.
    pub fn new(config: ArchiveQueueConfig, handler: Weak<dyn ArchiveJobHandler>) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::channel(config.queue_depth.max(1));
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let pool_config = config.clone();
        tokio::spawn(async move {
            Self::worker_pool(pool_config, handler, jobs_rx, shutdown_rx).await;
        });

        Self {
            jobs_tx,
            shutdown_tx,
            config,
        }
    }

    /// Queue `task_id` without waiting. Fails with [`EnqueueError::Full`] when the
    /// queue is at capacity.
    pub fn try_enqueue(&self, task_id: Uuid) -> Result<(), EnqueueError> {
        match self.jobs_tx.try_send(task_id) {
            Ok(()) => {
                tracing::debug!(task_id = %task_id, "Archive job queued");
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    task_id = %task_id,
                    queue_depth = self.config.queue_depth,
                    "Archive queue full, rejecting job"
                );
                Err(EnqueueError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EnqueueError::Closed),
        }
    }

    pub fn config(&self) -> &ArchiveQueueConfig {
        &self.config
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    async fn worker_pool(
        config: ArchiveQueueConfig,
        handler: Weak<dyn ArchiveJobHandler>,
        mut jobs_rx: mpsc::Receiver<Uuid>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            workers = config.workers,
            queue_depth = config.queue_depth,
            "Archive worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));

        loop {
            // Take a worker slot before a job so waiting jobs stay in the bounded queue.
            let permit = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let task_id = tokio::select! {
                biased;
                _ = shutdown_rx.recv() => break,
                job = jobs_rx.recv() => match job {
                    Some(task_id) => task_id,
                    None => break,
                },
            };

            let handler = handler.clone();
            tokio::spawn(async move {
                let _permit = permit;
                Self::process_job(task_id, handler).await;
            });
        }

        tracing::info!("Archive worker pool stopped");
    }

    #[tracing::instrument(skip(handler), fields(task.id = %task_id))]
    async fn process_job(task_id: Uuid, handler: Weak<dyn ArchiveJobHandler>) {
        let Some(handler) = handler.upgrade() else {
            tracing::warn!(task_id = %task_id, "Archive job handler was dropped, skipping job");
            return;
        };

        let start = std::time::Instant::now();
        // Run on its own task so a panic is contained to this job.
        let job = tokio::spawn(Arc::clone(&handler).run_job(task_id));

        match job.await {
            Ok(Ok(())) => {
                tracing::debug!(
                    task_id = %task_id,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Archive job finished"
                );
            }
            Ok(Err(e)) => {
                tracing::error!(task_id = %task_id, error = %e, "Archive job could not record its outcome");
            }
            Err(join_error) => {
                let reason = if join_error.is_panic() {
                    format!("worker panicked: {}", panic_message(join_error.into_panic()))
                } else {
                    "worker was cancelled".to_string()
                };
                tracing::error!(task_id = %task_id, reason = %reason, "Archive job crashed");
                handler.job_crashed(task_id, reason).await;
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
