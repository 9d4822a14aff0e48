//! Background archive packaging
//!
//! Each job moves its task `pending -> processing`, streams every accepted file
//! into a ZIP written to a local temp file, then moves the result into storage and
//! marks the task `completed`. Any failure removes the partial container and marks
//! the task `failed`; failed tasks are not retried.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use cofile_core::models::{ArchiveStatus, ArchiveTask, ArchiveTransition};
use cofile_core::AppError;
use cofile_db::{ArchiveTaskRepository, ContentRepository, FileRepository};
use cofile_storage::{archive_key, ContentStore, Storage};
use cofile_worker::ArchiveJobHandler;
use tempfile::NamedTempFile;
use tokio::runtime::Handle;
use tokio_util::io::SyncIoBridge;
use uuid::Uuid;
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

use super::naming::EntryNamer;

/// One file to place in the container
#[derive(Debug, Clone)]
struct PlannedEntry {
    name: String,
    storage_key: String,
    size: u64,
}

pub struct ArchiveBuilder {
    files: Arc<dyn FileRepository>,
    contents: Arc<dyn ContentRepository>,
    archives: Arc<dyn ArchiveTaskRepository>,
    content_store: ContentStore,
    work_dir: PathBuf,
    ttl: Duration,
}

impl ArchiveBuilder {
    pub fn new(
        files: Arc<dyn FileRepository>,
        contents: Arc<dyn ContentRepository>,
        archives: Arc<dyn ArchiveTaskRepository>,
        content_store: ContentStore,
        work_dir: PathBuf,
        ttl: Duration,
    ) -> Self {
        Self {
            files,
            contents,
            archives,
            content_store,
            work_dir,
            ttl,
        }
    }

    fn storage(&self) -> &Arc<dyn Storage> {
        self.content_store.storage()
    }

    /// Run one task to a terminal status. Returns `Err` only when the outcome
    /// could not be recorded.
    #[tracing::instrument(skip(self), fields(task_id = %task_id))]
    pub async fn build(&self, task_id: Uuid) -> Result<(), AppError> {
        let task = match self.archives.transition(task_id, ArchiveTransition::Start).await {
            Ok(task) => task,
            Err(AppError::InvalidState(_)) | Err(AppError::NotFound(_)) => {
                tracing::warn!("Archive task is no longer pending, skipping");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let start = Instant::now();
        let key = archive_key(task.id);
        let packaged = self.package(&task, &key).await;

        let transition = match packaged {
            Ok(size) => ArchiveTransition::Complete {
                container_key: key.clone(),
                container_size: size,
                expires_at: Utc::now() + self.ttl,
            },
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "Archive build failed");
                self.discard_container(&key).await;
                ArchiveTransition::Fail {
                    error_detail: format!("{:#}", e),
                }
            }
        };
        let completed = matches!(transition, ArchiveTransition::Complete { .. });

        if let Err(e) = self.archives.transition(task.id, transition).await {
            if completed {
                self.discard_container(&key).await;
            }
            return Err(e);
        }

        if completed {
            tracing::info!(
                file_count = task.file_ids.len(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Archive completed"
            );
        }
        Ok(())
    }

    /// Write the container for `task` and store it under `key`. Returns its size.
    async fn package(&self, task: &ArchiveTask, key: &str) -> anyhow::Result<u64> {
        let entries = self.plan_entries(task).await?;

        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .with_context(|| format!("creating {}", self.work_dir.display()))?;
        let temp = NamedTempFile::new_in(&self.work_dir).context("creating archive temp file")?;

        let store = self.content_store.clone();
        let rt = Handle::current();
        let temp = tokio::task::spawn_blocking(move || write_zip(temp, &entries, &store, &rt))
            .await
            .context("archive writer task failed")??;

        let temp_path = temp.into_temp_path();
        let size = self
            .storage()
            .put_file(key, &temp_path)
            .await
            .context("storing archive")?;
        Ok(size)
    }

    /// Resolve the task's files to entry names and storage keys, in task order.
    async fn plan_entries(&self, task: &ArchiveTask) -> anyhow::Result<Vec<PlannedEntry>> {
        let found = self.files.get_many(&task.file_ids).await?;
        let mut namer = EntryNamer::new();
        let mut entries = Vec::with_capacity(task.file_ids.len());

        for id in &task.file_ids {
            let file = found
                .iter()
                .find(|f| f.id == *id && f.is_active())
                .ok_or_else(|| anyhow!("file {} is no longer available", id))?;
            let content = self
                .contents
                .get(file.content_id)
                .await?
                .ok_or_else(|| anyhow!("content for file {} is missing", id))?;
            entries.push(PlannedEntry {
                name: namer.assign(&file.file_name, file.id),
                storage_key: content.storage_key,
                size: content.size,
            });
        }
        Ok(entries)
    }

    async fn discard_container(&self, key: &str) {
        if let Err(e) = self.storage().delete(key).await {
            tracing::warn!(storage_key = %key, error = %e, "Failed to remove partial archive");
        }
    }

    async fn fail_task(&self, task_id: Uuid, error_detail: String) -> Result<(), AppError> {
        let Some(task) = self.archives.get(task_id).await? else {
            return Ok(());
        };
        if task.status == ArchiveStatus::Pending {
            self.archives.transition(task_id, ArchiveTransition::Start).await?;
        } else if task.status != ArchiveStatus::Processing {
            return Ok(());
        }
        self.discard_container(&archive_key(task_id)).await;
        self.archives
            .transition(task_id, ArchiveTransition::Fail { error_detail })
            .await?;
        Ok(())
    }

    /// Mark a task that will never run, or was cut short, as failed.
    pub async fn abandon(&self, task_id: Uuid, reason: &str) {
        if let Err(e) = self.fail_task(task_id, reason.to_string()).await {
            tracing::error!(task_id = %task_id, error = %e, "Failed to record archive failure");
        }
    }
}

/// Entries at or past the 4 GiB mark need ZIP64 headers, which the writer
/// only emits when told up front.
fn entry_options(size: u64) -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644)
        .large_file(size >= u64::from(u32::MAX))
}

/// Blocking half of packaging: runs on the blocking pool and pulls each file
/// through a sync bridge over the async reader.
fn write_zip(
    mut temp: NamedTempFile,
    entries: &[PlannedEntry],
    store: &ContentStore,
    rt: &Handle,
) -> anyhow::Result<NamedTempFile> {
    {
        let mut zip = ZipWriter::new(temp.as_file_mut());

        for entry in entries {
            let reader = rt
                .block_on(store.open_reader(&entry.storage_key))
                .with_context(|| format!("opening {}", entry.name))?;
            let mut source = SyncIoBridge::new_with_handle(reader, rt.clone());

            zip.start_file(entry.name.as_str(), entry_options(entry.size))
                .with_context(|| format!("adding {}", entry.name))?;
            std::io::copy(&mut source, &mut zip)
                .with_context(|| format!("writing {}", entry.name))?;
        }

        let file = zip.finish().context("finishing archive")?;
        file.flush()?;
    }
    temp.as_file().sync_all()?;
    Ok(temp)
}

#[async_trait]
impl ArchiveJobHandler for ArchiveBuilder {
    async fn run_job(self: Arc<Self>, task_id: Uuid) -> anyhow::Result<()> {
        self.build(task_id).await?;
        Ok(())
    }

    async fn job_crashed(self: Arc<Self>, task_id: Uuid, reason: String) {
        self.abandon(task_id, &reason).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    fn single_entry_zip(name: &str, declared_size: u64, body: &[u8]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file(name, entry_options(declared_size)).unwrap();
        zip.write_all(body).unwrap();
        zip.finish().unwrap().into_inner()
    }

    /// Length of the extra field in the first local file header.
    fn local_extra_len(bytes: &[u8]) -> u16 {
        u16::from_le_bytes([bytes[28], bytes[29]])
    }

    fn read_first(bytes: Vec<u8>) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut body = String::new();
        archive.by_index(0).unwrap().read_to_string(&mut body).unwrap();
        body
    }

    #[test]
    fn test_small_entries_stay_plain_zip() {
        let bytes = single_entry_zip("a.txt", 5, b"alpha");
        assert_eq!(local_extra_len(&bytes), 0);
        assert_eq!(read_first(bytes), "alpha");
    }

    #[test]
    fn test_large_entries_are_written_as_zip64() {
        let name = "big.bin";
        let bytes = single_entry_zip(name, u64::from(u32::MAX) + 1, b"still readable");

        assert_eq!(local_extra_len(&bytes), 20);
        let extra = 30 + name.len();
        assert_eq!(u16::from_le_bytes([bytes[extra], bytes[extra + 1]]), 0x0001);
        assert_eq!(read_first(bytes), "still readable");
    }

    #[test]
    fn test_four_gib_boundary_switches_on_zip64() {
        assert_eq!(local_extra_len(&single_entry_zip("a", u64::from(u32::MAX) - 1, b"x")), 0);
        assert_eq!(local_extra_len(&single_entry_zip("a", u64::from(u32::MAX), b"x")), 20);
    }
}
