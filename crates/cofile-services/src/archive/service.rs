use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use cofile_core::models::{
    ArchiveStatus, ArchiveTask, ArchiveTaskList, ArchiveTaskResponse, CreateArchiveRequest,
    CreateArchiveResponse, ListArchivesQuery,
};
use cofile_core::{AppError, ArchiveConfig};
use cofile_db::{ArchiveTaskRepository, Repositories};
use cofile_storage::{ByteStream, ContentStore};
use cofile_worker::{ArchiveJobHandler, ArchiveQueue, ArchiveQueueConfig};
use uuid::Uuid;

use super::builder::ArchiveBuilder;
use super::scheduler::ArchiveTaskScheduler;
use crate::permission::PermissionResolver;

const MAX_PAGE_SIZE: u32 = 100;

/// A completed archive ready to stream to its requester
pub struct ArchiveDownload {
    pub file_name: String,
    pub size: u64,
    pub stream: ByteStream,
}

/// Batch archive requests, status polling and retrieval
#[derive(Clone)]
pub struct ArchiveService {
    archives: Arc<dyn ArchiveTaskRepository>,
    content_store: ContentStore,
    scheduler: ArchiveTaskScheduler,
    builder: Arc<ArchiveBuilder>,
    queue: ArchiveQueue,
    public_base_url: String,
}

impl ArchiveService {
    /// Wire the builder to a fresh worker pool. Must be called inside a Tokio runtime.
    pub fn new(
        config: &ArchiveConfig,
        repositories: &Repositories,
        content_store: ContentStore,
        permissions: Arc<dyn PermissionResolver>,
        work_dir: PathBuf,
        public_base_url: String,
    ) -> Self {
        let builder = Arc::new(ArchiveBuilder::new(
            Arc::clone(&repositories.files),
            Arc::clone(&repositories.contents),
            Arc::clone(&repositories.archives),
            content_store.clone(),
            work_dir,
            chrono::Duration::hours(config.ttl_hours),
        ));
        let handler: Arc<dyn ArchiveJobHandler> = builder.clone();
        let queue = ArchiveQueue::new(ArchiveQueueConfig::from(config), Arc::downgrade(&handler));

        let scheduler = ArchiveTaskScheduler::new(
            Arc::clone(&repositories.files),
            Arc::clone(&repositories.archives),
            permissions,
            queue.clone(),
            config.max_files,
        );

        Self {
            archives: Arc::clone(&repositories.archives),
            content_store,
            scheduler,
            builder,
            queue,
            public_base_url,
        }
    }

    pub async fn request_archive(
        &self,
        requester: Uuid,
        request: CreateArchiveRequest,
    ) -> Result<CreateArchiveResponse, AppError> {
        self.scheduler.schedule(requester, request).await
    }

    pub async fn status(&self, requester: Uuid, task_id: Uuid) -> Result<ArchiveTaskResponse, AppError> {
        let task = self.owned_task(requester, task_id).await?;
        Ok(ArchiveTaskResponse::from_task(task, &self.public_base_url))
    }

    pub async fn list(
        &self,
        requester: Uuid,
        query: ListArchivesQuery,
    ) -> Result<ArchiveTaskList, AppError> {
        let page = query.page.max(1);
        let page_size = query.page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = u64::from(page - 1) * u64::from(page_size);

        let (tasks, total) = self
            .archives
            .list_for_requester(requester, page_size, offset)
            .await?;

        Ok(ArchiveTaskList {
            tasks: tasks
                .into_iter()
                .map(|t| ArchiveTaskResponse::from_task(t, &self.public_base_url))
                .collect(),
            page,
            page_size,
            total,
        })
    }

    /// Stream a completed archive to its requester.
    #[tracing::instrument(skip(self), fields(task_id = %task_id))]
    pub async fn open_download(&self, requester: Uuid, task_id: Uuid) -> Result<ArchiveDownload, AppError> {
        let task = self.owned_task(requester, task_id).await?;
        if task.status != ArchiveStatus::Completed {
            return Err(AppError::InvalidState(format!(
                "Archive {} is {}, not completed",
                task_id, task.status
            )));
        }
        if task.is_expired(Utc::now()) {
            return Err(not_found(task_id));
        }

        let (Some(key), Some(size)) = (task.container_key.as_deref(), task.container_size) else {
            return Err(AppError::Internal(format!(
                "Completed archive {} has no container",
                task_id
            )));
        };
        let stream = self.content_store.download_stream(key).await?;
        Ok(ArchiveDownload {
            file_name: task.name,
            size,
            stream,
        })
    }

    /// Settle tasks left behind by a previous process: interrupted builds fail,
    /// pending tasks are queued again.
    pub async fn recover_on_startup(&self) -> Result<(), AppError> {
        let interrupted = self.archives.list_by_status(ArchiveStatus::Processing).await?;
        for task in &interrupted {
            self.builder.abandon(task.id, "interrupted by restart").await;
        }

        let pending = self.archives.list_by_status(ArchiveStatus::Pending).await?;
        let mut requeued = 0usize;
        for task in &pending {
            match self.queue.try_enqueue(task.id) {
                Ok(()) => requeued += 1,
                Err(e) => self.builder.abandon(task.id, &format!("could not be queued: {}", e)).await,
            }
        }

        if !interrupted.is_empty() || !pending.is_empty() {
            tracing::info!(
                interrupted = interrupted.len(),
                requeued,
                "Recovered archive tasks from previous run"
            );
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }

    async fn owned_task(&self, requester: Uuid, task_id: Uuid) -> Result<ArchiveTask, AppError> {
        self.archives
            .get(task_id)
            .await?
            .filter(|t| t.requester_id == requester)
            .ok_or_else(|| not_found(task_id))
    }
}

fn not_found(task_id: Uuid) -> AppError {
    AppError::NotFound(format!("Archive task {} not found", task_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::VisibilityPermissionResolver;
    use bytes::Bytes;
    use cofile_core::models::{
        ArchiveTransition, ContentRecord, FileEntry, NewFileEntry, Placement, Visibility,
    };
    use cofile_core::{ContentKey, Fingerprint};
    use cofile_storage::{LocalStorage, Storage};
    use futures::TryStreamExt;
    use std::io::{Cursor, Read};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        service: ArchiveService,
        repos: Repositories,
        storage: Arc<LocalStorage>,
        _dir: TempDir,
    }

    async fn fixture(config: ArchiveConfig) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(dir.path().join("store")).await.unwrap());
        let repos = Repositories::in_memory();
        let service = ArchiveService::new(
            &config,
            &repos,
            ContentStore::new(storage.clone()),
            Arc::new(VisibilityPermissionResolver),
            dir.path().join("work"),
            "http://files.test".to_string(),
        );
        Fixture {
            service,
            repos,
            storage,
            _dir: dir,
        }
    }

    async fn add_file(f: &Fixture, owner: Uuid, name: &str, data: &'static [u8], visibility: Visibility) -> FileEntry {
        let key = ContentKey::new(Fingerprint::of(data), data.len() as u64);
        f.storage
            .put(&key.storage_key(), Bytes::from_static(data))
            .await
            .unwrap();
        let content = f
            .repos
            .contents
            .insert_or_get(ContentRecord::new(&key, "application/octet-stream"))
            .await
            .unwrap();
        f.repos
            .files
            .create(FileEntry::for_content(
                NewFileEntry {
                    owner_id: owner,
                    file_name: name.to_string(),
                    placement: Placement::default(),
                    visibility,
                    description: None,
                },
                &content,
            ))
            .await
            .unwrap()
    }

    async fn wait_for_terminal(f: &Fixture, requester: Uuid, task_id: Uuid) -> ArchiveTaskResponse {
        for _ in 0..300 {
            let status = f.service.status(requester, task_id).await.unwrap();
            if status.status.is_terminal() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("archive task did not finish");
    }

    async fn download_entries(f: &Fixture, requester: Uuid, task_id: Uuid) -> Vec<(String, Vec<u8>)> {
        let download = f.service.open_download(requester, task_id).await.unwrap();
        let chunks: Vec<Bytes> = download.stream.try_collect().await.unwrap();
        let bytes = chunks.concat();
        assert_eq!(bytes.len() as u64, download.size);

        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entries = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            entries.push((entry.name().to_string(), data));
        }
        entries
    }

    #[tokio::test]
    async fn test_reaped_archive_is_no_longer_found() {
        let config = ArchiveConfig {
            ttl_hours: -1,
            ..ArchiveConfig::default()
        };
        let f = fixture(config).await;
        let requester = Uuid::new_v4();
        let a = add_file(&f, requester, "a.txt", b"alpha", Visibility::Private).await;

        let response = f
            .service
            .request_archive(
                requester,
                CreateArchiveRequest {
                    file_ids: vec![a.id],
                    archive_name: None,
                },
            )
            .await
            .unwrap();
        let status = wait_for_terminal(&f, requester, response.task_id).await;
        assert_eq!(status.status, ArchiveStatus::Completed);

        // Past its expiry the archive can no longer be downloaded.
        assert!(matches!(
            f.service.open_download(requester, response.task_id).await,
            Err(AppError::NotFound(_))
        ));

        let staging = cofile_storage::StagingArea::new(f._dir.path().join("staging"))
            .await
            .unwrap();
        let uploads = crate::upload::UploadService::new(
            cofile_core::UploadConfig::default(),
            &f.repos,
            ContentStore::new(f.storage.clone()),
            staging,
        );
        let reaper = crate::cleanup::ExpiryReaper::new(
            f.repos.archives.clone(),
            f.storage.clone(),
            uploads,
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        );
        let report = reaper.sweep().await.unwrap().unwrap();
        assert_eq!(report.archives_removed, 1);

        assert!(matches!(
            f.service.status(requester, response.task_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(!f
            .storage
            .exists(&cofile_storage::archive_key(response.task_id))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_archive_skips_unreadable_files() {
        let f = fixture(ArchiveConfig::default()).await;
        let requester = Uuid::new_v4();
        let other = Uuid::new_v4();

        let a = add_file(&f, requester, "a.txt", b"alpha", Visibility::Private).await;
        let b = add_file(&f, other, "b.txt", b"bravo", Visibility::Team).await;
        let hidden = add_file(&f, other, "secret.txt", b"nope", Visibility::Private).await;

        let response = f
            .service
            .request_archive(
                requester,
                CreateArchiveRequest {
                    file_ids: vec![a.id, hidden.id, b.id],
                    archive_name: Some("bundle".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(response.accepted_count, 2);
        assert_eq!(response.status, ArchiveStatus::Pending);

        let task = f.repos.archives.get(response.task_id).await.unwrap().unwrap();
        assert_eq!(task.file_ids, vec![a.id, b.id]);

        let status = wait_for_terminal(&f, requester, response.task_id).await;
        assert_eq!(status.status, ArchiveStatus::Completed);
        assert_eq!(status.name, "bundle.zip");
        assert_eq!(
            status.retrieval_reference.as_deref(),
            Some(format!("http://files.test/api/v1/archives/{}/download", response.task_id).as_str())
        );
        assert!(status.expires_at.is_some());

        let entries = download_entries(&f, requester, response.task_id).await;
        assert_eq!(
            entries,
            vec![
                ("a.txt".to_string(), b"alpha".to_vec()),
                ("b.txt".to_string(), b"bravo".to_vec()),
            ]
        );

        // Only the requester can see the task.
        assert!(matches!(
            f.service.status(other, response.task_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_names_are_suffixed() {
        let f = fixture(ArchiveConfig::default()).await;
        let owner = Uuid::new_v4();
        let first = add_file(&f, owner, "report.pdf", b"v1", Visibility::Private).await;
        let second = add_file(&f, owner, "report.pdf", b"v2", Visibility::Private).await;

        let response = f
            .service
            .request_archive(
                owner,
                CreateArchiveRequest {
                    file_ids: vec![first.id, second.id, first.id],
                    archive_name: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(response.accepted_count, 2);
        wait_for_terminal(&f, owner, response.task_id).await;

        let names: Vec<String> = download_entries(&f, owner, response.task_id)
            .await
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["report.pdf", "report (1).pdf"]);
    }

    #[tokio::test]
    async fn test_no_accessible_files_creates_no_task() {
        let f = fixture(ArchiveConfig::default()).await;
        let hidden = add_file(&f, Uuid::new_v4(), "x.txt", b"x", Visibility::Private).await;
        let requester = Uuid::new_v4();

        let err = f
            .service
            .request_archive(
                requester,
                CreateArchiveRequest {
                    file_ids: vec![hidden.id, Uuid::new_v4()],
                    archive_name: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NoAccessibleContent));

        let (tasks, total) = f
            .repos
            .archives
            .list_for_requester(requester, 10, 0)
            .await
            .unwrap();
        assert!(tasks.is_empty());
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_too_many_files_rejected() {
        let f = fixture(ArchiveConfig {
            max_files: 2,
            ..ArchiveConfig::default()
        })
        .await;
        let err = f
            .service
            .request_archive(
                Uuid::new_v4(),
                CreateArchiveRequest {
                    file_ids: (0..3).map(|_| Uuid::new_v4()).collect(),
                    archive_name: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_missing_content_fails_task() {
        let f = fixture(ArchiveConfig::default()).await;
        let owner = Uuid::new_v4();
        let file = add_file(&f, owner, "gone.txt", b"soon gone", Visibility::Private).await;
        f.storage
            .delete(&ContentKey::new(Fingerprint::of(b"soon gone"), 9).storage_key())
            .await
            .unwrap();

        let response = f
            .service
            .request_archive(
                owner,
                CreateArchiveRequest {
                    file_ids: vec![file.id],
                    archive_name: None,
                },
            )
            .await
            .unwrap();
        let status = wait_for_terminal(&f, owner, response.task_id).await;

        assert_eq!(status.status, ArchiveStatus::Failed);
        assert!(status.error_detail.is_some());
        assert!(status.retrieval_reference.is_none());
        assert!(!f
            .storage
            .exists(&cofile_storage::archive_key(response.task_id))
            .await
            .unwrap());
        assert!(matches!(
            f.service.open_download(owner, response.task_id).await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_recover_on_startup() {
        let f = fixture(ArchiveConfig::default()).await;
        let owner = Uuid::new_v4();
        let file = add_file(&f, owner, "a.txt", b"alpha", Visibility::Private).await;

        let interrupted = f
            .repos
            .archives
            .create(ArchiveTask::new_pending(owner, "old.zip".to_string(), vec![file.id]))
            .await
            .unwrap();
        f.repos
            .archives
            .transition(interrupted.id, ArchiveTransition::Start)
            .await
            .unwrap();
        let pending = f
            .repos
            .archives
            .create(ArchiveTask::new_pending(owner, "queued.zip".to_string(), vec![file.id]))
            .await
            .unwrap();

        f.service.recover_on_startup().await.unwrap();

        let old = wait_for_terminal(&f, owner, interrupted.id).await;
        assert_eq!(old.status, ArchiveStatus::Failed);
        assert_eq!(old.error_detail.as_deref(), Some("interrupted by restart"));
        let queued = wait_for_terminal(&f, owner, pending.id).await;
        assert_eq!(queued.status, ArchiveStatus::Completed);
    }

    #[tokio::test]
    async fn test_list_is_paged() {
        let f = fixture(ArchiveConfig::default()).await;
        let owner = Uuid::new_v4();
        for i in 0..3 {
            f.repos
                .archives
                .create(ArchiveTask::new_pending(owner, format!("{}.zip", i), vec![Uuid::new_v4()]))
                .await
                .unwrap();
        }

        let page = f
            .service
            .list(
                owner,
                ListArchivesQuery {
                    page: 2,
                    page_size: 2,
                },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.tasks.len(), 1);
    }
}
