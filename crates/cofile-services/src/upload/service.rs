use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use cofile_core::models::{
    ChunkReceipt, FileEntry, InitUploadRequest, InitUploadResponse, InstantUploadResponse,
    NewFileEntry, UploadProgress, UploadSession, UploadSessionResponse, UploadStatus,
};
use cofile_core::validation::{plan_chunks, validate_description, validate_file_name};
use cofile_core::{AppError, Fingerprint, UploadConfig};
use cofile_db::Repositories;
use cofile_storage::{ContentStore, StagingArea};
use uuid::Uuid;
use validator::Validate;

use super::dedup::ContentDeduplicator;
use super::finalize::UploadFinalizer;
use super::ingest::{ChunkIngester, IncomingChunk};
use super::registry::{SessionPhase, UploadSessionRegistry};

const MAX_REPORTED_MISSING: usize = 100;

/// Entry point for the chunked upload lifecycle
#[derive(Clone)]
pub struct UploadService {
    config: UploadConfig,
    registry: Arc<UploadSessionRegistry>,
    staging: StagingArea,
    dedup: ContentDeduplicator,
    ingester: ChunkIngester,
    finalizer: UploadFinalizer,
}

impl UploadService {
    pub fn new(
        config: UploadConfig,
        repositories: &Repositories,
        content_store: ContentStore,
        staging: StagingArea,
    ) -> Self {
        let registry = Arc::new(UploadSessionRegistry::new());
        Self {
            dedup: ContentDeduplicator::new(
                Arc::clone(&repositories.contents),
                Arc::clone(&repositories.files),
            ),
            ingester: ChunkIngester::new(Arc::clone(&registry), staging.clone()),
            finalizer: UploadFinalizer::new(
                Arc::clone(&registry),
                staging.clone(),
                content_store,
                Arc::clone(&repositories.contents),
                Arc::clone(&repositories.files),
            ),
            registry,
            staging,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<UploadSessionRegistry> {
        &self.registry
    }

    /// Start an upload, or finish it immediately when the content is already stored.
    #[tracing::instrument(
        skip(self, request),
        fields(owner_id = %caller, file_name = %request.file_name, file_size = request.file_size)
    )]
    pub async fn init(
        &self,
        caller: Uuid,
        request: InitUploadRequest,
    ) -> Result<InitUploadResponse, AppError> {
        request.validate()?;
        validate_file_name(&request.file_name)?;
        validate_description(request.description.as_deref())?;
        let fingerprint = Fingerprint::parse(&request.fingerprint)?;
        let total_chunks = plan_chunks(request.file_size, request.chunk_size, &self.config)?;

        let session = UploadSession {
            id: Uuid::new_v4(),
            owner_id: caller,
            placement: request.placement(),
            file_name: request.file_name,
            declared_size: request.file_size,
            fingerprint,
            chunk_size: request.chunk_size,
            total_chunks,
            visibility: request.visibility,
            description: request.description,
            created_at: Utc::now(),
        };

        if self.config.instant_upload_enabled {
            let new = NewFileEntry {
                owner_id: caller,
                file_name: session.file_name.clone(),
                placement: session.placement.clone(),
                visibility: session.visibility,
                description: session.description.clone(),
            };
            if let Some(entry) = self.dedup.try_instant_upload(&session.content_key(), new).await? {
                return Ok(InitUploadResponse::Instant(InstantUploadResponse {
                    file: entry.into(),
                }));
            }
        }

        self.staging.create_session(session.id).await?;
        let response = UploadSessionResponse {
            session_id: session.id,
            total_chunks: session.total_chunks,
            chunk_size: session.chunk_size,
            created_at: session.created_at,
        };
        self.registry.create(session);

        tracing::info!(session_id = %response.session_id, total_chunks, "Upload session created");
        Ok(InitUploadResponse::Session(response))
    }

    pub async fn upload_chunk(
        &self,
        caller: Uuid,
        chunk: IncomingChunk,
    ) -> Result<ChunkReceipt, AppError> {
        self.ingester.ingest(caller, chunk).await
    }

    pub async fn finalize(&self, caller: Uuid, session_id: Uuid) -> Result<FileEntry, AppError> {
        self.finalizer.finalize(caller, session_id).await
    }

    pub async fn progress(&self, caller: Uuid, session_id: Uuid) -> Result<UploadProgress, AppError> {
        let handle = self.registry.get(session_id)?;
        handle.ensure_owner(caller)?;
        let session = handle.session();
        let snapshot = handle.snapshot().await;

        let received_count = snapshot.received.len() as u64;
        let uploaded_bytes = snapshot
            .received
            .iter()
            .filter_map(|&i| session.expected_chunk_len(i))
            .sum();
        let status = match snapshot.phase {
            SessionPhase::Finalizing | SessionPhase::Finalized => UploadStatus::Finalizing,
            _ if snapshot.is_complete(session.total_chunks) => UploadStatus::Ready,
            _ => UploadStatus::Uploading,
        };
        let missing_indices = (0..session.total_chunks)
            .filter(|i| !snapshot.received.contains(i))
            .take(MAX_REPORTED_MISSING)
            .collect();

        Ok(UploadProgress {
            session_id,
            file_name: session.file_name.clone(),
            file_size: session.declared_size,
            received_count,
            total_chunks: session.total_chunks,
            uploaded_bytes,
            percent: received_count as f64 / session.total_chunks as f64 * 100.0,
            status,
            missing_indices,
            created_at: session.created_at,
        })
    }

    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    pub async fn cancel(&self, caller: Uuid, session_id: Uuid) -> Result<(), AppError> {
        let handle = self.registry.get(session_id)?;
        handle.ensure_owner(caller)?;
        self.destroy(session_id).await?;
        tracing::info!("Upload session cancelled");
        Ok(())
    }

    /// Destroy sessions created before `cutoff`. Sessions being finalized are left
    /// alone. Returns how many were removed.
    pub async fn expire_sessions_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut expired = 0;
        for handle in self.registry.created_before(cutoff) {
            match self.destroy(handle.id()).await {
                Ok(()) => {
                    tracing::info!(session_id = %handle.id(), "Stale upload session expired");
                    expired += 1;
                }
                Err(AppError::Conflict(_)) | Err(AppError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(session_id = %handle.id(), error = %e, "Failed to expire upload session")
                }
            }
        }
        expired
    }

    /// Remove staging directories older than `ttl` that no live session owns, such as
    /// those left behind by a previous process.
    pub async fn remove_orphaned_staging(&self, ttl: Duration) -> Result<usize, AppError> {
        let cutoff = SystemTime::now()
            .checked_sub(ttl)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0;
        for session_id in self.staging.sessions_modified_before(cutoff).await? {
            if self.registry.contains(session_id) {
                continue;
            }
            self.staging.remove_session(session_id).await?;
            tracing::info!(session_id = %session_id, "Removed orphaned staging directory");
            removed += 1;
        }
        Ok(removed)
    }

    async fn destroy(&self, session_id: Uuid) -> Result<(), AppError> {
        let handle = self.registry.get(session_id)?;
        let gate = handle.begin_cancel().await?;
        self.registry.delete(session_id);
        self.staging.remove_session(session_id).await?;
        drop(gate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::test_support::md5_hex;
    use cofile_core::models::{Placement, Visibility};
    use cofile_storage::LocalStorage;
    use tempfile::TempDir;

    struct Fixture {
        service: UploadService,
        repos: Repositories,
        content_dir: TempDir,
        _staging_dir: TempDir,
    }

    fn small_config() -> UploadConfig {
        UploadConfig {
            min_chunk_size_bytes: 1,
            max_chunk_size_bytes: 4 * 1024 * 1024,
            ..UploadConfig::default()
        }
    }

    async fn fixture_with(config: UploadConfig) -> Fixture {
        let content_dir = tempfile::tempdir().unwrap();
        let staging_dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalStorage::new(content_dir.path()).await.unwrap());
        let staging = StagingArea::new(staging_dir.path()).await.unwrap();
        let repos = Repositories::in_memory();
        let service = UploadService::new(config, &repos, ContentStore::new(storage), staging);
        Fixture {
            service,
            repos,
            content_dir,
            _staging_dir: staging_dir,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(small_config()).await
    }

    fn request(name: &str, content: &[u8], chunk_size: u64) -> InitUploadRequest {
        InitUploadRequest {
            file_name: name.to_string(),
            file_size: content.len() as u64,
            fingerprint: md5_hex(content),
            chunk_size,
            folder_id: None,
            workflow_id: None,
            task_id: None,
            visibility: Visibility::Team,
            description: None,
        }
    }

    fn expect_session(response: InitUploadResponse) -> UploadSessionResponse {
        match response {
            InitUploadResponse::Session(s) => s,
            InitUploadResponse::Instant(_) => panic!("expected an upload session"),
        }
    }

    async fn send(f: &Fixture, owner: Uuid, session_id: Uuid, content: &[u8], chunk_size: usize, index: usize) {
        let start = index * chunk_size;
        let end = (start + chunk_size).min(content.len());
        let data = bytes::Bytes::copy_from_slice(&content[start..end]);
        f.service
            .upload_chunk(
                owner,
                IncomingChunk {
                    session_id,
                    index: index as u64,
                    checksum: md5_hex(&data),
                    data,
                },
            )
            .await
            .unwrap();
    }

    fn count_files(dir: &std::path::Path) -> usize {
        let mut n = 0;
        for entry in std::fs::read_dir(dir).unwrap() {
            let entry = entry.unwrap();
            if entry.file_type().unwrap().is_dir() {
                n += count_files(&entry.path());
            } else {
                n += 1;
            }
        }
        n
    }

    #[tokio::test]
    async fn test_out_of_order_chunks_finalize() {
        let f = fixture().await;
        let owner = Uuid::new_v4();
        let chunk_size = 2 * 1024 * 1024;
        let content: Vec<u8> = (0..10 * 1024 * 1024).map(|i| (i % 251) as u8).collect();

        let session = expect_session(
            f.service
                .init(owner, request("video.mp4", &content, chunk_size as u64))
                .await
                .unwrap(),
        );
        assert_eq!(session.total_chunks, 5);

        for index in [3, 1, 4, 0, 2] {
            send(&f, owner, session.session_id, &content, chunk_size, index).await;
        }

        let entry = f.service.finalize(owner, session.session_id).await.unwrap();
        assert_eq!(entry.file_size, 10 * 1024 * 1024);
        assert_eq!(entry.mime_type, "video/mp4");
        assert_eq!(f.repos.contents.count().await.unwrap(), 1);
        assert_eq!(f.repos.files.count().await.unwrap(), 1);
        assert!(f.service.registry().get(session.session_id).is_err());
        assert!(matches!(
            f.service.progress(owner, session.session_id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_init_matching_content_is_instant() {
        let f = fixture().await;
        let content = b"quarterly numbers";
        let owner = Uuid::new_v4();

        let session = expect_session(f.service.init(owner, request("q.txt", content, 8)).await.unwrap());
        for index in 0..3 {
            send(&f, owner, session.session_id, content, 8, index).await;
        }
        f.service.finalize(owner, session.session_id).await.unwrap();

        let sessions_before = f.service.registry().len();
        let response = f
            .service
            .init(Uuid::new_v4(), request("copy.txt", content, 8))
            .await
            .unwrap();

        match response {
            InitUploadResponse::Instant(instant) => {
                assert_eq!(instant.file.file_name, "copy.txt");
                assert_eq!(instant.file.file_size, content.len() as u64);
            }
            InitUploadResponse::Session(_) => panic!("expected instant upload"),
        }
        assert_eq!(f.service.registry().len(), sessions_before);
        assert_eq!(f.repos.files.count().await.unwrap(), 2);
        assert_eq!(f.repos.contents.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_identical_uploads_share_one_copy() {
        let f = fixture_with(UploadConfig {
            instant_upload_enabled: false,
            ..small_config()
        })
        .await;
        let content = b"same bytes from two people";

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let sa = expect_session(f.service.init(a, request("a.bin", content, 10)).await.unwrap());
        let sb = expect_session(f.service.init(b, request("b.bin", content, 10)).await.unwrap());
        for index in 0..3 {
            send(&f, a, sa.session_id, content, 10, index).await;
            send(&f, b, sb.session_id, content, 10, index).await;
        }

        let (ea, eb) = tokio::join!(
            f.service.finalize(a, sa.session_id),
            f.service.finalize(b, sb.session_id)
        );
        let (ea, eb) = (ea.unwrap(), eb.unwrap());

        assert_ne!(ea.id, eb.id);
        assert_eq!(ea.content_id, eb.content_id);
        assert_eq!(f.repos.files.count().await.unwrap(), 2);
        assert_eq!(f.repos.contents.count().await.unwrap(), 1);
        assert_eq!(count_files(f.content_dir.path()), 1);
    }

    #[tokio::test]
    async fn test_fingerprint_mismatch_creates_nothing() {
        let f = fixture().await;
        let owner = Uuid::new_v4();
        let content = b"actual content!!";
        let mut req = request("doc.txt", content, 8);
        req.fingerprint = md5_hex(b"something else!!");

        let session = expect_session(f.service.init(owner, req).await.unwrap());
        send(&f, owner, session.session_id, content, 8, 0).await;
        send(&f, owner, session.session_id, content, 8, 1).await;

        let err = f.service.finalize(owner, session.session_id).await.unwrap_err();
        assert!(matches!(err, AppError::Integrity(_)));
        assert_eq!(f.repos.files.count().await.unwrap(), 0);
        assert_eq!(f.repos.contents.count().await.unwrap(), 0);

        // The session survives and is back to accepting chunks.
        let progress = f.service.progress(owner, session.session_id).await.unwrap();
        assert_eq!(progress.received_count, 2);
        assert_eq!(progress.status, UploadStatus::Ready);
        send(&f, owner, session.session_id, content, 8, 0).await;
    }

    #[tokio::test]
    async fn test_finalize_requires_every_chunk() {
        let f = fixture().await;
        let owner = Uuid::new_v4();
        let content = b"0123456789";
        let session = expect_session(f.service.init(owner, request("n.txt", content, 4)).await.unwrap());
        send(&f, owner, session.session_id, content, 4, 0).await;
        send(&f, owner, session.session_id, content, 4, 2).await;

        let err = f.service.finalize(owner, session.session_id).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));

        let progress = f.service.progress(owner, session.session_id).await.unwrap();
        assert_eq!(progress.status, UploadStatus::Uploading);
        assert_eq!(progress.missing_indices, vec![1]);
        assert_eq!(progress.uploaded_bytes, 6);
        assert!((progress.percent - 200.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cancel_removes_session() {
        let f = fixture().await;
        let owner = Uuid::new_v4();
        let content = b"0123456789";
        let session = expect_session(f.service.init(owner, request("n.txt", content, 4)).await.unwrap());
        send(&f, owner, session.session_id, content, 4, 0).await;

        assert!(matches!(
            f.service.cancel(Uuid::new_v4(), session.session_id).await,
            Err(AppError::NotFound(_))
        ));
        f.service.cancel(owner, session.session_id).await.unwrap();

        assert!(matches!(
            f.service.finalize(owner, session.session_id).await,
            Err(AppError::NotFound(_))
        ));
        assert!(f.service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_init_validation() {
        let f = fixture_with(UploadConfig {
            max_file_size_bytes: 100,
            ..small_config()
        })
        .await;
        let owner = Uuid::new_v4();

        assert!(matches!(
            f.service.init(owner, request("a/b.txt", b"abc", 3)).await,
            Err(AppError::InvalidInput(_))
        ));

        let mut bad_fp = request("a.txt", b"abc", 3);
        bad_fp.fingerprint = "z".repeat(32);
        assert!(matches!(
            f.service.init(owner, bad_fp).await,
            Err(AppError::InvalidInput(_))
        ));

        let big = vec![0u8; 101];
        assert!(matches!(
            f.service.init(owner, request("big.bin", &big, 50)).await,
            Err(AppError::PayloadTooLarge(_))
        ));
        assert!(f.service.registry().is_empty());
    }

    #[tokio::test]
    async fn test_expire_and_orphan_cleanup() {
        let f = fixture().await;
        let owner = Uuid::new_v4();
        let content = b"0123456789";
        let session = expect_session(f.service.init(owner, request("n.txt", content, 4)).await.unwrap());

        let expired = f
            .service
            .expire_sessions_before(Utc::now() + chrono::Duration::seconds(1))
            .await;
        assert_eq!(expired, 1);
        assert!(f.service.registry().get(session.session_id).is_err());

        // A directory no session owns, as left by an earlier process.
        let orphan = Uuid::new_v4();
        f.service.staging.create_session(orphan).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let removed = f
            .service
            .remove_orphaned_staging(Duration::from_secs(0))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!f.service.staging.session_dir(orphan).exists());
    }

    #[tokio::test]
    async fn test_placement_is_carried_to_entry() {
        let f = fixture().await;
        let owner = Uuid::new_v4();
        let content = b"abc";
        let folder = Uuid::new_v4();
        let mut req = request("a.txt", content, 3);
        req.folder_id = Some(folder);
        req.visibility = Visibility::Private;

        let session = expect_session(f.service.init(owner, req).await.unwrap());
        send(&f, owner, session.session_id, content, 3, 0).await;
        let entry = f.service.finalize(owner, session.session_id).await.unwrap();

        assert_eq!(
            entry.placement,
            Placement {
                folder_id: Some(folder),
                workflow_id: None,
                task_id: None
            }
        );
        assert_eq!(entry.visibility, Visibility::Private);
    }
}
