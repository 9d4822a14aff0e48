//! Upload completion: merge staged chunks, verify the whole-file fingerprint,
//! commit content and create the file entry.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use cofile_core::mime::mime_type_for;
use cofile_core::models::{ContentRecord, FileEntry, NewFileEntry, UploadSession};
use cofile_core::{AppError, FingerprintHasher};
use cofile_db::{ContentRepository, FileRepository};
use cofile_storage::{ContentStore, StagingArea};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use super::registry::{SessionHandle, UploadSessionRegistry};

const MERGE_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Clone)]
pub struct UploadFinalizer {
    registry: Arc<UploadSessionRegistry>,
    staging: StagingArea,
    content_store: ContentStore,
    contents: Arc<dyn ContentRepository>,
    files: Arc<dyn FileRepository>,
}

impl UploadFinalizer {
    pub fn new(
        registry: Arc<UploadSessionRegistry>,
        staging: StagingArea,
        content_store: ContentStore,
        contents: Arc<dyn ContentRepository>,
        files: Arc<dyn FileRepository>,
    ) -> Self {
        Self {
            registry,
            staging,
            content_store,
            contents,
            files,
        }
    }

    /// Complete an upload.
    ///
    /// Any failure, including a fingerprint mismatch, leaves the session accepting
    /// chunks again with its received set untouched, and creates no records.
    #[tracing::instrument(skip(self), fields(session_id = %session_id))]
    pub async fn finalize(&self, caller: Uuid, session_id: Uuid) -> Result<FileEntry, AppError> {
        let start = Instant::now();
        let handle = self.registry.get(session_id)?;
        handle.ensure_owner(caller)?;

        let _gate = handle.begin_finalize().await?;

        let merged = self.staging.merged_path(session_id);
        let entry = match self.finalize_exclusive(&handle, &merged).await {
            Ok(entry) => entry,
            Err(e) => {
                remove_if_present(&merged).await;
                handle.abort_finalize().await;
                tracing::warn!(error = %e, "Finalize failed, session left open");
                return Err(e);
            }
        };

        self.registry.delete(session_id);
        handle.mark_finalized().await;
        if let Err(e) = self.staging.remove_session(session_id).await {
            tracing::warn!(error = %e, "Failed to remove staging after finalize");
        }

        tracing::info!(
            file_id = %entry.id,
            content_id = %entry.content_id,
            file_size = entry.file_size,
            duration_ms = start.elapsed().as_millis() as u64,
            "Upload finalized"
        );
        Ok(entry)
    }

    /// Body of a finalize. Runs with chunk writes excluded.
    async fn finalize_exclusive(
        &self,
        handle: &SessionHandle,
        merged: &Path,
    ) -> Result<FileEntry, AppError> {
        let session = handle.session();
        let snapshot = handle.snapshot().await;
        if !snapshot.is_complete(session.total_chunks) {
            return Err(AppError::InvalidState(format!(
                "Upload session {} has {} of {} chunks",
                session.id,
                snapshot.received.len(),
                session.total_chunks
            )));
        }

        self.merge_and_verify(session, merged).await?;

        let key = session.content_key();
        let lock = self.content_store.lock(&key).await;
        let content = match self.contents.find_by_key(&key).await? {
            Some(existing) => {
                // Someone else committed this content while we were merging.
                remove_if_present(merged).await;
                tracing::debug!(content_id = %existing.id, "Folded into existing content");
                existing
            }
            None => {
                self.content_store.commit_file(&lock, &key, merged).await?;
                self.contents
                    .insert_or_get(ContentRecord::new(&key, mime_type_for(&session.file_name)))
                    .await?
            }
        };
        drop(lock);

        let new = NewFileEntry {
            owner_id: session.owner_id,
            file_name: session.file_name.clone(),
            placement: session.placement.clone(),
            visibility: session.visibility,
            description: session.description.clone(),
        };
        self.files.create(FileEntry::for_content(new, &content)).await
    }

    /// Concatenate chunks in index order into `merged`, hashing as we go.
    async fn merge_and_verify(&self, session: &UploadSession, merged: &Path) -> Result<(), AppError> {
        let mut out = fs::File::create(merged).await?;
        let mut hasher = FingerprintHasher::new();
        let mut buf = vec![0u8; MERGE_BUFFER_SIZE];

        for index in 0..session.total_chunks {
            let mut chunk = self.staging.open_chunk(session.id, index).await?;
            loop {
                let n = chunk.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                out.write_all(&buf[..n]).await?;
            }
        }
        out.flush().await?;
        out.sync_all().await?;
        drop(out);

        let merged_size = hasher.bytes_hashed();
        let actual = hasher.finish();
        if merged_size != session.declared_size || actual != session.fingerprint {
            return Err(AppError::Integrity(format!(
                "Assembled file does not match declared content: expected {} ({} bytes), got {} ({} bytes)",
                session.fingerprint, session.declared_size, actual, merged_size
            )));
        }
        Ok(())
    }
}

async fn remove_if_present(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove merged file");
        }
    }
}
