//! Instant upload: reuse already stored content instead of transferring bytes

use std::sync::Arc;

use cofile_core::models::{ContentRecord, FileEntry, NewFileEntry};
use cofile_core::{AppError, ContentKey};
use cofile_db::{ContentRepository, FileRepository};

#[derive(Clone)]
pub struct ContentDeduplicator {
    contents: Arc<dyn ContentRepository>,
    files: Arc<dyn FileRepository>,
}

impl ContentDeduplicator {
    pub fn new(contents: Arc<dyn ContentRepository>, files: Arc<dyn FileRepository>) -> Self {
        Self { contents, files }
    }

    /// Stored content matching a claimed fingerprint and size, if any.
    pub async fn lookup(&self, key: &ContentKey) -> Result<Option<ContentRecord>, AppError> {
        self.contents.find_by_key(key).await
    }

    /// Create a file entry for `new` if content for `key` is already stored.
    #[tracing::instrument(skip(self, new), fields(content = %key, owner_id = %new.owner_id))]
    pub async fn try_instant_upload(
        &self,
        key: &ContentKey,
        new: NewFileEntry,
    ) -> Result<Option<FileEntry>, AppError> {
        let Some(content) = self.lookup(key).await? else {
            return Ok(None);
        };

        let entry = self.files.create(FileEntry::for_content(new, &content)).await?;
        tracing::info!(
            file_id = %entry.id,
            content_id = %content.id,
            "Instant upload: reused stored content"
        );
        Ok(Some(entry))
    }
}
