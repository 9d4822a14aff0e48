//! Read access to finished files

use std::sync::Arc;

use cofile_core::models::FileEntry;
use cofile_core::AppError;
use cofile_db::{ContentRepository, FileRepository};
use cofile_storage::{ByteStream, ContentStore};
use uuid::Uuid;

use crate::permission::PermissionResolver;

#[derive(Clone)]
pub struct FileService {
    files: Arc<dyn FileRepository>,
    contents: Arc<dyn ContentRepository>,
    content_store: ContentStore,
    permissions: Arc<dyn PermissionResolver>,
}

impl FileService {
    pub fn new(
        files: Arc<dyn FileRepository>,
        contents: Arc<dyn ContentRepository>,
        content_store: ContentStore,
        permissions: Arc<dyn PermissionResolver>,
    ) -> Self {
        Self {
            files,
            contents,
            content_store,
            permissions,
        }
    }

    /// Files the caller may not read are reported exactly like missing ones.
    pub async fn get_file(&self, caller: Uuid, file_id: Uuid) -> Result<FileEntry, AppError> {
        let not_found = || AppError::NotFound(format!("File {} not found", file_id));
        let entry = self
            .files
            .get(file_id)
            .await?
            .filter(FileEntry::is_active)
            .ok_or_else(not_found)?;

        if !self.permissions.can_read(caller, &entry).await? {
            return Err(not_found());
        }
        Ok(entry)
    }

    /// Metadata and a byte stream for one file.
    #[tracing::instrument(skip(self), fields(file_id = %file_id))]
    pub async fn open_content(
        &self,
        caller: Uuid,
        file_id: Uuid,
    ) -> Result<(FileEntry, ByteStream), AppError> {
        let entry = self.get_file(caller, file_id).await?;
        let content = self.contents.get(entry.content_id).await?.ok_or_else(|| {
            AppError::Internal(format!(
                "File {} points at missing content {}",
                entry.id, entry.content_id
            ))
        })?;
        let stream = self.content_store.download_stream(&content.storage_key).await?;
        Ok((entry, stream))
    }
}
