//! Per-session staging area for uploaded chunks
//!
//! Each session owns a directory `{root}/{session_id}` holding one file per chunk
//! index (`chunk_{index}`). Chunks are addressed by index, never by content, so a
//! retried or out-of-order chunk only ever replaces its own slot.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

const MERGED_FILE_NAME: &str = "merged.part";

#[derive(Clone, Debug)]
pub struct StagingArea {
    root: PathBuf,
}

impl StagingArea {
    pub async fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create staging directory {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_dir(&self, session_id: Uuid) -> PathBuf {
        self.root.join(session_id.to_string())
    }

    pub fn chunk_path(&self, session_id: Uuid, index: u64) -> PathBuf {
        self.session_dir(session_id).join(format!("chunk_{}", index))
    }

    /// Scratch file the finalizer concatenates chunks into
    pub fn merged_path(&self, session_id: Uuid) -> PathBuf {
        self.session_dir(session_id).join(MERGED_FILE_NAME)
    }

    pub async fn create_session(&self, session_id: Uuid) -> StorageResult<()> {
        fs::create_dir_all(self.session_dir(session_id)).await?;
        Ok(())
    }

    /// Write one chunk into its slot. The slot is replaced atomically, so a reader
    /// sees either the previous complete chunk or the new one.
    pub async fn write_chunk(&self, session_id: Uuid, index: u64, data: &[u8]) -> StorageResult<()> {
        let dir = self.session_dir(session_id);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(StorageError::NotFound(format!("staging for session {}", session_id)));
        }

        let target = self.chunk_path(session_id, index);
        let temp = dir.join(format!("chunk_{}.tmp-{}", index, Uuid::new_v4()));

        let result = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&temp, &target).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = result {
            let _ = fs::remove_file(&temp).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to stage chunk {} of session {}: {}",
                index, session_id, e
            )));
        }
        Ok(())
    }

    pub async fn open_chunk(&self, session_id: Uuid, index: u64) -> StorageResult<fs::File> {
        let path = self.chunk_path(session_id, index);
        match fs::File::open(&path).await {
            Ok(file) => Ok(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::NotFound(
                format!("chunk {} of session {}", index, session_id),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a session's staging directory. Missing directories are ignored.
    pub async fn remove_session(&self, session_id: Uuid) -> StorageResult<()> {
        match fs::remove_dir_all(self.session_dir(session_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteFailed(format!(
                "Failed to remove staging for session {}: {}",
                session_id, e
            ))),
        }
    }

    /// Session directories last modified before `cutoff`.
    pub async fn sessions_modified_before(&self, cutoff: SystemTime) -> StorageResult<Vec<Uuid>> {
        let mut stale = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let Some(session_id) = entry
                .file_name()
                .to_str()
                .and_then(|name| Uuid::parse_str(name).ok())
            else {
                continue;
            };
            let meta = entry.metadata().await?;
            if !meta.is_dir() {
                continue;
            }
            if meta.modified().map(|m| m < cutoff).unwrap_or(false) {
                stale.push(session_id);
            }
        }
        Ok(stale)
    }
}
