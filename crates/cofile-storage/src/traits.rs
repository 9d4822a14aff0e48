//! Storage abstraction trait
//!
//! Raw byte storage addressable by key. Content-addressing and staging are layered
//! on top of this in [`crate::content`] and [`crate::staging`].

use async_trait::async_trait;
use bytes::Bytes;
use cofile_core::AppError;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncRead;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Stored object {}", key)),
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            other => AppError::Storage(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Boxed stream of stored bytes
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Boxed async reader over stored bytes
pub type ByteReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Storage abstraction trait
///
/// Keys are relative, `/`-separated and must not contain `..` or start with `/`.
/// Writes are all-or-nothing: a reader never observes a partially written object.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Store `data` under `key`, replacing any existing object.
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()>;

    /// Store everything `reader` yields under `key`. Returns the number of bytes written.
    async fn put_stream(&self, key: &str, reader: ByteReader) -> StorageResult<u64>;

    /// Move a local file into storage under `key`. The source is consumed on success.
    async fn put_file(&self, key: &str, source: &Path) -> StorageResult<u64> {
        let file = tokio::fs::File::open(source).await?;
        let written = self.put_stream(key, Box::pin(file)).await?;
        tokio::fs::remove_file(source).await?;
        Ok(written)
    }

    /// Read a whole object into memory
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Open an object for sequential reading
    async fn open_reader(&self, key: &str) -> StorageResult<ByteReader>;

    /// Download an object as a stream of chunks
    async fn download_stream(&self, key: &str) -> StorageResult<ByteStream>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Check if an object exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Size in bytes of an existing object
    async fn content_length(&self, key: &str) -> StorageResult<u64>;
}
