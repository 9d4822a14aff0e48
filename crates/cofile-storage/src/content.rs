//! Content-addressed layer over [`Storage`]
//!
//! Bytes are stored once per [`ContentKey`]. Writers of the same key are serialized
//! through a per-key lock so concurrent commits of identical content leave exactly
//! one physical copy.

use std::path::Path;
use std::sync::Arc;

use cofile_core::ContentKey;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::traits::{ByteReader, ByteStream, Storage, StorageResult};

type LockMap = DashMap<ContentKey, Arc<Mutex<()>>>;

#[derive(Clone)]
pub struct ContentStore {
    storage: Arc<dyn Storage>,
    locks: Arc<LockMap>,
}

/// Exclusive right to create content for one key. Released on drop.
pub struct ContentLock {
    key: ContentKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl Drop for ContentLock {
    fn drop(&mut self) {
        self.guard.take();
        // Drop the map entry once no other writer is holding or waiting on it.
        self.locks
            .remove_if(&self.key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Outcome of committing bytes for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The bytes were moved into place
    Stored,
    /// An object of the right size already existed; the staged bytes were discarded
    AlreadyPresent,
}

impl ContentStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            locks: Arc::new(DashMap::new()),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &ContentKey) -> ContentLock {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        ContentLock {
            key: key.clone(),
            guard: Some(guard),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Move a fully written local file into content storage. Callers hold the
    /// key's [`ContentLock`]. If an object of the expected size already exists the
    /// source file is removed instead.
    pub async fn commit_file(
        &self,
        _lock: &ContentLock,
        key: &ContentKey,
        source: &Path,
    ) -> StorageResult<CommitOutcome> {
        let storage_key = key.storage_key();

        if self.storage.exists(&storage_key).await?
            && self.storage.content_length(&storage_key).await? == key.size
        {
            tokio::fs::remove_file(source).await?;
            tracing::debug!(content = %key, "Content already stored, discarding staged copy");
            return Ok(CommitOutcome::AlreadyPresent);
        }

        self.storage.put_file(&storage_key, source).await?;
        tracing::info!(content = %key, storage_key = %storage_key, "Content committed");
        Ok(CommitOutcome::Stored)
    }

    pub async fn open_reader(&self, storage_key: &str) -> StorageResult<ByteReader> {
        self.storage.open_reader(storage_key).await
    }

    pub async fn download_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        self.storage.download_stream(storage_key).await
    }

    pub async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.storage.delete(storage_key).await
    }

    #[cfg(test)]
    fn lock_entries(&self) -> usize {
        self.locks.len()
    }
}
