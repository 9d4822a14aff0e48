//! Chunk receipt: verify one chunk and persist it into the session's staging slot

use std::sync::Arc;

use bytes::Bytes;
use cofile_core::models::ChunkReceipt;
use cofile_core::{AppError, Fingerprint};
use cofile_storage::{StagingArea, StorageError};
use uuid::Uuid;

use super::registry::{session_not_found, UploadSessionRegistry};

/// One chunk as received from a client
#[derive(Debug, Clone)]
pub struct IncomingChunk {
    pub session_id: Uuid,
    pub index: u64,
    pub data: Bytes,
    /// Client-computed MD5 of `data`
    pub checksum: String,
}

#[derive(Clone)]
pub struct ChunkIngester {
    registry: Arc<UploadSessionRegistry>,
    staging: StagingArea,
}

impl ChunkIngester {
    pub fn new(registry: Arc<UploadSessionRegistry>, staging: StagingArea) -> Self {
        Self { registry, staging }
    }

    #[tracing::instrument(
        skip(self, chunk),
        fields(
            session_id = %chunk.session_id,
            chunk_index = chunk.index,
            chunk_len = chunk.data.len()
        )
    )]
    pub async fn ingest(&self, caller: Uuid, chunk: IncomingChunk) -> Result<ChunkReceipt, AppError> {
        let handle = self.registry.get(chunk.session_id)?;
        handle.ensure_owner(caller)?;
        let session = handle.session();

        let claimed = Fingerprint::parse(&chunk.checksum)?;
        let expected_len = session.expected_chunk_len(chunk.index).ok_or_else(|| {
            AppError::InvalidInput(format!(
                "Chunk index {} is out of range (0..{})",
                chunk.index, session.total_chunks
            ))
        })?;
        if chunk.data.len() as u64 != expected_len {
            return Err(AppError::InvalidInput(format!(
                "Chunk {} must be {} bytes, got {}",
                chunk.index,
                expected_len,
                chunk.data.len()
            )));
        }

        let actual = Fingerprint::of(&chunk.data);
        if actual != claimed {
            tracing::warn!(
                expected = %claimed,
                actual = %actual,
                "Chunk checksum mismatch, chunk rejected"
            );
            return Err(AppError::Integrity(format!(
                "Checksum mismatch for chunk {}: expected {}, computed {}",
                chunk.index, claimed, actual
            )));
        }

        let _write = handle.begin_write().await?;
        match self
            .staging
            .write_chunk(chunk.session_id, chunk.index, &chunk.data)
            .await
        {
            Ok(()) => {}
            // Staging vanished underneath us: the session was cancelled or reaped.
            Err(StorageError::NotFound(_)) => return Err(session_not_found(chunk.session_id)),
            Err(e) => return Err(e.into()),
        }
        let received_count = handle.mark_received(chunk.index).await?;

        tracing::debug!(
            received_count,
            total_chunks = session.total_chunks,
            "Chunk stored"
        );

        Ok(ChunkReceipt {
            session_id: chunk.session_id,
            chunk_index: chunk.index,
            received_count,
            total_chunks: session.total_chunks,
        })
    }
}
