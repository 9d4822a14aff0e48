//! Chunked, resumable upload with content deduplication
//!
//! `init` either short-circuits through [`ContentDeduplicator`] or opens a session in
//! the [`UploadSessionRegistry`]; chunks flow through [`ChunkIngester`] into the
//! staging area; [`UploadFinalizer`] turns a complete session into a file entry.

pub mod dedup;
pub mod finalize;
pub mod ingest;
pub mod registry;
pub mod service;

pub use dedup::ContentDeduplicator;
pub use finalize::UploadFinalizer;
pub use ingest::{ChunkIngester, IncomingChunk};
pub use registry::{ReceiptSnapshot, SessionHandle, SessionPhase, UploadSessionRegistry};
pub use service::UploadService;
