//! Cofile Storage Library
//!
//! Raw byte storage behind the [`Storage`] trait, a local filesystem backend,
//! the content-addressed [`ContentStore`] and the per-session [`StagingArea`].
//!
//! # Storage key format
//!
//! - **Content**: `content/{fingerprint[0..2]}/{fingerprint}-{size}`
//! - **Archives**: `archives/{task_id}.zip`
//!
//! Keys must not contain `..` or a leading `/`.

pub mod content;
pub mod local;
pub mod staging;
pub mod traits;

// Re-export commonly used types
pub use content::{CommitOutcome, ContentLock, ContentStore};
pub use local::LocalStorage;
pub use staging::StagingArea;
pub use traits::{ByteReader, ByteStream, Storage, StorageError, StorageResult};

/// Storage key of a packaged archive
pub fn archive_key(task_id: uuid::Uuid) -> String {
    format!("archives/{}.zip", task_id)
}
