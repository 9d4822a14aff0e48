//! Background archive work: a bounded queue of archive task ids drained by a
//! fixed-size worker pool.

pub mod context;
pub mod queue;

pub use context::ArchiveJobHandler;
pub use queue::{ArchiveQueue, ArchiveQueueConfig, EnqueueError};
