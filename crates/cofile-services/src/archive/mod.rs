//! Batch archive packaging
//!
//! [`ArchiveTaskScheduler`] filters a request and queues a pending task;
//! [`ArchiveBuilder`] runs on the worker pool and drives the task to a terminal
//! status; [`ArchiveService`] is the facade used by the HTTP layer.

pub mod builder;
pub mod naming;
pub mod scheduler;
pub mod service;

pub use builder::ArchiveBuilder;
pub use naming::{archive_file_name, sanitize_file_name, EntryNamer};
pub use scheduler::ArchiveTaskScheduler;
pub use service::{ArchiveDownload, ArchiveService};
