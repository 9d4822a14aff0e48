//! In-memory repositories
//!
//! Used when no `DATABASE_URL` is configured and by tests. Records live only as
//! long as the process.

mod archive;
mod content;
mod file;

pub use archive::InMemoryArchiveTaskRepository;
pub use content::InMemoryContentRepository;
pub use file::InMemoryFileRepository;
