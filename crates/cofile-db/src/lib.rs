//! Cofile persistent metadata store
//!
//! Repository traits for content records, file entries and archive tasks, with an
//! in-memory implementation and a PostgreSQL implementation.

pub mod memory;
pub mod postgres;
pub mod repository;

use std::sync::Arc;

use sqlx::PgPool;

pub use memory::{InMemoryArchiveTaskRepository, InMemoryContentRepository, InMemoryFileRepository};
pub use postgres::{PostgresArchiveTaskRepository, PostgresContentRepository, PostgresFileRepository};
pub use repository::{ArchiveTaskRepository, ContentRepository, FileRepository};

/// The set of repositories a running service uses
#[derive(Clone)]
pub struct Repositories {
    pub contents: Arc<dyn ContentRepository>,
    pub files: Arc<dyn FileRepository>,
    pub archives: Arc<dyn ArchiveTaskRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        tracing::info!("Using in-memory repositories");
        Self {
            contents: Arc::new(InMemoryContentRepository::new()),
            files: Arc::new(InMemoryFileRepository::new()),
            archives: Arc::new(InMemoryArchiveTaskRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        tracing::info!("Using PostgreSQL repositories");
        Self {
            contents: Arc::new(PostgresContentRepository::new(pool.clone())),
            files: Arc::new(PostgresFileRepository::new(pool.clone())),
            archives: Arc::new(PostgresArchiveTaskRepository::new(pool)),
        }
    }
}
