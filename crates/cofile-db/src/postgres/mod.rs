//! PostgreSQL repositories
//!
//! Queries are built at runtime with `sqlx::query` so the crate compiles without a
//! live database or an offline query cache. Unsigned sizes are stored as `BIGINT`.

mod archive;
mod content;
mod file;

pub use archive::PostgresArchiveTaskRepository;
pub use content::PostgresContentRepository;
pub use file::PostgresFileRepository;

use cofile_core::{AppError, Fingerprint};

pub(crate) fn to_db_size(size: u64) -> Result<i64, AppError> {
    i64::try_from(size).map_err(|_| AppError::InvalidInput(format!("Size {} is too large", size)))
}

pub(crate) fn from_db_size(size: i64) -> Result<u64, AppError> {
    u64::try_from(size).map_err(|_| AppError::Internal(format!("Negative size {} in database", size)))
}

pub(crate) fn parse_fingerprint(raw: &str) -> Result<Fingerprint, AppError> {
    Fingerprint::parse(raw)
        .map_err(|_| AppError::Internal(format!("Corrupt fingerprint {:?} in database", raw)))
}

pub(crate) fn parse_column<T>(column: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    raw.parse()
        .map_err(|e: anyhow::Error| AppError::Internal(format!("Invalid {}: {}", column, e)))
}
