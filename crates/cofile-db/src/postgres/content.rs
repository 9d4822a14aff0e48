use cofile_core::models::ContentRecord;
use cofile_core::{AppError, ContentKey};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{from_db_size, parse_fingerprint, to_db_size};
use crate::repository::ContentRepository;

const COLUMNS: &str = "id, fingerprint, size, storage_key, mime_type, created_at";

#[derive(Clone)]
pub struct PostgresContentRepository {
    pool: PgPool,
}

impl PostgresContentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &PgRow) -> Result<ContentRecord, AppError> {
        Ok(ContentRecord {
            id: row.get("id"),
            fingerprint: parse_fingerprint(row.get::<&str, _>("fingerprint"))?,
            size: from_db_size(row.get("size"))?,
            storage_key: row.get("storage_key"),
            mime_type: row.get("mime_type"),
            created_at: row.get("created_at"),
        })
    }
}

#[async_trait::async_trait]
impl ContentRepository for PostgresContentRepository {
    #[tracing::instrument(skip(self), fields(db.system = "postgresql", db.table = "content_records", db.operation = "select"))]
    async fn find_by_key(&self, key: &ContentKey) -> Result<Option<ContentRecord>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_records WHERE fingerprint = $1 AND size = $2",
            COLUMNS
        ))
        .bind(key.fingerprint.as_str())
        .bind(to_db_size(key.size)?)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn get(&self, id: Uuid) -> Result<Option<ContentRecord>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM content_records WHERE id = $1",
            COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    #[tracing::instrument(skip(self, record), fields(db.system = "postgresql", db.table = "content_records", db.operation = "insert", content_id = %record.id))]
    async fn insert_or_get(&self, record: ContentRecord) -> Result<ContentRecord, AppError> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO content_records (id, fingerprint, size, storage_key, mime_type, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (fingerprint, size) DO NOTHING
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(record.id)
        .bind(record.fingerprint.as_str())
        .bind(to_db_size(record.size)?)
        .bind(&record.storage_key)
        .bind(&record.mime_type)
        .bind(record.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Self::row_to_record(&row);
        }

        // Lost the race to a concurrent insert of the same content.
        self.find_by_key(&record.key()).await?.ok_or_else(|| {
            AppError::Internal(format!(
                "Content record {} vanished after conflicting insert",
                record.key()
            ))
        })
    }

    async fn count(&self) -> Result<u64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM content_records")
            .fetch_one(&self.pool)
            .await?;
        from_db_size(row.get::<i64, _>("count"))
    }
}
