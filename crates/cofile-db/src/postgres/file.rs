use cofile_core::models::{FileEntry, Placement};
use cofile_core::AppError;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{from_db_size, parse_column, parse_fingerprint, to_db_size};
use crate::repository::FileRepository;

const COLUMNS: &str = r#"
    id, owner_id, file_name, content_id, fingerprint, file_size, mime_type,
    folder_id, workflow_id, task_id, visibility, description, version, state,
    created_at, updated_at
"#;

#[derive(Clone)]
pub struct PostgresFileRepository {
    pool: PgPool,
}

impl PostgresFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: &PgRow) -> Result<FileEntry, AppError> {
        Ok(FileEntry {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            file_name: row.get("file_name"),
            content_id: row.get("content_id"),
            fingerprint: parse_fingerprint(row.get::<&str, _>("fingerprint"))?,
            file_size: from_db_size(row.get("file_size"))?,
            mime_type: row.get("mime_type"),
            placement: Placement {
                folder_id: row.get("folder_id"),
                workflow_id: row.get("workflow_id"),
                task_id: row.get("task_id"),
            },
            visibility: parse_column("visibility", row.get::<&str, _>("visibility"))?,
            description: row.get("description"),
            version: row.get("version"),
            state: parse_column("state", row.get::<&str, _>("state"))?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait::async_trait]
impl FileRepository for PostgresFileRepository {
    #[tracing::instrument(skip(self, entry), fields(db.system = "postgresql", db.table = "file_entries", db.operation = "insert", file_id = %entry.id))]
    async fn create(&self, entry: FileEntry) -> Result<FileEntry, AppError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO file_entries (
                id, owner_id, file_name, content_id, fingerprint, file_size, mime_type,
                folder_id, workflow_id, task_id, visibility, description, version, state,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(entry.id)
        .bind(entry.owner_id)
        .bind(&entry.file_name)
        .bind(entry.content_id)
        .bind(entry.fingerprint.as_str())
        .bind(to_db_size(entry.file_size)?)
        .bind(&entry.mime_type)
        .bind(entry.placement.folder_id)
        .bind(entry.placement.workflow_id)
        .bind(entry.placement.task_id)
        .bind(entry.visibility.to_string())
        .bind(&entry.description)
        .bind(entry.version)
        .bind(entry.state.to_string())
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_entry(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<FileEntry>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM file_entries WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_entry).transpose()
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<FileEntry>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(&format!(
            "SELECT {} FROM file_entries WHERE id = ANY($1)",
            COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    async fn count(&self) -> Result<u64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM file_entries")
            .fetch_one(&self.pool)
            .await?;
        from_db_size(row.get::<i64, _>("count"))
    }
}
