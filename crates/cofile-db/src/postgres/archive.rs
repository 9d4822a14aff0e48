use chrono::{DateTime, Utc};
use cofile_core::models::{ArchiveStatus, ArchiveTask, ArchiveTransition};
use cofile_core::AppError;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{from_db_size, parse_column, to_db_size};
use crate::repository::{rejected_transition, required_status, ArchiveTaskRepository};

const COLUMNS: &str = r#"
    id, requester_id, name, file_ids, status, container_key, container_size,
    error_detail, expires_at, created_at, updated_at, completed_at
"#;

#[derive(Clone)]
pub struct PostgresArchiveTaskRepository {
    pool: PgPool,
}

impl PostgresArchiveTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(row: &PgRow) -> Result<ArchiveTask, AppError> {
        Ok(ArchiveTask {
            id: row.get("id"),
            requester_id: row.get("requester_id"),
            name: row.get("name"),
            file_ids: row.get("file_ids"),
            status: parse_column("status", row.get::<&str, _>("status"))?,
            container_key: row.get("container_key"),
            container_size: row
                .get::<Option<i64>, _>("container_size")
                .map(from_db_size)
                .transpose()?,
            error_detail: row.get("error_detail"),
            expires_at: row.get("expires_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait::async_trait]
impl ArchiveTaskRepository for PostgresArchiveTaskRepository {
    #[tracing::instrument(skip(self, task), fields(db.system = "postgresql", db.table = "archive_tasks", db.operation = "insert", task_id = %task.id))]
    async fn create(&self, task: ArchiveTask) -> Result<ArchiveTask, AppError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO archive_tasks (
                id, requester_id, name, file_ids, status, container_key, container_size,
                error_detail, expires_at, created_at, updated_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(task.id)
        .bind(task.requester_id)
        .bind(&task.name)
        .bind(&task.file_ids)
        .bind(task.status.to_string())
        .bind(&task.container_key)
        .bind(task.container_size.map(to_db_size).transpose()?)
        .bind(&task.error_detail)
        .bind(task.expires_at)
        .bind(task.created_at)
        .bind(task.updated_at)
        .bind(task.completed_at)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_task(&row)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ArchiveTask>, AppError> {
        let row = sqlx::query(&format!("SELECT {} FROM archive_tasks WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    #[tracing::instrument(skip(self, transition), fields(db.system = "postgresql", db.table = "archive_tasks", db.operation = "update", task_id = %id))]
    async fn transition(
        &self,
        id: Uuid,
        transition: ArchiveTransition,
    ) -> Result<ArchiveTask, AppError> {
        let from = required_status(&transition);
        let to = transition.target();

        let (container_key, container_size, expires_at, error_detail) = match &transition {
            ArchiveTransition::Start => (None, None, None, None),
            ArchiveTransition::Complete {
                container_key,
                container_size,
                expires_at,
            } => (
                Some(container_key.clone()),
                Some(to_db_size(*container_size)?),
                Some(*expires_at),
                None,
            ),
            ArchiveTransition::Fail { error_detail } => {
                (None, None, None, Some(error_detail.clone()))
            }
        };
        let terminal = to.is_terminal();

        // Status guard in the WHERE clause makes the check-and-set atomic.
        let row = sqlx::query(&format!(
            r#"
            UPDATE archive_tasks
            SET status = $3,
                container_key = COALESCE($4, container_key),
                container_size = COALESCE($5, container_size),
                expires_at = COALESCE($6, expires_at),
                error_detail = COALESCE($7, error_detail),
                completed_at = CASE WHEN $8 THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            COLUMNS
        ))
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(container_key)
        .bind(container_size)
        .bind(expires_at)
        .bind(error_detail)
        .bind(terminal)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_task(&row),
            None => match self.get(id).await? {
                Some(current) => Err(rejected_transition(id, current.status, to)),
                None => Err(AppError::NotFound(format!("Archive task {} not found", id))),
            },
        }
    }

    async fn list_for_requester(
        &self,
        requester_id: Uuid,
        limit: u32,
        offset: u64,
    ) -> Result<(Vec<ArchiveTask>, u64), AppError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM archive_tasks
            WHERE requester_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            COLUMNS
        ))
        .bind(requester_id)
        .bind(i64::from(limit))
        .bind(to_db_size(offset)?)
        .fetch_all(&self.pool)
        .await?;

        let total_row =
            sqlx::query("SELECT COUNT(*) AS count FROM archive_tasks WHERE requester_id = $1")
                .bind(requester_id)
                .fetch_one(&self.pool)
                .await?;

        let tasks = rows
            .iter()
            .map(Self::row_to_task)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((tasks, from_db_size(total_row.get::<i64, _>("count"))?))
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ArchiveTask>, AppError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {}
            FROM archive_tasks
            WHERE status = 'completed' AND expires_at <= $1
            ORDER BY expires_at ASC
            LIMIT $2
            "#,
            COLUMNS
        ))
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn list_by_status(&self, status: ArchiveStatus) -> Result<Vec<ArchiveTask>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM archive_tasks WHERE status = $1 ORDER BY created_at ASC",
            COLUMNS
        ))
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_task).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM archive_tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
