//! Repository selection and database setup

use anyhow::{Context, Result};
use cofile_core::Config;
use cofile_db::Repositories;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::Path;
use std::time::Duration;

/// PostgreSQL repositories when `DATABASE_URL` is set, in-memory ones otherwise.
pub async fn setup_repositories(config: &Config) -> Result<Repositories> {
    match config.base.database_url.as_deref() {
        Some(url) => Ok(Repositories::postgres(setup_database(config, url).await?)),
        None => {
            tracing::warn!("DATABASE_URL not set; metadata will not survive a restart");
            Ok(Repositories::in_memory())
        }
    }
}

/// Setup database connection pool and run migrations
async fn setup_database(config: &Config, url: &str) -> Result<PgPool> {
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.base.db_max_connections)
        .acquire_timeout(Duration::from_secs(config.base.db_timeout_seconds))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!(
        max_connections = config.base.db_max_connections,
        "Database connected successfully"
    );

    // Path: workspace migrations/ from crate root
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("Failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
