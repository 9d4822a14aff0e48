//! Service wiring

use crate::state::AppState;
use anyhow::{Context, Result};
use cofile_core::Config;
use cofile_db::Repositories;
use cofile_services::{
    ArchiveService, ExpiryReaper, FileService, PermissionResolver, UploadService,
    VisibilityPermissionResolver,
};
use cofile_storage::{ContentStore, LocalStorage, StagingArea, Storage};
use std::sync::Arc;
use std::time::Duration;

const ARCHIVE_WORK_DIR: &str = "archive-work";

/// Build every service on top of `repositories` and settle work left by a previous run.
///
/// The archive worker pool starts with the archive service; the reaper loop is
/// left for the caller to start.
pub async fn initialize_services(config: &Config, repositories: Repositories) -> Result<Arc<AppState>> {
    let storage: Arc<dyn Storage> = Arc::new(
        LocalStorage::new(&config.upload.content_storage_path)
            .await
            .context("Failed to initialize content storage")?,
    );
    let content_store = ContentStore::new(Arc::clone(&storage));
    let staging = StagingArea::new(&config.upload.staging_path)
        .await
        .context("Failed to initialize staging area")?;

    let work_dir = config.upload.staging_path.join(ARCHIVE_WORK_DIR);
    tokio::fs::create_dir_all(&work_dir)
        .await
        .with_context(|| format!("Failed to create archive work dir {}", work_dir.display()))?;

    let permissions: Arc<dyn PermissionResolver> = Arc::new(VisibilityPermissionResolver);

    let uploads = UploadService::new(
        config.upload.clone(),
        &repositories,
        content_store.clone(),
        staging,
    );
    let files = FileService::new(
        Arc::clone(&repositories.files),
        Arc::clone(&repositories.contents),
        content_store.clone(),
        Arc::clone(&permissions),
    );
    let archives = ArchiveService::new(
        &config.archive,
        &repositories,
        content_store,
        permissions,
        work_dir,
        config.base.public_base_url.clone(),
    );
    archives
        .recover_on_startup()
        .await
        .context("Failed to recover archive tasks")?;

    let session_ttl_secs = u64::try_from(config.upload.session_ttl_hours.max(0))
        .unwrap_or_default()
        .saturating_mul(3600);
    let reaper = Arc::new(ExpiryReaper::new(
        Arc::clone(&repositories.archives),
        storage,
        uploads.clone(),
        Duration::from_secs(session_ttl_secs),
        Duration::from_secs(config.archive.reaper_interval_secs.max(1)),
    ));

    tracing::info!(
        content_path = %config.upload.content_storage_path.display(),
        staging_path = %config.upload.staging_path.display(),
        archive_workers = config.archive.workers,
        instant_upload = config.upload.instant_upload_enabled,
        "Services initialized"
    );

    Ok(Arc::new(AppState {
        config: config.clone(),
        uploads,
        files,
        archives,
        reaper,
    }))
}
