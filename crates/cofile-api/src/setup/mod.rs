//! Application setup and initialization

pub mod database;
pub mod routes;
pub mod server;
pub mod services;

use crate::state::AppState;
use anyhow::{Context, Result};
use cofile_core::Config;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    crate::telemetry::init_telemetry(config.base.log_format);

    // Fail fast on misconfiguration
    config.validate().context("Configuration validation failed")?;
    tracing::info!(environment = %config.base.environment, "Configuration loaded and validated");

    let repositories = database::setup_repositories(&config).await?;
    let state = services::initialize_services(&config, repositories).await?;
    let router = routes::setup_routes(&config, Arc::clone(&state))?;

    Ok((state, router))
}
