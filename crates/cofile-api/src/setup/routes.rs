//! Route configuration and setup

use crate::auth::jwt::JwtService;
use crate::auth::middleware::{auth_middleware, AuthState};
use crate::constants::{API_PREFIX, BODY_LIMIT_HEADROOM_BYTES, HTTP_CONCURRENCY_LIMIT};
use crate::handlers;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post, put},
    Router,
};
use cofile_core::Config;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Setup all application routes
pub fn setup_routes(config: &Config, state: Arc<AppState>) -> Result<Router, anyhow::Error> {
    let cors = setup_cors(config)?;
    let auth_state = Arc::new(AuthState {
        jwt: JwtService::new(&config.base.jwt_secret),
    });

    let body_limit = usize::try_from(config.upload.max_chunk_size_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(BODY_LIMIT_HEADROOM_BYTES);

    let protected = protected_routes(body_limit)
        .layer(axum::middleware::from_fn_with_state(auth_state, auth_middleware));

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            &format!("{}/openapi.json", API_PREFIX),
            get(handlers::health::openapi_json),
        )
        .merge(protected)
        .layer(ConcurrencyLimitLayer::new(HTTP_CONCURRENCY_LIMIT))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    Ok(app)
}

fn protected_routes(chunk_body_limit: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            &format!("{}/uploads", API_PREFIX),
            post(handlers::uploads::init_upload),
        )
        .route(
            &format!("{}/uploads/{{session_id}}", API_PREFIX),
            get(handlers::uploads::get_upload_progress).delete(handlers::uploads::cancel_upload),
        )
        .route(
            &format!("{}/uploads/{{session_id}}/chunks/{{index}}", API_PREFIX),
            put(handlers::uploads::upload_chunk).layer(DefaultBodyLimit::max(chunk_body_limit)),
        )
        .route(
            &format!("{}/uploads/{{session_id}}/complete", API_PREFIX),
            post(handlers::uploads::complete_upload),
        )
        .route(
            &format!("{}/files/{{id}}", API_PREFIX),
            get(handlers::files::get_file),
        )
        .route(
            &format!("{}/files/{{id}}/content", API_PREFIX),
            get(handlers::files::download_file),
        )
        .route(
            &format!("{}/archives", API_PREFIX),
            post(handlers::archives::create_archive).get(handlers::archives::list_archives),
        )
        .route(
            &format!("{}/archives/{{task_id}}", API_PREFIX),
            get(handlers::archives::get_archive),
        )
        .route(
            &format!("{}/archives/{{task_id}}/download", API_PREFIX),
            get(handlers::archives::download_archive),
        )
}

fn setup_cors(config: &Config) -> Result<CorsLayer, anyhow::Error> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let cors = if config.base.cors_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS allows any origin");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins = config
            .base
            .cors_origins
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {:?}: {}", o, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    };

    Ok(cors)
}
