//! Test helpers: build the application over in-memory repositories and a
//! temporary directory.

#![allow(dead_code)]

use axum_test::TestServer;
use bytes::Bytes;
use chrono::Duration;
use cofile_api::auth::jwt::JwtService;
use cofile_api::auth::UserRole;
use cofile_api::constants::{self, CHUNK_CHECKSUM_HEADER};
use cofile_api::setup::{routes, services};
use cofile_api::AppState;
use cofile_core::{ArchiveConfig, BaseConfig, Config, Fingerprint, LogFormat, UploadConfig};
use cofile_db::Repositories;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "test-jwt-secret-at-least-32-characters-long";

/// API path with the version prefix, e.g. `/api/v1/uploads`.
pub fn api_path(path: &str) -> String {
    format!("{}{}", constants::API_PREFIX, path)
}

pub fn md5_hex(data: &[u8]) -> String {
    Fingerprint::of(data).to_string()
}

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    jwt: JwtService,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Bearer header value for `user_id`
    pub fn bearer(&self, user_id: Uuid) -> String {
        let token = self
            .jwt
            .issue_token(user_id, UserRole::Member, Duration::hours(1))
            .expect("Failed to issue test token");
        format!("Bearer {}", token)
    }
}

pub fn test_config(temp_dir: &TempDir) -> Config {
    Config {
        base: BaseConfig {
            server_port: 0,
            environment: "test".to_string(),
            cors_origins: vec!["*".to_string()],
            jwt_secret: TEST_JWT_SECRET.to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            log_format: LogFormat::Compact,
            database_url: None,
            db_max_connections: 1,
            db_timeout_seconds: 5,
        },
        upload: UploadConfig {
            content_storage_path: temp_dir.path().join("content"),
            staging_path: temp_dir.path().join("staging"),
            min_chunk_size_bytes: 1,
            max_chunk_size_bytes: 1024 * 1024,
            ..UploadConfig::default()
        },
        archive: ArchiveConfig {
            workers: 2,
            queue_depth: 16,
            max_files: 10,
            ..ArchiveConfig::default()
        },
    }
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(|_| {}).await
}

/// Setup with a config tweak applied before the services are built.
pub async fn setup_test_app_with(tweak: impl FnOnce(&mut Config)) -> TestApp {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let mut config = test_config(&temp_dir);
    tweak(&mut config);

    let state = services::initialize_services(&config, Repositories::in_memory())
        .await
        .expect("Failed to initialize services");
    let app = routes::setup_routes(&config, state.clone()).expect("Failed to setup routes");
    let server = TestServer::new(app).expect("Failed to create test server");

    TestApp {
        server,
        state,
        jwt: JwtService::new(TEST_JWT_SECRET),
        _temp_dir: temp_dir,
    }
}

/// Start an upload and return the init response body.
pub async fn init_upload(app: &TestApp, user: Uuid, name: &str, content: &[u8], chunk_size: u64) -> (u16, Value) {
    let response = app
        .client()
        .post(&api_path("/uploads"))
        .add_header("Authorization", app.bearer(user))
        .json(&json!({
            "file_name": name,
            "file_size": content.len(),
            "fingerprint": md5_hex(content),
            "chunk_size": chunk_size,
        }))
        .await;
    (response.status_code().as_u16(), response.json())
}

pub async fn put_chunk(app: &TestApp, user: Uuid, session_id: &str, index: u64, data: &[u8], checksum: &str) -> u16 {
    app.client()
        .put(&api_path(&format!("/uploads/{}/chunks/{}", session_id, index)))
        .add_header("Authorization", app.bearer(user))
        .add_header(CHUNK_CHECKSUM_HEADER, checksum.to_string())
        .bytes(Bytes::copy_from_slice(data))
        .await
        .status_code()
        .as_u16()
}

/// Upload `content` in `chunk_size` pieces (instant upload is used if offered)
/// and return the created file.
pub async fn upload_file(app: &TestApp, user: Uuid, name: &str, content: &[u8], chunk_size: u64) -> Value {
    let (status, init) = init_upload(app, user, name, content, chunk_size).await;
    if init["kind"] == "instant" {
        assert_eq!(status, 200);
        return init["file"].clone();
    }
    assert_eq!(status, 201, "init failed: {}", init);
    let session_id = init["session_id"].as_str().expect("session_id").to_string();

    for (index, chunk) in content.chunks(chunk_size as usize).enumerate() {
        let status = put_chunk(app, user, &session_id, index as u64, chunk, &md5_hex(chunk)).await;
        assert_eq!(status, 200);
    }

    let response = app
        .client()
        .post(&api_path(&format!("/uploads/{}/complete", session_id)))
        .add_header("Authorization", app.bearer(user))
        .await;
    assert_eq!(response.status_code(), 201);
    response.json()
}
