//! Configuration module
//!
//! Settings are read from the environment (with `.env` support) once at startup.
//! Upload and archive settings live in their own structs so services can take
//! only the part they need.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

// Common constants
const SERVER_PORT: u16 = 3000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MIN_PRODUCTION_SECRET_LEN: usize = 32;

pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 1024;
pub const DEFAULT_MIN_CHUNK_SIZE_BYTES: u64 = 64 * 1024;
pub const DEFAULT_MAX_CHUNK_SIZE_BYTES: u64 = 64 * 1024 * 1024;
pub const DEFAULT_MAX_CHUNK_COUNT: u64 = 10_000;
pub const DEFAULT_UPLOAD_SESSION_TTL_HOURS: i64 = 24;
pub const DEFAULT_ARCHIVE_WORKERS: usize = 4;
pub const DEFAULT_ARCHIVE_QUEUE_DEPTH: usize = 64;
pub const DEFAULT_ARCHIVE_TTL_HOURS: i64 = 24;
pub const DEFAULT_ARCHIVE_MAX_FILES: usize = 500;
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 3600;

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool_env(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

/// Log output format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compact" | "pretty" | "text" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

/// Server-wide settings
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,
    pub jwt_secret: String,
    pub public_base_url: String,
    pub log_format: LogFormat,
    /// `None` selects the in-memory repositories.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
}

/// Chunked upload settings
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub content_storage_path: PathBuf,
    pub staging_path: PathBuf,
    pub max_file_size_bytes: u64,
    pub min_chunk_size_bytes: u64,
    pub max_chunk_size_bytes: u64,
    pub max_chunk_count: u64,
    pub session_ttl_hours: i64,
    pub instant_upload_enabled: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            content_storage_path: PathBuf::from("./data/content"),
            staging_path: PathBuf::from("./data/staging"),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_MB * 1024 * 1024,
            min_chunk_size_bytes: DEFAULT_MIN_CHUNK_SIZE_BYTES,
            max_chunk_size_bytes: DEFAULT_MAX_CHUNK_SIZE_BYTES,
            max_chunk_count: DEFAULT_MAX_CHUNK_COUNT,
            session_ttl_hours: DEFAULT_UPLOAD_SESSION_TTL_HOURS,
            instant_upload_enabled: true,
        }
    }
}

/// Archive packaging and reaping settings
#[derive(Clone, Debug)]
pub struct ArchiveConfig {
    pub workers: usize,
    pub queue_depth: usize,
    pub ttl_hours: i64,
    pub max_files: usize,
    pub reaper_interval_secs: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_ARCHIVE_WORKERS,
            queue_depth: DEFAULT_ARCHIVE_QUEUE_DEPTH,
            ttl_hours: DEFAULT_ARCHIVE_TTL_HOURS,
            max_files: DEFAULT_ARCHIVE_MAX_FILES,
            reaper_interval_secs: DEFAULT_REAPER_INTERVAL_SECS,
        }
    }
}

/// Application configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub base: BaseConfig,
    pub upload: UploadConfig,
    pub archive: ArchiveConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins: Vec<String> = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let log_format = env::var("LOG_FORMAT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(LogFormat::Compact);

        let base = BaseConfig {
            server_port: env::var("SERVER_PORT")
                .or_else(|_| env::var("PORT"))
                .unwrap_or_else(|_| SERVER_PORT.to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("SERVER_PORT must be a valid number"))?,
            environment,
            cors_origins,
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| anyhow::anyhow!("JWT_SECRET must be set for authentication"))?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}", SERVER_PORT))
                .trim_end_matches('/')
                .to_string(),
            log_format,
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            db_max_connections: parse_env("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: parse_env("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
        };

        let defaults = UploadConfig::default();
        let upload = UploadConfig {
            content_storage_path: env::var("CONTENT_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.content_storage_path),
            staging_path: env::var("STAGING_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.staging_path),
            max_file_size_bytes: parse_env("MAX_FILE_SIZE_MB", DEFAULT_MAX_FILE_SIZE_MB)
                .saturating_mul(1024 * 1024),
            min_chunk_size_bytes: parse_env("MIN_CHUNK_SIZE_BYTES", DEFAULT_MIN_CHUNK_SIZE_BYTES),
            max_chunk_size_bytes: parse_env("MAX_CHUNK_SIZE_BYTES", DEFAULT_MAX_CHUNK_SIZE_BYTES),
            max_chunk_count: parse_env("MAX_CHUNK_COUNT", DEFAULT_MAX_CHUNK_COUNT),
            session_ttl_hours: parse_env(
                "UPLOAD_SESSION_TTL_HOURS",
                DEFAULT_UPLOAD_SESSION_TTL_HOURS,
            ),
            instant_upload_enabled: parse_bool_env("INSTANT_UPLOAD_ENABLED", true),
        };

        let archive = ArchiveConfig {
            workers: parse_env("ARCHIVE_WORKERS", DEFAULT_ARCHIVE_WORKERS),
            queue_depth: parse_env("ARCHIVE_QUEUE_DEPTH", DEFAULT_ARCHIVE_QUEUE_DEPTH),
            ttl_hours: parse_env("ARCHIVE_TTL_HOURS", DEFAULT_ARCHIVE_TTL_HOURS),
            max_files: parse_env("ARCHIVE_MAX_FILES", DEFAULT_ARCHIVE_MAX_FILES),
            reaper_interval_secs: parse_env("REAPER_INTERVAL_SECS", DEFAULT_REAPER_INTERVAL_SECS),
        };

        Ok(Config {
            base,
            upload,
            archive,
        })
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base.jwt_secret.is_empty() {
            return Err(anyhow::anyhow!("JWT_SECRET must not be empty"));
        }

        if self.is_production() {
            if self.base.jwt_secret.len() < MIN_PRODUCTION_SECRET_LEN {
                return Err(anyhow::anyhow!(
                    "JWT_SECRET must be at least {} characters long in production",
                    MIN_PRODUCTION_SECRET_LEN
                ));
            }
            if self.base.cors_origins.iter().any(|o| o == "*") {
                return Err(anyhow::anyhow!(
                    "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
                ));
            }
        }

        if let Some(url) = &self.base.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        let upload = &self.upload;
        if upload.max_file_size_bytes == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE_MB must be greater than 0"));
        }
        if upload.min_chunk_size_bytes == 0 {
            return Err(anyhow::anyhow!("MIN_CHUNK_SIZE_BYTES must be greater than 0"));
        }
        if upload.min_chunk_size_bytes > upload.max_chunk_size_bytes {
            return Err(anyhow::anyhow!(
                "MIN_CHUNK_SIZE_BYTES ({}) must not exceed MAX_CHUNK_SIZE_BYTES ({})",
                upload.min_chunk_size_bytes,
                upload.max_chunk_size_bytes
            ));
        }
        if upload.max_chunk_count == 0 {
            return Err(anyhow::anyhow!("MAX_CHUNK_COUNT must be greater than 0"));
        }
        if upload.session_ttl_hours <= 0 {
            return Err(anyhow::anyhow!("UPLOAD_SESSION_TTL_HOURS must be positive"));
        }
        if upload.content_storage_path == upload.staging_path {
            return Err(anyhow::anyhow!(
                "CONTENT_STORAGE_PATH and STAGING_PATH must be different directories"
            ));
        }

        let archive = &self.archive;
        if archive.workers == 0 || archive.queue_depth == 0 {
            return Err(anyhow::anyhow!(
                "ARCHIVE_WORKERS and ARCHIVE_QUEUE_DEPTH must be greater than 0"
            ));
        }
        if archive.ttl_hours <= 0 {
            return Err(anyhow::anyhow!("ARCHIVE_TTL_HOURS must be positive"));
        }
        if archive.max_files == 0 {
            return Err(anyhow::anyhow!("ARCHIVE_MAX_FILES must be greater than 0"));
        }
        if archive.reaper_interval_secs == 0 {
            return Err(anyhow::anyhow!("REAPER_INTERVAL_SECS must be greater than 0"));
        }

        Ok(())
    }

    // Convenience getters for common fields
    pub fn server_port(&self) -> u16 {
        self.base.server_port
    }

    pub fn jwt_secret(&self) -> &str {
        &self.base.jwt_secret
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.base.cors_origins
    }

    pub fn database_url(&self) -> Option<&str> {
        self.base.database_url.as_deref()
    }

    pub fn public_base_url(&self) -> &str {
        &self.base.public_base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            base: BaseConfig {
                server_port: SERVER_PORT,
                environment: "development".to_string(),
                cors_origins: vec!["*".to_string()],
                jwt_secret: "test-secret".to_string(),
                public_base_url: "http://localhost:3000".to_string(),
                log_format: LogFormat::Compact,
                database_url: None,
                db_max_connections: MAX_CONNECTIONS,
                db_timeout_seconds: CONNECTION_TIMEOUT_SECS,
            },
            upload: UploadConfig::default(),
            archive: ArchiveConfig::default(),
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_production_requires_long_secret_and_explicit_origins() {
        let mut config = sample_config();
        config.base.environment = "production".to_string();
        assert!(config.validate().is_err());

        config.base.jwt_secret = "x".repeat(32);
        assert!(config.validate().is_err());

        config.base.cors_origins = vec!["https://team.example.com".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_chunk_bounds_must_be_ordered() {
        let mut config = sample_config();
        config.upload.min_chunk_size_bytes = 2 * 1024 * 1024;
        config.upload.max_chunk_size_bytes = 1024 * 1024;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_url_scheme() {
        let mut config = sample_config();
        config.base.database_url = Some("mysql://localhost/cofile".to_string());
        assert!(config.validate().is_err());

        config.base.database_url = Some("postgres://localhost/cofile".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_staging_and_content_paths_differ() {
        let mut config = sample_config();
        config.upload.staging_path = config.upload.content_storage_path.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
