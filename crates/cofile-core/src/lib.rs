//! Cofile Core Library
//!
//! This crate provides the domain models, error types, configuration, fingerprinting
//! and validation shared across all Cofile components.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod mime;
pub mod models;
pub mod validation;

// Re-export commonly used types
pub use config::{ArchiveConfig, BaseConfig, Config, LogFormat, UploadConfig};
pub use error::{AppError, ErrorKind, ErrorMetadata, LogLevel};
pub use fingerprint::{ContentKey, Fingerprint, FingerprintHasher};

pub type AppResult<T> = Result<T, AppError>;
