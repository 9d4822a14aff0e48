//! Cofile Services Layer
//!
//! Orchestration for the content transfer subsystem: the chunked upload pipeline,
//! batch archive packaging, file reads behind the permission resolver, and the
//! background expiry reaper. Thin HTTP handling lives in cofile-api.

pub mod archive;
pub mod cleanup;
pub mod files;
pub mod permission;
pub mod upload;

pub use archive::{ArchiveDownload, ArchiveService};
pub use cleanup::{ExpiryReaper, SweepReport};
pub use files::FileService;
pub use permission::{PermissionResolver, VisibilityPermissionResolver};
pub use upload::{IncomingChunk, UploadService};
