//! Access decisions for file reads
//!
//! Role and workflow membership live outside this system; the resolver is the seam
//! where that collaborator plugs in.

use async_trait::async_trait;
use cofile_core::models::{FileEntry, Visibility};
use cofile_core::AppError;
use uuid::Uuid;

#[async_trait]
pub trait PermissionResolver: Send + Sync {
    /// Whether `caller` may read `file`'s metadata and bytes.
    async fn can_read(&self, caller: Uuid, file: &FileEntry) -> Result<bool, AppError>;
}

/// Owners can read their own files; team-visible files are readable by everyone.
#[derive(Debug, Default, Clone)]
pub struct VisibilityPermissionResolver;

#[async_trait]
impl PermissionResolver for VisibilityPermissionResolver {
    async fn can_read(&self, caller: Uuid, file: &FileEntry) -> Result<bool, AppError> {
        Ok(file.is_active() && (file.owner_id == caller || file.visibility == Visibility::Team))
    }
}
