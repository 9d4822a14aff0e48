//! Application state shared by handlers

use cofile_core::Config;
use cofile_services::{ArchiveService, ExpiryReaper, FileService, UploadService};
use std::sync::Arc;

pub struct AppState {
    pub config: Config,
    pub uploads: UploadService,
    pub files: FileService,
    pub archives: ArchiveService,
    pub reaper: Arc<ExpiryReaper>,
}
