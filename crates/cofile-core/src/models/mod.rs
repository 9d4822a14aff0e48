//! Data models for the application
//!
//! Records owned by the transfer subsystem plus the request/response bodies of the
//! HTTP surface, organized by domain.

mod archive;
mod content;
mod file;
mod upload;

pub use archive::*;
pub use content::*;
pub use file::*;
pub use upload::*;
