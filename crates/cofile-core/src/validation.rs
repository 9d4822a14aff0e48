//! Input validation for upload and archive requests

use crate::config::UploadConfig;
use crate::error::AppError;

pub const MAX_FILE_NAME_LENGTH: usize = 255;
pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

/// Validate a user-supplied display name. Names are stored as given, so path
/// separators and control characters are rejected rather than stripped.
pub fn validate_file_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::InvalidInput("File name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_FILE_NAME_LENGTH {
        return Err(AppError::InvalidInput(format!(
            "File name must be at most {} characters",
            MAX_FILE_NAME_LENGTH
        )));
    }
    if name.contains('/') || name.contains('\\') || name.chars().any(char::is_control) {
        return Err(AppError::InvalidInput(
            "File name must not contain path separators or control characters".to_string(),
        ));
    }
    if name == "." || name == ".." {
        return Err(AppError::InvalidInput("Invalid file name".to_string()));
    }
    Ok(())
}

/// Validate the declared upload geometry and return the number of chunks.
pub fn plan_chunks(
    declared_size: u64,
    chunk_size: u64,
    config: &UploadConfig,
) -> Result<u64, AppError> {
    if declared_size == 0 {
        return Err(AppError::InvalidInput(
            "File size must be at least 1 byte".to_string(),
        ));
    }
    if declared_size > config.max_file_size_bytes {
        return Err(AppError::PayloadTooLarge(format!(
            "File size {} exceeds maximum of {} bytes",
            declared_size, config.max_file_size_bytes
        )));
    }
    // A file smaller than the minimum chunk size travels as a single short chunk.
    let min_chunk = config.min_chunk_size_bytes.min(declared_size);
    if chunk_size < min_chunk || chunk_size > config.max_chunk_size_bytes {
        return Err(AppError::InvalidInput(format!(
            "Chunk size must be between {} and {} bytes",
            config.min_chunk_size_bytes, config.max_chunk_size_bytes
        )));
    }

    let total_chunks = declared_size.div_ceil(chunk_size);
    if total_chunks > config.max_chunk_count {
        return Err(AppError::InvalidInput(format!(
            "Upload would need {} chunks; at most {} are allowed",
            total_chunks, config.max_chunk_count
        )));
    }
    Ok(total_chunks)
}

pub fn validate_description(description: Option<&str>) -> Result<(), AppError> {
    match description {
        Some(d) if d.chars().count() > MAX_DESCRIPTION_LENGTH => Err(AppError::InvalidInput(
            format!(
                "Description must be at most {} characters",
                MAX_DESCRIPTION_LENGTH
            ),
        )),
        _ => Ok(()),
    }
}
