//! Node name rules.

use drivehub_core::error::AppError;
use drivehub_core::result::AppResult;

/// Longest accepted name, in characters.
pub const MAX_NAME_LENGTH: usize = 255;

/// Validate a node name and return it trimmed.
pub fn validate_name(name: &str) -> AppResult<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation("Name must not be empty"));
    }
    if trimmed.contains('/') {
        return Err(AppError::validation("Name must not contain '/'"));
    }
    if trimmed.chars().any(char::is_control) {
        return Err(AppError::validation("Name must not contain control characters"));
    }
    if trimmed.chars().count() > MAX_NAME_LENGTH {
        return Err(AppError::validation(format!(
            "Name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(trimmed)
}
