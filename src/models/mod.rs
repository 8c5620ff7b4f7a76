pub mod access;
pub mod auth;
pub mod group;
pub mod task;
pub mod user;

use crate::error::{AppError, AppResult};

const MAX_NAME_LEN: usize = 255;

/// Names must be non-blank and at most 255 characters.
pub(crate) fn validate_name(field: &str, value: &str) -> AppResult<()> {
    let len = value.trim().chars().count();
    if len == 0 || len > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "{field} must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}
