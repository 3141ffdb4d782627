// src/models/mod.rs

pub mod college;
pub mod comment;
pub mod image;
pub mod post;
pub mod profile;
pub mod user;

/// Shared check for user-written text: non-empty once trimmed, at most `max` characters.
pub(crate) fn check_text(
    value: &str,
    max: usize,
    field: &'static str,
) -> Result<(), validator::ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(validator::ValidationError::new("empty")
            .with_message(format!("{field} cannot be empty").into()));
    }
    if trimmed.chars().count() > max {
        return Err(validator::ValidationError::new("too_long")
            .with_message(format!("{field} must be at most {max} characters").into()));
    }
    Ok(())
}
