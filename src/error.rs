// src/error.rs

use std::fmt;

/// Global Application Error Enum.
/// Every repository, gateway and storage operation reports failures through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    // Input rejected before anything was written (empty content, bad audience, ...)
    Validation(String),

    // The signed-in user has not finished onboarding.
    ProfileIncomplete,

    // An image could not be stored; the dependent write was aborted.
    Upload(String),

    // Generic gateway failure (database, transport).
    Network(String),

    // 404-style miss on a row or a cached item.
    NotFound(String),

    // Unique violation or a one-time transition attempted twice.
    Conflict(String),

    // Bad credentials or an invalid token.
    Auth(String),

    // The session owning this repository has been torn down.
    Unauthenticated,

    // Missing or malformed configuration.
    Config(String),
}

impl AppError {
    /// Whether the user may reasonably retry the same action by hand.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Network(_) | AppError::Upload(_))
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(msg) => write!(f, "validation failed: {msg}"),
            AppError::ProfileIncomplete => write!(f, "please complete your profile first"),
            AppError::Upload(msg) => write!(f, "image upload failed: {msg}"),
            AppError::Network(msg) => write!(f, "gateway error: {msg}"),
            AppError::NotFound(msg) => write!(f, "not found: {msg}"),
            AppError::Conflict(msg) => write!(f, "conflict: {msg}"),
            AppError::Auth(msg) => write!(f, "authentication failed: {msg}"),
            AppError::Unauthenticated => write!(f, "session has ended"),
            AppError::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

/// Converts `sqlx::Error` into `AppError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound(err.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(db.message().to_string())
            }
            _ => AppError::Network(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Network(err.to_string())
    }
}

/// Validation failures from the `validator` derive surface as `Validation`.
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_network_and_upload() {
        assert!(AppError::Network("timeout".into()).is_transient());
        assert!(AppError::Upload("disk full".into()).is_transient());
        assert!(!AppError::Validation("empty".into()).is_transient());
        assert!(!AppError::ProfileIncomplete.is_transient());
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
