// src/models/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::image::ImageFile;

/// Authenticated identity as seen by the rest of the crate.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Represents the 'users' table in the database.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,

    /// Argon2 password hash.
    pub password: String,

    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for AuthUser {
    fn from(record: UserRecord) -> Self {
        AuthUser {
            id: record.id,
            email: record.email,
            created_at: record.created_at,
        }
    }
}

/// A signed-in user together with the access token the gateway issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user: AuthUser,
    pub access_token: String,
}

/// DTO for email/password sign-in.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "Please enter a valid email address."))]
    pub email: String,
    #[validate(length(
        min = 6,
        max = 128,
        message = "Password length must be between 6 and 128 characters."
    ))]
    pub password: String,
}

/// DTO for the sign-up form, which also carries the onboarding profile.
#[derive(Debug, Clone, Validate)]
pub struct SignUpRequest {
    #[validate(nested)]
    pub credentials: Credentials,

    #[validate(length(
        min = 3,
        max = 50,
        message = "Display name length must be between 3 and 50 characters."
    ))]
    pub display_name: String,

    pub college_id: Uuid,
    pub department_id: Uuid,

    /// Optional profile picture; a failed upload does not block sign-up.
    pub picture: Option<ImageFile>,
}
