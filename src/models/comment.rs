use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::check_text;

pub const MAX_COMMENT_CHARS: usize = 200;

/// Represents the 'comments' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub likes_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// UI helper: whether the current user has liked this comment.
    #[sqlx(skip)]
    #[serde(default)]
    pub is_liked: bool,
}

/// DTO for creating a new comment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CommentDraft {
    #[validate(custom(function = validate_comment_content))]
    pub content: String,
}

fn validate_comment_content(content: &str) -> Result<(), validator::ValidationError> {
    check_text(content, MAX_COMMENT_CHARS, "Comment")
}

/// Row handed to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub post_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
}
