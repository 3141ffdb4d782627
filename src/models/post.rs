use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{check_text, image::ImageFile, profile::Profile};

pub const MAX_POST_CHARS: usize = 500;

/// Represents the 'posts' table in the database.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,

    /// Public image URLs, in upload order.
    pub images: Vec<String>,

    pub college_id: Uuid,
    /// Present exactly when the post is department-scoped.
    pub department_id: Option<Uuid>,
    pub is_college_wide: bool,

    pub likes_count: i32,
    pub comments_count: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// UI helper: joined from 'departments' when listing the feed.
    #[sqlx(default)]
    #[serde(default)]
    pub department_name: Option<String>,

    /// UI helper: whether the current user has liked this post.
    /// Default to false, populated by the post repository.
    #[sqlx(skip)]
    #[serde(default)]
    pub is_liked: bool,
}

impl Post {
    pub fn audience(&self) -> Audience {
        match (self.is_college_wide, self.department_id) {
            (false, Some(department_id)) => Audience::Department(department_id),
            _ => Audience::CollegeWide,
        }
    }

    /// College-wide posts of the viewer's college, or posts of the viewer's department.
    pub fn is_visible_to(&self, profile: &Profile) -> bool {
        self.college_id == profile.college_id
            && (self.is_college_wide || self.department_id == Some(profile.department_id))
    }

    /// Posts are anonymous; the feed never shows who wrote them.
    pub fn author_label(&self) -> &'static str {
        "Anonymous"
    }

    /// Likes plus comments, the ranking key of the "Hot" filter.
    pub fn engagement(&self) -> i64 {
        i64::from(self.likes_count) + i64::from(self.comments_count)
    }
}

/// Visibility scope of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "department_id", rename_all = "snake_case")]
pub enum Audience {
    CollegeWide,
    Department(Uuid),
}

impl Audience {
    pub fn is_college_wide(&self) -> bool {
        matches!(self, Audience::CollegeWide)
    }

    pub fn department_id(&self) -> Option<Uuid> {
        match self {
            Audience::CollegeWide => None,
            Audience::Department(id) => Some(*id),
        }
    }
}

/// What the composer hands to the post repository.
#[derive(Debug, Clone, Default, Validate)]
pub struct PostDraft {
    #[validate(custom(function = validate_post_content))]
    pub content: String,

    pub images: Vec<ImageFile>,

    pub is_college_wide: bool,

    /// Only meaningful when `is_college_wide` is false; defaults to the author's department.
    pub department_id: Option<Uuid>,
}

impl PostDraft {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn college_wide(mut self) -> Self {
        self.is_college_wide = true;
        self.department_id = None;
        self
    }

    pub fn in_department(mut self, department_id: Uuid) -> Self {
        self.is_college_wide = false;
        self.department_id = Some(department_id);
        self
    }

    pub fn with_images(mut self, images: Vec<ImageFile>) -> Self {
        self.images = images;
        self
    }
}

fn validate_post_content(content: &str) -> Result<(), validator::ValidationError> {
    check_text(content, MAX_POST_CHARS, "Post content")
}

/// Row handed to the gateway; college and audience are already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub user_id: Uuid,
    pub content: String,
    pub images: Vec<String>,
    pub college_id: Uuid,
    pub audience: Audience,
}

/// Page request for the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedPage {
    /// Only posts strictly older than this are returned.
    pub cursor: Option<DateTime<Utc>>,

    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,
}

impl FeedPage {
    pub fn effective_limit(&self, default: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_only_content_is_rejected() {
        assert!(PostDraft::new("   \n\t").validate().is_err());
        assert!(PostDraft::new(" hello ").validate().is_ok());
    }

    #[test]
    fn content_limit_counts_characters_after_trimming() {
        let exact = "é".repeat(MAX_POST_CHARS);
        assert!(PostDraft::new(format!("  {exact}  ")).validate().is_ok());
        assert!(PostDraft::new(format!("{exact}x")).validate().is_err());
    }

    #[test]
    fn college_wide_draft_drops_department() {
        let draft = PostDraft::new("hi").in_department(Uuid::new_v4()).college_wide();
        assert!(draft.is_college_wide);
        assert_eq!(draft.department_id, None);
    }

    #[test]
    fn audience_serializes_with_kind_tag() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(Audience::Department(id)).unwrap();
        assert_eq!(json["kind"], "department");
        assert_eq!(json["department_id"], id.to_string());

        let wide: Audience = serde_json::from_str(r#"{"kind":"college_wide"}"#).unwrap();
        assert!(wide.is_college_wide());
    }

    #[test]
    fn page_limit_is_clamped() {
        assert_eq!(FeedPage::default().effective_limit(20), 20);
        assert_eq!(FeedPage { cursor: None, limit: Some(500) }.effective_limit(20), 100);
        assert_eq!(FeedPage { cursor: None, limit: Some(0) }.effective_limit(20), 1);
    }
}
