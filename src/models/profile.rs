use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Represents the 'profiles' table in the database.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,

    /// Owner; set once at onboarding and never changed.
    pub user_id: Uuid,

    /// Anonymous name chosen by the user.
    pub display_name: String,

    pub college_id: Uuid,
    /// Always a department of `college_id`.
    pub department_id: Uuid,

    pub picture_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTO for the one-time profile creation during onboarding.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewProfile {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Display name length must be between 3 and 50 characters."
    ))]
    pub display_name: String,

    pub college_id: Uuid,
    pub department_id: Uuid,

    #[validate(url)]
    pub picture_url: Option<String>,
}

/// DTO for the settings screen. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ProfileChanges {
    #[validate(length(
        min = 3,
        max = 50,
        message = "Display name length must be between 3 and 50 characters."
    ))]
    pub display_name: Option<String>,

    pub college_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.college_id.is_none() && self.department_id.is_none()
    }
}

/// Column-level patch applied by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub display_name: Option<String>,
    pub college_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub picture_url: Option<String>,
}

impl ProfilePatch {
    pub fn picture(url: impl Into<String>) -> Self {
        Self {
            picture_url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Applies the patch to an in-memory copy of the row.
    pub fn apply_to(&self, profile: &mut Profile) {
        if let Some(name) = &self.display_name {
            profile.display_name = name.clone();
        }
        if let Some(college_id) = self.college_id {
            profile.college_id = college_id;
        }
        if let Some(department_id) = self.department_id {
            profile.department_id = department_id;
        }
        if let Some(url) = &self.picture_url {
            profile.picture_url = Some(url.clone());
        }
    }
}
