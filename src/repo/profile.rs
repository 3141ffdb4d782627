// src/repo/profile.rs

use std::sync::{Arc, Mutex};

use uuid::Uuid;
use validator::Validate;

use super::lock;
use crate::{
    error::AppError,
    models::{
        college::{College, Department},
        image::ImageFile,
        profile::{NewProfile, Profile, ProfileChanges, ProfilePatch},
    },
    session::SessionContext,
};

struct Inner {
    context: Arc<SessionContext>,
    cached: Mutex<Option<Profile>>,
}

/// The signed-in user's profile plus the college/department reference data
/// the settings screen needs.
#[derive(Clone)]
pub struct ProfileRepository {
    inner: Arc<Inner>,
}

impl ProfileRepository {
    pub(crate) fn new(context: Arc<SessionContext>) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                cached: Mutex::new(None),
            }),
        }
    }

    /// Fetches the profile. `Ok(None)` means onboarding never finished.
    pub async fn load_profile(&self) -> Result<Option<Profile>, AppError> {
        let context = &self.inner.context;
        context.liveness.ensure()?;

        let profile = context.gateway.find_profile(context.user.id).await?;

        context.liveness.ensure()?;
        *lock(&self.inner.cached) = profile.clone();
        Ok(profile)
    }

    pub fn profile(&self) -> Option<Profile> {
        lock(&self.inner.cached).clone()
    }

    /// One-time onboarding. Fails with `Conflict` if a profile already exists.
    pub async fn create_profile(&self, new_profile: NewProfile) -> Result<Profile, AppError> {
        let context = &self.inner.context;
        context.liveness.ensure()?;
        new_profile.validate()?;

        if context.gateway.find_profile(context.user.id).await?.is_some() {
            return Err(AppError::Conflict("Profile already exists".to_string()));
        }
        self.check_membership(new_profile.college_id, new_profile.department_id)
            .await?;

        let new_profile = NewProfile {
            display_name: new_profile.display_name.trim().to_string(),
            ..new_profile
        };
        let profile = context
            .gateway
            .insert_profile(context.user.id, &new_profile)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create profile: {}", e);
                e
            })?;

        context.liveness.ensure()?;
        *lock(&self.inner.cached) = Some(profile.clone());
        tracing::info!("Profile created for {}", context.user.id);
        Ok(profile)
    }

    /// Changes name and/or affiliation. Never creates a profile: without one
    /// this fails with `ProfileIncomplete`.
    pub async fn update_profile(&self, changes: ProfileChanges) -> Result<Profile, AppError> {
        let context = &self.inner.context;
        context.liveness.ensure()?;
        changes.validate()?;

        let current = context
            .gateway
            .find_profile(context.user.id)
            .await?
            .ok_or(AppError::ProfileIncomplete)?;
        if changes.is_empty() {
            return Ok(current);
        }

        let college_id = changes.college_id.unwrap_or(current.college_id);
        let department_id = changes.department_id.unwrap_or(current.department_id);
        if college_id != current.college_id || department_id != current.department_id {
            self.check_membership(college_id, department_id).await?;
        }

        let patch = ProfilePatch {
            display_name: changes.display_name.map(|n| n.trim().to_string()),
            college_id: changes.college_id,
            department_id: changes.department_id,
            picture_url: None,
        };
        self.apply(patch).await
    }

    /// Uploads a new picture and points the profile at it. The cached profile
    /// keeps its old URL unless both steps succeed.
    pub async fn update_profile_picture(&self, file: ImageFile) -> Result<Profile, AppError> {
        let context = &self.inner.context;
        context.liveness.ensure()?;

        if context.gateway.find_profile(context.user.id).await?.is_none() {
            return Err(AppError::ProfileIncomplete);
        }

        let url = context
            .uploads
            .upload_profile_picture(&file, context.user.id)
            .await?;
        self.apply(ProfilePatch::picture(url)).await
    }

    pub async fn colleges(&self) -> Result<Vec<College>, AppError> {
        self.inner.context.gateway.colleges().await
    }

    pub async fn departments(&self, college_id: Uuid) -> Result<Vec<Department>, AppError> {
        self.inner.context.gateway.departments(college_id).await
    }

    pub(crate) fn clear(&self) {
        *lock(&self.inner.cached) = None;
    }

    async fn apply(&self, patch: ProfilePatch) -> Result<Profile, AppError> {
        let context = &self.inner.context;
        let profile = context
            .gateway
            .update_profile(context.user.id, &patch)
            .await
            .map_err(|e| {
                tracing::error!("Failed to update profile: {}", e);
                e
            })?;

        context.liveness.ensure()?;
        *lock(&self.inner.cached) = Some(profile.clone());
        Ok(profile)
    }

    async fn check_membership(&self, college_id: Uuid, department_id: Uuid) -> Result<(), AppError> {
        let gateway = &self.inner.context.gateway;
        if gateway.college(college_id).await?.is_none() {
            return Err(AppError::Validation("Unknown college".to_string()));
        }
        match gateway.department(department_id).await? {
            Some(d) if d.college_id == college_id => Ok(()),
            _ => Err(AppError::Validation(
                "Department does not belong to the selected college".to_string(),
            )),
        }
    }
}
