// src/gateway/mod.rs

//! The remote data gateway: auth, relational rows and like bookkeeping.
//!
//! Repositories only ever talk to `dyn Gateway`. Like counters on posts and
//! comments are owned by the gateway: `set_*_like` writes the like row and the
//! aggregate together and returns the authoritative count.

pub mod memory;
pub mod postgres;

use std::collections::HashSet;

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        college::{College, Department},
        comment::{Comment, NewComment},
        post::{FeedPage, NewPost, Post},
        profile::{NewProfile, Profile, ProfilePatch},
        user::{AuthSession, AuthUser, Credentials},
    },
};

/// Result of an idempotent like write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeAck {
    /// Whether the like row exists after the write.
    pub liked: bool,
    /// Aggregate count after the write.
    pub likes_count: i32,
}

#[async_trait]
pub trait Gateway: Send + Sync {
    // --- auth ---

    /// Creates the account. Duplicate emails fail with `Conflict`.
    async fn sign_up(&self, credentials: &Credentials) -> Result<AuthSession, AppError>;

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, AppError>;

    /// Resolves an access token back to its user.
    async fn verify_token(&self, token: &str) -> Result<AuthUser, AppError>;

    async fn sign_out(&self, _token: &str) -> Result<(), AppError> {
        Ok(())
    }

    // --- reference data ---

    /// All colleges ordered by name.
    async fn colleges(&self) -> Result<Vec<College>, AppError>;

    async fn college(&self, college_id: Uuid) -> Result<Option<College>, AppError>;

    /// Departments of one college ordered by name.
    async fn departments(&self, college_id: Uuid) -> Result<Vec<Department>, AppError>;

    async fn department(&self, department_id: Uuid) -> Result<Option<Department>, AppError>;

    // --- profiles ---

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError>;

    /// Fails with `Conflict` when the user already has a profile.
    async fn insert_profile(&self, user_id: Uuid, profile: &NewProfile)
    -> Result<Profile, AppError>;

    /// Fails with `NotFound` when the user has no profile.
    async fn update_profile(&self, user_id: Uuid, patch: &ProfilePatch)
    -> Result<Profile, AppError>;

    // --- posts ---

    /// Posts of `college_id` that are college-wide or scoped to `department_id`,
    /// newest first.
    async fn visible_posts(
        &self,
        college_id: Uuid,
        department_id: Uuid,
        page: FeedPage,
    ) -> Result<Vec<Post>, AppError>;

    async fn insert_post(&self, post: &NewPost) -> Result<Post, AppError>;

    /// The subset of `post_ids` liked by `user_id`, in one round-trip.
    async fn liked_post_ids(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, AppError>;

    /// Inserts or deletes the like row so that its presence equals `liked`.
    async fn set_post_like(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        liked: bool,
    ) -> Result<LikeAck, AppError>;

    // --- comments ---

    /// Comments of a post, oldest first.
    async fn comments(&self, post_id: Uuid) -> Result<Vec<Comment>, AppError>;

    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment, AppError>;

    /// Bumps the post's comment counter, returning the new value.
    async fn increment_comments_count(&self, post_id: Uuid) -> Result<i32, AppError>;

    async fn liked_comment_ids(
        &self,
        user_id: Uuid,
        comment_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, AppError>;

    async fn set_comment_like(
        &self,
        user_id: Uuid,
        comment_id: Uuid,
        liked: bool,
    ) -> Result<LikeAck, AppError>;
}
