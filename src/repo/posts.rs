// src/repo/posts.rs

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;
use validator::Validate;

use super::lock;
use crate::{
    error::AppError,
    likes::LikeBook,
    models::{
        post::{Audience, FeedPage, NewPost, Post, PostDraft},
        profile::Profile,
    },
    session::SessionContext,
};

#[derive(Default)]
struct PostCache {
    /// Newest first.
    posts: Vec<Post>,
    /// The last page came back short; there is nothing older to fetch.
    exhausted: bool,
    /// Posts created here since the last full reload started. A reload whose
    /// page predates them keeps them on top.
    created: Vec<Uuid>,
}

struct Inner {
    context: Arc<SessionContext>,
    cache: Mutex<PostCache>,
    likes: LikeBook,
    /// Bumped by every full reload; older loads drop their results.
    epoch: AtomicU64,
}

/// The feed of the signed-in user.
#[derive(Clone)]
pub struct PostRepository {
    inner: Arc<Inner>,
}

impl PostRepository {
    pub(crate) fn new(context: Arc<SessionContext>) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                cache: Mutex::new(PostCache::default()),
                likes: LikeBook::default(),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    fn context(&self) -> &SessionContext {
        &self.inner.context
    }

    /// Loads the first page of posts visible to the user, newest first, and
    /// replaces the local cache with it. Posts created while the load was in
    /// flight stay on top.
    pub async fn load_posts(&self) -> Result<Vec<Post>, AppError> {
        let context = self.context();
        context.liveness.ensure()?;
        let epoch = {
            let mut cache = lock(&self.inner.cache);
            cache.created.clear();
            self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };

        let profile = self.require_profile().await?;
        let limit = context.page_size;
        let posts = self
            .fetch_page(&profile, FeedPage { cursor: None, limit: Some(limit) })
            .await?;

        context.liveness.ensure()?;
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            tracing::debug!("Discarding a feed load superseded by a newer one");
            return Ok(self.posts());
        }

        for post in &posts {
            self.inner.likes.reconcile(post.id, post.is_liked, post.likes_count);
        }
        {
            let mut cache = lock(&self.inner.cache);
            cache.exhausted = (posts.len() as i64) < FeedPage::default().effective_limit(limit);
            let mut merged: Vec<Post> = cache
                .posts
                .iter()
                .filter(|p| cache.created.contains(&p.id) && posts.iter().all(|f| f.id != p.id))
                .cloned()
                .collect();
            if !merged.is_empty() {
                tracing::debug!("Keeping {} post(s) created during the reload", merged.len());
            }
            merged.extend(posts);
            cache.posts = merged;
        }

        Ok(self.posts())
    }

    /// Appends the next page of older posts. Returns only the new ones.
    pub async fn load_more(&self) -> Result<Vec<Post>, AppError> {
        let context = self.context();
        context.liveness.ensure()?;

        let (cursor, exhausted) = {
            let cache = lock(&self.inner.cache);
            (cache.posts.last().map(|p| p.created_at), cache.exhausted)
        };
        let Some(cursor) = cursor else {
            return self.load_posts().await;
        };
        if exhausted {
            return Ok(Vec::new());
        }

        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let profile = self.require_profile().await?;
        let limit = context.page_size;
        let page = self
            .fetch_page(&profile, FeedPage { cursor: Some(cursor), limit: Some(limit) })
            .await?;

        context.liveness.ensure()?;
        if self.inner.epoch.load(Ordering::SeqCst) != epoch {
            return Ok(Vec::new());
        }

        let mut added = Vec::new();
        {
            let mut cache = lock(&self.inner.cache);
            cache.exhausted = (page.len() as i64) < FeedPage::default().effective_limit(limit);
            for post in page {
                if cache.posts.iter().all(|p| p.id != post.id) {
                    cache.posts.push(post.clone());
                    added.push(post);
                }
            }
        }
        for post in &added {
            self.inner.likes.reconcile(post.id, post.is_liked, post.likes_count);
        }

        Ok(added.into_iter().map(|p| self.decorate(p)).collect())
    }

    /// Validates, uploads images, then inserts the post.
    ///
    /// The college always comes from the author's profile. A department-scoped
    /// post goes to the explicit department when given (it must be a
    /// department of the author's college), otherwise to the author's own.
    /// Nothing is written unless every image uploaded.
    pub async fn create_post(&self, draft: PostDraft) -> Result<Post, AppError> {
        let context = self.context();
        context.liveness.ensure()?;
        draft.validate()?;

        let profile = self.require_profile().await?;
        let audience = self.resolve_audience(&profile, &draft).await?;

        let images = context
            .uploads
            .upload_all(&draft.images, context.user.id)
            .await
            .map_err(|e| {
                tracing::error!("Aborting post creation, image upload failed: {}", e);
                e
            })?;

        let new_post = NewPost {
            user_id: context.user.id,
            content: draft.content.trim().to_string(),
            images: images.into_iter().map(String::from).collect(),
            college_id: profile.college_id,
            audience,
        };

        let mut post = context.gateway.insert_post(&new_post).await.map_err(|e| {
            tracing::error!("Failed to create post: {}", e);
            e
        })?;
        post.is_liked = false;

        context.liveness.ensure()?;
        self.inner.likes.reconcile(post.id, false, post.likes_count);
        {
            let mut cache = lock(&self.inner.cache);
            cache.created.push(post.id);
            if cache.posts.iter().all(|p| p.id != post.id) {
                cache.posts.insert(0, post.clone());
            }
        }

        tracing::info!(
            "Post {} created {}",
            post.id,
            if post.is_college_wide { "college-wide" } else { "in department" }
        );
        Ok(post)
    }

    /// Flips the user's like on a cached post. The cache shows the new state
    /// immediately; a failed write puts back the last confirmed state and
    /// returns the error.
    pub async fn toggle_like(&self, post_id: Uuid) -> Result<Post, AppError> {
        let context = self.context();
        context.liveness.ensure()?;
        if self.post(post_id).is_none() {
            return Err(AppError::NotFound("Post not found".to_string()));
        }

        let gateway = context.gateway.as_ref();
        let user_id = context.user.id;
        self.inner
            .likes
            .toggle(post_id, &context.liveness, |liked| {
                gateway.set_post_like(user_id, post_id, liked)
            })
            .await
            .map_err(|e| {
                tracing::error!("Failed to update like on {}: {}", post_id, e);
                e
            })?;

        self.post(post_id)
            .ok_or(AppError::NotFound("Post not found".to_string()))
    }

    /// Snapshot of the cached feed with the displayed like state applied.
    pub fn posts(&self) -> Vec<Post> {
        let posts = lock(&self.inner.cache).posts.clone();
        posts.into_iter().map(|p| self.decorate(p)).collect()
    }

    pub fn post(&self, post_id: Uuid) -> Option<Post> {
        let post = lock(&self.inner.cache)
            .posts
            .iter()
            .find(|p| p.id == post_id)
            .cloned();
        post.map(|p| self.decorate(p))
    }

    pub fn has_more(&self) -> bool {
        !lock(&self.inner.cache).exhausted
    }

    /// Comment counter hook for the comment repository: `None` is a local +1
    /// hint, `Some` is the gateway's value.
    pub(crate) fn record_comment(&self, post_id: Uuid, authoritative: Option<i32>) {
        let mut cache = lock(&self.inner.cache);
        if let Some(post) = cache.posts.iter_mut().find(|p| p.id == post_id) {
            post.comments_count = match authoritative {
                Some(count) => count,
                None => post.comments_count + 1,
            };
        }
    }

    pub(crate) fn clear(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        *lock(&self.inner.cache) = PostCache::default();
        self.inner.likes.clear();
    }

    fn decorate(&self, mut post: Post) -> Post {
        if let Some(view) = self.inner.likes.view(post.id) {
            post.is_liked = view.liked;
            post.likes_count = view.likes_count;
        }
        post
    }

    async fn require_profile(&self) -> Result<Profile, AppError> {
        let context = self.context();
        context
            .gateway
            .find_profile(context.user.id)
            .await?
            .ok_or(AppError::ProfileIncomplete)
    }

    /// One page of visible posts, annotated with a single batched like lookup.
    async fn fetch_page(&self, profile: &Profile, page: FeedPage) -> Result<Vec<Post>, AppError> {
        let context = self.context();

        let mut posts = context
            .gateway
            .visible_posts(profile.college_id, profile.department_id, page)
            .await
            .map_err(|e| {
                tracing::error!("Failed to load posts: {}", e);
                e
            })?;

        let before = posts.len();
        posts.retain(|p| p.is_visible_to(profile));
        if posts.len() != before {
            tracing::warn!("Gateway returned {} post(s) outside the user's audience", before - posts.len());
        }

        let ids: Vec<Uuid> = posts.iter().map(|p| p.id).collect();
        let liked = if ids.is_empty() {
            Default::default()
        } else {
            context.gateway.liked_post_ids(context.user.id, &ids).await?
        };

        for post in &mut posts {
            post.is_liked = liked.contains(&post.id);
        }
        Ok(posts)
    }

    async fn resolve_audience(
        &self,
        profile: &Profile,
        draft: &PostDraft,
    ) -> Result<Audience, AppError> {
        if draft.is_college_wide {
            return Ok(Audience::CollegeWide);
        }

        match draft.department_id {
            None => Ok(Audience::Department(profile.department_id)),
            Some(id) if id == profile.department_id => Ok(Audience::Department(id)),
            Some(id) => {
                let department = self.context().gateway.department(id).await?;
                match department {
                    Some(d) if d.college_id == profile.college_id => Ok(Audience::Department(d.id)),
                    _ => Err(AppError::Validation(
                        "Department does not belong to your college".to_string(),
                    )),
                }
            }
        }
    }
}
