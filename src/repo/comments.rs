// src/repo/comments.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;
use validator::Validate;

use super::{lock, posts::PostRepository};
use crate::{
    error::AppError,
    likes::LikeBook,
    models::comment::{Comment, CommentDraft, NewComment},
    session::SessionContext,
};

#[derive(Default)]
struct Thread {
    /// Oldest first.
    comments: Vec<Comment>,
    /// Bumped by every load of this thread.
    epoch: u64,
    /// Comments posted here since the last load started.
    created: Vec<Uuid>,
}

struct Inner {
    context: Arc<SessionContext>,
    threads: Mutex<HashMap<Uuid, Thread>>,
    likes: LikeBook,
}

/// Comment threads, cached per post.
#[derive(Clone)]
pub struct CommentRepository {
    inner: Arc<Inner>,
    posts: PostRepository,
}

impl CommentRepository {
    pub(crate) fn new(context: Arc<SessionContext>, posts: PostRepository) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                threads: Mutex::new(HashMap::new()),
                likes: LikeBook::default(),
            }),
            posts,
        }
    }

    /// Fetches the comments of a post, oldest first, and replaces the cached
    /// thread. Comments posted while the fetch was in flight are kept at the end.
    pub async fn load_comments(&self, post_id: Uuid) -> Result<Vec<Comment>, AppError> {
        let context = &self.inner.context;
        context.liveness.ensure()?;

        let epoch = {
            let mut threads = lock(&self.inner.threads);
            let thread = threads.entry(post_id).or_default();
            thread.epoch += 1;
            thread.created.clear();
            thread.epoch
        };

        let mut comments = context.gateway.comments(post_id).await.map_err(|e| {
            tracing::error!("Failed to load comments of {}: {}", post_id, e);
            e
        })?;

        let ids: Vec<Uuid> = comments.iter().map(|c| c.id).collect();
        let liked = if ids.is_empty() {
            Default::default()
        } else {
            context.gateway.liked_comment_ids(context.user.id, &ids).await?
        };
        for comment in &mut comments {
            comment.is_liked = liked.contains(&comment.id);
        }

        context.liveness.ensure()?;
        {
            let mut threads = lock(&self.inner.threads);
            let thread = threads.entry(post_id).or_default();
            if thread.epoch != epoch {
                tracing::debug!("Discarding stale comment load for {}", post_id);
                drop(threads);
                return Ok(self.comments(post_id));
            }
            let late: Vec<Comment> = thread
                .comments
                .iter()
                .filter(|c| thread.created.contains(&c.id) && comments.iter().all(|f| f.id != c.id))
                .cloned()
                .collect();
            let mut merged = comments.clone();
            merged.extend(late);
            thread.comments = merged;
        }
        for comment in &comments {
            self.inner.likes.reconcile(comment.id, comment.is_liked, comment.likes_count);
        }

        Ok(self.comments(post_id))
    }

    /// Posts a comment.
    ///
    /// Once the row is written the comment is kept even if bumping the post's
    /// counter fails; the feed shows a local +1 until the next reload.
    pub async fn create_comment(
        &self,
        post_id: Uuid,
        content: impl Into<String>,
    ) -> Result<Comment, AppError> {
        let context = &self.inner.context;
        context.liveness.ensure()?;

        let draft = CommentDraft { content: content.into() };
        draft.validate()?;

        let new_comment = NewComment {
            post_id,
            user_id: context.user.id,
            content: draft.content.trim().to_string(),
        };
        let mut comment = context.gateway.insert_comment(&new_comment).await.map_err(|e| {
            tracing::error!("Failed to create comment on {}: {}", post_id, e);
            e
        })?;
        comment.is_liked = false;

        context.liveness.ensure()?;
        {
            let mut threads = lock(&self.inner.threads);
            let thread = threads.entry(post_id).or_default();
            thread.created.push(comment.id);
            if thread.comments.iter().all(|c| c.id != comment.id) {
                thread.comments.push(comment.clone());
            }
        }
        self.inner.likes.reconcile(comment.id, false, comment.likes_count);
        self.posts.record_comment(post_id, None);

        match context.gateway.increment_comments_count(post_id).await {
            Ok(count) if context.liveness.is_alive() => {
                self.posts.record_comment(post_id, Some(count));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Comment {} saved but counter update failed: {}", comment.id, e);
            }
        }

        Ok(comment)
    }

    pub async fn toggle_comment_like(
        &self,
        post_id: Uuid,
        comment_id: Uuid,
    ) -> Result<Comment, AppError> {
        let context = &self.inner.context;
        context.liveness.ensure()?;
        if self.comment(post_id, comment_id).is_none() {
            return Err(AppError::NotFound("Comment not found".to_string()));
        }

        let gateway = context.gateway.as_ref();
        let user_id = context.user.id;
        self.inner
            .likes
            .toggle(comment_id, &context.liveness, |liked| {
                gateway.set_comment_like(user_id, comment_id, liked)
            })
            .await
            .map_err(|e| {
                tracing::error!("Failed to update like on comment {}: {}", comment_id, e);
                e
            })?;

        self.comment(post_id, comment_id)
            .ok_or(AppError::NotFound("Comment not found".to_string()))
    }

    /// Cached thread of a post, oldest first. Empty until loaded.
    pub fn comments(&self, post_id: Uuid) -> Vec<Comment> {
        let comments = lock(&self.inner.threads)
            .get(&post_id)
            .map(|t| t.comments.clone())
            .unwrap_or_default();
        comments.into_iter().map(|c| self.decorate(c)).collect()
    }

    fn comment(&self, post_id: Uuid, comment_id: Uuid) -> Option<Comment> {
        let comment = lock(&self.inner.threads)
            .get(&post_id)
            .and_then(|t| t.comments.iter().find(|c| c.id == comment_id).cloned());
        comment.map(|c| self.decorate(c))
    }

    fn decorate(&self, mut comment: Comment) -> Comment {
        if let Some(view) = self.inner.likes.view(comment.id) {
            comment.is_liked = view.liked;
            comment.likes_count = view.likes_count;
        }
        comment
    }

    pub(crate) fn clear(&self) {
        lock(&self.inner.threads).clear();
        self.inner.likes.clear();
    }
}
