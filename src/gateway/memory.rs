// src/gateway/memory.rs

//! In-process gateway for tests and local tooling.
//!
//! Every call yields to the runtime before touching state, so flows started
//! with `tokio::join!` genuinely interleave on a current-thread runtime.
//! Individual operations can be made to fail to exercise rollback paths.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{Gateway, LikeAck};
use crate::{
    config::Config,
    error::AppError,
    models::{
        college::{College, Department},
        comment::{Comment, NewComment},
        post::{FeedPage, NewPost, Post},
        profile::{NewProfile, Profile, ProfilePatch},
        user::{AuthSession, AuthUser, Credentials, UserRecord},
    },
    utils::{
        hash::{hash_password, verify_password},
        jwt::{sign_jwt, verify_jwt},
    },
};

/// Names every gateway call, for failure injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    SignUp,
    SignIn,
    VerifyToken,
    Colleges,
    Departments,
    FindProfile,
    InsertProfile,
    UpdateProfile,
    VisiblePosts,
    InsertPost,
    LikedPostIds,
    SetPostLike,
    Comments,
    InsertComment,
    IncrementCommentsCount,
    LikedCommentIds,
    SetCommentLike,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Always,
    Once,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    revoked_tokens: HashSet<String>,
    colleges: HashMap<Uuid, College>,
    departments: HashMap<Uuid, Department>,
    profiles: HashMap<Uuid, Profile>,
    posts: HashMap<Uuid, Post>,
    comments: HashMap<Uuid, Comment>,
    post_likes: HashSet<(Uuid, Uuid)>,
    comment_likes: HashSet<(Uuid, Uuid)>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Tables {
    /// Strictly increasing timestamps keep ordering deterministic.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }
}

pub struct MemoryGateway {
    tables: Mutex<Tables>,
    failures: Mutex<HashMap<Operation, Failure>>,
    calls: Mutex<HashMap<Operation, usize>>,
    jwt_secret: String,
    jwt_expiration: u64,
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new(&Config::for_tests())
    }
}

impl MemoryGateway {
    pub fn new(config: &Config) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            jwt_secret: config.jwt_secret.clone(),
            jwt_expiration: config.jwt_expiration,
        }
    }

    /// Makes every subsequent call of `op` fail with `Network`.
    pub fn fail(&self, op: Operation) {
        lock(&self.failures).insert(op, Failure::Always);
    }

    /// Makes only the next call of `op` fail with `Network`.
    pub fn fail_once(&self, op: Operation) {
        lock(&self.failures).insert(op, Failure::Once);
    }

    pub fn heal(&self, op: Operation) {
        lock(&self.failures).remove(&op);
    }

    /// How many times `op` has been called, failed calls included.
    pub fn calls(&self, op: Operation) -> usize {
        lock(&self.calls).get(&op).copied().unwrap_or(0)
    }

    /// Inserts a college with the named departments.
    pub fn seed_college(
        &self,
        name: &str,
        email_domain: &str,
        departments: &[&str],
    ) -> (College, Vec<Department>) {
        let college = College {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email_domain: email_domain.to_string(),
        };
        let departments: Vec<Department> = departments
            .iter()
            .map(|dept| Department {
                id: Uuid::new_v4(),
                name: (*dept).to_string(),
                college_id: college.id,
            })
            .collect();

        let mut tables = lock(&self.tables);
        tables.colleges.insert(college.id, college.clone());
        for dept in &departments {
            tables.departments.insert(dept.id, dept.clone());
        }
        (college, departments)
    }

    /// Stored post rows, newest first.
    pub fn stored_posts(&self) -> Vec<Post> {
        let mut posts: Vec<Post> = lock(&self.tables).posts.values().cloned().collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts
    }

    pub fn stored_post(&self, post_id: Uuid) -> Option<Post> {
        lock(&self.tables).posts.get(&post_id).cloned()
    }

    pub fn stored_comment(&self, comment_id: Uuid) -> Option<Comment> {
        lock(&self.tables).comments.get(&comment_id).cloned()
    }

    pub fn stored_profile(&self, user_id: Uuid) -> Option<Profile> {
        lock(&self.tables).profiles.get(&user_id).cloned()
    }

    pub fn post_like_exists(&self, user_id: Uuid, post_id: Uuid) -> bool {
        lock(&self.tables).post_likes.contains(&(user_id, post_id))
    }

    pub fn comment_like_exists(&self, user_id: Uuid, comment_id: Uuid) -> bool {
        lock(&self.tables).comment_likes.contains(&(user_id, comment_id))
    }

    /// Yields once, counts the call and applies any injected failure.
    async fn enter(&self, op: Operation) -> Result<(), AppError> {
        tokio::task::yield_now().await;

        *lock(&self.calls).entry(op).or_default() += 1;

        let mut failures = lock(&self.failures);
        match failures.get(&op).copied() {
            Some(Failure::Always) => Err(AppError::Network(format!("{op:?} failed"))),
            Some(Failure::Once) => {
                failures.remove(&op);
                Err(AppError::Network(format!("{op:?} failed")))
            }
            None => Ok(()),
        }
    }

    fn session_for(&self, user: AuthUser) -> Result<AuthSession, AppError> {
        let access_token = sign_jwt(user.id, &user.email, &self.jwt_secret, self.jwt_expiration)?;
        Ok(AuthSession { user, access_token })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn with_department_name(tables: &Tables, mut post: Post) -> Post {
    post.department_name = post
        .department_id
        .and_then(|id| tables.departments.get(&id))
        .map(|dept| dept.name.clone());
    post
}

fn set_like(
    likes: &mut HashSet<(Uuid, Uuid)>,
    counter: &mut i32,
    key: (Uuid, Uuid),
    liked: bool,
) -> LikeAck {
    let changed = if liked {
        likes.insert(key)
    } else {
        likes.remove(&key)
    };
    if changed {
        *counter = if liked { *counter + 1 } else { (*counter - 1).max(0) };
    }
    LikeAck {
        liked,
        likes_count: *counter,
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    async fn sign_up(&self, credentials: &Credentials) -> Result<AuthSession, AppError> {
        self.enter(Operation::SignUp).await?;
        let email = credentials.email.trim().to_lowercase();
        let password = hash_password(&credentials.password)?;

        let user = {
            let mut tables = lock(&self.tables);
            if tables.users.values().any(|u| u.email == email) {
                return Err(AppError::Conflict(format!(
                    "An account for '{email}' already exists"
                )));
            }
            let record = UserRecord {
                id: Uuid::new_v4(),
                email,
                password,
                created_at: tables.next_timestamp(),
            };
            tables.users.insert(record.id, record.clone());
            AuthUser::from(record)
        };

        self.session_for(user)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, AppError> {
        self.enter(Operation::SignIn).await?;
        let email = credentials.email.trim().to_lowercase();

        let record = lock(&self.tables)
            .users
            .values()
            .find(|u| u.email == email)
            .cloned()
            .ok_or(AppError::Auth("Invalid email or password".to_string()))?;

        if !verify_password(&credentials.password, &record.password)? {
            return Err(AppError::Auth("Invalid email or password".to_string()));
        }

        self.session_for(record.into())
    }

    async fn verify_token(&self, token: &str) -> Result<AuthUser, AppError> {
        self.enter(Operation::VerifyToken).await?;
        let claims = verify_jwt(token, &self.jwt_secret)?;

        let tables = lock(&self.tables);
        if tables.revoked_tokens.contains(token) {
            return Err(AppError::Auth("Token has been revoked".to_string()));
        }
        tables
            .users
            .get(&claims.sub)
            .cloned()
            .map(AuthUser::from)
            .ok_or(AppError::Auth("User no longer exists".to_string()))
    }

    async fn sign_out(&self, token: &str) -> Result<(), AppError> {
        lock(&self.tables).revoked_tokens.insert(token.to_string());
        Ok(())
    }

    async fn colleges(&self) -> Result<Vec<College>, AppError> {
        self.enter(Operation::Colleges).await?;
        let mut colleges: Vec<College> = lock(&self.tables).colleges.values().cloned().collect();
        colleges.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(colleges)
    }

    async fn college(&self, college_id: Uuid) -> Result<Option<College>, AppError> {
        self.enter(Operation::Colleges).await?;
        Ok(lock(&self.tables).colleges.get(&college_id).cloned())
    }

    async fn departments(&self, college_id: Uuid) -> Result<Vec<Department>, AppError> {
        self.enter(Operation::Departments).await?;
        let mut departments: Vec<Department> = lock(&self.tables)
            .departments
            .values()
            .filter(|d| d.college_id == college_id)
            .cloned()
            .collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn department(&self, department_id: Uuid) -> Result<Option<Department>, AppError> {
        self.enter(Operation::Departments).await?;
        Ok(lock(&self.tables).departments.get(&department_id).cloned())
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        self.enter(Operation::FindProfile).await?;
        Ok(lock(&self.tables).profiles.get(&user_id).cloned())
    }

    async fn insert_profile(
        &self,
        user_id: Uuid,
        profile: &NewProfile,
    ) -> Result<Profile, AppError> {
        self.enter(Operation::InsertProfile).await?;
        let mut tables = lock(&self.tables);

        if tables.profiles.contains_key(&user_id) {
            return Err(AppError::Conflict("Profile already exists".to_string()));
        }
        let belongs = tables
            .departments
            .get(&profile.department_id)
            .is_some_and(|d| d.college_id == profile.college_id);
        if !belongs {
            return Err(AppError::Network(
                "profiles_department_id_college_id_fkey violated".to_string(),
            ));
        }

        let now = tables.next_timestamp();
        let row = Profile {
            id: Uuid::new_v4(),
            user_id,
            display_name: profile.display_name.trim().to_string(),
            college_id: profile.college_id,
            department_id: profile.department_id,
            picture_url: profile.picture_url.clone(),
            created_at: now,
            updated_at: now,
        };
        tables.profiles.insert(user_id, row.clone());
        Ok(row)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        patch: &ProfilePatch,
    ) -> Result<Profile, AppError> {
        self.enter(Operation::UpdateProfile).await?;
        let mut tables = lock(&self.tables);
        let now = tables.next_timestamp();

        let row = tables
            .profiles
            .get_mut(&user_id)
            .ok_or(AppError::NotFound("Profile not found".to_string()))?;
        let mut patch = patch.clone();
        patch.display_name = patch.display_name.map(|name| name.trim().to_string());
        patch.apply_to(row);
        row.updated_at = now;
        Ok(row.clone())
    }

    async fn visible_posts(
        &self,
        college_id: Uuid,
        department_id: Uuid,
        page: FeedPage,
    ) -> Result<Vec<Post>, AppError> {
        self.enter(Operation::VisiblePosts).await?;
        let tables = lock(&self.tables);

        let mut posts: Vec<Post> = tables
            .posts
            .values()
            .filter(|p| p.college_id == college_id)
            .filter(|p| p.is_college_wide || p.department_id == Some(department_id))
            .filter(|p| page.cursor.is_none_or(|cursor| p.created_at < cursor))
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        posts.truncate(usize::try_from(page.effective_limit(20)).unwrap_or(20));

        Ok(posts
            .into_iter()
            .map(|p| with_department_name(&tables, p))
            .collect())
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, AppError> {
        self.enter(Operation::InsertPost).await?;
        let mut tables = lock(&self.tables);

        if let Some(department_id) = post.audience.department_id() {
            let belongs = tables
                .departments
                .get(&department_id)
                .is_some_and(|d| d.college_id == post.college_id);
            if !belongs {
                return Err(AppError::Network(
                    "posts_department_id_college_id_fkey violated".to_string(),
                ));
            }
        }

        let now = tables.next_timestamp();
        let row = Post {
            id: Uuid::new_v4(),
            user_id: post.user_id,
            content: post.content.clone(),
            images: post.images.clone(),
            college_id: post.college_id,
            department_id: post.audience.department_id(),
            is_college_wide: post.audience.is_college_wide(),
            likes_count: 0,
            comments_count: 0,
            created_at: now,
            updated_at: now,
            department_name: None,
            is_liked: false,
        };
        tables.posts.insert(row.id, row.clone());
        Ok(with_department_name(&tables, row))
    }

    async fn liked_post_ids(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, AppError> {
        self.enter(Operation::LikedPostIds).await?;
        let tables = lock(&self.tables);
        Ok(post_ids
            .iter()
            .copied()
            .filter(|id| tables.post_likes.contains(&(user_id, *id)))
            .collect())
    }

    async fn set_post_like(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        liked: bool,
    ) -> Result<LikeAck, AppError> {
        self.enter(Operation::SetPostLike).await?;
        let mut guard = lock(&self.tables);
        let tables = &mut *guard;
        let post = tables
            .posts
            .get_mut(&post_id)
            .ok_or(AppError::NotFound(format!("posts {post_id}")))?;
        Ok(set_like(
            &mut tables.post_likes,
            &mut post.likes_count,
            (user_id, post_id),
            liked,
        ))
    }

    async fn comments(&self, post_id: Uuid) -> Result<Vec<Comment>, AppError> {
        self.enter(Operation::Comments).await?;
        let mut comments: Vec<Comment> = lock(&self.tables)
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(comments)
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment, AppError> {
        self.enter(Operation::InsertComment).await?;
        let mut tables = lock(&self.tables);

        if !tables.posts.contains_key(&comment.post_id) {
            return Err(AppError::NotFound("Post not found".to_string()));
        }

        let now = tables.next_timestamp();
        let row = Comment {
            id: Uuid::new_v4(),
            post_id: comment.post_id,
            user_id: comment.user_id,
            content: comment.content.clone(),
            likes_count: 0,
            created_at: now,
            updated_at: now,
            is_liked: false,
        };
        tables.comments.insert(row.id, row.clone());
        Ok(row)
    }

    async fn increment_comments_count(&self, post_id: Uuid) -> Result<i32, AppError> {
        self.enter(Operation::IncrementCommentsCount).await?;
        let mut tables = lock(&self.tables);
        let post = tables
            .posts
            .get_mut(&post_id)
            .ok_or(AppError::NotFound("Post not found".to_string()))?;
        post.comments_count += 1;
        Ok(post.comments_count)
    }

    async fn liked_comment_ids(
        &self,
        user_id: Uuid,
        comment_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, AppError> {
        self.enter(Operation::LikedCommentIds).await?;
        let tables = lock(&self.tables);
        Ok(comment_ids
            .iter()
            .copied()
            .filter(|id| tables.comment_likes.contains(&(user_id, *id)))
            .collect())
    }

    async fn set_comment_like(
        &self,
        user_id: Uuid,
        comment_id: Uuid,
        liked: bool,
    ) -> Result<LikeAck, AppError> {
        self.enter(Operation::SetCommentLike).await?;
        let mut guard = lock(&self.tables);
        let tables = &mut *guard;
        let comment = tables
            .comments
            .get_mut(&comment_id)
            .ok_or(AppError::NotFound(format!("comments {comment_id}")))?;
        Ok(set_like(
            &mut tables.comment_likes,
            &mut comment.likes_count,
            (user_id, comment_id),
            liked,
        ))
    }
}
