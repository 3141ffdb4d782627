// src/gateway/postgres.rs

use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Gateway, LikeAck};
use crate::{
    config::{Config, SeedConfig},
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

const POST_COLUMNS: &str = r#"
    p.id, p.user_id, p.content, p.images,
    p.college_id, p.department_id, p.is_college_wide,
    p.likes_count, p.comments_count,
    p.created_at, p.updated_at
"#;

/// Where the like rows and the aggregate for one kind of target live.
struct LikeTable {
    likes: &'static str,
    column: &'static str,
    target: &'static str,
}

const POST_LIKES: LikeTable = LikeTable {
    likes: "post_likes",
    column: "post_id",
    target: "posts",
};

const COMMENT_LIKES: LikeTable = LikeTable {
    likes: "comment_likes",
    column: "comment_id",
    target: "comments",
};

/// Gateway backed by Postgres. Plays the hosted backend's role: auth,
/// relational rows and like counters maintained inside one transaction.
#[derive(Clone)]
pub struct PgGateway {
    pool: PgPool,
    jwt_secret: String,
    jwt_expiration: u64,
}

impl PgGateway {
    pub fn new(pool: PgPool, config: &Config) -> Self {
        Self {
            pool,
            jwt_secret: config.jwt_secret.clone(),
            jwt_expiration: config.jwt_expiration,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Upserts one college and its departments. Safe to run repeatedly.
    pub async fn seed(&self, seed: &SeedConfig) -> Result<College, AppError> {
        let mut tx = self.pool.begin().await?;

        let college = sqlx::query_as::<_, College>(
            r#"
            INSERT INTO colleges (id, name, email_domain)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET email_domain = EXCLUDED.email_domain
            RETURNING id, name, email_domain
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&seed.college_name)
        .bind(seed.college_domain.trim().to_ascii_lowercase())
        .fetch_one(&mut *tx)
        .await?;

        for name in &seed.departments {
            sqlx::query(
                r#"
                INSERT INTO departments (id, name, college_id)
                VALUES ($1, $2, $3)
                ON CONFLICT (college_id, name) DO NOTHING
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(name)
            .bind(college.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(college)
    }

    fn session_for(&self, user: AuthUser) -> Result<AuthSession, AppError> {
        let access_token = sign_jwt(user.id, &user.email, &self.jwt_secret, self.jwt_expiration)?;
        Ok(AuthSession { user, access_token })
    }

    async fn liked_ids(
        &self,
        table: &LikeTable,
        user_id: Uuid,
        ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, AppError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let sql = format!(
            "SELECT {column} FROM {likes} WHERE user_id = $1 AND {column} = ANY($2)",
            column = table.column,
            likes = table.likes,
        );

        let rows: Vec<Uuid> = sqlx::query_scalar(&sql)
            .bind(user_id)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to read {}: {:?}", table.likes, e);
                AppError::from(e)
            })?;

        Ok(rows.into_iter().collect())
    }

    async fn set_like(
        &self,
        table: &LikeTable,
        user_id: Uuid,
        target_id: Uuid,
        liked: bool,
    ) -> Result<LikeAck, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Lock the target row so concurrent toggles on it serialize
        let current: Option<i32> = sqlx::query_scalar(&format!(
            "SELECT likes_count FROM {} WHERE id = $1 FOR UPDATE",
            table.target
        ))
        .bind(target_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Err(AppError::NotFound(format!("{} {target_id}", table.target)));
        };

        // 2. Make the like row match the requested state
        let changed = if liked {
            sqlx::query(&format!(
                "INSERT INTO {} (user_id, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
                table.likes, table.column
            ))
            .bind(user_id)
            .bind(target_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        } else {
            sqlx::query(&format!(
                "DELETE FROM {} WHERE user_id = $1 AND {} = $2",
                table.likes, table.column
            ))
            .bind(user_id)
            .bind(target_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
        };

        // 3. Keep the aggregate in step, only when the row actually changed
        let likes_count = if changed == 0 {
            current
        } else {
            let delta = if liked {
                "likes_count + 1"
            } else {
                "GREATEST(0, likes_count - 1)"
            };
            sqlx::query_scalar(&format!(
                "UPDATE {} SET likes_count = {delta} WHERE id = $1 RETURNING likes_count",
                table.target
            ))
            .bind(target_id)
            .fetch_one(&mut *tx)
            .await?
        };

        tx.commit().await.map_err(|e| {
            tracing::error!("Failed to commit {} write: {:?}", table.likes, e);
            AppError::from(e)
        })?;

        Ok(LikeAck { liked, likes_count })
    }
}

#[async_trait]
impl Gateway for PgGateway {
    async fn sign_up(&self, credentials: &Credentials) -> Result<AuthSession, AppError> {
        let email = credentials.email.trim().to_lowercase();
        let hashed_password = hash_password(&credentials.password)?;

        let user = sqlx::query_as::<_, AuthUser>(
            r#"
            INSERT INTO users (id, email, password)
            VALUES ($1, $2, $3)
            RETURNING id, email, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict(format!("An account for '{email}' already exists"))
            }
            other => {
                tracing::error!("Failed to register user: {}", other);
                other
            }
        })?;

        self.session_for(user)
    }

    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, AppError> {
        let user = sqlx::query_as::<_, UserRecord>(
            "SELECT id, email, password, created_at FROM users WHERE email = $1",
        )
        .bind(credentials.email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Sign-in DB error: {:?}", e);
            AppError::from(e)
        })?
        .ok_or(AppError::Auth("Invalid email or password".to_string()))?;

        if !verify_password(&credentials.password, &user.password)? {
            return Err(AppError::Auth("Invalid email or password".to_string()));
        }

        self.session_for(user.into())
    }

    async fn verify_token(&self, token: &str) -> Result<AuthUser, AppError> {
        let claims = verify_jwt(token, &self.jwt_secret)?;

        sqlx::query_as::<_, AuthUser>("SELECT id, email, created_at FROM users WHERE id = $1")
            .bind(claims.sub)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AppError::Auth("User no longer exists".to_string()))
    }

    async fn colleges(&self) -> Result<Vec<College>, AppError> {
        let colleges = sqlx::query_as::<_, College>(
            "SELECT id, name, email_domain FROM colleges ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(colleges)
    }

    async fn college(&self, college_id: Uuid) -> Result<Option<College>, AppError> {
        let college = sqlx::query_as::<_, College>(
            "SELECT id, name, email_domain FROM colleges WHERE id = $1",
        )
        .bind(college_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(college)
    }

    async fn departments(&self, college_id: Uuid) -> Result<Vec<Department>, AppError> {
        let departments = sqlx::query_as::<_, Department>(
            "SELECT id, name, college_id FROM departments WHERE college_id = $1 ORDER BY name",
        )
        .bind(college_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(departments)
    }

    async fn department(&self, department_id: Uuid) -> Result<Option<Department>, AppError> {
        let department = sqlx::query_as::<_, Department>(
            "SELECT id, name, college_id FROM departments WHERE id = $1",
        )
        .bind(department_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(department)
    }

    async fn find_profile(&self, user_id: Uuid) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, user_id, display_name, college_id, department_id,
                   picture_url, created_at, updated_at
            FROM profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }

    async fn insert_profile(
        &self,
        user_id: Uuid,
        profile: &NewProfile,
    ) -> Result<Profile, AppError> {
        sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (id, user_id, display_name, college_id, department_id, picture_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, display_name, college_id, department_id,
                      picture_url, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(profile.display_name.trim())
        .bind(profile.college_id)
        .bind(profile.department_id)
        .bind(&profile.picture_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::Conflict("Profile already exists".to_string()),
            other => {
                tracing::error!("Failed to create profile: {}", other);
                other
            }
        })
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        patch: &ProfilePatch,
    ) -> Result<Profile, AppError> {
        sqlx::query_as::<_, Profile>(
            r#"
            UPDATE profiles SET
                display_name  = COALESCE($2, display_name),
                college_id    = COALESCE($3, college_id),
                department_id = COALESCE($4, department_id),
                picture_url   = COALESCE($5, picture_url),
                updated_at    = NOW()
            WHERE user_id = $1
            RETURNING id, user_id, display_name, college_id, department_id,
                      picture_url, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(patch.display_name.as_deref().map(str::trim))
        .bind(patch.college_id)
        .bind(patch.department_id)
        .bind(&patch.picture_url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to update profile: {:?}", e);
            AppError::from(e)
        })?
        .ok_or(AppError::NotFound("Profile not found".to_string()))
    }

    async fn visible_posts(
        &self,
        college_id: Uuid,
        department_id: Uuid,
        page: FeedPage,
    ) -> Result<Vec<Post>, AppError> {
        let sql = format!(
            r#"
            SELECT {POST_COLUMNS}, d.name AS department_name
            FROM posts p
            LEFT JOIN departments d ON d.id = p.department_id
            WHERE p.college_id = $1
              AND (p.is_college_wide OR p.department_id = $2)
              AND ($3::TIMESTAMPTZ IS NULL OR p.created_at < $3)
            ORDER BY p.created_at DESC
            LIMIT $4
            "#
        );

        sqlx::query_as::<_, Post>(&sql)
            .bind(college_id)
            .bind(department_id)
            .bind(page.cursor)
            .bind(page.effective_limit(20))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to list posts: {:?}", e);
                AppError::from(e)
            })
    }

    async fn insert_post(&self, post: &NewPost) -> Result<Post, AppError> {
        let sql = format!(
            r#"
            WITH p AS (
                INSERT INTO posts (id, user_id, content, images, college_id, department_id, is_college_wide)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
            )
            SELECT {POST_COLUMNS}, d.name AS department_name
            FROM p
            LEFT JOIN departments d ON d.id = p.department_id
            "#
        );

        sqlx::query_as::<_, Post>(&sql)
            .bind(Uuid::new_v4())
            .bind(post.user_id)
            .bind(&post.content)
            .bind(&post.images)
            .bind(post.college_id)
            .bind(post.audience.department_id())
            .bind(post.audience.is_college_wide())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to create post: {:?}", e);
                AppError::from(e)
            })
    }

    async fn liked_post_ids(
        &self,
        user_id: Uuid,
        post_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, AppError> {
        self.liked_ids(&POST_LIKES, user_id, post_ids).await
    }

    async fn set_post_like(
        &self,
        user_id: Uuid,
        post_id: Uuid,
        liked: bool,
    ) -> Result<LikeAck, AppError> {
        self.set_like(&POST_LIKES, user_id, post_id, liked).await
    }

    async fn comments(&self, post_id: Uuid) -> Result<Vec<Comment>, AppError> {
        let comments = sqlx::query_as::<_, Comment>(
            r#"
            SELECT id, post_id, user_id, content, likes_count, created_at, updated_at
            FROM comments
            WHERE post_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(comments)
    }

    async fn insert_comment(&self, comment: &NewComment) -> Result<Comment, AppError> {
        sqlx::query_as::<_, Comment>(
            r#"
            INSERT INTO comments (id, post_id, user_id, content)
            VALUES ($1, $2, $3, $4)
            RETURNING id, post_id, user_id, content, likes_count, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(comment.post_id)
        .bind(comment.user_id)
        .bind(&comment.content)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create comment: {:?}", e);
            AppError::from(e)
        })
    }

    async fn increment_comments_count(&self, post_id: Uuid) -> Result<i32, AppError> {
        sqlx::query_scalar(
            "UPDATE posts SET comments_count = comments_count + 1 WHERE id = $1 RETURNING comments_count",
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Post not found".to_string()))
    }

    async fn liked_comment_ids(
        &self,
        user_id: Uuid,
        comment_ids: &[Uuid],
    ) -> Result<HashSet<Uuid>, AppError> {
        self.liked_ids(&COMMENT_LIKES, user_id, comment_ids).await
    }

    async fn set_comment_like(
        &self,
        user_id: Uuid,
        comment_id: Uuid,
        liked: bool,
    ) -> Result<LikeAck, AppError> {
        self.set_like(&COMMENT_LIKES, user_id, comment_id, liked).await
    }
}
