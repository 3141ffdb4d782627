// src/session.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use validator::Validate;

use crate::{
    config::Config,
    error::AppError,
    gateway::Gateway,
    models::{
        college::{College, Department},
        profile::NewProfile,
        user::{AuthSession, AuthUser, Credentials, SignUpRequest},
    },
    repo::{comments::CommentRepository, posts::PostRepository, profile::ProfileRepository},
    storage::ObjectStore,
    upload::ImageUploadService,
};

/// Cleared when a session is torn down. Work that completes afterwards checks
/// it and drops its result instead of touching the disposed caches.
#[derive(Debug, Clone)]
pub struct Liveness(Arc<AtomicBool>);

impl Default for Liveness {
    fn default() -> Self {
        Self::new()
    }
}

impl Liveness {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn end(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn ensure(&self) -> Result<(), AppError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(AppError::Unauthenticated)
        }
    }
}

/// Collaborators shared by the repositories of one session.
pub(crate) struct SessionContext {
    pub(crate) user: AuthUser,
    pub(crate) gateway: Arc<dyn Gateway>,
    pub(crate) uploads: ImageUploadService,
    pub(crate) liveness: Liveness,
    pub(crate) page_size: i64,
}

/// Resolves who is signed in and hands out per-session repositories.
pub struct SessionProvider {
    gateway: Arc<dyn Gateway>,
    uploads: ImageUploadService,
    page_size: i64,
    current: watch::Sender<Option<AuthUser>>,
}

impl SessionProvider {
    pub fn new(gateway: Arc<dyn Gateway>, store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        let (current, _) = watch::channel(None);
        Self {
            gateway,
            uploads: ImageUploadService::new(store),
            page_size: config.feed_page_size,
            current,
        }
    }

    /// Follows the signed-in user; `None` means the UI should go back to the auth screen.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthUser>> {
        self.current.subscribe()
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.current.borrow().clone()
    }

    /// Reference data for the sign-up form.
    pub async fn colleges(&self) -> Result<Vec<College>, AppError> {
        self.gateway.colleges().await
    }

    pub async fn departments(&self, college_id: uuid::Uuid) -> Result<Vec<Department>, AppError> {
        self.gateway.departments(college_id).await
    }

    /// Creates the account and its profile in one go.
    ///
    /// The email must belong to the chosen college's domain and the department
    /// to that college. A failed picture upload only drops the picture. If the
    /// profile row cannot be written the account still exists; the returned
    /// session then has no profile and the caller should run onboarding again.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<Session, AppError> {
        request.validate()?;

        let college = self
            .gateway
            .college(request.college_id)
            .await?
            .ok_or(AppError::Validation("Please select your college".to_string()))?;

        if !college.accepts_email(&request.credentials.email) {
            return Err(AppError::Validation(format!(
                "Please use your {} email address",
                college.name
            )));
        }

        let department = self.gateway.department(request.department_id).await?;
        if department.is_none_or(|d| d.college_id != college.id) {
            return Err(AppError::Validation(
                "Please select a department of your college".to_string(),
            ));
        }

        let auth = self.gateway.sign_up(&request.credentials).await?;
        tracing::info!("Account created for {}", auth.user.id);

        let picture_url = match &request.picture {
            Some(file) => match self.uploads.upload_profile_picture(file, auth.user.id).await {
                Ok(url) => Some(url.to_string()),
                Err(e) => {
                    tracing::warn!("Profile picture upload failed during sign-up: {}", e);
                    None
                }
            },
            None => None,
        };

        let profile = NewProfile {
            display_name: request.display_name.trim().to_string(),
            college_id: college.id,
            department_id: request.department_id,
            picture_url,
        };
        if let Err(e) = self.gateway.insert_profile(auth.user.id, &profile).await {
            tracing::error!("Account created but profile setup failed: {}", e);
        }

        Ok(self.open(auth).await)
    }

    pub async fn sign_in(&self, credentials: Credentials) -> Result<Session, AppError> {
        credentials.validate()?;
        let auth = self.gateway.sign_in(&credentials).await?;
        Ok(self.open(auth).await)
    }

    /// Re-establishes a session from a stored access token.
    pub async fn restore(&self, access_token: &str) -> Result<Session, AppError> {
        let user = self.gateway.verify_token(access_token).await?;
        Ok(self
            .open(AuthSession {
                user,
                access_token: access_token.to_string(),
            })
            .await)
    }

    /// Tears the session down. Its repositories stop accepting calls and any
    /// in-flight results are discarded. The published user is only cleared
    /// when it is this session's user; a newer sign-in stays current.
    pub async fn sign_out(&self, session: Session) -> Result<(), AppError> {
        session.close();
        if let Err(e) = self.gateway.sign_out(&session.access_token).await {
            tracing::warn!("Gateway sign-out failed: {}", e);
        }
        let user_id = session.user().id;
        let cleared = self.current.send_if_modified(|current| {
            if current.as_ref().is_some_and(|user| user.id == user_id) {
                *current = None;
                true
            } else {
                false
            }
        });
        if !cleared {
            tracing::debug!("Sign-out of {} left the current user in place", user_id);
        }
        tracing::info!("Signed out {}", user_id);
        Ok(())
    }

    async fn open(&self, auth: AuthSession) -> Session {
        let context = Arc::new(SessionContext {
            user: auth.user.clone(),
            gateway: self.gateway.clone(),
            uploads: self.uploads.clone(),
            liveness: Liveness::new(),
            page_size: self.page_size,
        });
        let session = Session::new(context, auth.access_token);

        if let Err(e) = session.profile().load_profile().await {
            tracing::warn!("Could not load profile at sign-in: {}", e);
        }

        self.current.send_replace(Some(auth.user));
        session
    }
}

/// One signed-in user's repositories. Constructed at sign-in, torn down by
/// `SessionProvider::sign_out`.
pub struct Session {
    context: Arc<SessionContext>,
    access_token: String,
    posts: PostRepository,
    comments: CommentRepository,
    profile: ProfileRepository,
}

impl Session {
    pub(crate) fn new(context: Arc<SessionContext>, access_token: String) -> Self {
        let posts = PostRepository::new(context.clone());
        let comments = CommentRepository::new(context.clone(), posts.clone());
        let profile = ProfileRepository::new(context.clone());
        Self {
            context,
            access_token,
            posts,
            comments,
            profile,
        }
    }

    pub fn user(&self) -> &AuthUser {
        &self.context.user
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn is_active(&self) -> bool {
        self.context.liveness.is_alive()
    }

    pub fn posts(&self) -> &PostRepository {
        &self.posts
    }

    pub fn comments(&self) -> &CommentRepository {
        &self.comments
    }

    pub fn profile(&self) -> &ProfileRepository {
        &self.profile
    }

    fn close(&self) {
        self.context.liveness.end();
        self.posts.clear();
        self.comments.clear();
        self.profile.clear();
    }
}
