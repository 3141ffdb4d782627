// tests/session_tests.rs

mod common;

use common::{PASSWORD, spawn_app};
use lastbench::{
    AppError,
    gateway::memory::Operation,
    models::{image::ImageFile, post::PostDraft, user::Credentials},
};

#[tokio::test]
async fn test_sign_up_creates_profile_and_publishes_user() {
    // Arrange
    let app = spawn_app();
    let mut watcher = app.provider.subscribe();
    assert!(watcher.borrow().is_none());

    // Act
    let session = app.sign_up("alice", "CS").await;

    // Assert
    let profile = session.profile().profile().expect("profile is loaded at sign-in");
    assert_eq!(profile.display_name, "alice anon");
    assert_eq!(profile.college_id, app.college.id);
    assert_eq!(profile.department_id, app.department("CS"));
    assert!(watcher.has_changed().unwrap());
    assert_eq!(
        watcher.borrow_and_update().as_ref().map(|u| u.id),
        Some(session.user().id)
    );
    assert_eq!(app.provider.current_user(), Some(session.user().clone()));
}

#[tokio::test]
async fn test_sign_up_requires_college_email() {
    let app = spawn_app();
    let mut request = app.sign_up_request("alice", "CS");
    request.credentials.email = "alice@gmail.com".to_string();

    let result = app.provider.sign_up(request).await;

    match result {
        Err(AppError::Validation(msg)) => assert!(msg.contains("Lastbench Institute")),
        other => panic!("expected validation error, got {:?}", other.map(|s| s.user().clone())),
    }
    assert_eq!(app.gateway.calls(Operation::SignUp), 0);
}

#[tokio::test]
async fn test_sign_up_rejects_department_of_another_college() {
    let app = spawn_app();
    let (_, foreign) = app.gateway.seed_college("Other", "other.edu", &["CS"]);
    let mut request = app.sign_up_request("alice", "CS");
    request.department_id = foreign[0].id;

    let result = app.provider.sign_up(request).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(app.gateway.calls(Operation::SignUp), 0);
}

#[tokio::test]
async fn test_sign_up_survives_picture_upload_failure() {
    let app = spawn_app();
    app.store.fail_after(0);
    let mut request = app.sign_up_request("alice", "CS");
    request.picture = Some(ImageFile::new("me.png", b"me".to_vec()));

    let session = app.provider.sign_up(request).await.unwrap();

    let profile = session.profile().profile().unwrap();
    assert_eq!(profile.picture_url, None);
    assert!(app.store.keys().is_empty());
}

#[tokio::test]
async fn test_sign_up_stores_picture() {
    let app = spawn_app();
    let mut request = app.sign_up_request("alice", "CS");
    request.picture = Some(ImageFile::new("me.PNG", b"me".to_vec()));

    let session = app.provider.sign_up(request).await.unwrap();

    let owner = session.user().id;
    let url = session.profile().profile().unwrap().picture_url.unwrap();
    assert!(url.contains(&format!("{owner}/profile-")));
    assert!(url.ends_with(".png"));
    assert_eq!(app.stored_bytes(&url).unwrap(), b"me");
}

#[tokio::test]
async fn test_duplicate_email_is_a_conflict() {
    let app = spawn_app();
    let request = app.sign_up_request("alice", "CS");
    app.provider.sign_up(request.clone()).await.unwrap();

    let result = app.provider.sign_up(request).await;
    assert!(matches!(result, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn test_sign_in_and_sign_out() {
    // Arrange
    let app = spawn_app();
    let request = app.sign_up_request("alice", "CS");
    let email = request.credentials.email.clone();
    let first = app.provider.sign_up(request).await.unwrap();
    let user_id = first.user().id;
    app.provider.sign_out(first).await.unwrap();
    assert!(app.provider.current_user().is_none());

    // Act
    let wrong = app
        .provider
        .sign_in(Credentials {
            email: email.clone(),
            password: "not-the-password".to_string(),
        })
        .await;
    let session = app
        .provider
        .sign_in(Credentials {
            email: email.to_uppercase(),
            password: PASSWORD.to_string(),
        })
        .await
        .unwrap();

    // Assert
    assert!(matches!(wrong, Err(AppError::Auth(_))));
    assert_eq!(session.user().id, user_id);
    assert!(session.profile().profile().is_some());
}

#[tokio::test]
async fn test_signing_out_an_older_session_keeps_the_newer_user() {
    // Arrange
    let app = spawn_app();
    let older = app.sign_up("alice", "CS").await;
    let newer = app.sign_up("bob", "EE").await;
    let watcher = app.provider.subscribe();
    assert_eq!(app.provider.current_user().map(|u| u.id), Some(newer.user().id));

    // Act
    app.provider.sign_out(older).await.unwrap();

    // Assert
    assert_eq!(app.provider.current_user().map(|u| u.id), Some(newer.user().id));
    assert!(!watcher.has_changed().unwrap());
    assert!(newer.posts().load_posts().await.is_ok());

    app.provider.sign_out(newer).await.unwrap();
    assert!(app.provider.current_user().is_none());
    assert!(watcher.has_changed().unwrap());
}

#[tokio::test]
async fn test_restore_from_token() {
    let app = spawn_app();
    let session = app.sign_up("alice", "CS").await;
    let token = session.access_token().to_string();
    let user_id = session.user().id;

    let restored = app.provider.restore(&token).await.unwrap();
    assert_eq!(restored.user().id, user_id);

    app.provider.sign_out(session).await.unwrap();
    assert!(matches!(app.provider.restore(&token).await, Err(AppError::Auth(_))));
    assert!(matches!(
        app.provider.restore("garbage").await,
        Err(AppError::Auth(_))
    ));
}

#[tokio::test]
async fn test_repositories_stop_after_sign_out() {
    let app = spawn_app();
    let session = app.sign_up("alice", "CS").await;
    let post = session.posts().create_post(PostDraft::new("bye")).await.unwrap();
    let posts = session.posts().clone();
    let comments = session.comments().clone();

    app.provider.sign_out(session).await.unwrap();

    assert!(posts.posts().is_empty());
    assert_eq!(posts.load_posts().await, Err(AppError::Unauthenticated));
    assert_eq!(
        comments.create_comment(post.id, "too late").await,
        Err(AppError::Unauthenticated)
    );
}

#[tokio::test]
async fn test_late_load_is_dropped_after_sign_out() {
    // Arrange
    let app = spawn_app();
    let session = app.sign_up("alice", "CS").await;
    session.posts().create_post(PostDraft::new("hello")).await.unwrap();
    let posts = session.posts().clone();
    let active = session.posts().clone();

    // Act: sign out while the load is waiting on the gateway
    let (loaded, signed_out) = tokio::join!(active.load_posts(), app.provider.sign_out(session));

    // Assert
    assert!(signed_out.is_ok());
    assert_eq!(loaded, Err(AppError::Unauthenticated));
    assert!(posts.posts().is_empty());
}
