// tests/profile_tests.rs

mod common;

use common::spawn_app;
use lastbench::{
    AppError,
    gateway::memory::Operation,
    models::{
        image::ImageFile,
        post::PostDraft,
        profile::{NewProfile, ProfileChanges},
    },
};

#[tokio::test]
async fn test_profile_onboarding_flow() {
    // Arrange: the profile row could not be written at sign-up
    let app = spawn_app();
    app.gateway.fail_once(Operation::InsertProfile);
    let session = app.sign_up("alice", "CS").await;
    assert!(session.profile().profile().is_none());

    // 1. Settings cannot patch a profile that does not exist
    let update = session
        .profile()
        .update_profile(ProfileChanges {
            display_name: Some("renamed".to_string()),
            ..ProfileChanges::default()
        })
        .await;
    assert_eq!(update, Err(AppError::ProfileIncomplete));
    assert_eq!(app.gateway.calls(Operation::UpdateProfile), 0);

    // 2. Department must belong to the college
    let mismatched = session
        .profile()
        .create_profile(NewProfile {
            display_name: "alice".to_string(),
            college_id: app.college.id,
            department_id: uuid::Uuid::new_v4(),
            picture_url: None,
        })
        .await;
    assert!(matches!(mismatched, Err(AppError::Validation(_))));

    // 3. Onboarding succeeds once
    let new_profile = NewProfile {
        display_name: "  alice  ".to_string(),
        college_id: app.college.id,
        department_id: app.department("EE"),
        picture_url: None,
    };
    let created = session.profile().create_profile(new_profile.clone()).await.unwrap();
    assert_eq!(created.display_name, "alice");
    assert_eq!(session.profile().profile(), Some(created.clone()));

    // 4. A second attempt is a conflict and writes nothing
    let inserts = app.gateway.calls(Operation::InsertProfile);
    let again = session.profile().create_profile(new_profile).await;
    assert!(matches!(again, Err(AppError::Conflict(_))));
    assert_eq!(app.gateway.calls(Operation::InsertProfile), inserts);

    // 5. The feed now works
    assert!(session.posts().load_posts().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_profile_changes_department() {
    let app = spawn_app();
    let session = app.sign_up("alice", "CS").await;
    let ee_post = app
        .sign_up("bob", "EE")
        .await
        .posts()
        .create_post(PostDraft::new("ee news"))
        .await
        .unwrap();
    assert!(session.posts().load_posts().await.unwrap().is_empty());

    let updated = session
        .profile()
        .update_profile(ProfileChanges {
            display_name: Some("  moved  ".to_string()),
            department_id: Some(app.department("EE")),
            ..ProfileChanges::default()
        })
        .await
        .unwrap();

    assert_eq!(updated.display_name, "moved");
    assert_eq!(updated.department_id, app.department("EE"));
    assert_eq!(app.gateway.stored_profile(session.user().id), Some(updated));
    let feed = session.posts().load_posts().await.unwrap();
    assert_eq!(feed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![ee_post.id]);
}

#[tokio::test]
async fn test_changing_college_requires_matching_department() {
    let app = spawn_app();
    let session = app.sign_up("alice", "CS").await;
    let (other, other_depts) = app.gateway.seed_college("Other", "other.edu", &["Law"]);

    let stale = session
        .profile()
        .update_profile(ProfileChanges {
            college_id: Some(other.id),
            ..ProfileChanges::default()
        })
        .await;
    assert!(matches!(stale, Err(AppError::Validation(_))));
    assert_eq!(app.gateway.calls(Operation::UpdateProfile), 0);

    let moved = session
        .profile()
        .update_profile(ProfileChanges {
            college_id: Some(other.id),
            department_id: Some(other_depts[0].id),
            ..ProfileChanges::default()
        })
        .await
        .unwrap();
    assert_eq!(moved.college_id, other.id);

    let departments = session.profile().departments(other.id).await.unwrap();
    assert_eq!(departments, other_depts);
    let colleges = session.profile().colleges().await.unwrap();
    assert_eq!(
        colleges.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        vec!["Lastbench Institute", "Other"]
    );
}

#[tokio::test]
async fn test_profile_picture_update() {
    // Arrange
    let app = spawn_app();
    let mut request = app.sign_up_request("alice", "CS");
    request.picture = Some(ImageFile::new("old.jpg", b"old".to_vec()));
    let session = app.provider.sign_up(request).await.unwrap();
    let old_url = session.profile().profile().unwrap().picture_url;
    let old_url_str = old_url.clone().unwrap();
    assert!(old_url_str.ends_with(".jpg"));

    // 1. Upload fails: nothing changes
    app.store.fail_after(0);
    let failed = session
        .profile()
        .update_profile_picture(ImageFile::new("new.png", b"new".to_vec()))
        .await;
    assert!(matches!(failed, Err(AppError::Upload(_))));
    assert_eq!(session.profile().profile().unwrap().picture_url, old_url);
    app.store.heal();

    // 2. Upload works but the row write fails: cached profile keeps the old URL
    app.gateway.fail_once(Operation::UpdateProfile);
    let failed = session
        .profile()
        .update_profile_picture(ImageFile::new("new.png", b"new".to_vec()))
        .await;
    assert!(matches!(failed, Err(AppError::Network(_))));
    assert_eq!(session.profile().profile().unwrap().picture_url, old_url);
    assert_eq!(
        app.gateway.stored_profile(session.user().id).unwrap().picture_url,
        old_url
    );
    // The unconfirmed upload went to its own key; the old picture is intact
    assert_eq!(app.stored_bytes(&old_url_str).unwrap(), b"old");

    // 3. Both succeed
    let updated = session
        .profile()
        .update_profile_picture(ImageFile::new("new.png", b"new".to_vec()))
        .await
        .unwrap();
    let new_url = updated.picture_url.clone().unwrap();
    assert_ne!(new_url, old_url_str);
    assert!(new_url.contains(&format!("{}/profile-", session.user().id)));
    assert_eq!(app.stored_bytes(&new_url).unwrap(), b"new");
    assert_eq!(app.stored_bytes(&old_url_str).unwrap(), b"old");
    assert_eq!(session.profile().profile(), Some(updated));
}

#[tokio::test]
async fn test_picture_requires_profile() {
    let app = spawn_app();
    app.gateway.fail_once(Operation::InsertProfile);
    let session = app.sign_up("alice", "CS").await;

    let result = session
        .profile()
        .update_profile_picture(ImageFile::new("me.png", b"me".to_vec()))
        .await;

    assert_eq!(result, Err(AppError::ProfileIncomplete));
    assert!(app.store.keys().is_empty());
}
