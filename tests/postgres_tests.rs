// tests/postgres_tests.rs

use std::sync::Arc;

use lastbench::{
    SessionProvider,
    config::{Config, SeedConfig},
    gateway::{Gateway, postgres::PgGateway},
    models::{
        post::PostDraft,
        user::{Credentials, SignUpRequest},
    },
    storage::{MemoryObjectStore, ObjectStore},
};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn spawn_gateway() -> PgGateway {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    let gateway = PgGateway::new(pool, &Config::for_tests());
    gateway.migrate().await.expect("Failed to migrate database");
    gateway
}

#[tokio::test]
#[ignore = "requires a running Postgres (DATABASE_URL)"]
async fn test_postgres_feed_and_likes() {
    // Arrange
    let gateway = spawn_gateway().await;
    let tag = &Uuid::new_v4().to_string()[..8];
    let domain = format!("pg{tag}.edu");
    let college = gateway
        .seed(&SeedConfig {
            college_name: format!("PG College {tag}"),
            college_domain: domain.clone(),
            departments: vec!["CS".to_string(), "EE".to_string()],
        })
        .await
        .unwrap();
    let departments = gateway.departments(college.id).await.unwrap();
    let cs = departments.iter().find(|d| d.name == "CS").unwrap().id;
    let ee = departments.iter().find(|d| d.name == "EE").unwrap().id;

    let provider = SessionProvider::new(
        Arc::new(gateway.clone()) as Arc<dyn Gateway>,
        Arc::new(MemoryObjectStore::default()) as Arc<dyn ObjectStore>,
        &Config::for_tests(),
    );
    let sign_up = |name: &str, department_id: Uuid| SignUpRequest {
        credentials: Credentials {
            email: format!("{name}@{domain}"),
            password: "password123".to_string(),
        },
        display_name: name.to_string(),
        college_id: college.id,
        department_id,
        picture: None,
    };
    let alice = provider.sign_up(sign_up("alice", cs)).await.unwrap();
    let bob = provider.sign_up(sign_up("bob", ee)).await.unwrap();

    // Act
    let mine = alice.posts().create_post(PostDraft::new("cs only")).await.unwrap();
    let wide = bob
        .posts()
        .create_post(PostDraft::new("everyone").college_wide())
        .await
        .unwrap();
    bob.posts().create_post(PostDraft::new("ee only")).await.unwrap();

    let feed = alice.posts().load_posts().await.unwrap();
    let liked = alice.posts().toggle_like(wide.id).await.unwrap();
    let unliked = alice.posts().toggle_like(wide.id).await.unwrap();

    alice.comments().create_comment(mine.id, "first").await.unwrap();
    alice.comments().create_comment(mine.id, "second").await.unwrap();
    let comments = alice.comments().load_comments(mine.id).await.unwrap();

    // Assert
    assert_eq!(feed.iter().map(|p| p.id).collect::<Vec<_>>(), vec![wide.id, mine.id]);
    assert_eq!(feed[1].department_name.as_deref(), Some("CS"));
    assert!(liked.is_liked);
    assert_eq!(liked.likes_count, 1);
    assert!(!unliked.is_liked);
    assert_eq!(unliked.likes_count, 0);
    assert_eq!(
        comments.iter().map(|c| c.content.as_str()).collect::<Vec<_>>(),
        vec!["first", "second"]
    );
    assert_eq!(alice.posts().post(mine.id).unwrap().comments_count, 2);
}
