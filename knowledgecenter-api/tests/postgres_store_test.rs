//! Identity store against a real database. Run with a `DATABASE_URL` and
//! `cargo test -- --ignored`.

use chrono::{Duration, Utc};
use knowledgecenter_api::{
    config::DatabaseConfig,
    db,
    models::{LocalizedText, NewRefreshToken, NewUser},
    services::{IdentityStore, PgIdentityStore, StoreError},
    utils::random::{generate_refresh_secret, generate_token_id, hash_token},
};
use sqlx::PgPool;

async fn store() -> (PgIdentityStore, PgPool) {
    let config = DatabaseConfig {
        url: std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/knowledgecenter_test".to_string()),
        max_connections: 2,
        min_connections: 1,
    };
    let pool = db::create_pool(&config).await.unwrap();
    db::run_migrations(&pool).await.unwrap();
    (PgIdentityStore::new(pool.clone()), pool)
}

fn new_user(tag: &str) -> NewUser {
    NewUser {
        login_id: format!("login-{}", tag),
        email: format!("{}@x.io", tag),
        name: LocalizedText::from([("en-US".to_string(), tag.to_string())]),
        password_hash: String::new(),
    }
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn user_lifecycle_and_uniqueness() {
    let (store, _pool) = store().await;
    let tag = generate_token_id().unwrap();

    let user = store.create_user(new_user(&tag)).await.unwrap();
    let by_login = store
        .lookup_user_by_login(&user.login_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_login.public_id, user.public_id);
    assert!(store
        .lookup_user_by_public_id(user.public_id)
        .await
        .unwrap()
        .is_some());

    let mut same_email = new_user(&tag);
    same_email.login_id = format!("other-{}", tag);
    match store.create_user(same_email).await {
        Err(StoreError::Conflict(constraint)) => assert!(constraint.contains("email")),
        other => panic!("expected conflict, got {:?}", other.map(|u| u.id)),
    }
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn token_rotation_columns() {
    let (store, _pool) = store().await;
    let tag = generate_token_id().unwrap();
    let user = store.create_user(new_user(&tag)).await.unwrap();

    let secret = generate_refresh_secret().unwrap();
    let first = store
        .create_token(NewRefreshToken {
            user_id: user.id,
            token_hash: hash_token(&secret),
            expires_at: Utc::now() + Duration::days(7),
            parent_token_id: None,
            client_ip: Some("203.0.113.1".to_string()),
            user_agent: None,
        })
        .await
        .unwrap();
    let found = store
        .lookup_token_by_hash(&hash_token(&secret))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, first.id);

    let second = store
        .create_token(NewRefreshToken {
            user_id: user.id,
            token_hash: hash_token(&generate_refresh_secret().unwrap()),
            expires_at: Utc::now() + Duration::days(7),
            parent_token_id: Some(first.id),
            client_ip: None,
            user_agent: None,
        })
        .await
        .unwrap();
    store.mark_token_replaced(first.id, second.id).await.unwrap();

    let first = store
        .lookup_token_by_hash(&first.token_hash)
        .await
        .unwrap()
        .unwrap();
    assert!(first.is_revoked);
    assert_eq!(first.replaced_by, Some(second.id));

    assert_eq!(store.revoke_all_user_tokens(user.id).await.unwrap(), 1);
    store.revoke_token(i64::MAX).await.unwrap();
}

#[tokio::test]
#[ignore] // Requires running PostgreSQL
async fn effective_roles_union_user_and_group_roles() {
    let (store, pool) = store().await;
    let tag = generate_token_id().unwrap();
    let user = store.create_user(new_user(&tag)).await.unwrap();
    let public = store
        .get_group_by_public_id("public")
        .await
        .unwrap()
        .expect("seeded public group");
    store.add_user_to_group(user.id, public.id, None).await.unwrap();

    let direct = format!("direct-{}", tag);
    let via_group = format!("group-{}", tag);
    for role in [&direct, &via_group] {
        sqlx::query("INSERT INTO roles (name) VALUES ($1)")
            .bind(role)
            .execute(&pool)
            .await
            .unwrap();
    }
    sqlx::query("INSERT INTO user_roles (user_id, role_id) SELECT $1, id FROM roles WHERE name = ANY($2)")
        .bind(user.id)
        .bind(vec![direct.clone(), via_group.clone()])
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO group_roles (group_id, role_id) SELECT $1, id FROM roles WHERE name = $2")
        .bind(public.id)
        .bind(&via_group)
        .execute(&pool)
        .await
        .unwrap();

    let roles = store.get_effective_roles(user.id).await.unwrap();
    assert!(roles.contains(&direct));
    assert_eq!(roles.iter().filter(|r| **r == via_group).count(), 1);

    let mut sorted = roles.clone();
    sorted.sort();
    assert_eq!(roles, sorted);

    // Group roles leak to every public member; clean up.
    sqlx::query("DELETE FROM group_roles WHERE group_id = $1 AND role_id IN (SELECT id FROM roles WHERE name = $2)")
        .bind(public.id)
        .bind(&via_group)
        .execute(&pool)
        .await
        .unwrap();
}
