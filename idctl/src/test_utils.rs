//! Test utilities for integration testing.

use crate::api::models::users::CurrentUser;
use crate::auth::password::{Argon2Params, hash_string_with_params};
use crate::auth::tokens::{TokenKind, create_token};
use crate::db::handlers::{Groups, Permissions, Repository, Users};
use crate::db::models::{groups::GroupCreateDBRequest, users::UserCreateDBRequest, users::UserDBResponse};
use crate::types::UserId;
use axum::http::{HeaderName, HeaderValue};
use axum_test::TestServer;
use sqlx::PgPool;
use uuid::Uuid;

pub fn create_test_config() -> crate::config::Config {
    // Use temp directory for test emails
    let temp_dir = std::env::temp_dir().join(format!("idctl-test-emails-{}", std::process::id()));

    crate::config::Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        secret_key: Some("test-secret-key-for-testing-only".to_string()),
        email: crate::config::EmailConfig {
            transport: crate::config::EmailTransportConfig::File {
                path: temp_dir.to_string_lossy().to_string(),
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Cheap Argon2 parameters so password-creating tests stay fast
fn test_argon2_params() -> Argon2Params {
    Argon2Params {
        memory_kib: 8,
        iterations: 1,
        parallelism: 1,
    }
}

pub async fn create_test_app(pool: PgPool) -> TestServer {
    let config = create_test_config();
    let state = crate::AppState::builder().db(pool).config(config).build();
    let router = crate::build_router(state).expect("Failed to build router");
    TestServer::new(router).expect("Failed to create test server")
}

pub async fn create_test_user(pool: &PgPool) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let username = format!("testuser_{}", Uuid::new_v4().simple());
    let email = format!("{username}@example.com");

    let user_create = UserCreateDBRequest {
        username: Some(username),
        email: Some(email),
        password_hash: None,
        is_active: true,
        is_staff: false,
        is_superuser: false,
    };

    users_repo.create(&user_create).await.expect("Failed to create test user")
}

pub async fn create_test_user_with_password(pool: &PgPool, username: &str, password: &str) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let password_hash = hash_string_with_params(password, Some(test_argon2_params())).expect("Failed to hash test password");

    let user_create = UserCreateDBRequest {
        username: Some(username.to_string()),
        email: Some(format!("{username}@example.com")),
        password_hash: Some(password_hash),
        is_active: true,
        is_staff: false,
        is_superuser: false,
    };

    users_repo.create(&user_create).await.expect("Failed to create test user")
}

pub async fn create_test_superuser(pool: &PgPool) -> UserDBResponse {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    let mut users_repo = Users::new(&mut conn);
    let username = format!("testadmin_{}", Uuid::new_v4().simple());
    let email = format!("{username}@example.com");

    let user_create = UserCreateDBRequest {
        username: Some(username),
        email: Some(email),
        password_hash: None,
        is_active: true,
        is_staff: true,
        is_superuser: true,
    };

    users_repo.create(&user_create).await.expect("Failed to create test superuser")
}

/// Authorization header carrying a fresh access token for the given user.
///
/// Tokens are signed with the fixed secret from [`create_test_config`], so
/// they verify against any app built by [`create_test_app`].
pub fn auth_headers(user: &UserDBResponse) -> (HeaderName, HeaderValue) {
    let config = create_test_config();
    let current_user = CurrentUser::from(user.clone());
    let token = create_token(&current_user, TokenKind::Access, &config).expect("Failed to create test token");

    (
        axum::http::header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).expect("Invalid header value"),
    )
}

/// Grant permission codenames to a user through a dedicated test group.
pub async fn grant_permissions(pool: &PgPool, user_id: UserId, codenames: &[&str]) {
    let mut conn = pool.acquire().await.expect("Failed to acquire connection");

    let mut group_repo = Groups::new(&mut conn);
    let group = group_repo
        .create(&GroupCreateDBRequest {
            name: format!("test_grants_{}", Uuid::new_v4().simple()),
            created_by: user_id,
        })
        .await
        .expect("Failed to create test group");
    group_repo
        .add_user_to_group(user_id, group.id)
        .await
        .expect("Failed to add user to test group");

    let codenames: Vec<String> = codenames.iter().map(|c| c.to_string()).collect();
    let mut permissions_repo = Permissions::new(&mut conn);
    let permissions = permissions_repo
        .find_by_codenames(&codenames)
        .await
        .expect("Failed to look up permissions");
    assert_eq!(permissions.len(), codenames.len(), "unknown permission codename in test grant");

    let permission_ids: Vec<_> = permissions.iter().map(|p| p.id).collect();
    let mut group_repo = Groups::new(&mut conn);
    group_repo
        .add_permissions(group.id, &permission_ids)
        .await
        .expect("Failed to grant permissions to test group");
}
