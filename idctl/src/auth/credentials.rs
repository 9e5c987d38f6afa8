//! Credential checking for login.
//!
//! Login accepts a single identifier that may be a username or an email
//! address. The identifier is matched against both columns; when it matches
//! one account by username and a different account by email, the shape of the
//! identifier decides which account wins.

use std::sync::LazyLock;

use regex::Regex;
use sqlx::PgPool;
use tracing::instrument;

use crate::{
    auth::password,
    db::{errors::DbError, handlers::Users, models::users::UserDBResponse},
    errors::{Error, Result},
};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex"));

/// Whether an identifier is shaped like an email address
pub fn is_email(identifier: &str) -> bool {
    EMAIL_RE.is_match(identifier)
}

/// Pick the account an ambiguous identifier refers to. Email-shaped
/// identifiers prefer the email match, everything else prefers the username
/// match.
fn resolve<'a>(identifier: &str, matches: &'a [UserDBResponse]) -> Option<&'a UserDBResponse> {
    if matches.len() <= 1 {
        return matches.first();
    }

    let preferred = if is_email(identifier) {
        matches.iter().find(|u| u.email.as_deref() == Some(identifier))
    } else {
        matches.iter().find(|u| u.username.as_deref() == Some(identifier))
    };
    preferred.or_else(|| matches.first())
}

/// Authenticate a user by identifier and password.
///
/// Distinguishes an unknown account from a wrong password in the returned
/// error, mirroring the login responses the API documents.
#[instrument(skip(db, password), err)]
pub async fn authenticate(db: &PgPool, identifier: &str, password: &str) -> Result<UserDBResponse> {
    if identifier.is_empty() || password.is_empty() {
        return Err(Error::Unauthenticated { message: None });
    }

    let mut conn = db.acquire().await.map_err(DbError::from)?;
    let matches = Users::new(&mut conn).find_by_identifier(identifier).await?;

    let user = resolve(identifier, &matches).ok_or_else(|| Error::AccountNotFound {
        identifier: identifier.to_string(),
    })?;

    if !user.is_active {
        return Err(Error::Unauthenticated {
            message: Some("User account is disabled".to_string()),
        });
    }

    let hash = user.password_hash.as_deref().ok_or(Error::InvalidCredentials)?;
    if !password::verify_string(password, hash)? {
        return Err(Error::InvalidCredentials);
    }

    Ok(user.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::handlers::Repository;
    use crate::db::models::users::UserCreateDBRequest;
    use sqlx::PgConnection;

    #[test]
    fn test_email_classification() {
        assert!(is_email("alice@example.com"));
        assert!(is_email("a.b+tag@sub.domain.co.uk"));
        assert!(!is_email("alice"));
        assert!(!is_email("alice@"));
        assert!(!is_email("@example.com"));
        assert!(!is_email("alice@example"));
    }

    fn user_with(username: Option<&str>, email: Option<&str>) -> UserDBResponse {
        UserDBResponse {
            id: uuid::Uuid::new_v4(),
            username: username.map(String::from),
            email: email.map(String::from),
            password_hash: None,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            groups: Vec::new(),
        }
    }

    #[test]
    fn test_ambiguous_identifier_resolution() {
        // One account is named "bob@example.com", another owns that email
        let by_username = user_with(Some("bob@example.com"), Some("other@example.com"));
        let by_email = user_with(Some("bob"), Some("bob@example.com"));
        let matches = vec![by_username.clone(), by_email.clone()];

        // Email-shaped identifier resolves to the email owner
        let resolved = resolve("bob@example.com", &matches).unwrap();
        assert_eq!(resolved.id, by_email.id);

        // Plain identifier resolves to the username owner
        let matches = vec![user_with(Some("carol"), None), user_with(Some("dave"), Some("carol"))];
        let resolved = resolve("carol", &matches).unwrap();
        assert_eq!(resolved.username.as_deref(), Some("carol"));
    }

    async fn seed_user(conn: &mut PgConnection, username: &str, password: &str, active: bool) {
        let mut users = crate::db::handlers::Users::new(conn);
        users
            .create(&UserCreateDBRequest {
                username: Some(username.to_string()),
                email: Some(format!("{username}@example.com")),
                password_hash: Some(password::hash_string(password).unwrap()),
                is_active: active,
                is_staff: false,
                is_superuser: false,
            })
            .await
            .unwrap();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_authenticate_by_username_and_email(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        seed_user(&mut conn, "alice", "hunter2hunter2", true).await;
        drop(conn);

        let user = authenticate(&pool, "alice", "hunter2hunter2").await.unwrap();
        assert_eq!(user.username.as_deref(), Some("alice"));

        let user = authenticate(&pool, "alice@example.com", "hunter2hunter2").await.unwrap();
        assert_eq!(user.username.as_deref(), Some("alice"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_authenticate_error_taxonomy(pool: sqlx::PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        seed_user(&mut conn, "alice", "hunter2hunter2", true).await;
        seed_user(&mut conn, "mallory", "pw123456789", false).await;
        drop(conn);

        // Unknown account names the identifier
        let err = authenticate(&pool, "nobody", "whatever").await.unwrap_err();
        assert!(matches!(err, Error::AccountNotFound { .. }));
        assert_eq!(err.user_message(), "User nobody does not exist");

        // Wrong password is a distinct error
        let err = authenticate(&pool, "alice", "wrong-password").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredentials));

        // Disabled accounts cannot log in even with the right password
        let err = authenticate(&pool, "mallory", "pw123456789").await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated { .. }));

        // Empty credentials never reveal account existence
        let err = authenticate(&pool, "", "").await.unwrap_err();
        assert!(matches!(err, Error::Unauthenticated { message: None }));
    }
}
