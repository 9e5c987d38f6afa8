use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::tokens::{self, TokenKind},
    errors::{Error, Result},
};
use axum::{extract::FromRequestParts, http::request::Parts};
use tracing::{instrument, trace};

/// Pull the bearer token out of the Authorization header, if any
fn bearer_token(parts: &Parts) -> Result<Option<&str>> {
    let Some(auth_header) = parts.headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let auth_str = auth_header.to_str().map_err(|e| Error::BadRequest {
        message: format!("Invalid authorization header: {e}"),
    })?;

    Ok(auth_str.strip_prefix("Bearer "))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let Some(token) = bearer_token(parts)? else {
            trace!("No bearer token in request");
            return Err(Error::Unauthenticated { message: None });
        };

        let claims = tokens::verify_token(token, TokenKind::Access, &state.config)?;
        let user = CurrentUser::from(claims);

        if !user.is_active {
            return Err(Error::Unauthenticated {
                message: Some("User account is disabled".to_string()),
            });
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::create_token;
    use crate::test_utils::create_test_config;

    fn parts_with_auth(value: &str) -> Parts {
        let request = axum::http::Request::builder()
            .uri("http://localhost/test")
            .header(axum::http::header::AUTHORIZATION, value)
            .body(())
            .unwrap();
        let (parts, _body) = request.into_parts();
        parts
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_valid_bearer_token(pool: sqlx::PgPool) {
        let config = create_test_config();
        let state = AppState::builder().db(pool).config(config.clone()).build();

        let user = CurrentUser {
            id: uuid::Uuid::new_v4(),
            username: Some("alice".to_string()),
            email: Some("alice@example.com".to_string()),
            is_active: true,
            is_superuser: false,
        };
        let token = create_token(&user, TokenKind::Access, &config).unwrap();

        let mut parts = parts_with_auth(&format!("Bearer {token}"));
        let extracted = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(extracted.id, user.id);
        assert_eq!(extracted.username, user.username);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_missing_and_malformed_tokens_rejected(pool: sqlx::PgPool) {
        let config = create_test_config();
        let state = AppState::builder().db(pool).config(config.clone()).build();

        let request = axum::http::Request::builder().uri("http://localhost/test").body(()).unwrap();
        let (mut parts, _body) = request.into_parts();
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);

        let mut parts = parts_with_auth("Bearer not-a-jwt");
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_refresh_token_rejected_for_requests(pool: sqlx::PgPool) {
        let config = create_test_config();
        let state = AppState::builder().db(pool).config(config.clone()).build();

        let user = CurrentUser {
            id: uuid::Uuid::new_v4(),
            username: Some("alice".to_string()),
            email: None,
            is_active: true,
            is_superuser: false,
        };
        let refresh = create_token(&user, TokenKind::Refresh, &config).unwrap();

        let mut parts = parts_with_auth(&format!("Bearer {refresh}"));
        let err = CurrentUser::from_request_parts(&mut parts, &state).await.unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
