//! JWT access and refresh token creation and verification.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{api::models::users::CurrentUser, config::Config, errors::Error, types::UserId};

/// Discriminates access tokens from refresh tokens so one cannot be spent as
/// the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,               // Subject (user ID)
    pub username: Option<String>,  // Username, when the account has one
    pub email: Option<String>,     // Email, when the account has one
    pub is_active: bool,
    pub is_superuser: bool,
    pub kind: TokenKind,
    pub jti: Uuid, // Token identifier, used by the revocation list
    pub exp: i64,  // Expiration time
    pub iat: i64,  // Issued at
}

impl Claims {
    fn new(user: &CurrentUser, kind: TokenKind, config: &Config) -> Self {
        let now = Utc::now();
        let duration = match kind {
            TokenKind::Access => config.auth.security.access_token_duration,
            TokenKind::Refresh => config.auth.security.refresh_token_duration,
        };
        let exp = now + duration;

        Self {
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            kind,
            jti: Uuid::new_v4(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }

    pub fn expires_at(&self) -> chrono::DateTime<Utc> {
        chrono::DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            email: claims.email,
            is_active: claims.is_active,
            is_superuser: claims.is_superuser,
        }
    }
}

fn encoding_key(config: &Config) -> Result<EncodingKey, Error> {
    let secret_key = config.secret_key.as_ref().ok_or_else(|| Error::Internal {
        operation: "JWT tokens: secret_key is required".to_string(),
    })?;
    Ok(EncodingKey::from_secret(secret_key.as_bytes()))
}

/// Create a token of the given kind for a user
pub fn create_token(user: &CurrentUser, kind: TokenKind, config: &Config) -> Result<String, Error> {
    let claims = Claims::new(user, kind, config);
    encode(&Header::default(), &claims, &encoding_key(config)?).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Create an access/refresh pair for a user
pub fn create_token_pair(user: &CurrentUser, config: &Config) -> Result<(String, String), Error> {
    Ok((
        create_token(user, TokenKind::Access, config)?,
        create_token(user, TokenKind::Refresh, config)?,
    ))
}

/// Verify and decode a token, rejecting tokens of the wrong kind
pub fn verify_token(token: &str, expected_kind: TokenKind, config: &Config) -> Result<Claims, Error> {
    let secret_key = config.secret_key.as_ref().ok_or_else(|| Error::Internal {
        operation: "JWT tokens: secret_key is required".to_string(),
    })?;

    let key = DecodingKey::from_secret(secret_key.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthenticated { message: None },

        // Server errors (500) - key issues, internal failures
        jsonwebtoken::errors::ErrorKind::InvalidEcdsaKey
        | jsonwebtoken::errors::ErrorKind::InvalidRsaKey(_)
        | jsonwebtoken::errors::ErrorKind::RsaFailedSigning
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithmName
        | jsonwebtoken::errors::ErrorKind::InvalidKeyFormat
        | jsonwebtoken::errors::ErrorKind::MissingAlgorithm
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_)
        | jsonwebtoken::errors::ErrorKind::Crypto(_) => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },

        // Catch-all for any future error variants (default to server error for safety)
        _ => Error::Internal {
            operation: format!("JWT verification (unknown error): {e}"),
        },
    })?;

    if token_data.claims.kind != expected_kind {
        return Err(Error::Unauthenticated {
            message: Some("Wrong token type".to_string()),
        });
    }

    Ok(token_data.claims)
}
