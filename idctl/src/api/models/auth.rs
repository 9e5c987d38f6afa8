//! API request/response models for signup, login, and password reset.

use crate::api::models::users::UserResponse;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Request body for self-service signup. At least one of username and email
/// must be provided, and the two password fields must match.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SignupRequest {
    #[schema(example = "jdoe")]
    pub username: Option<String>,
    #[schema(example = "jdoe@example.com")]
    pub email: Option<String>,
    pub password1: String,
    pub password2: String,
}

/// Request body for login. The identifier may be a username or an email
/// address.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "jdoe")]
    pub username: String,
    pub password: String,
}

/// Successful login response with the token pair
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    pub detail: UserResponse,
    pub access: String,
    pub refresh: String,
}

/// Request body for exchanging a refresh token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenRefreshRequest {
    pub refresh: String,
}

/// A fresh token pair
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
}

/// Request body for logout; revokes the refresh token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LogoutRequest {
    pub refresh: String,
}

/// Request body for starting a password reset
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetRequest {
    #[schema(example = "jdoe@example.com")]
    pub email: String,
}

/// Request body for completing a password reset with an emailed token. The
/// token ID travels in the URL path; the raw token travels in the body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

/// Generic message-only response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
