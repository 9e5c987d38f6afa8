//! API request/response models for users.

use super::pagination::Pagination;
use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Request body for creating a user through the admin API. At least one of
/// username and email must be set.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserCreate {
    #[schema(example = "jdoe")]
    pub username: Option<String>,
    #[schema(example = "jdoe@example.com")]
    pub email: Option<String>,
    /// Initial password. Accounts without one cannot log in until a password
    /// reset is completed.
    pub password: Option<String>,
}

/// Request body for updating a user. All fields are optional; only provided
/// fields will be updated.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    /// Set to false to disable the account without deleting it
    pub is_active: Option<bool>,
}

/// Request body for setting a user's password. The caller must be the owner
/// of the account or hold the modify_other_user permission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub password1: String,
    pub password2: String,
}

/// Full user details returned by the API. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Names of the groups this user belongs to
    pub groups: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            is_active: db.is_active,
            is_staff: db.is_staff,
            is_superuser: db.is_superuser,
            groups: db.groups,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Query parameters for listing users
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListUsersQuery {
    /// Pagination parameters
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// When set, only return users whose is_active flag matches
    pub active: Option<bool>,
}

/// The authenticated caller, decoded from the access token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    #[schema(value_type = String, format = "uuid")]
    pub id: UserId,
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub is_superuser: bool,
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            is_active: db.is_active,
            is_superuser: db.is_superuser,
        }
    }
}
