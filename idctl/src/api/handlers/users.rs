use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};

use crate::{
    AppState,
    api::models::users::{ChangePasswordRequest, CurrentUser, ListUsersQuery, UserCreate, UserResponse, UserUpdate},
    auth::{
        password,
        permissions::{Protected, UserResource, has_permission},
    },
    db::{
        errors::DbError,
        handlers::{Groups, Repository, Users, users::UserFilter},
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    errors::{Error, Result},
    types::UserId,
    validation,
};

async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || password::hash_string(&password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

/// Load the caller's effective permission codenames for an owner-or-codename
/// check. Superusers never reach the lookup.
async fn granted_codenames(state: &AppState, user: &CurrentUser) -> Result<Vec<String>> {
    if user.is_superuser {
        return Ok(Vec::new());
    }
    let mut conn = state.db.acquire().await.map_err(DbError::from)?;
    Ok(Groups::new(&mut conn).effective_permissions(user.id).await?)
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "users",
    summary = "List users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "List of users", body = Vec<UserResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<ListUsersQuery>,
    current_user: CurrentUser,
) -> Result<Json<Vec<UserResponse>>> {
    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Users::new(&mut pool_conn);

    // Non-staff callers only ever see their own account
    if !current_user.is_superuser {
        let db_user = repo.get_by_id(current_user.id).await?;
        let is_staff = db_user.as_ref().map(|u| u.is_staff).unwrap_or(false);
        if !is_staff {
            let users = db_user.map(UserResponse::from).into_iter().collect();
            return Ok(Json(users));
        }
    }

    let (skip, limit) = query.pagination.params();
    let filter = UserFilter::new(skip, limit).with_active(query.active);
    let users = repo.list(&filter).await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "users",
    summary = "Create user",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Invalid request"),
        (status = 403, description = "Missing add_user permission"),
        (status = 409, description = "Username or email already taken"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    _: Protected<UserResource>,
    Json(create): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let username = validation::normalize_identifier(create.username);
    let email = validation::normalize_identifier(create.email);
    if username.is_none() && email.is_none() {
        return Err(Error::BadRequest {
            message: "Username or Email required".to_string(),
        });
    }

    let password_hash = match create.password {
        Some(password) => {
            if password.len() < state.config.auth.password.min_length {
                return Err(Error::BadRequest {
                    message: format!("Password must be at least {} characters", state.config.auth.password.min_length),
                });
            }
            Some(hash_password(password).await?)
        }
        None => None,
    };

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Users::new(&mut pool_conn);
    let user = repo
        .create(&UserCreateDBRequest {
            username,
            email,
            password_hash,
            is_active: true,
            ..Default::default()
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Get user",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User details", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing view_user permission"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
) -> Result<Json<UserResponse>> {
    if current_user.id != user_id {
        let granted = granted_codenames(&state, &current_user).await?;
        if !has_permission(&current_user, &granted, "view_user") {
            return Err(Error::InsufficientPermissions {
                required: "view_user".to_string(),
            });
        }
    }

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Users::new(&mut pool_conn);
    match repo.get_by_id(user_id).await? {
        Some(user) => Ok(Json(UserResponse::from(user))),
        None => Err(Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        }),
    }
}

#[utoipa::path(
    patch,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Update user",
    request_body = UserUpdate,
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User updated", body = UserResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing modify_other_user permission"),
        (status = 404, description = "User not found"),
        (status = 409, description = "Username or email already taken"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    if current_user.id != user_id {
        let granted = granted_codenames(&state, &current_user).await?;
        if !has_permission(&current_user, &granted, "modify_other_user") {
            return Err(Error::InsufficientPermissions {
                required: "modify_other_user".to_string(),
            });
        }
    }

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Users::new(&mut pool_conn);
    let user = repo
        .update(
            user_id,
            &UserUpdateDBRequest {
                username: update.username,
                email: update.email,
                is_active: update.is_active,
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(UserResponse::from(user)))
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}",
    tag = "users",
    summary = "Delete user",
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing delete_own_user or delete_other_user permission"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
) -> Result<StatusCode> {
    let required = if current_user.id == user_id {
        "delete_own_user"
    } else {
        "delete_other_user"
    };
    let granted = granted_codenames(&state, &current_user).await?;
    if !has_permission(&current_user, &granted, required) {
        return Err(Error::InsufficientPermissions {
            required: required.to_string(),
        });
    }

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Users::new(&mut pool_conn);
    if repo.delete(user_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "User".to_string(),
            id: user_id.to_string(),
        })
    }
}

#[utoipa::path(
    patch,
    path = "/users/{user_id}/change-password",
    tag = "users",
    summary = "Change password",
    request_body = ChangePasswordRequest,
    params(("user_id" = uuid::Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Password changed", body = UserResponse),
        (status = 400, description = "Password mismatch or too short"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing modify_other_user permission"),
        (status = 404, description = "User not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
    current_user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<UserResponse>> {
    if current_user.id != user_id {
        let granted = granted_codenames(&state, &current_user).await?;
        if !has_permission(&current_user, &granted, "modify_other_user") {
            return Err(Error::InsufficientPermissions {
                required: "modify_other_user".to_string(),
            });
        }
    }

    if request.password1 != request.password2 {
        return Err(Error::BadRequest {
            message: "Password mismatch".to_string(),
        });
    }
    if request.password1.len() < state.config.auth.password.min_length {
        return Err(Error::BadRequest {
            message: format!("Password must be at least {} characters", state.config.auth.password.min_length),
        });
    }

    let password_hash = hash_password(request.password1).await?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Users::new(&mut pool_conn);
    let user = repo
        .update(
            user_id,
            &UserUpdateDBRequest {
                password_hash: Some(password_hash),
                ..Default::default()
            },
        )
        .await?;

    Ok(Json(UserResponse::from(user)))
}
