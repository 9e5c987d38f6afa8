use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use sqlx::Acquire;

use crate::{
    AppState,
    api::models::{
        groups::{GroupCreate, GroupResponse, GroupUpdate, ListGroupsQuery, MembershipChange, PermissionBatch},
        users::CurrentUser,
    },
    auth::permissions::{GroupResource, Protected, has_permission},
    db::{
        errors::DbError,
        handlers::{Groups, Permissions, Repository, groups::GroupFilter},
        models::groups::{GroupCreateDBRequest, GroupUpdateDBRequest},
    },
    errors::{Error, Result},
    types::{GroupId, PermissionId},
};

/// Resolve a permission batch against the registry. All-or-nothing: any
/// unknown codename rejects the whole batch.
async fn resolve_batch(repo: &mut Permissions<'_>, codenames: &[String]) -> Result<Vec<PermissionId>> {
    let resolved = repo.find_by_codenames(codenames).await?;
    if resolved.is_empty() {
        return Err(Error::BadRequest {
            message: "No valid permissions found".to_string(),
        });
    }
    if resolved.len() < codenames.len() {
        let known: Vec<&str> = resolved.iter().map(|p| p.codename.as_str()).collect();
        let unknown: Vec<&str> = codenames
            .iter()
            .map(String::as_str)
            .filter(|c| !known.contains(c))
            .collect();
        return Err(Error::BadRequest {
            message: format!("Unknown permissions: {}", unknown.join(", ")),
        });
    }
    Ok(resolved.into_iter().map(|p| p.id).collect())
}

#[utoipa::path(
    get,
    path = "/groups",
    tag = "groups",
    summary = "List groups",
    params(ListGroupsQuery),
    responses(
        (status = 200, description = "List of groups", body = Vec<GroupResponse>),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing view_group permission"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_groups(
    State(state): State<AppState>,
    Query(query): Query<ListGroupsQuery>,
    _: Protected<GroupResource>,
) -> Result<Json<Vec<GroupResponse>>> {
    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut pool_conn);

    let (skip, limit) = query.pagination.params();
    let mut filter = GroupFilter::new(skip, limit);
    if let Some(search) = query.search {
        filter = filter.with_search(search);
    }

    let groups = repo.list(&filter).await?;
    Ok(Json(groups.into_iter().map(GroupResponse::from).collect()))
}

#[utoipa::path(
    post,
    path = "/groups",
    tag = "groups",
    summary = "Create group",
    request_body = GroupCreate,
    responses(
        (status = 201, description = "Group created", body = GroupResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing add_group permission"),
        (status = 409, description = "Group name already taken"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn create_group(
    State(state): State<AppState>,
    current_user: Protected<GroupResource>,
    Json(create): Json<GroupCreate>,
) -> Result<(StatusCode, Json<GroupResponse>)> {
    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut pool_conn);

    let group = repo
        .create(&GroupCreateDBRequest {
            name: create.name,
            created_by: current_user.user.id,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(GroupResponse::from(group))))
}

#[utoipa::path(
    get,
    path = "/groups/{group_id}",
    tag = "groups",
    summary = "Get group",
    params(("group_id" = uuid::Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group details", body = GroupResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing view_group permission"),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    _: Protected<GroupResource>,
) -> Result<Json<GroupResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut pool_conn);

    match repo.get_by_id(group_id).await? {
        Some(group) => Ok(Json(GroupResponse::from(group))),
        None => Err(Error::NotFound {
            resource: "Group".to_string(),
            id: group_id.to_string(),
        }),
    }
}

#[utoipa::path(
    patch,
    path = "/groups/{group_id}",
    tag = "groups",
    summary = "Update group",
    request_body = GroupUpdate,
    params(("group_id" = uuid::Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group updated", body = GroupResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing change_group permission"),
        (status = 404, description = "Group not found"),
        (status = 409, description = "Group name already taken"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn update_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    current_user: Protected<GroupResource>,
    Json(update): Json<GroupUpdate>,
) -> Result<Json<GroupResponse>> {
    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut pool_conn);

    let group = repo
        .update(
            group_id,
            &GroupUpdateDBRequest {
                name: update.name,
                updated_by: current_user.user.id,
            },
        )
        .await?;

    Ok(Json(GroupResponse::from(group)))
}

#[utoipa::path(
    delete,
    path = "/groups/{group_id}",
    tag = "groups",
    summary = "Delete group",
    params(("group_id" = uuid::Uuid, Path, description = "Group ID")),
    responses(
        (status = 204, description = "Group deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing delete_group permission"),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn delete_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    _: Protected<GroupResource>,
) -> Result<StatusCode> {
    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut pool_conn);

    if repo.delete(group_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::NotFound {
            resource: "Group".to_string(),
            id: group_id.to_string(),
        })
    }
}

#[utoipa::path(
    patch,
    path = "/groups/{group_id}/add-permissions",
    tag = "groups",
    summary = "Grant permissions to group",
    request_body = PermissionBatch,
    params(("group_id" = uuid::Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Permissions granted", body = GroupResponse),
        (status = 400, description = "Unknown permission codename in batch"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing change_group permission"),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_permissions_to_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    _: Protected<GroupResource>,
    Json(batch): Json<PermissionBatch>,
) -> Result<Json<GroupResponse>> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let permission_ids = {
        let mut registry = Permissions::new(tx.acquire().await.map_err(DbError::from)?);
        resolve_batch(&mut registry, &batch.permissions).await?
    };

    let mut repo = Groups::new(tx.acquire().await.map_err(DbError::from)?);
    repo.add_permissions(group_id, &permission_ids).await?;
    let group = repo.get_by_id(group_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Group".to_string(),
        id: group_id.to_string(),
    })?;

    tx.commit().await.map_err(DbError::from)?;
    Ok(Json(GroupResponse::from(group)))
}

#[utoipa::path(
    patch,
    path = "/groups/{group_id}/remove-permissions",
    tag = "groups",
    summary = "Revoke permissions from group",
    request_body = PermissionBatch,
    params(("group_id" = uuid::Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Permissions revoked", body = GroupResponse),
        (status = 400, description = "Unknown permission codename in batch"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing change_group permission"),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_permissions_from_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    _: Protected<GroupResource>,
    Json(batch): Json<PermissionBatch>,
) -> Result<Json<GroupResponse>> {
    let mut tx = state.db.begin().await.map_err(DbError::from)?;

    let permission_ids = {
        let mut registry = Permissions::new(tx.acquire().await.map_err(DbError::from)?);
        resolve_batch(&mut registry, &batch.permissions).await?
    };

    let mut repo = Groups::new(tx.acquire().await.map_err(DbError::from)?);
    repo.remove_permissions(group_id, &permission_ids).await?;
    let group = repo.get_by_id(group_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Group".to_string(),
        id: group_id.to_string(),
    })?;

    tx.commit().await.map_err(DbError::from)?;
    Ok(Json(GroupResponse::from(group)))
}

/// Check the dedicated membership codename for the caller.
async fn require_membership_codename(state: &AppState, user: &CurrentUser, required: &str) -> Result<()> {
    let granted = if user.is_superuser {
        Vec::new()
    } else {
        let mut conn = state.db.acquire().await.map_err(DbError::from)?;
        Groups::new(&mut conn).effective_permissions(user.id).await?
    };
    if !has_permission(user, &granted, required) {
        return Err(Error::InsufficientPermissions {
            required: required.to_string(),
        });
    }
    Ok(())
}

#[utoipa::path(
    patch,
    path = "/groups/{group_id}/add-user",
    tag = "groups",
    summary = "Add user to group",
    request_body = MembershipChange,
    params(("group_id" = uuid::Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "User added", body = GroupResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing add_user_to_group permission"),
        (status = 404, description = "Group or user not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn add_user_to_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    current_user: CurrentUser,
    Json(change): Json<MembershipChange>,
) -> Result<Json<GroupResponse>> {
    require_membership_codename(&state, &current_user, "add_user_to_group").await?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut pool_conn);
    repo.add_user_to_group(change.user_guid, group_id).await?;

    let group = repo.get_by_id(group_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Group".to_string(),
        id: group_id.to_string(),
    })?;
    Ok(Json(GroupResponse::from(group)))
}

#[utoipa::path(
    patch,
    path = "/groups/{group_id}/remove-user",
    tag = "groups",
    summary = "Remove user from group",
    request_body = MembershipChange,
    params(("group_id" = uuid::Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "User removed", body = GroupResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Missing remove_user_from_group permission"),
        (status = 404, description = "Group not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn remove_user_from_group(
    State(state): State<AppState>,
    Path(group_id): Path<GroupId>,
    current_user: CurrentUser,
    Json(change): Json<MembershipChange>,
) -> Result<Json<GroupResponse>> {
    require_membership_codename(&state, &current_user, "remove_user_from_group").await?;

    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Groups::new(&mut pool_conn);
    repo.remove_user_from_group(change.user_guid, group_id).await?;

    let group = repo.get_by_id(group_id).await?.ok_or_else(|| Error::NotFound {
        resource: "Group".to_string(),
        id: group_id.to_string(),
    })?;
    Ok(Json(GroupResponse::from(group)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{auth_headers, create_test_app, create_test_superuser, create_test_user, grant_permissions};
    use axum::http::StatusCode;
    use serde_json::json;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_group_crud(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_superuser(&pool).await;
        let (name, value) = auth_headers(&admin);

        let response = app
            .post("/groups")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "editors"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let group: GroupResponse = response.json();
        assert_eq!(group.name, "editors");
        assert_eq!(group.created_by, admin.id);

        // Duplicate name conflicts
        let response = app
            .post("/groups")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "editors"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);

        let response = app
            .patch(&format!("/groups/{}", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "reviewers"}))
            .await;
        response.assert_status_ok();
        let updated: GroupResponse = response.json();
        assert_eq!(updated.name, "reviewers");

        let response = app
            .delete(&format!("/groups/{}", group.id))
            .add_header(name.clone(), value.clone())
            .await;
        response.assert_status(StatusCode::NO_CONTENT);

        let response = app.get(&format!("/groups/{}", group.id)).add_header(name, value).await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_group_listing_requires_view_group(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool).await;

        let (name, value) = auth_headers(&user);
        let response = app.get("/groups").add_header(name, value).await;
        response.assert_status(StatusCode::FORBIDDEN);

        grant_permissions(&pool, user.id, &["view_group"]).await;
        let (name, value) = auth_headers(&user);
        let response = app.get("/groups").add_header(name, value).await;
        response.assert_status_ok();
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_permission_batch_all_or_nothing(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_superuser(&pool).await;
        let (name, value) = auth_headers(&admin);

        let response = app
            .post("/groups")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "batch-test"}))
            .await;
        let group: GroupResponse = response.json();

        // Entirely unknown batch
        let response = app
            .patch(&format!("/groups/{}/add-permissions", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"permissions": ["no_such_thing"]}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().contains("No valid permissions found"));

        // Mixed batch leaves the set unchanged
        let response = app
            .patch(&format!("/groups/{}/add-permissions", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"permissions": ["view_user", "no_such_thing"]}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().contains("no_such_thing"));

        let response = app
            .get(&format!("/groups/{}", group.id))
            .add_header(name.clone(), value.clone())
            .await;
        let current: GroupResponse = response.json();
        assert!(current.permissions.is_empty());

        // Fully valid batch lands
        let response = app
            .patch(&format!("/groups/{}/add-permissions", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"permissions": ["view_user", "change_user"]}))
            .await;
        response.assert_status_ok();
        let current: GroupResponse = response.json();
        assert_eq!(current.permissions.len(), 2);

        // And can be revoked again
        let response = app
            .patch(&format!("/groups/{}/remove-permissions", group.id))
            .add_header(name, value)
            .json(&json!({"permissions": ["view_user"]}))
            .await;
        response.assert_status_ok();
        let current: GroupResponse = response.json();
        assert_eq!(current.permissions, vec!["change_user".to_string()]);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_membership_codenames(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_superuser(&pool).await;
        let manager = create_test_user(&pool).await;
        let member = create_test_user(&pool).await;

        let (name, value) = auth_headers(&admin);
        let response = app
            .post("/groups")
            .add_header(name, value)
            .json(&json!({"name": "membership-test"}))
            .await;
        let group: GroupResponse = response.json();

        // Without the dedicated codename membership changes are forbidden
        let (name, value) = auth_headers(&manager);
        let response = app
            .patch(&format!("/groups/{}/add-user", group.id))
            .add_header(name, value)
            .json(&json!({"user_guid": member.id}))
            .await;
        response.assert_status(StatusCode::FORBIDDEN);

        grant_permissions(&pool, manager.id, &["add_user_to_group", "remove_user_from_group"]).await;

        let (name, value) = auth_headers(&manager);
        let response = app
            .patch(&format!("/groups/{}/add-user", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"user_guid": member.id}))
            .await;
        response.assert_status_ok();
        let current: GroupResponse = response.json();
        assert!(current.user_ids.contains(&member.id));

        // Adding twice is idempotent
        let response = app
            .patch(&format!("/groups/{}/add-user", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"user_guid": member.id}))
            .await;
        response.assert_status_ok();

        // Removing a non-member is a no-op, not an error
        let stranger = create_test_user(&pool).await;
        let response = app
            .patch(&format!("/groups/{}/remove-user", group.id))
            .add_header(name.clone(), value.clone())
            .json(&json!({"user_guid": stranger.id}))
            .await;
        response.assert_status_ok();

        let response = app
            .patch(&format!("/groups/{}/remove-user", group.id))
            .add_header(name, value)
            .json(&json!({"user_guid": member.id}))
            .await;
        response.assert_status_ok();
        let current: GroupResponse = response.json();
        assert!(!current.user_ids.contains(&member.id));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_add_unknown_user_is_not_found(pool: PgPool) {
        let app = create_test_app(pool.clone()).await;
        let admin = create_test_superuser(&pool).await;
        let (name, value) = auth_headers(&admin);

        let response = app
            .post("/groups")
            .add_header(name.clone(), value.clone())
            .json(&json!({"name": "fk-test"}))
            .await;
        let group: GroupResponse = response.json();

        let response = app
            .patch(&format!("/groups/{}/add-user", group.id))
            .add_header(name, value)
            .json(&json!({"user_guid": uuid::Uuid::new_v4()}))
            .await;
        response.assert_status(StatusCode::NOT_FOUND);
    }
}
