use axum::{Json, extract::State};

use crate::{
    AppState,
    api::models::{permissions::PermissionResponse, users::CurrentUser},
    db::{errors::DbError, handlers::Permissions},
    errors::Result,
};

/// List the seeded permission registry
#[utoipa::path(
    get,
    path = "/permissions",
    tag = "permissions",
    responses(
        (status = 200, description = "All registered permissions", body = Vec<PermissionResponse>),
        (status = 401, description = "Unauthorized"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_permissions(State(state): State<AppState>, _: CurrentUser) -> Result<Json<Vec<PermissionResponse>>> {
    let mut pool_conn = state.db.acquire().await.map_err(DbError::from)?;
    let mut repo = Permissions::new(&mut pool_conn);

    let permissions = repo.list().await?;
    Ok(Json(permissions.into_iter().map(PermissionResponse::from).collect()))
}
