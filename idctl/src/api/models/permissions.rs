//! API models for the permission registry.

use crate::db::models::permissions::PermissionDBResponse;
use crate::types::PermissionId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A registered permission. The registry is seeded by migrations and is
/// read-only at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: PermissionId,
    #[schema(example = "view_user")]
    pub codename: String,
    #[schema(example = "Can view user")]
    pub name: String,
    #[schema(example = "user")]
    pub resource: String,
}

impl From<PermissionDBResponse> for PermissionResponse {
    fn from(db: PermissionDBResponse) -> Self {
        Self {
            id: db.id,
            codename: db.codename,
            name: db.name,
            resource: db.resource,
        }
    }
}
