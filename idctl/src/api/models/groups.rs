//! API request/response models for groups.

use super::pagination::Pagination;
use crate::db::models::groups::GroupDBResponse;
use crate::types::{GroupId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Query parameters for listing groups
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListGroupsQuery {
    /// Pagination parameters
    #[serde(flatten)]
    #[param(inline)]
    pub pagination: Pagination,

    /// Search query to filter groups by name (case-insensitive substring match)
    pub search: Option<String>,
}

/// Request body for creating a new group.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupCreate {
    /// Display name for the group (must be unique)
    #[schema(example = "editors")]
    pub name: String,
}

/// Request body for updating an existing group.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupUpdate {
    /// New display name (null to keep unchanged)
    pub name: Option<String>,
}

/// Request body for granting or revoking a batch of permissions by codename.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PermissionBatch {
    #[schema(example = json!(["view_user", "change_user"]))]
    pub permissions: Vec<String>,
}

/// Request body for adding or removing a group member.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MembershipChange {
    #[schema(value_type = String, format = "uuid")]
    pub user_guid: UserId,
}

/// Full group details returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: GroupId,
    pub name: String,
    #[schema(value_type = String, format = "uuid")]
    pub created_by: UserId,
    #[schema(value_type = String, format = "uuid")]
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Permission codenames granted to this group
    pub permissions: Vec<String>,
    /// Members of this group
    #[schema(value_type = Vec<String>)]
    pub user_ids: Vec<UserId>,
}

impl From<GroupDBResponse> for GroupResponse {
    fn from(db: GroupDBResponse) -> Self {
        Self {
            id: db.id,
            name: db.name,
            created_by: db.created_by,
            updated_by: db.updated_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
            permissions: db.permissions,
            user_ids: db.user_ids,
        }
    }
}
