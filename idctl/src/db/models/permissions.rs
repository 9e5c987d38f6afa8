//! Database models for the permission registry.

use crate::types::PermissionId;
use sqlx::FromRow;

/// A row from the seeded permission registry. The registry is read-only at
/// runtime, so there are no create/update request types.
#[derive(Debug, Clone, FromRow)]
pub struct PermissionDBResponse {
    pub id: PermissionId,
    pub codename: String,
    pub name: String,
    pub resource: String,
}
