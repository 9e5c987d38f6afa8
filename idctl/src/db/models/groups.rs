//! Database models for groups.

use crate::types::{GroupId, UserId};
use chrono::{DateTime, Utc};

/// Database request for creating a new group
#[derive(Debug, Clone)]
pub struct GroupCreateDBRequest {
    pub name: String,
    pub created_by: UserId,
}

/// Database request for updating a group
#[derive(Debug, Clone)]
pub struct GroupUpdateDBRequest {
    pub name: Option<String>,
    pub updated_by: UserId,
}

/// Database response for a group, including its granted permission codenames
/// and member user ids
#[derive(Debug, Clone)]
pub struct GroupDBResponse {
    pub id: GroupId,
    pub name: String,
    pub created_by: UserId,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub permissions: Vec<String>,
    pub user_ids: Vec<UserId>,
}
