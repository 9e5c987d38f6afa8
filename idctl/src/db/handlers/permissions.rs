//! Read-only access to the seeded permission registry.

use crate::db::{errors::Result, models::permissions::PermissionDBResponse};
use crate::types::{PermissionId, abbrev_uuid};
use sqlx::PgConnection;
use tracing::instrument;

pub struct Permissions<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Permissions<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn list(&mut self) -> Result<Vec<PermissionDBResponse>> {
        let permissions =
            sqlx::query_as::<_, PermissionDBResponse>("SELECT * FROM permissions ORDER BY resource, codename")
                .fetch_all(&mut *self.db)
                .await?;
        Ok(permissions)
    }

    #[instrument(skip(self), fields(permission_id = %abbrev_uuid(&id)), err)]
    pub async fn get_by_id(&mut self, id: PermissionId) -> Result<Option<PermissionDBResponse>> {
        let permission = sqlx::query_as::<_, PermissionDBResponse>("SELECT * FROM permissions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;
        Ok(permission)
    }

    /// Resolve codenames against the registry. Unknown codenames are silently
    /// absent from the result; the caller decides whether that is an error.
    #[instrument(skip(self, codenames), fields(count = codenames.len()), err)]
    pub async fn find_by_codenames(&mut self, codenames: &[String]) -> Result<Vec<PermissionDBResponse>> {
        if codenames.is_empty() {
            return Ok(Vec::new());
        }

        let permissions =
            sqlx::query_as::<_, PermissionDBResponse>("SELECT * FROM permissions WHERE codename = ANY($1)")
                .bind(codenames)
                .fetch_all(&mut *self.db)
                .await?;
        Ok(permissions)
    }
}
