//! Database repository for groups, memberships, and granted permissions.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::groups::{GroupCreateDBRequest, GroupDBResponse, GroupUpdateDBRequest},
};
use crate::types::{GroupId, PermissionId, UserId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, PgConnection};
use tracing::instrument;

/// Filter for listing groups
#[derive(Debug, Clone)]
pub struct GroupFilter {
    pub skip: i64,
    pub limit: i64,
    pub search: Option<String>, // Case-insensitive substring search on name
}

impl GroupFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self { skip, limit, search: None }
    }

    pub fn with_search(mut self, search: String) -> Self {
        self.search = Some(search);
        self
    }
}

// Database entity model
#[derive(Debug, Clone, FromRow)]
struct Group {
    pub id: GroupId,
    pub name: String,
    pub created_by: UserId,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct Groups<'c> {
    db: &'c mut PgConnection,
}

/// Attach granted permission codenames and member ids to a bare group row
async fn hydrate(db: &mut PgConnection, group: Group) -> Result<GroupDBResponse> {
    let permissions = sqlx::query_scalar::<_, String>(
        r#"
        SELECT p.codename FROM permissions p
        JOIN group_permissions gp ON gp.permission_id = p.id
        WHERE gp.group_id = $1
        ORDER BY p.codename
        "#,
    )
    .bind(group.id)
    .fetch_all(&mut *db)
    .await?;

    let user_ids = sqlx::query_scalar::<_, UserId>("SELECT user_id FROM user_groups WHERE group_id = $1")
        .bind(group.id)
        .fetch_all(&mut *db)
        .await?;

    Ok(GroupDBResponse {
        id: group.id,
        name: group.name,
        created_by: group.created_by,
        updated_by: group.updated_by,
        created_at: group.created_at,
        updated_at: group.updated_at,
        permissions,
        user_ids,
    })
}

#[async_trait::async_trait]
impl<'c> Repository for Groups<'c> {
    type CreateRequest = GroupCreateDBRequest;
    type UpdateRequest = GroupUpdateDBRequest;
    type Response = GroupDBResponse;
    type Id = GroupId;
    type Filter = GroupFilter;

    #[instrument(skip(self, request), fields(name = %request.name), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        // created_at and updated_at use database DEFAULT NOW() for consistency
        let group = sqlx::query_as::<_, Group>(
            r#"
            INSERT INTO groups (name, created_by, updated_by)
            VALUES ($1, $2, $2)
            RETURNING *
            "#,
        )
        .bind(&request.name)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;

        hydrate(self.db, group).await
    }

    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let group = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        match group {
            Some(group) => Ok(Some(hydrate(self.db, group).await?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<GroupId>) -> Result<std::collections::HashMap<GroupId, GroupDBResponse>> {
        if ids.is_empty() {
            return Ok(std::collections::HashMap::new());
        }

        let groups = sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        let mut result = std::collections::HashMap::new();
        for group in groups {
            let id = group.id;
            result.insert(id, hydrate(self.db, group).await?);
        }

        Ok(result)
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        use sqlx::QueryBuilder;

        let mut query = QueryBuilder::new("SELECT * FROM groups WHERE 1=1");

        // Case-insensitive substring match on name
        if let Some(ref search) = filter.search {
            let search_pattern = format!("%{}%", search.to_lowercase());
            query.push(" AND LOWER(name) LIKE ");
            query.push_bind(search_pattern);
        }

        query.push(" ORDER BY name LIMIT ");
        query.push_bind(filter.limit);
        query.push(" OFFSET ");
        query.push_bind(filter.skip);

        let groups = query.build_query_as::<Group>().fetch_all(&mut *self.db).await?;

        let mut result = Vec::new();
        for group in groups {
            result.push(hydrate(self.db, group).await?);
        }
        Ok(result)
    }

    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM groups WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(group_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Atomic update with conditional field updates
        let group = sqlx::query_as::<_, Group>(
            r#"
            UPDATE groups SET
                name = COALESCE($2, name),
                updated_by = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(request.updated_by)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        hydrate(self.db, group).await
    }
}

impl<'c> Groups<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), group_id = %abbrev_uuid(&group_id)), err)]
    pub async fn add_user_to_group(&mut self, user_id: UserId, group_id: GroupId) -> Result<()> {
        match sqlx::query("INSERT INTO user_groups (user_id, group_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(group_id)
            .execute(&mut *self.db)
            .await
        {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                // Foreign key violation means either user or group doesn't exist
                Err(DbError::NotFound)
            }
            Err(e) => Err(DbError::from(e)),
        }
    }

    /// Removing a user that is not a member is a no-op.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id), group_id = %abbrev_uuid(&group_id)), err)]
    pub async fn remove_user_from_group(&mut self, user_id: UserId, group_id: GroupId) -> Result<()> {
        sqlx::query("DELETE FROM user_groups WHERE user_id = $1 AND group_id = $2")
            .bind(user_id)
            .bind(group_id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Grant a batch of permissions to a group. The batch is atomic and
    /// already-granted permissions are skipped.
    #[instrument(skip(self, permission_ids), fields(group_id = %abbrev_uuid(&group_id), count = permission_ids.len()), err)]
    pub async fn add_permissions(&mut self, group_id: GroupId, permission_ids: &[PermissionId]) -> Result<()> {
        let mut tx = self.db.begin().await?;

        for permission_id in permission_ids {
            match sqlx::query(
                "INSERT INTO group_permissions (group_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(group_id)
            .bind(permission_id)
            .execute(&mut *tx)
            .await
            {
                Ok(_) => {}
                Err(sqlx::Error::Database(db_err)) if db_err.is_foreign_key_violation() => {
                    return Err(DbError::NotFound);
                }
                Err(e) => return Err(DbError::from(e)),
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Revoke a batch of permissions from a group. Permissions not currently
    /// granted are skipped.
    #[instrument(skip(self, permission_ids), fields(group_id = %abbrev_uuid(&group_id), count = permission_ids.len()), err)]
    pub async fn remove_permissions(&mut self, group_id: GroupId, permission_ids: &[PermissionId]) -> Result<()> {
        sqlx::query("DELETE FROM group_permissions WHERE group_id = $1 AND permission_id = ANY($2)")
            .bind(group_id)
            .bind(permission_ids)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn get_user_groups(&mut self, user_id: UserId) -> Result<Vec<GroupDBResponse>> {
        let groups = sqlx::query_as::<_, Group>(
            r#"
            SELECT g.* FROM groups g
            INNER JOIN user_groups ug ON g.id = ug.group_id
            WHERE ug.user_id = $1
            ORDER BY g.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;

        let mut result = Vec::new();
        for group in groups {
            result.push(hydrate(self.db, group).await?);
        }
        Ok(result)
    }

    #[instrument(skip(self), fields(group_id = %abbrev_uuid(&group_id)), err)]
    pub async fn get_group_users(&mut self, group_id: GroupId) -> Result<Vec<UserId>> {
        let users = sqlx::query_scalar::<_, UserId>("SELECT user_id FROM user_groups WHERE group_id = $1")
            .bind(group_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(users)
    }

    /// Union of permission codenames granted through every group the user
    /// belongs to
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn effective_permissions(&mut self, user_id: UserId) -> Result<Vec<String>> {
        let codenames = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT p.codename FROM permissions p
            JOIN group_permissions gp ON gp.permission_id = p.id
            JOIN user_groups ug ON ug.group_id = gp.group_id
            WHERE ug.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *self.db)
        .await?;
        Ok(codenames)
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use crate::db::handlers::{Permissions, Users};
    use crate::db::models::users::UserCreateDBRequest;
    use sqlx::PgPool;

    async fn create_test_user(conn: &mut PgConnection, username: &str) -> UserId {
        let mut users = Users::new(conn);
        users
            .create(&UserCreateDBRequest {
                username: Some(username.to_string()),
                email: Some(format!("{username}@example.com")),
                password_hash: None,
                is_active: true,
                is_staff: false,
                is_superuser: false,
            })
            .await
            .unwrap()
            .id
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_get_group(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let creator = create_test_user(&mut conn, "creator").await;

        let mut repo = Groups::new(&mut conn);
        let group = repo
            .create(&GroupCreateDBRequest {
                name: "admins".to_string(),
                created_by: creator,
            })
            .await
            .unwrap();

        assert_eq!(group.name, "admins");
        assert!(group.permissions.is_empty());
        assert!(group.user_ids.is_empty());

        let fetched = repo.get_by_id(group.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, group.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_group_name_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let creator = create_test_user(&mut conn, "creator").await;

        let mut repo = Groups::new(&mut conn);
        let request = GroupCreateDBRequest {
            name: "staff".to_string(),
            created_by: creator,
        };
        repo.create(&request).await.unwrap();
        let err = repo.create(&request).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_membership_roundtrip(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let creator = create_test_user(&mut conn, "creator").await;
        let member = create_test_user(&mut conn, "member").await;

        let mut repo = Groups::new(&mut conn);
        let group = repo
            .create(&GroupCreateDBRequest {
                name: "editors".to_string(),
                created_by: creator,
            })
            .await
            .unwrap();

        repo.add_user_to_group(member, group.id).await.unwrap();
        // Adding twice is a no-op
        repo.add_user_to_group(member, group.id).await.unwrap();

        let users = repo.get_group_users(group.id).await.unwrap();
        assert_eq!(users, vec![member]);

        repo.remove_user_from_group(member, group.id).await.unwrap();
        // Removing a non-member is also a no-op
        repo.remove_user_from_group(member, group.id).await.unwrap();

        assert!(repo.get_group_users(group.id).await.unwrap().is_empty());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_add_user_to_missing_group_is_not_found(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let member = create_test_user(&mut conn, "member").await;

        let mut repo = Groups::new(&mut conn);
        let err = repo.add_user_to_group(member, GroupId::new_v4()).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_effective_permissions_union_across_groups(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let creator = create_test_user(&mut conn, "creator").await;
        let member = create_test_user(&mut conn, "member").await;

        let viewers_perm;
        let editors_perm;
        {
            let mut perms = Permissions::new(&mut conn);
            viewers_perm = perms.find_by_codenames(&["view_user".to_string()]).await.unwrap();
            editors_perm = perms.find_by_codenames(&["change_user".to_string()]).await.unwrap();
        }

        let mut repo = Groups::new(&mut conn);
        let viewers = repo
            .create(&GroupCreateDBRequest {
                name: "viewers".to_string(),
                created_by: creator,
            })
            .await
            .unwrap();
        let editors = repo
            .create(&GroupCreateDBRequest {
                name: "editors".to_string(),
                created_by: creator,
            })
            .await
            .unwrap();

        repo.add_permissions(viewers.id, &[viewers_perm[0].id]).await.unwrap();
        repo.add_permissions(editors.id, &[editors_perm[0].id]).await.unwrap();
        repo.add_user_to_group(member, viewers.id).await.unwrap();
        repo.add_user_to_group(member, editors.id).await.unwrap();

        let mut effective = repo.effective_permissions(member).await.unwrap();
        effective.sort();
        assert_eq!(effective, vec!["change_user".to_string(), "view_user".to_string()]);

        // Revoking from one group drops only that codename
        repo.remove_permissions(editors.id, &[editors_perm[0].id]).await.unwrap();
        let effective = repo.effective_permissions(member).await.unwrap();
        assert_eq!(effective, vec!["view_user".to_string()]);
    }
}
