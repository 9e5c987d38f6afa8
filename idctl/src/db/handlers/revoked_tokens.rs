//! Revocation list for refresh tokens.
//!
//! Logout records the refresh token's jti here; the refresh endpoint rejects
//! any jti present in the list. Rows past their expiry can be purged since the
//! token itself is no longer accepted anyway.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    db::errors::Result,
    types::{UserId, abbrev_uuid},
};

pub struct RevokedTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> RevokedTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Revoking the same jti twice is a no-op.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn revoke(&mut self, jti: Uuid, user_id: UserId, expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO revoked_tokens (jti, user_id, expires_at) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(&mut *self.db)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn is_revoked(&mut self, jti: Uuid) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM revoked_tokens WHERE jti = $1")
            .bind(jti)
            .fetch_one(&mut *self.db)
            .await?;
        Ok(found > 0)
    }

    #[instrument(skip(self), err)]
    pub async fn purge_expired(&mut self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < NOW()")
            .execute(&mut *self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
