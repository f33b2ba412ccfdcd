//! Database repository for the refresh-token blacklist.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::db::{errors::Result, models::revoked_tokens::RevokedToken};
use crate::types::{abbrev_uuid, UserId};

pub struct RevokedTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> RevokedTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Blacklist a refresh token by jti. Idempotent.
    #[instrument(skip(self), fields(jti = %abbrev_uuid(&jti)), err)]
    pub async fn revoke(&mut self, jti: Uuid, user_id: UserId, token_expires_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO revoked_tokens (jti, user_id, token_expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(token_expires_at)
        .execute(&mut *self.db)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(jti = %abbrev_uuid(&jti)), err)]
    pub async fn get(&mut self, jti: Uuid) -> Result<Option<RevokedToken>> {
        let row = sqlx::query_as::<_, RevokedToken>("SELECT * FROM revoked_tokens WHERE jti = $1")
            .bind(jti)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(row)
    }

    pub async fn is_revoked(&mut self, jti: Uuid) -> Result<bool> {
        Ok(self.get(jti).await?.is_some())
    }

    /// Remove blacklist rows whose tokens have expired anyway. Returns the
    /// number of rows purged.
    #[instrument(skip(self), err)]
    pub async fn purge_expired(&mut self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM revoked_tokens WHERE token_expires_at < NOW()")
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected())
    }
}
