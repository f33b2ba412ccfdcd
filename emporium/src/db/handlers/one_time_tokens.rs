//! Database repository for single-use activation and password-reset tokens.

use chrono::Utc;
use sqlx::PgConnection;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::password,
    config::Config,
    db::{
        errors::{DbError, Result},
        models::one_time_tokens::{OneTimeToken, OneTimeTokenCreateRequest, TokenPurpose},
    },
    types::{abbrev_uuid, TokenId, UserId},
};

pub struct OneTimeTokens<'c> {
    db: &'c mut PgConnection,
}

impl<'c> OneTimeTokens<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request), err)]
    pub async fn create(&mut self, request: &OneTimeTokenCreateRequest) -> Result<OneTimeToken> {
        let token_hash = password::hash_string_with_params(&request.raw_token, Some(request.argon2_params))
            .map_err(|e| DbError::Other(anyhow::anyhow!(e)))?;

        let token = sqlx::query_as::<_, OneTimeToken>(
            r#"
            INSERT INTO one_time_tokens (id, user_id, purpose, token_hash, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(request.purpose)
        .bind(&token_hash)
        .bind(request.expires_at)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(token)
    }

    /// Create a token for a user, returning the raw token material alongside
    /// the stored row. The raw token leaves the process only inside the
    /// emailed link.
    #[instrument(skip(self, config), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn create_for_user(&mut self, user_id: UserId, purpose: TokenPurpose, config: &Config) -> Result<(String, OneTimeToken)> {
        let raw_token = password::generate_one_time_token();
        let lifetime = match purpose {
            TokenPurpose::Activation => config.auth.activation_token_lifetime,
            TokenPurpose::PasswordReset => config.auth.password_reset_token_lifetime,
        };
        let expires_at = Utc::now() + chrono::Duration::from_std(lifetime).unwrap_or(chrono::Duration::minutes(30));

        let request = OneTimeTokenCreateRequest {
            user_id,
            purpose,
            raw_token: raw_token.clone(),
            expires_at,
            argon2_params: (&config.auth.password).into(),
        };

        let token = self.create(&request).await?;
        Ok((raw_token, token))
    }

    /// Find the newest valid (unexpired, unconsumed) token of a purpose for a
    /// user and verify the raw token against its hash.
    #[instrument(skip(self, raw_token), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn find_valid_for_user(&mut self, user_id: UserId, purpose: TokenPurpose, raw_token: &str) -> Result<Option<OneTimeToken>> {
        let candidates = sqlx::query_as::<_, OneTimeToken>(
            r#"
            SELECT * FROM one_time_tokens
            WHERE user_id = $1 AND purpose = $2 AND used_at IS NULL AND expires_at > NOW()
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .bind(purpose)
        .fetch_all(&mut *self.db)
        .await?;

        for token in candidates {
            match password::verify_string(raw_token, &token.token_hash) {
                Ok(true) => return Ok(Some(token)),
                Ok(false) => continue,
                Err(e) => {
                    tracing::error!("Token verification error for token {}: {:?}", token.id, e);
                    continue;
                }
            }
        }

        Ok(None)
    }

    /// Consume a token so it can never be redeemed again.
    #[instrument(skip(self), fields(token_id = %abbrev_uuid(&token_id)), err)]
    pub async fn consume(&mut self, token_id: TokenId) -> Result<()> {
        sqlx::query("UPDATE one_time_tokens SET used_at = NOW() WHERE id = $1 AND used_at IS NULL")
            .bind(token_id)
            .execute(&mut *self.db)
            .await?;

        Ok(())
    }

    /// Invalidate all outstanding tokens of a purpose for a user.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn invalidate_for_user(&mut self, user_id: UserId, purpose: TokenPurpose) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE one_time_tokens
            SET used_at = NOW()
            WHERE user_id = $1 AND purpose = $2 AND used_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(purpose)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected())
    }
}
