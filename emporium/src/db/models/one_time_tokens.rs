//! Database models for single-use activation and password-reset tokens.

use crate::auth::password::Argon2Params;
use crate::types::{TokenId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What a one-time token is redeemable for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "token_purpose", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Activation,
    PasswordReset,
}

/// Request for creating a one-time token. Only the hash of `raw_token` is
/// stored.
#[derive(Debug, Clone)]
pub struct OneTimeTokenCreateRequest {
    pub user_id: UserId,
    pub purpose: TokenPurpose,
    pub raw_token: String,
    pub expires_at: DateTime<Utc>,
    pub argon2_params: Argon2Params,
}

#[derive(Debug, Clone, FromRow)]
pub struct OneTimeToken {
    pub id: TokenId,
    pub user_id: UserId,
    pub purpose: TokenPurpose,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}
