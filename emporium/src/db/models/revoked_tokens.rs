//! Database models for the refresh-token blacklist.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct RevokedToken {
    pub jti: Uuid,
    pub user_id: UserId,
    pub token_expires_at: DateTime<Utc>,
    pub revoked_at: DateTime<Utc>,
}
