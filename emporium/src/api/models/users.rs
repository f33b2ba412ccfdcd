//! API request/response models for users.

use super::pagination::Pagination;
use crate::db::handlers::users::UserFilter;
use crate::db::models::users::UserDBResponse;
use crate::types::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

/// Platform role. `Admin` is the elevated role: it passes every ownership
/// and role check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Customer,
}

// User request models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreate {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
}

/// Partial update payload; absent fields are left untouched. Full updates
/// are treated the same way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Self-service profile update; restricted to harmless fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

// User response models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    pub is_deleted: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            first_name: db.first_name,
            last_name: db.last_name,
            role: db.role,
            is_active: db.is_active,
            is_deleted: db.is_deleted,
            email_verified_at: db.email_verified_at,
            last_login: db.last_login,
            created_at: db.created_at,
            updated_at: db.updated_at,
            deleted_at: db.deleted_at,
        }
    }
}

/// The authenticated caller, as carried in access-token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub role: Role,
}

impl CurrentUser {
    /// Elevated callers pass every role and ownership check.
    pub fn is_elevated(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            role: db.role,
        }
    }
}

/// Query parameters for listing users
// Scalars go through DisplayFromStr: a struct with a flattened member is
// deserialized from string-typed content when it arrives as a query string.
#[serde_as]
#[derive(Debug, Default, Deserialize)]
pub struct ListUsersQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub ordering: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    #[serde_as(as = "Option<DisplayFromStr>")]
    pub is_active: Option<bool>,
    pub role: Option<Role>,
    pub search: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl ListUsersQuery {
    pub fn to_filter(&self) -> UserFilter {
        UserFilter {
            skip: self.pagination.offset(),
            limit: self.pagination.page_size(),
            ordering: self.ordering.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            is_active: self.is_active,
            role: self.role,
            search: self.search.clone(),
            from_date: self.from_date.map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()),
            to_date: self.to_date.map(|d| d.and_hms_opt(23, 59, 59).unwrap_or_default().and_utc()),
        }
    }
}
