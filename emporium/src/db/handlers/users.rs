//! Database repository for users.

use std::collections::HashMap;

use crate::types::{abbrev_uuid, UserId};
use crate::{
    api::models::users::Role,
    db::{
        errors::{DbError, Result},
        handlers::repository::{EntityId, Repository},
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing users
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
    /// Ordering field, optionally prefixed with '-' for descending
    pub ordering: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
    pub is_active: Option<bool>,
    pub role: Option<Role>,
    /// Case-insensitive substring match across username, email and names
    pub search: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

/// Map a client-supplied ordering value onto a whitelisted ORDER BY clause.
fn order_clause(ordering: Option<&str>) -> &'static str {
    match ordering {
        Some("id") => "id ASC",
        Some("-id") => "id DESC",
        Some("email") => "email ASC",
        Some("-email") => "email DESC",
        Some("username") => "username ASC",
        Some("-username") => "username DESC",
        Some("last_login") => "last_login ASC",
        Some("-last_login") => "last_login DESC",
        Some("created_at") => "created_at ASC",
        _ => "created_at DESC",
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &UserFilter) {
    if let Some(email) = &filter.email {
        qb.push(" AND email ILIKE ").push_bind(format!("%{email}%"));
    }
    if let Some(username) = &filter.username {
        qb.push(" AND username ILIKE ").push_bind(format!("%{username}%"));
    }
    if let Some(is_active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(is_active);
    }
    if let Some(role) = filter.role {
        qb.push(" AND role = ").push_bind(role);
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{search}%");
        qb.push(" AND (username ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR first_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR last_name ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(from_date) = filter.from_date {
        qb.push(" AND created_at >= ").push_bind(from_date);
    }
    if let Some(to_date) = filter.to_date {
        qb.push(" AND created_at <= ").push_bind(to_date);
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    const RESOURCE: &'static str = "users";

    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            INSERT INTO users (id, username, email, first_name, last_name, role, is_active, password_hash, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(request.role)
        .bind(request.is_active)
        .bind(&request.password_hash)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: EntityId) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1 AND is_deleted = FALSE")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id_unscoped(&mut self, id: EntityId) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: &[EntityId]) -> Result<HashMap<EntityId, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let users = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE id = ANY($1) AND is_deleted = FALSE")
            .bind(ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(users.into_iter().map(|u| (u.id, u)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut qb = QueryBuilder::new("SELECT * FROM users WHERE is_deleted = FALSE");
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY ").push(order_clause(filter.ordering.as_deref()));
        qb.push(" LIMIT ").push_bind(filter.limit).push(" OFFSET ").push_bind(filter.skip);

        let users = qb.build_query_as::<UserDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(users)
    }

    #[instrument(skip(self, filter), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM users WHERE is_deleted = FALSE");
        push_filters(&mut qb, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: EntityId, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let user = sqlx::query_as::<_, UserDBResponse>(
            r#"
            UPDATE users SET
                email = COALESCE($2, email),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                role = COALESCE($5, role),
                is_active = COALESCE($6, is_active),
                email_verified_at = COALESCE($7, email_verified_at),
                last_login = COALESCE($8, last_login),
                password_hash = COALESCE($9, password_hash),
                updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.email)
        .bind(&request.first_name)
        .bind(&request.last_name)
        .bind(request.role)
        .bind(request.is_active)
        .bind(request.email_verified_at)
        .bind(request.last_login)
        .bind(&request.password_hash)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn soft_delete(&mut self, id: EntityId, actor: Option<UserId>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users SET
                is_deleted = TRUE,
                is_active = FALSE,
                deleted_at = NOW(),
                deleted_by = $2,
                updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            "#,
        )
        .bind(id)
        .bind(actor)
        .execute(&mut *self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    fn owner_of(response: &Self::Response) -> Option<UserId> {
        response.created_by
    }
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE email = $1 AND is_deleted = FALSE")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }

    #[instrument(skip(self, username), err)]
    pub async fn get_by_username(&mut self, username: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, UserDBResponse>("SELECT * FROM users WHERE username = $1 AND is_deleted = FALSE")
            .bind(username)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn create_request(username: &str) -> UserCreateDBRequest {
        UserCreateDBRequest {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            first_name: None,
            last_name: None,
            role: Role::Customer,
            is_active: false,
            password_hash: None,
            created_by: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_and_get_by_email(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&create_request("alice")).await.unwrap();
        assert_eq!(created.username, "alice");
        assert!(!created.is_active);
        assert!(!created.is_deleted);

        let found = repo.get_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_soft_delete_leaves_row_behind(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let actor = repo.create(&create_request("admin")).await.unwrap();
        let victim = repo.create(&create_request("bob")).await.unwrap();

        assert!(repo.soft_delete(victim.id, Some(actor.id)).await.unwrap());

        // Gone from every default scope
        assert!(repo.get_by_id(victim.id).await.unwrap().is_none());
        assert!(repo.get_by_email("bob@example.com").await.unwrap().is_none());
        let listed = repo.list(&UserFilter::new(0, 100)).await.unwrap();
        assert!(listed.iter().all(|u| u.id != victim.id));

        // But still there for direct unscoped access, with the actor stamped
        let row = repo.get_by_id_unscoped(victim.id).await.unwrap().unwrap();
        assert!(row.is_deleted);
        assert!(!row.is_active);
        assert_eq!(row.deleted_by, Some(actor.id));
        assert!(row.deleted_at.is_some());

        // A second delete of the same row is a no-op
        assert!(!repo.soft_delete(victim.id, Some(actor.id)).await.unwrap());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filters_and_count(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&create_request("carol")).await.unwrap();
        repo.create(&create_request("carlos")).await.unwrap();
        repo.create(&create_request("dave")).await.unwrap();

        let filter = UserFilter {
            skip: 0,
            limit: 100,
            email: Some("car".to_string()),
            ..Default::default()
        };
        let listed = repo.list(&filter).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(repo.count(&filter).await.unwrap(), 2);

        let search = UserFilter {
            skip: 0,
            limit: 100,
            search: Some("DAVE".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.list(&search).await.unwrap().len(), 1);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_partial_update(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("erin")).await.unwrap();

        let update = UserUpdateDBRequest {
            first_name: Some("Erin".to_string()),
            ..Default::default()
        };
        let updated = repo.update(user.id, &update).await.unwrap();

        // Only the provided field changed
        assert_eq!(updated.first_name.as_deref(), Some("Erin"));
        assert_eq!(updated.email, user.email);
        assert_eq!(updated.role, user.role);
    }
}
