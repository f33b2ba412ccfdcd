//! Database repository for dispatched-email records.

use std::collections::HashMap;

use crate::types::{abbrev_uuid, UserId};
use crate::{
    api::models::mails::MailKind,
    db::{
        errors::{DbError, Result},
        handlers::repository::{EntityId, Repository},
        models::mails::{MailCreateDBRequest, MailDBResponse, MailUpdateDBRequest},
    },
};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing mail records
#[derive(Debug, Clone, Default)]
pub struct MailFilter {
    pub skip: i64,
    pub limit: i64,
    pub ordering: Option<String>,
    pub kind: Option<MailKind>,
    pub subject: Option<String>,
    pub to_email: Option<String>,
    pub bcc: Option<String>,
    pub cc: Option<String>,
    pub from_email: Option<String>,
    pub from_user: Option<String>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

impl MailFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }
}

pub struct Mails<'c> {
    db: &'c mut PgConnection,
}

fn order_clause(ordering: Option<&str>) -> &'static str {
    match ordering {
        Some("id") => "id ASC",
        Some("-id") => "id DESC",
        Some("kind") => "kind ASC",
        Some("-kind") => "kind DESC",
        Some("subject") => "subject ASC",
        Some("-subject") => "subject DESC",
        Some("created_at") => "created_at ASC",
        _ => "created_at DESC",
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &MailFilter) {
    if let Some(kind) = filter.kind {
        qb.push(" AND kind = ").push_bind(kind);
    }
    if let Some(subject) = &filter.subject {
        qb.push(" AND subject ILIKE ").push_bind(format!("%{subject}%"));
    }
    if let Some(to_email) = &filter.to_email {
        qb.push(" AND to_email ILIKE ").push_bind(format!("%{to_email}%"));
    }
    if let Some(bcc) = &filter.bcc {
        qb.push(" AND bcc ILIKE ").push_bind(format!("%{bcc}%"));
    }
    if let Some(cc) = &filter.cc {
        qb.push(" AND cc ILIKE ").push_bind(format!("%{cc}%"));
    }
    if let Some(from_email) = &filter.from_email {
        qb.push(" AND from_email ILIKE ").push_bind(format!("%{from_email}%"));
    }
    if let Some(from_user) = &filter.from_user {
        qb.push(" AND from_user ILIKE ").push_bind(format!("%{from_user}%"));
    }
    if let Some(from_date) = filter.from_date {
        qb.push(" AND created_at >= ").push_bind(from_date);
    }
    if let Some(to_date) = filter.to_date {
        qb.push(" AND created_at <= ").push_bind(to_date);
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Mails<'c> {
    const RESOURCE: &'static str = "mails";

    type CreateRequest = MailCreateDBRequest;
    type UpdateRequest = MailUpdateDBRequest;
    type Response = MailDBResponse;
    type Filter = MailFilter;

    #[instrument(skip(self, request), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let mail = sqlx::query_as::<_, MailDBResponse>(
            r#"
            INSERT INTO mails (id, kind, subject, template, body_html, to_email, bcc, cc, from_email, from_user, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.kind)
        .bind(&request.subject)
        .bind(&request.template)
        .bind(&request.body_html)
        .bind(&request.to_email)
        .bind(&request.bcc)
        .bind(&request.cc)
        .bind(&request.from_email)
        .bind(&request.from_user)
        .bind(request.created_by)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(mail)
    }

    #[instrument(skip(self), fields(mail_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: EntityId) -> Result<Option<Self::Response>> {
        let mail = sqlx::query_as::<_, MailDBResponse>("SELECT * FROM mails WHERE id = $1 AND is_deleted = FALSE")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(mail)
    }

    #[instrument(skip(self), fields(mail_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id_unscoped(&mut self, id: EntityId) -> Result<Option<Self::Response>> {
        let mail = sqlx::query_as::<_, MailDBResponse>("SELECT * FROM mails WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(mail)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: &[EntityId]) -> Result<HashMap<EntityId, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mails = sqlx::query_as::<_, MailDBResponse>("SELECT * FROM mails WHERE id = ANY($1) AND is_deleted = FALSE")
            .bind(ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(mails.into_iter().map(|m| (m.id, m)).collect())
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let mut qb = QueryBuilder::new("SELECT * FROM mails WHERE is_deleted = FALSE");
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY ").push(order_clause(filter.ordering.as_deref()));
        qb.push(" LIMIT ").push_bind(filter.limit).push(" OFFSET ").push_bind(filter.skip);

        let mails = qb.build_query_as::<MailDBResponse>().fetch_all(&mut *self.db).await?;
        Ok(mails)
    }

    #[instrument(skip(self, filter), err)]
    async fn count(&mut self, filter: &Self::Filter) -> Result<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM mails WHERE is_deleted = FALSE");
        push_filters(&mut qb, filter);

        let count: i64 = qb.build_query_scalar().fetch_one(&mut *self.db).await?;
        Ok(count)
    }

    #[instrument(skip(self, request), fields(mail_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: EntityId, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let mail = sqlx::query_as::<_, MailDBResponse>(
            r#"
            UPDATE mails SET
                kind = COALESCE($2, kind),
                subject = COALESCE($3, subject),
                template = COALESCE($4, template),
                body_html = COALESCE($5, body_html),
                to_email = COALESCE($6, to_email),
                bcc = COALESCE($7, bcc),
                cc = COALESCE($8, cc),
                from_email = COALESCE($9, from_email),
                from_user = COALESCE($10, from_user),
                updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(request.kind)
        .bind(&request.subject)
        .bind(&request.template)
        .bind(&request.body_html)
        .bind(&request.to_email)
        .bind(&request.bcc)
        .bind(&request.cc)
        .bind(&request.from_email)
        .bind(&request.from_user)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(mail)
    }

    #[instrument(skip(self), fields(mail_id = %abbrev_uuid(&id)), err)]
    async fn soft_delete(&mut self, id: EntityId, actor: Option<UserId>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE mails SET
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

impl<'c> Mails<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }
}
