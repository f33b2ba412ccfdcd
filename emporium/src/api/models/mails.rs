//! API request/response models for mail records.

use super::pagination::Pagination;
use crate::db::handlers::mails::MailFilter;
use crate::db::models::mails::MailDBResponse;
use crate::types::{MailId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// What an email record was sent for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "mail_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MailKind {
    Registration,
    PasswordReset,
    Generic,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailCreate {
    pub kind: Option<MailKind>,
    pub subject: Option<String>,
    pub template: Option<String>,
    pub body_html: Option<String>,
    pub to_email: Option<String>,
    pub bcc: Option<String>,
    pub cc: Option<String>,
    pub from_email: Option<String>,
    pub from_user: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailUpdate {
    pub kind: Option<MailKind>,
    pub subject: Option<String>,
    pub template: Option<String>,
    pub body_html: Option<String>,
    pub to_email: Option<String>,
    pub bcc: Option<String>,
    pub cc: Option<String>,
    pub from_email: Option<String>,
    pub from_user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailResponse {
    pub id: MailId,
    pub kind: MailKind,
    pub subject: Option<String>,
    pub template: Option<String>,
    pub body_html: Option<String>,
    pub to_email: Option<String>,
    pub bcc: Option<String>,
    pub cc: Option<String>,
    pub from_email: Option<String>,
    pub from_user: Option<String>,
    pub is_active: bool,
    pub created_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<MailDBResponse> for MailResponse {
    fn from(db: MailDBResponse) -> Self {
        Self {
            id: db.id,
            kind: db.kind,
            subject: db.subject,
            template: db.template,
            body_html: db.body_html,
            to_email: db.to_email,
            bcc: db.bcc,
            cc: db.cc,
            from_email: db.from_email,
            from_user: db.from_user,
            is_active: db.is_active,
            created_by: db.created_by,
            created_at: db.created_at,
            updated_at: db.updated_at,
        }
    }
}

/// Query parameters for listing mail records
#[derive(Debug, Default, Deserialize)]
pub struct ListMailsQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    pub ordering: Option<String>,
    pub kind: Option<MailKind>,
    pub subject: Option<String>,
    pub to_email: Option<String>,
    pub bcc: Option<String>,
    pub cc: Option<String>,
    pub from_email: Option<String>,
    pub from_user: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

impl ListMailsQuery {
    pub fn to_filter(&self) -> MailFilter {
        MailFilter {
            skip: self.pagination.offset(),
            limit: self.pagination.page_size(),
            ordering: self.ordering.clone(),
            kind: self.kind,
            subject: self.subject.clone(),
            to_email: self.to_email.clone(),
            bcc: self.bcc.clone(),
            cc: self.cc.clone(),
            from_email: self.from_email.clone(),
            from_user: self.from_user.clone(),
            from_date: self.from_date.map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()),
            to_date: self.to_date.map(|d| d.and_hms_opt(23, 59, 59).unwrap_or_default().and_utc()),
        }
    }
}
