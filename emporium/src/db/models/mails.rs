//! Database models for dispatched-email records.

use crate::api::models::mails::{MailCreate, MailKind, MailUpdate};
use crate::types::{MailId, UserId};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database request for creating a mail record
#[derive(Debug, Clone)]
pub struct MailCreateDBRequest {
    pub kind: MailKind,
    pub subject: Option<String>,
    pub template: Option<String>,
    pub body_html: Option<String>,
    pub to_email: Option<String>,
    pub bcc: Option<String>,
    pub cc: Option<String>,
    pub from_email: Option<String>,
    pub from_user: Option<String>,
    pub created_by: Option<UserId>,
}

impl From<MailCreate> for MailCreateDBRequest {
    fn from(api: MailCreate) -> Self {
        Self {
            kind: api.kind.unwrap_or(MailKind::Generic),
            subject: api.subject,
            template: api.template,
            body_html: api.body_html,
            to_email: api.to_email,
            bcc: api.bcc,
            cc: api.cc,
            from_email: api.from_email,
            from_user: api.from_user,
            created_by: None,
        }
    }
}

/// Database request for updating a mail record (partial semantics)
#[derive(Debug, Clone, Default)]
pub struct MailUpdateDBRequest {
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

impl From<MailUpdate> for MailUpdateDBRequest {
    fn from(update: MailUpdate) -> Self {
        Self {
            kind: update.kind,
            subject: update.subject,
            template: update.template,
            body_html: update.body_html,
            to_email: update.to_email,
            bcc: update.bcc,
            cc: update.cc,
            from_email: update.from_email,
            from_user: update.from_user,
        }
    }
}

/// Database response for a mail record
#[derive(Debug, Clone, FromRow)]
pub struct MailDBResponse {
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
    pub is_deleted: bool,
    pub created_by: Option<UserId>,
    pub deleted_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}
