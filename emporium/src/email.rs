//! Email rendering, delivery and record keeping.
//!
//! Outgoing mail is rendered from an embedded minijinja template, sent once
//! through the configured transport (SMTP in production, files in
//! development), and persisted to the `mails` table. Persistence and
//! delivery batch independently: a large blind-copy list is always sent as
//! one message, but is recorded as ceil(L/batch) rows, each carrying a
//! slice of the list and the same rendered body.
//!
//! Handlers hand mail to [`EmailService::dispatch`], which does the work on
//! a background task; the HTTP response never waits for delivery.

use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncFileTransport, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use sqlx::PgPool;
use std::path::Path;

use crate::{
    api::models::mails::MailKind,
    config::Config,
    db::handlers::{Mails, Repository},
    db::models::mails::MailCreateDBRequest,
    errors::Error,
    types::UserId,
};

/// A fully specified outgoing message.
#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub kind: MailKind,
    pub template: String,
    pub subject: String,
    pub context: serde_json::Value,
    pub to: Vec<String>,
    pub bcc: Vec<String>,
    pub cc: Vec<String>,
    pub from_user: Option<String>,
    pub created_by: Option<UserId>,
}

#[derive(Clone)]
pub struct EmailService {
    transport: std::sync::Arc<EmailTransport>,
    from_email: String,
    from_name: String,
    reply_to: Option<String>,
    record_batch_size: usize,
    frontend_url: String,
    templates: minijinja::Environment<'static>,
}

enum EmailTransport {
    Smtp(AsyncSmtpTransport<Tokio1Executor>),
    File(AsyncFileTransport<Tokio1Executor>),
}

impl EmailService {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let email_config = &config.email;

        let transport = match &email_config.transport {
            crate::config::EmailTransportConfig::Smtp {
                host,
                port,
                username,
                password,
                use_tls,
            } => {
                if !use_tls {
                    tracing::warn!("SMTP TLS is disabled - this is not recommended for production");
                }

                let smtp_builder = if *use_tls {
                    AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
                } else {
                    Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host))
                }
                .map_err(|e| Error::Internal {
                    operation: format!("create SMTP transport: {e}"),
                })?
                .port(*port)
                .credentials(Credentials::new(username.clone(), password.clone()));

                EmailTransport::Smtp(smtp_builder.build())
            }
            crate::config::EmailTransportConfig::File { path } => {
                let emails_dir = Path::new(path);
                if !emails_dir.exists() {
                    std::fs::create_dir_all(emails_dir).map_err(|e| Error::Internal {
                        operation: format!("create emails directory: {e}"),
                    })?;
                }
                EmailTransport::File(AsyncFileTransport::<Tokio1Executor>::new(emails_dir))
            }
        };

        let mut templates = minijinja::Environment::new();
        templates
            .add_template("activation.html", include_str!("templates/activation.html"))
            .map_err(|e| Error::Internal {
                operation: format!("register activation template: {e}"),
            })?;
        templates
            .add_template("password_reset.html", include_str!("templates/password_reset.html"))
            .map_err(|e| Error::Internal {
                operation: format!("register password reset template: {e}"),
            })?;

        Ok(Self {
            transport: std::sync::Arc::new(transport),
            from_email: email_config.from_email.clone(),
            from_name: email_config.from_name.clone(),
            reply_to: email_config.reply_to.clone(),
            record_batch_size: email_config.record_batch_size,
            frontend_url: config.frontend_url.clone(),
            templates,
        })
    }

    /// Render a registered template with the given context.
    pub fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, Error> {
        let tmpl = self.templates.get_template(template).map_err(|e| Error::Internal {
            operation: format!("load template {template}: {e}"),
        })?;

        tmpl.render(context).map_err(|e| Error::Internal {
            operation: format!("render template {template}: {e}"),
        })
    }

    fn activation_email(&self, username: &str, to_email: &str, uid: &str, token: &str) -> OutgoingEmail {
        let activation_url = format!("{}/activate?uid={}&token={}", self.frontend_url, uid, token);
        OutgoingEmail {
            kind: MailKind::Registration,
            template: "activation.html".to_string(),
            subject: "Activate your account".to_string(),
            context: serde_json::json!({
                "username": username,
                "activation_url": activation_url,
            }),
            to: vec![to_email.to_string()],
            bcc: vec![],
            cc: vec![],
            from_user: None,
            created_by: None,
        }
    }

    fn password_reset_email(&self, username: &str, to_email: &str, uid: &str, token: &str) -> OutgoingEmail {
        let reset_url = format!("{}/reset-password?uid={}&token={}", self.frontend_url, uid, token);
        OutgoingEmail {
            kind: MailKind::PasswordReset,
            template: "password_reset.html".to_string(),
            subject: "Password Reset Request".to_string(),
            context: serde_json::json!({
                "username": username,
                "reset_url": reset_url,
            }),
            to: vec![to_email.to_string()],
            bcc: vec![],
            cc: vec![],
            from_user: None,
            created_by: None,
        }
    }

    /// Send an account activation email.
    pub async fn send_activation_email(&self, db: &PgPool, username: &str, to_email: &str, uid: &str, token: &str) -> Result<(), Error> {
        let email = self.activation_email(username, to_email, uid, token);
        self.send_and_record(db, &email).await
    }

    /// Queue an account activation email on a background task.
    pub fn dispatch_activation_email(&self, db: PgPool, username: &str, to_email: &str, uid: &str, token: &str) {
        self.dispatch(db, self.activation_email(username, to_email, uid, token));
    }

    /// Send a password reset email.
    pub async fn send_password_reset_email(&self, db: &PgPool, username: &str, to_email: &str, uid: &str, token: &str) -> Result<(), Error> {
        let email = self.password_reset_email(username, to_email, uid, token);
        self.send_and_record(db, &email).await
    }

    /// Queue a password reset email on a background task.
    pub fn dispatch_password_reset_email(&self, db: PgPool, username: &str, to_email: &str, uid: &str, token: &str) {
        self.dispatch(db, self.password_reset_email(username, to_email, uid, token));
    }

    /// Send on a background task. Delivery failures are logged, never
    /// surfaced to the caller.
    pub fn dispatch(&self, db: PgPool, email: OutgoingEmail) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.send_and_record(&db, &email).await {
                tracing::error!(template = %email.template, "Failed to send email: {:#}", e);
            }
        });
    }

    /// Render, send once, then persist records (chunked by bcc batch size).
    pub async fn send_and_record(&self, db: &PgPool, email: &OutgoingEmail) -> Result<(), Error> {
        let html = self.render(&email.template, &email.context)?;
        let plain = strip_tags(&html);

        let message = self.build_message(email, &plain, &html)?;

        match self.transport.as_ref() {
            EmailTransport::Smtp(smtp) => {
                smtp.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send SMTP email: {e}"),
                })?;
            }
            EmailTransport::File(file) => {
                file.send(message).await.map_err(|e| Error::Internal {
                    operation: format!("send file email: {e}"),
                })?;
            }
        }

        self.record(db, email, &html).await
    }

    fn build_message(&self, email: &OutgoingEmail, plain: &str, html: &str) -> Result<Message, Error> {
        let from = format!("{} <{}>", self.from_name, self.from_email)
            .parse::<Mailbox>()
            .map_err(|e| Error::Internal {
                operation: format!("parse from email: {e}"),
            })?;

        let mut builder = Message::builder().from(from).subject(email.subject.as_str());

        if let Some(reply_to) = &self.reply_to {
            builder = builder.reply_to(parse_mailbox(reply_to)?);
        }
        for to in &email.to {
            builder = builder.to(parse_mailbox(to)?);
        }
        for cc in &email.cc {
            builder = builder.cc(parse_mailbox(cc)?);
        }
        // The whole blind-copy list goes on the one outgoing message;
        // only the persisted records are chunked.
        for bcc in &email.bcc {
            builder = builder.bcc(parse_mailbox(bcc)?);
        }

        builder
            .multipart(MultiPart::alternative_plain_html(plain.to_string(), html.to_string()))
            .map_err(|e| Error::Internal {
                operation: format!("build email message: {e}"),
            })
    }

    async fn record(&self, db: &PgPool, email: &OutgoingEmail, html: &str) -> Result<(), Error> {
        let mut conn = db.acquire().await.map_err(|e| Error::Database(e.into()))?;
        let mut repo = Mails::new(&mut conn);

        let base = MailCreateDBRequest {
            kind: email.kind,
            subject: Some(email.subject.clone()),
            template: Some(email.template.clone()),
            body_html: Some(html.to_string()),
            to_email: join_nonempty(&email.to),
            bcc: None,
            cc: join_nonempty(&email.cc),
            from_email: Some(self.from_email.clone()),
            from_user: email.from_user.clone(),
            created_by: email.created_by,
        };

        if email.bcc.is_empty() {
            repo.create(&base).await?;
            return Ok(());
        }

        for chunk in chunk_bcc(&email.bcc, self.record_batch_size) {
            let request = MailCreateDBRequest {
                bcc: Some(chunk.join(",")),
                ..base.clone()
            };
            repo.create(&request).await?;
        }

        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, Error> {
    address.parse::<Mailbox>().map_err(|e| Error::Internal {
        operation: format!("parse email address: {e}"),
    })
}

fn join_nonempty(addresses: &[String]) -> Option<String> {
    if addresses.is_empty() {
        None
    } else {
        Some(addresses.join(","))
    }
}

/// Split a blind-copy list into record-sized slices.
pub fn chunk_bcc(bcc: &[String], batch_size: usize) -> Vec<Vec<String>> {
    bcc.chunks(batch_size.max(1)).map(|chunk| chunk.to_vec()).collect()
}

/// Derive a plain-text fallback from an HTML body by dropping markup and
/// collapsing whitespace.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;

    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EmailTransportConfig};

    fn test_config(dir: &std::path::Path) -> Config {
        let mut config = Config {
            secret_key: Some("test".to_string()),
            ..Default::default()
        };
        config.email.transport = EmailTransportConfig::File {
            path: dir.to_string_lossy().to_string(),
        };
        config
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("<p>Hello <b>world</b></p>"), "Hello world");
        assert_eq!(strip_tags("no markup"), "no markup");
        assert_eq!(strip_tags("<a href=\"x\">link</a>\n  text"), "link text");
    }

    #[test]
    fn test_chunk_bcc_covers_everything_once() {
        let bcc: Vec<String> = (0..20).map(|i| format!("user{i}@example.com")).collect();
        let chunks = chunk_bcc(&bcc, 9);

        // ceil(20/9) slices, each within the batch size
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 9));

        // Full coverage, no duplicates or omissions
        let flattened: Vec<String> = chunks.into_iter().flatten().collect();
        assert_eq!(flattened, bcc);
    }

    #[test]
    fn test_chunk_bcc_small_list_is_single_record() {
        let bcc: Vec<String> = (0..9).map(|i| format!("user{i}@example.com")).collect();
        assert_eq!(chunk_bcc(&bcc, 9).len(), 1);
    }

    #[tokio::test]
    async fn test_render_templates() {
        let dir = tempfile::tempdir().unwrap();
        let service = EmailService::new(&test_config(dir.path())).unwrap();

        let html = service
            .render(
                "activation.html",
                &serde_json::json!({"username": "alice", "activation_url": "http://x/activate?uid=a&token=b"}),
            )
            .unwrap();
        assert!(html.contains("Hello alice,"));
        assert!(html.contains("http://x/activate?uid=a&token=b"));

        let html = service
            .render(
                "password_reset.html",
                &serde_json::json!({"username": "bob", "reset_url": "http://x/reset"}),
            )
            .unwrap();
        assert!(html.contains("Hello bob,"));
        assert!(html.contains("reset your password"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_send_and_record_chunks_bcc(pool: sqlx::PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let service = EmailService::new(&test_config(dir.path())).unwrap();

        let bcc: Vec<String> = (0..20).map(|i| format!("user{i}@example.com")).collect();
        let email = OutgoingEmail {
            kind: MailKind::Generic,
            template: "activation.html".to_string(),
            subject: "Bulk".to_string(),
            context: serde_json::json!({"username": "all", "activation_url": "http://x"}),
            to: vec!["to@example.com".to_string()],
            bcc,
            cc: vec![],
            from_user: None,
            created_by: None,
        };

        service.send_and_record(&pool, &email).await.unwrap();

        // One message on the wire
        let sent_files = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(sent_files, 1);

        // ceil(20/9) = 3 persisted records, each carrying <= 9 addresses,
        // covering the original list exactly
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Mails::new(&mut conn);
        let records = repo.list(&crate::db::handlers::mails::MailFilter::new(0, 100)).await.unwrap();
        assert_eq!(records.len(), 3);

        let mut seen: Vec<String> = Vec::new();
        for record in &records {
            let addresses: Vec<String> = record.bcc.as_deref().unwrap().split(',').map(str::to_string).collect();
            assert!(addresses.len() <= 9);
            seen.extend(addresses);
        }
        seen.sort();
        let mut expected: Vec<String> = (0..20).map(|i| format!("user{i}@example.com")).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_send_and_record_without_bcc_is_single_row(pool: sqlx::PgPool) {
        let dir = tempfile::tempdir().unwrap();
        let service = EmailService::new(&test_config(dir.path())).unwrap();

        service
            .send_activation_email(&pool, "alice", "alice@example.com", "uid123", "tok456")
            .await
            .unwrap();

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Mails::new(&mut conn);
        let records = repo.list(&crate::db::handlers::mails::MailFilter::new(0, 100)).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, MailKind::Registration);
        assert_eq!(records[0].to_email.as_deref(), Some("alice@example.com"));
        assert!(records[0].body_html.as_deref().unwrap().contains("uid=uid123"));
    }
}
