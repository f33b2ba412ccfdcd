//! Database repository for the append-only access log.

use sqlx::PgConnection;
use tracing::instrument;

use crate::db::{
    errors::Result,
    models::access_logs::{AccessLogCreateRequest, AccessLogEntry},
};

pub struct AccessLogs<'c> {
    db: &'c mut PgConnection,
}

impl<'c> AccessLogs<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Append one row. Rows are never updated or deleted.
    #[instrument(skip(self, request), fields(path = %request.path, method = %request.method), err)]
    pub async fn append(&mut self, request: &AccessLogCreateRequest) -> Result<AccessLogEntry> {
        let entry = sqlx::query_as::<_, AccessLogEntry>(
            r#"
            INSERT INTO access_logs (path, method, data, ip_address, referrer)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&request.path)
        .bind(&request.method)
        .bind(&request.data)
        .bind(&request.ip_address)
        .bind(&request.referrer)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(entry)
    }

    #[instrument(skip(self), err)]
    pub async fn recent(&mut self, limit: i64) -> Result<Vec<AccessLogEntry>> {
        let entries = sqlx::query_as::<_, AccessLogEntry>("SELECT * FROM access_logs ORDER BY sys_id DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    #[sqlx::test]
    #[test_log::test]
    async fn test_append_and_read_back(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = AccessLogs::new(&mut conn);

        let entry = repo
            .append(&AccessLogCreateRequest {
                path: "/api/mails".to_string(),
                method: "GET".to_string(),
                data: None,
                ip_address: Some("203.0.113.9".to_string()),
                referrer: Some("https://app.example.com".to_string()),
            })
            .await
            .unwrap();

        assert!(entry.sys_id > 0);
        assert_eq!(entry.method, "GET");

        let recent = repo.recent(10).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].path, "/api/mails");
    }
}
