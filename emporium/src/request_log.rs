//! Access-log middleware.
//!
//! Records one `access_logs` row per inbound API request: path, method, a
//! bounded body snapshot, caller IP, referrer and timestamp. The insert
//! runs on a background task; logging never fails or delays the request.

use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::{db::handlers::AccessLogs, db::models::access_logs::AccessLogCreateRequest, errors::Result, AppState};

/// First address in X-Forwarded-For when present, otherwise the peer
/// address recorded by the listener.
fn client_ip(parts: &Parts) -> Option<String> {
    if let Some(forwarded) = parts.headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return Some(first.to_string());
            }
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

/// Snapshot the request body when it is declared small enough to buffer.
/// Bodies without a Content-Length (streaming uploads) are skipped rather
/// than consumed.
async fn body_snapshot(parts: &Parts, body: Body, max_bytes: usize) -> (Option<String>, Body) {
    let declared_len = parts
        .headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse::<usize>().ok());

    match declared_len {
        Some(len) if len > 0 && len <= max_bytes => match axum::body::to_bytes(body, max_bytes).await {
            Ok(bytes) => {
                let snapshot = String::from_utf8_lossy(&bytes).into_owned();
                (Some(snapshot), Body::from(bytes))
            }
            Err(e) => {
                debug!("Skipping body snapshot: {e}");
                (None, Body::empty())
            }
        },
        _ => (None, body),
    }
}

pub async fn access_log_middleware(State(state): State<AppState>, request: Request, next: Next) -> Result<Response> {
    if !state.config.request_log.enabled {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());
    let method = parts.method.to_string();
    let ip_address = client_ip(&parts);
    let referrer = parts
        .headers
        .get(axum::http::header::REFERER)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let (data, body) = body_snapshot(&parts, body, state.config.request_log.max_body_bytes).await;

    let entry = AccessLogCreateRequest {
        path,
        method,
        data,
        ip_address,
        referrer,
    };

    // Fire and forget: the request does not wait for the row
    let db = state.db.clone();
    tokio::spawn(async move {
        let mut conn = match db.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Access log skipped, no connection: {e}");
                return;
            }
        };
        if let Err(e) = AccessLogs::new(&mut conn).append(&entry).await {
            tracing::warn!("Access log insert failed: {e}");
        }
    });

    let request = Request::from_parts(parts, body);
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts_with_headers(headers: &[(&str, &str)]) -> Parts {
        let mut builder = HttpRequest::builder().uri("http://localhost/api/mails");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (parts, _) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn test_client_ip_prefers_forwarded_header() {
        let parts = parts_with_headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")]);
        assert_eq!(client_ip(&parts), Some("203.0.113.9".to_string()));

        let parts = parts_with_headers(&[]);
        assert_eq!(client_ip(&parts), None);
    }

    #[tokio::test]
    async fn test_body_snapshot_respects_declared_length() {
        let payload = r#"{"email":"a@b.c"}"#;
        let parts = parts_with_headers(&[("content-length", &payload.len().to_string())]);
        let (snapshot, body) = body_snapshot(&parts, Body::from(payload), 1024).await;
        assert_eq!(snapshot.as_deref(), Some(payload));

        // The body is still usable downstream
        let bytes = axum::body::to_bytes(body, 1024).await.unwrap();
        assert_eq!(bytes.as_ref(), payload.as_bytes());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_one_row_per_api_request(pool: sqlx::PgPool) {
        use crate::api::models::users::Role;
        use crate::test_utils::{bearer, create_test_app, create_test_user};

        let server = create_test_app(pool.clone()).await;
        let user = create_test_user(&pool, Role::Customer).await;

        server
            .post("/api/mails")
            .add_header("authorization", bearer(&user))
            .add_header("x-forwarded-for", "203.0.113.9")
            .add_header("referer", "https://app.example.com/")
            .json(&serde_json::json!({"subject": "logged"}))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        // The insert is fire-and-forget; poll for the row
        let entry = {
            let mut found = None;
            for _ in 0..50 {
                let mut conn = pool.acquire().await.unwrap();
                let recent = AccessLogs::new(&mut conn).recent(10).await.unwrap();
                if let Some(entry) = recent.iter().find(|e| e.path == "/api/mails" && e.method == "POST") {
                    found = Some(entry.clone());
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            }
            found.expect("access log row should arrive")
        };

        assert!(entry.data.as_deref().unwrap().contains("logged"));
        assert_eq!(entry.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(entry.referrer.as_deref(), Some("https://app.example.com/"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_disabled_logging_writes_nothing(pool: sqlx::PgPool) {
        use crate::test_utils::create_test_app_with;

        let server = create_test_app_with(pool.clone(), |config| {
            config.request_log.enabled = false;
        })
        .await;

        server.post("/api/login").json(&serde_json::json!({"email": "a@b.c", "password": "x"})).await;
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        let mut conn = pool.acquire().await.unwrap();
        let recent = AccessLogs::new(&mut conn).recent(10).await.unwrap();
        assert!(recent.is_empty());
    }

    #[tokio::test]
    async fn test_body_snapshot_skips_oversized_and_unsized_bodies() {
        let parts = parts_with_headers(&[("content-length", "999999")]);
        let (snapshot, _) = body_snapshot(&parts, Body::from("x".repeat(10)), 1024).await;
        assert!(snapshot.is_none());

        let parts = parts_with_headers(&[]);
        let (snapshot, body) = body_snapshot(&parts, Body::from("stream"), 1024).await;
        assert!(snapshot.is_none());
        // Unsized bodies pass through untouched
        let bytes = axum::body::to_bytes(body, 1024).await.unwrap();
        assert_eq!(bytes.as_ref(), b"stream");
    }
}
