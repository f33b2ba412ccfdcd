//! Database models for the append-only access log.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// A single inbound request, as captured by the access-log middleware.
#[derive(Debug, Clone)]
pub struct AccessLogCreateRequest {
    pub path: String,
    pub method: String,
    pub data: Option<String>,
    pub ip_address: Option<String>,
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, FromRow)]
pub struct AccessLogEntry {
    pub sys_id: i64,
    pub path: String,
    pub method: String,
    pub data: Option<String>,
    pub ip_address: Option<String>,
    pub referrer: Option<String>,
    pub timestamp: DateTime<Utc>,
}
