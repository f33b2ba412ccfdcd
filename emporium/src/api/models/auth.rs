//! API request/response models for registration, login and token flows.

use crate::types::UserId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// An access/refresh pair as returned by login, refresh and register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPairResponse {
    pub refresh: String,
    pub access: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub refresh: String,
    pub access: String,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyTokenRequest {
    pub token: String,
}

/// Logout wants a refresh token; its absence is a 400, checked in the
/// handler so the error body stays in the standard shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    pub refresh: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailVerifyRequest {
    pub uid: String,
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgetPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForgetPasswordDoneRequest {
    pub uid: String,
    pub token: String,
    pub new_password: String,
}

/// Change-password payload. An elevated caller may pass `user` to set
/// another account's password without knowing the old one.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
    pub re_password: Option<String>,
    pub old_password: Option<String>,
    pub user: Option<UserId>,
}

/// Generic `{"status": ..., "message": ...}` body used by the flows above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

impl StatusResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }
}
