//! Extractors for the authenticated caller.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    api::models::users::CurrentUser,
    auth::token::{self, TokenKind},
    errors::{Error, Result},
    AppState,
};

/// Pull a bearer token out of the Authorization header, if any.
fn bearer_token(parts: &Parts) -> Option<Result<&str>> {
    let header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let value = match header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }))
        }
    };

    match value.strip_prefix("Bearer ") {
        Some(token) => Some(Ok(token)),
        None => Some(Err(Error::Unauthenticated {
            message: Some("Authorization header must use the Bearer scheme".to_string()),
        })),
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match bearer_token(parts) {
            Some(Ok(raw)) => {
                let claims = token::verify_token(raw, TokenKind::Access, &state.config)?;
                Ok(CurrentUser::from(claims))
            }
            Some(Err(e)) => Err(e),
            None => Err(Error::Unauthenticated { message: None }),
        }
    }
}

/// Like [`CurrentUser`] but missing credentials are fine. A present-but-
/// invalid token is still rejected. Used by endpoints whose policy may
/// allow anonymous access, and for per-caller cache keying.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match bearer_token(parts) {
            Some(Ok(raw)) => {
                let claims = token::verify_token(raw, TokenKind::Access, &state.config)?;
                Ok(MaybeUser(Some(CurrentUser::from(claims))))
            }
            Some(Err(e)) => Err(e),
            None => Ok(MaybeUser(None)),
        }
    }
}
