//! Stateless JWT issuance and verification.
//!
//! Every login produces an access/refresh pair. Access tokens authenticate
//! API requests; refresh tokens are exchanged for fresh pairs and are
//! rotated on every refresh, with the spent jti added to the blacklist.

use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::models::users::{CurrentUser, Role},
    config::Config,
    errors::Error,
    types::UserId,
};

/// Which half of a token pair a JWT is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT claims carried by both token kinds.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub jti: Uuid,        // Token id, used for refresh blacklisting
    pub sub: UserId,      // Subject (user ID)
    pub username: String, // Username
    pub email: String,    // User email
    pub role: Role,       // Platform role
    pub token_type: TokenKind,
    pub exp: i64, // Expiration time
    pub iat: i64, // Issued at
}

impl Claims {
    fn new(user: &CurrentUser, kind: TokenKind, config: &Config) -> Self {
        let now = Utc::now();
        let lifetime = match kind {
            TokenKind::Access => config.auth.access_token_lifetime,
            TokenKind::Refresh => config.auth.refresh_token_lifetime,
        };
        let exp = now + lifetime;

        Self {
            jti: Uuid::new_v4(),
            sub: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role,
            token_type: kind,
            exp: exp.timestamp(),
            iat: now.timestamp(),
        }
    }
}

impl From<Claims> for CurrentUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username,
            email: claims.email,
            role: claims.role,
        }
    }
}

/// An issued access/refresh pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

fn secret_key(config: &Config) -> Result<&str, Error> {
    config.secret_key.as_deref().ok_or_else(|| Error::Internal {
        operation: "JWT: secret_key is required".to_string(),
    })
}

fn encode_claims(claims: &Claims, config: &Config) -> Result<String, Error> {
    let key = EncodingKey::from_secret(secret_key(config)?.as_bytes());
    encode(&Header::default(), claims, &key).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Issue a fresh access/refresh pair for a user.
pub fn issue_pair(user: &CurrentUser, config: &Config) -> Result<TokenPair, Error> {
    let access = encode_claims(&Claims::new(user, TokenKind::Access, config), config)?;
    let refresh = encode_claims(&Claims::new(user, TokenKind::Refresh, config), config)?;
    Ok(TokenPair { access, refresh })
}

/// Verify and decode a JWT, checking it is the expected kind.
pub fn verify_token(token: &str, expected: TokenKind, config: &Config) -> Result<Claims, Error> {
    let key = DecodingKey::from_secret(secret_key(config)?.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed tokens, invalid claims, expired tokens
        jsonwebtoken::errors::ErrorKind::InvalidToken
        | jsonwebtoken::errors::ErrorKind::InvalidSignature
        | jsonwebtoken::errors::ErrorKind::ExpiredSignature
        | jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(_)
        | jsonwebtoken::errors::ErrorKind::InvalidIssuer
        | jsonwebtoken::errors::ErrorKind::InvalidAudience
        | jsonwebtoken::errors::ErrorKind::InvalidSubject
        | jsonwebtoken::errors::ErrorKind::ImmatureSignature
        | jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => Error::Unauthenticated {
            message: Some("Token is invalid or expired".to_string()),
        },

        // Server errors (500) - key issues, internal failures
        _ => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },
    })?;

    let claims = token_data.claims;
    if claims.token_type != expected {
        return Err(Error::Unauthenticated {
            message: Some("Token has wrong type".to_string()),
        });
    }

    Ok(claims)
}
