//! Registration, login, token lifecycle and password flows.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use crate::{
    api::models::{
        auth::{
            ChangePasswordRequest, EmailVerifyRequest, ForgetPasswordDoneRequest, ForgetPasswordRequest, LoginRequest, LogoutRequest,
            RefreshRequest, RegisterRequest, RegisterResponse, StatusResponse, TokenPairResponse, VerifyTokenRequest,
        },
        users::{CurrentUser, Role},
    },
    auth::{
        password,
        token::{self, TokenKind},
    },
    db::{
        handlers::{Groups, OneTimeTokens, Repository, RevokedTokens, Users},
        models::one_time_tokens::TokenPurpose,
        models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    },
    email::EmailService,
    errors::{Error, Result},
    types::UserId,
    AppState,
};

fn check_password_length(password: &str, state: &AppState) -> Result<()> {
    let rules = &state.config.auth.password;
    if password.len() < rules.min_length {
        return Err(Error::invalid(
            "password",
            format!("Password must have at least {} length!", rules.min_length),
        ));
    }
    if password.len() > rules.max_length {
        return Err(Error::invalid(
            "password",
            format!("Password must be no more than {} characters", rules.max_length),
        ));
    }
    Ok(())
}

async fn hash_on_blocking_thread(password: String) -> Result<String> {
    // Argon2 is deliberately slow; keep it off the async runtime
    tokio::task::spawn_blocking(move || password::hash_string(&password))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password hashing task: {e}"),
        })?
}

async fn verify_on_blocking_thread(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || password::verify_string(&password, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })?
}

/// POST /api/register
///
/// Creates an unverified account, adds it to the default group, sends one
/// activation email and returns a token pair.
#[tracing::instrument(skip_all)]
pub async fn register(State(state): State<AppState>, Json(request): Json<RegisterRequest>) -> Result<(StatusCode, Json<RegisterResponse>)> {
    if !state.config.auth.allow_registration {
        return Err(Error::BadRequest {
            message: "User registration is disabled".to_string(),
        });
    }

    if request.username.trim().is_empty() {
        return Err(Error::invalid("username", "Username is required!"));
    }
    check_password_length(&request.password, &state)?;

    let password_hash = hash_on_blocking_thread(request.password.clone()).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let created_user = {
        let mut user_repo = Users::new(&mut tx);

        if user_repo.get_by_username(&request.username).await?.is_some() {
            return Err(Error::invalid("username", "This username is already registered!"));
        }

        // The username doubles as the account's email address
        user_repo
            .create(&UserCreateDBRequest {
                username: request.username.clone(),
                email: request.username.clone(),
                first_name: request.first_name.clone(),
                last_name: request.last_name.clone(),
                role: Role::Customer,
                is_active: false,
                password_hash: Some(password_hash),
                created_by: None,
            })
            .await?
    };

    // New accounts join the default group
    {
        let mut group_repo = Groups::new(&mut tx);
        let group = group_repo.get_or_create(&state.config.default_group).await?;
        group_repo.add_user(group.id, created_user.id).await?;
    }

    // Single-use activation token, emailed as a link
    let (raw_token, _token) = {
        let mut token_repo = OneTimeTokens::new(&mut tx);
        token_repo
            .create_for_user(created_user.id, TokenPurpose::Activation, &state.config)
            .await?
    };

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    // Delivery happens in the background; the response never waits for it
    let email_service = EmailService::new(&state.config)?;
    let uid = password::encode_uid(&created_user.id);
    email_service.dispatch_activation_email(state.db.clone(), &created_user.username, &created_user.email, &uid, &raw_token);

    state.cache.invalidate_resource("users").await;

    let pair = token::issue_pair(&CurrentUser::from(created_user), &state.config)?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            refresh: pair.refresh,
            access: pair.access,
            message: "User was created successfully and an email verification was sent to the registered email address.".to_string(),
        }),
    ))
}

/// POST /api/login and /api/token
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, Json(request): Json<LoginRequest>) -> Result<Json<TokenPairResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut user_repo = Users::new(&mut conn);

    let invalid_credentials = || Error::Unauthenticated {
        message: Some("Unable to log in with provided credentials.".to_string()),
    };

    let user = user_repo.get_by_email(&request.email).await?.ok_or_else(invalid_credentials)?;

    // Unverified and deactivated accounts cannot log in
    if !user.is_active {
        return Err(invalid_credentials());
    }

    let password_hash = user.password_hash.clone().ok_or_else(invalid_credentials)?;
    let is_valid = verify_on_blocking_thread(request.password.clone(), password_hash).await?;
    if !is_valid {
        return Err(invalid_credentials());
    }

    user_repo
        .update(
            user.id,
            &UserUpdateDBRequest {
                last_login: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

    let pair = token::issue_pair(&CurrentUser::from(user), &state.config)?;
    Ok(Json(TokenPairResponse {
        refresh: pair.refresh,
        access: pair.access,
    }))
}

/// POST /api/token/refresh
///
/// Rotation: the submitted refresh token is blacklisted and a fresh pair is
/// issued. A blacklisted or expired token is refused.
#[tracing::instrument(skip_all)]
pub async fn refresh_token(State(state): State<AppState>, Json(request): Json<RefreshRequest>) -> Result<Json<TokenPairResponse>> {
    let claims = token::verify_token(&request.refresh, TokenKind::Refresh, &state.config)?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut revoked_repo = RevokedTokens::new(&mut conn);

    if revoked_repo.is_revoked(claims.jti).await? {
        return Err(Error::Unauthenticated {
            message: Some("Token is blacklisted".to_string()),
        });
    }

    let token_expires_at = Utc.timestamp_opt(claims.exp, 0).single().unwrap_or_else(Utc::now);
    revoked_repo.revoke(claims.jti, claims.sub, token_expires_at).await?;

    let pair = token::issue_pair(&CurrentUser::from(claims), &state.config)?;
    Ok(Json(TokenPairResponse {
        refresh: pair.refresh,
        access: pair.access,
    }))
}

/// POST /api/token/verify
#[tracing::instrument(skip_all)]
pub async fn verify_token(State(state): State<AppState>, Json(request): Json<VerifyTokenRequest>) -> Result<Json<Value>> {
    // Either half of a pair verifies; refresh tokens also check the
    // blacklist.
    match token::verify_token(&request.token, TokenKind::Access, &state.config) {
        Ok(_) => Ok(Json(json!({}))),
        Err(_) => {
            let claims = token::verify_token(&request.token, TokenKind::Refresh, &state.config)?;

            let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
            let mut revoked_repo = RevokedTokens::new(&mut conn);
            if revoked_repo.is_revoked(claims.jti).await? {
                return Err(Error::Unauthenticated {
                    message: Some("Token is blacklisted".to_string()),
                });
            }

            Ok(Json(json!({})))
        }
    }
}

/// POST /api/token/blacklist
#[tracing::instrument(skip_all)]
pub async fn blacklist_token(State(state): State<AppState>, Json(request): Json<RefreshRequest>) -> Result<Json<Value>> {
    let claims = token::verify_token(&request.refresh, TokenKind::Refresh, &state.config)?;

    let token_expires_at = Utc.timestamp_opt(claims.exp, 0).single().unwrap_or_else(Utc::now);
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    RevokedTokens::new(&mut conn).revoke(claims.jti, claims.sub, token_expires_at).await?;

    Ok(Json(json!({})))
}

/// POST /api/logout - blacklists the submitted refresh token.
#[tracing::instrument(skip_all)]
pub async fn logout(State(state): State<AppState>, user: CurrentUser, Json(request): Json<LogoutRequest>) -> Result<StatusCode> {
    let Some(refresh) = request.refresh else {
        return Err(Error::BadRequest {
            message: "Refresh token must be sent for logging out".to_string(),
        });
    };

    let claims = token::verify_token(&refresh, TokenKind::Refresh, &state.config)?;
    let token_expires_at = Utc.timestamp_opt(claims.exp, 0).single().unwrap_or_else(Utc::now);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    RevokedTokens::new(&mut conn).revoke(claims.jti, user.id, token_expires_at).await?;

    Ok(StatusCode::RESET_CONTENT)
}

/// PUT /api/verify/email
///
/// Transitions an account from unverified to active. The token is single
/// use: a second attempt with the same uid/token fails.
#[tracing::instrument(skip_all)]
pub async fn verify_email(State(state): State<AppState>, Json(request): Json<EmailVerifyRequest>) -> Result<Json<StatusResponse>> {
    let user_id = password::decode_uid(&request.uid)?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let expired = || Error::BadRequest {
        message: "The link expired or there is no such a user.".to_string(),
    };

    let user = {
        let mut user_repo = Users::new(&mut tx);
        user_repo.get_by_id(user_id).await?.ok_or_else(expired)?
    };

    let token = {
        let mut token_repo = OneTimeTokens::new(&mut tx);
        token_repo
            .find_valid_for_user(user.id, TokenPurpose::Activation, &request.token)
            .await?
            .ok_or_else(expired)?
    };

    {
        let mut token_repo = OneTimeTokens::new(&mut tx);
        token_repo.consume(token.id).await?;
    }

    {
        let mut user_repo = Users::new(&mut tx);
        user_repo
            .update(
                user.id,
                &UserUpdateDBRequest {
                    is_active: Some(true),
                    email_verified_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;
    state.cache.invalidate_resource("users").await;

    Ok(Json(StatusResponse::success("User's email was verified successfully.")))
}

/// POST /api/users/forget-password
#[tracing::instrument(skip_all)]
pub async fn forget_password(State(state): State<AppState>, Json(request): Json<ForgetPasswordRequest>) -> Result<Json<StatusResponse>> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let user = {
        let mut user_repo = Users::new(&mut tx);
        user_repo.get_by_email(&request.email).await?.ok_or_else(|| Error::BadRequest {
            message: "There is no user with this email.".to_string(),
        })?
    };

    let (raw_token, _token) = {
        let mut token_repo = OneTimeTokens::new(&mut tx);
        token_repo
            .create_for_user(user.id, TokenPurpose::PasswordReset, &state.config)
            .await?
    };

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let email_service = EmailService::new(&state.config)?;
    let uid = password::encode_uid(&user.id);
    email_service.dispatch_password_reset_email(state.db.clone(), &user.username, &user.email, &uid, &raw_token);

    Ok(Json(StatusResponse::success("A password reset link was sent to your email address.")))
}

/// POST /api/users/forget-password-done
///
/// Redeems a reset link: requires the exact user id plus an unexpired,
/// unconsumed token. Also reactivates the account.
#[tracing::instrument(skip_all)]
pub async fn forget_password_done(
    State(state): State<AppState>,
    Json(request): Json<ForgetPasswordDoneRequest>,
) -> Result<Json<StatusResponse>> {
    check_password_length(&request.new_password, &state)?;

    let user_id = password::decode_uid(&request.uid)?;
    let password_hash = hash_on_blocking_thread(request.new_password.clone()).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let expired = || Error::BadRequest {
        message: "There is no user with this email or link is expired".to_string(),
    };

    let user = {
        let mut user_repo = Users::new(&mut tx);
        user_repo.get_by_id(user_id).await?.ok_or_else(expired)?
    };

    let token = {
        let mut token_repo = OneTimeTokens::new(&mut tx);
        token_repo
            .find_valid_for_user(user.id, TokenPurpose::PasswordReset, &request.token)
            .await?
            .ok_or_else(expired)?
    };

    {
        let mut user_repo = Users::new(&mut tx);
        user_repo
            .update(
                user.id,
                &UserUpdateDBRequest {
                    password_hash: Some(password_hash),
                    is_active: Some(true),
                    ..Default::default()
                },
            )
            .await?;
    }

    {
        // Consume the redeemed token and every other outstanding reset link
        let mut token_repo = OneTimeTokens::new(&mut tx);
        token_repo.consume(token.id).await?;
        token_repo.invalidate_for_user(user.id, TokenPurpose::PasswordReset).await?;
    }

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(Json(StatusResponse::success("User has reset his password.")))
}

/// PUT /api/users/change-password
///
/// Callers change their own password by proving the old one. Elevated
/// callers may pass `user` to set another account's password directly.
/// Either way a fresh token pair for the affected account comes back.
#[tracing::instrument(skip_all)]
pub async fn change_password(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<TokenPairResponse>> {
    check_password_length(&request.password, &state)?;

    let target_id: UserId = match (&request.user, user.is_elevated()) {
        (Some(other), true) => *other,
        (Some(_), false) => {
            return Err(Error::Forbidden {
                action: crate::types::Operation::Update,
                resource: "users".to_string(),
            })
        }
        (None, _) => user.id,
    };

    // Self-service changes must prove the old password and repeat the new
    // one; an elevated caller acting on another account skips both.
    let self_service = target_id == user.id;
    if self_service {
        match &request.re_password {
            Some(re_password) if *re_password == request.password => {}
            Some(_) => return Err(Error::invalid("re_password", "Password and re_password are not matched")),
            None => return Err(Error::invalid("re_password", "This field is required.")),
        }
        if request.old_password.is_none() {
            return Err(Error::invalid("old_password", "This field is required."));
        }
    }

    let password_hash = hash_on_blocking_thread(request.password.clone()).await?;

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;

    let target = {
        let mut user_repo = Users::new(&mut tx);
        let target = user_repo.get_by_id(target_id).await?.ok_or_else(|| Error::NotFound {
            resource: "users".to_string(),
            id: target_id.to_string(),
        })?;

        if self_service {
            let old_password = request.old_password.clone().unwrap_or_default();
            let current_hash = target.password_hash.clone().unwrap_or_default();
            if current_hash.is_empty() || !verify_on_blocking_thread(old_password, current_hash).await? {
                return Err(Error::invalid("old_password", "Wrong password."));
            }
        }

        user_repo
            .update(
                target.id,
                &UserUpdateDBRequest {
                    password_hash: Some(password_hash),
                    ..Default::default()
                },
            )
            .await?
    };

    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    let pair = token::issue_pair(&CurrentUser::from(target), &state.config)?;
    Ok(Json(TokenPairResponse {
        refresh: pair.refresh,
        access: pair.access,
    }))
}
