//! User management endpoints: admin CRUD plus self-service profile routes.

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::{
    api::controller::{self, DestroyManyRequest},
    api::handlers::mails::GetManyQuery,
    api::models::users::{CurrentUser, ListUsersQuery, MeUpdate, UserCreate, UserResponse, UserUpdate},
    auth::current_user::MaybeUser,
    auth::policy::AccessPolicy,
    db::handlers::{Repository, Users},
    db::models::users::{UserCreateDBRequest, UserUpdateDBRequest},
    errors::{Error, Result},
    types::{Capability, Operation, UserId},
    AppState,
};

/// Account administration is elevated-only across the board.
fn policy() -> AccessPolicy {
    AccessPolicy::new()
        .with(Operation::List, Capability::Elevated)
        .with(Operation::Retrieve, Capability::Elevated)
        .with(Operation::Create, Capability::Elevated)
        .with(Operation::Update, Capability::Elevated)
        .with(Operation::Destroy, Capability::Elevated)
        .with(Operation::DestroyAll, Capability::Authenticated)
        .with(Operation::GetMany, Capability::Elevated)
}

#[tracing::instrument(skip_all)]
pub async fn list_users(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    MaybeUser(user): MaybeUser,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<Value>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    controller::list::<_, UserResponse>(
        &mut repo,
        &state.cache,
        &policy(),
        user.as_ref(),
        &uri.to_string(),
        &query.to_filter(),
        &query.pagination,
    )
    .await
}

#[tracing::instrument(skip_all)]
pub async fn get_user(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    MaybeUser(user): MaybeUser,
    Path(id_or_slug): Path<String>,
) -> Result<Json<Value>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    controller::retrieve::<_, UserResponse>(&mut repo, &state.cache, &policy(), user.as_ref(), &uri.to_string(), &id_or_slug).await
}

#[tracing::instrument(skip_all)]
pub async fn create_user(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(create): Json<UserCreate>,
) -> Result<(StatusCode, Json<UserResponse>)> {
    let mut request = UserCreateDBRequest::from(create);
    request.created_by = user.as_ref().map(|u| u.id);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    controller::create::<_, UserResponse>(&mut repo, &state.cache, &policy(), user.as_ref(), &request).await
}

#[tracing::instrument(skip_all)]
pub async fn update_user(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<UserId>,
    Json(update): Json<UserUpdate>,
) -> Result<Json<UserResponse>> {
    let request = UserUpdateDBRequest::from(update);

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let updated = {
        let mut repo = Users::new(&mut tx);
        controller::update::<_, UserResponse>(&mut repo, &state.cache, &policy(), user.as_ref(), id, &request).await?
    };
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(updated)
}

#[tracing::instrument(skip_all)]
pub async fn delete_user(State(state): State<AppState>, MaybeUser(user): MaybeUser, Path(id): Path<UserId>) -> Result<StatusCode> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let status = {
        let mut repo = Users::new(&mut tx);
        controller::destroy(&mut repo, &state.cache, &policy(), user.as_ref(), id).await?
    };
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(status)
}

#[tracing::instrument(skip_all)]
pub async fn delete_many_users(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(body): Json<DestroyManyRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let result = {
        let mut repo = Users::new(&mut tx);
        controller::destroy_all::<_, UserResponse>(&mut repo, &state.cache, &policy(), user.as_ref(), &body.items).await?
    };
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(result)
}

#[tracing::instrument(skip_all)]
pub async fn get_many_users(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<GetManyQuery>,
) -> Result<Json<Vec<UserResponse>>> {
    let ids = super::mails::parse_id_list(query.id.as_deref())?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    controller::get_many::<_, UserResponse>(&mut repo, &policy(), user.as_ref(), &ids).await
}

/// GET /api/users/me - profile of the authenticated caller, fresh from the
/// database rather than from token claims.
#[tracing::instrument(skip_all)]
pub async fn me(State(state): State<AppState>, user: CurrentUser) -> Result<Json<UserResponse>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    let record = repo.get_by_id(user.id).await?.ok_or_else(|| Error::NotFound {
        resource: "users".to_string(),
        id: user.id.to_string(),
    })?;

    Ok(Json(UserResponse::from(record)))
}

/// PUT /api/users/me/update - partial profile update for the caller.
#[tracing::instrument(skip_all)]
pub async fn me_update(State(state): State<AppState>, user: CurrentUser, Json(update): Json<MeUpdate>) -> Result<Json<UserResponse>> {
    let request = UserUpdateDBRequest {
        email: update.email,
        first_name: update.first_name,
        last_name: update.last_name,
        ..Default::default()
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Users::new(&mut conn);

    let updated = repo.update(user.id, &request).await?;
    state.cache.invalidate_resource("users").await;

    Ok(Json(UserResponse::from(updated)))
}
