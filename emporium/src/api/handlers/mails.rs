//! Mail record endpoints: CRUD plus bulk fetch and bulk destroy.

use axum::{
    extract::{OriginalUri, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    api::controller::{self, DestroyManyRequest},
    api::models::mails::{ListMailsQuery, MailCreate, MailResponse, MailUpdate},
    auth::current_user::MaybeUser,
    auth::policy::{elevated_or_owner, AccessPolicy},
    db::handlers::Mails,
    db::models::mails::{MailCreateDBRequest, MailUpdateDBRequest},
    errors::{Error, Result},
    types::{Capability, MailId, Operation},
    AppState,
};

/// Anyone logged in can read and create mail records; changing someone
/// else's records takes the elevated role.
fn policy() -> AccessPolicy {
    AccessPolicy::new()
        .with(Operation::List, Capability::Authenticated)
        .with(Operation::Retrieve, Capability::Authenticated)
        .with(Operation::Create, Capability::Authenticated)
        .with(Operation::Update, elevated_or_owner())
        .with(Operation::Destroy, Capability::Elevated)
        .with(Operation::DestroyAll, Capability::Authenticated)
        .with(Operation::GetMany, Capability::Elevated)
}

#[derive(Debug, Deserialize)]
pub struct GetManyQuery {
    /// Comma-separated list of IDs
    pub id: Option<String>,
}

pub(crate) fn parse_id_list(raw: Option<&str>) -> Result<Vec<Uuid>> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };

    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            Uuid::parse_str(s.trim()).map_err(|_| Error::BadRequest {
                message: format!("Invalid id: {s}"),
            })
        })
        .collect()
}

#[tracing::instrument(skip_all)]
pub async fn list_mails(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    MaybeUser(user): MaybeUser,
    Query(query): Query<ListMailsQuery>,
) -> Result<Json<Value>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Mails::new(&mut conn);

    controller::list::<_, MailResponse>(
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
pub async fn get_mail(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    MaybeUser(user): MaybeUser,
    Path(id_or_slug): Path<String>,
) -> Result<Json<Value>> {
    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Mails::new(&mut conn);

    controller::retrieve::<_, MailResponse>(&mut repo, &state.cache, &policy(), user.as_ref(), &uri.to_string(), &id_or_slug).await
}

#[tracing::instrument(skip_all)]
pub async fn create_mail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(create): Json<MailCreate>,
) -> Result<(StatusCode, Json<MailResponse>)> {
    let mut request = MailCreateDBRequest::from(create);
    request.created_by = user.as_ref().map(|u| u.id);

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Mails::new(&mut conn);

    controller::create::<_, MailResponse>(&mut repo, &state.cache, &policy(), user.as_ref(), &request).await
}

#[tracing::instrument(skip_all)]
pub async fn update_mail(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<MailId>,
    Json(update): Json<MailUpdate>,
) -> Result<Json<MailResponse>> {
    let request = MailUpdateDBRequest::from(update);

    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let updated = {
        let mut repo = Mails::new(&mut tx);
        controller::update::<_, MailResponse>(&mut repo, &state.cache, &policy(), user.as_ref(), id, &request).await?
    };
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(updated)
}

#[tracing::instrument(skip_all)]
pub async fn delete_mail(State(state): State<AppState>, MaybeUser(user): MaybeUser, Path(id): Path<MailId>) -> Result<StatusCode> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let status = {
        let mut repo = Mails::new(&mut tx);
        controller::destroy(&mut repo, &state.cache, &policy(), user.as_ref(), id).await?
    };
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(status)
}

#[tracing::instrument(skip_all)]
pub async fn delete_many_mails(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(body): Json<DestroyManyRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let mut tx = state.db.begin().await.map_err(|e| Error::Database(e.into()))?;
    let result = {
        let mut repo = Mails::new(&mut tx);
        controller::destroy_all::<_, MailResponse>(&mut repo, &state.cache, &policy(), user.as_ref(), &body.items).await?
    };
    tx.commit().await.map_err(|e| Error::Database(e.into()))?;

    Ok(result)
}

#[tracing::instrument(skip_all)]
pub async fn get_many_mails(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Query(query): Query<GetManyQuery>,
) -> Result<Json<Vec<MailResponse>>> {
    let ids = parse_id_list(query.id.as_deref())?;

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let mut repo = Mails::new(&mut conn);

    controller::get_many::<_, MailResponse>(&mut repo, &policy(), user.as_ref(), &ids).await
}
