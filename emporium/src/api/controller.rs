//! Generic resource controller.
//!
//! Uniform list/retrieve/create/update/destroy/destroy-many/get-many
//! behavior over any [`Repository`], composing the pieces every resource
//! endpoint needs: policy checks, response caching, pagination, filtering
//! and soft deletion. Handlers stay thin: they parse query/body models,
//! build the repository on a connection or transaction of their choosing,
//! and delegate here.
//!
//! Policy checks always run before any data access. Every mutating
//! operation invalidates all cached responses for the resource type before
//! returning.

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    api::models::pagination::{PaginatedResponse, Pagination},
    api::models::users::CurrentUser,
    auth::policy::AccessPolicy,
    cache::ResponseCache,
    db::handlers::repository::{EntityId, Repository},
    errors::{Error, Result},
    types::Operation,
};

/// Body for `DELETE /{resource}/delete-many`.
#[derive(Debug, Clone, Deserialize)]
pub struct DestroyManyRequest {
    pub items: Vec<EntityId>,
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| Error::Internal {
        operation: format!("serialize response: {e}"),
    })
}

/// List with filtering, pagination and caching.
pub async fn list<R, T>(
    repo: &mut R,
    cache: &ResponseCache,
    policy: &AccessPolicy,
    caller: Option<&CurrentUser>,
    request_url: &str,
    filter: &R::Filter,
    pagination: &Pagination,
) -> Result<Json<Value>>
where
    R: Repository + Send,
    T: Serialize + From<R::Response>,
{
    policy.authorize(Operation::List, caller, None, R::RESOURCE)?;

    let key = ResponseCache::key(R::RESOURCE, request_url, caller.map(|u| u.id));
    if let Some(cached) = cache.get(R::RESOURCE, &key).await {
        return Ok(Json(cached));
    }

    let rows = repo.list(filter).await?;
    let count = repo.count(filter).await?;
    let results: Vec<T> = rows.into_iter().map(T::from).collect();
    let envelope = to_value(&PaginatedResponse::new(results, count, pagination))?;

    cache.insert(R::RESOURCE, key, envelope.clone()).await;
    Ok(Json(envelope))
}

/// Retrieve one record by primary key, or by slug for resources that have
/// one. Cached like list responses.
pub async fn retrieve<R, T>(
    repo: &mut R,
    cache: &ResponseCache,
    policy: &AccessPolicy,
    caller: Option<&CurrentUser>,
    request_url: &str,
    id_or_slug: &str,
) -> Result<Json<Value>>
where
    R: Repository + Send,
    T: Serialize + From<R::Response>,
{
    policy.authorize(Operation::Retrieve, caller, None, R::RESOURCE)?;

    let key = ResponseCache::key(R::RESOURCE, request_url, caller.map(|u| u.id));
    if let Some(cached) = cache.get(R::RESOURCE, &key).await {
        return Ok(Json(cached));
    }

    let record = match Uuid::parse_str(id_or_slug) {
        Ok(id) => repo.get_by_id(id).await?,
        Err(_) => repo.get_by_slug(id_or_slug).await?,
    };

    let Some(record) = record else {
        return Err(Error::NotFound {
            resource: R::RESOURCE.to_string(),
            id: id_or_slug.to_string(),
        });
    };

    let value = to_value(&T::from(record))?;
    cache.insert(R::RESOURCE, key, value.clone()).await;
    Ok(Json(value))
}

/// Create a record. The payload is validated by the caller before it turns
/// into a repository request.
pub async fn create<R, T>(
    repo: &mut R,
    cache: &ResponseCache,
    policy: &AccessPolicy,
    caller: Option<&CurrentUser>,
    request: &R::CreateRequest,
) -> Result<(StatusCode, Json<T>)>
where
    R: Repository + Send,
    T: Serialize + From<R::Response>,
{
    policy.authorize(Operation::Create, caller, None, R::RESOURCE)?;

    let created = repo.create(request).await?;
    cache.invalidate_resource(R::RESOURCE).await;

    Ok((StatusCode::CREATED, Json(T::from(created))))
}

/// Update a record. Partial semantics: absent fields stay untouched, and
/// full updates go through the same path. The ownership check runs against
/// the stored record before anything is written.
pub async fn update<R, T>(
    repo: &mut R,
    cache: &ResponseCache,
    policy: &AccessPolicy,
    caller: Option<&CurrentUser>,
    id: EntityId,
    request: &R::UpdateRequest,
) -> Result<Json<T>>
where
    R: Repository + Send,
    T: Serialize + From<R::Response>,
{
    let existing = repo.get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: R::RESOURCE.to_string(),
        id: id.to_string(),
    })?;

    policy.authorize(Operation::Update, caller, R::owner_of(&existing), R::RESOURCE)?;

    let updated = repo.update(id, request).await?;
    cache.invalidate_resource(R::RESOURCE).await;

    Ok(Json(T::from(updated)))
}

/// Soft-delete a record, stamping the acting user and timestamp.
pub async fn destroy<R>(
    repo: &mut R,
    cache: &ResponseCache,
    policy: &AccessPolicy,
    caller: Option<&CurrentUser>,
    id: EntityId,
) -> Result<StatusCode>
where
    R: Repository + Send,
{
    let existing = repo.get_by_id(id).await?.ok_or_else(|| Error::NotFound {
        resource: R::RESOURCE.to_string(),
        id: id.to_string(),
    })?;

    policy.authorize(Operation::Destroy, caller, R::owner_of(&existing), R::RESOURCE)?;

    repo.soft_delete(id, caller.map(|u| u.id)).await?;
    cache.invalidate_resource(R::RESOURCE).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Bulk soft-delete. Each id is deleted only when the caller is elevated or
/// owns the record; the response itemizes both outcomes. The whole call is
/// expected to run inside one transaction owned by the handler.
///
/// Status is 401 only when every single item was refused, 400 when none of
/// the ids exist at all.
pub async fn destroy_all<R, T>(
    repo: &mut R,
    cache: &ResponseCache,
    policy: &AccessPolicy,
    caller: Option<&CurrentUser>,
    ids: &[EntityId],
) -> Result<(StatusCode, Json<Value>)>
where
    R: Repository + Send,
    T: Serialize + From<R::Response>,
{
    policy.authorize(Operation::DestroyAll, caller, None, R::RESOURCE)?;

    if ids.is_empty() {
        return Err(Error::BadRequest {
            message: "items must not be empty".to_string(),
        });
    }

    let elevated = caller.map(|u| u.is_elevated()).unwrap_or(false);
    let mut deleted_items: Vec<T> = Vec::new();
    let mut un_deleted_items: Vec<EntityId> = Vec::new();
    let mut any_found = false;

    for &id in ids {
        match repo.get_by_id(id).await? {
            Some(record) => {
                any_found = true;
                let owned = matches!((caller, R::owner_of(&record)), (Some(user), Some(owner)) if user.id == owner);
                if elevated || owned {
                    repo.soft_delete(id, caller.map(|u| u.id)).await?;
                    deleted_items.push(T::from(record));
                } else {
                    un_deleted_items.push(id);
                }
            }
            None => un_deleted_items.push(id),
        }
    }

    if !any_found {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "status": "error",
                "message": "entry not found",
                "items": ids,
            })),
        ));
    }

    if deleted_items.is_empty() {
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": "error",
                "message": "Unauthorized attempts",
                "items": ids,
            })),
        ));
    }

    cache.invalidate_resource(R::RESOURCE).await;

    Ok((
        StatusCode::OK,
        Json(json!({
            "status": "success",
            "message": "Destroying many items was successful.",
            "deleted_items": deleted_items,
            "un_deleted_items": un_deleted_items,
        })),
    ))
}

/// Bulk fetch by id list, elevated-only by policy. 404 when nothing
/// matches.
pub async fn get_many<R, T>(repo: &mut R, policy: &AccessPolicy, caller: Option<&CurrentUser>, ids: &[EntityId]) -> Result<Json<Vec<T>>>
where
    R: Repository + Send,
    T: Serialize + From<R::Response>,
{
    policy.authorize(Operation::GetMany, caller, None, R::RESOURCE)?;

    let mut found = repo.get_bulk(ids).await?;
    if found.is_empty() {
        return Err(Error::NotFound {
            resource: R::RESOURCE.to_string(),
            id: ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(","),
        });
    }

    // Preserve the order the ids were requested in
    let results: Vec<T> = ids.iter().filter_map(|id| found.remove(id)).map(T::from).collect();
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::mails::MailResponse;
    use crate::api::models::users::Role;
    use crate::auth::policy::elevated_or_owner;
    use crate::config::CacheConfig;
    use crate::db::handlers::mails::{MailFilter, Mails};
    use crate::db::models::mails::MailCreateDBRequest;
    use crate::types::Capability;
    use sqlx::PgPool;

    fn test_cache() -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            never_cached: vec![],
            ..Default::default()
        })
    }

    fn caller(role: Role) -> CurrentUser {
        CurrentUser {
            id: Uuid::new_v4(),
            username: "caller".to_string(),
            email: "caller@example.com".to_string(),
            role,
        }
    }

    fn mail_request(subject: &str, created_by: Option<Uuid>) -> MailCreateDBRequest {
        MailCreateDBRequest {
            kind: crate::api::models::mails::MailKind::Generic,
            subject: Some(subject.to_string()),
            template: None,
            body_html: None,
            to_email: None,
            bcc: None,
            cc: None,
            from_email: None,
            from_user: None,
            created_by,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_caches_until_mutation(pool: PgPool) {
        let cache = test_cache();
        let policy = AccessPolicy::new();
        let admin = caller(Role::Admin);

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Mails::new(&mut conn);
        repo.create(&mail_request("first", None)).await.unwrap();

        let url = "/api/mails";
        let filter = MailFilter::new(0, 100);
        let pagination = Pagination::default();

        let first = list::<_, MailResponse>(&mut repo, &cache, &policy, Some(&admin), url, &filter, &pagination)
            .await
            .unwrap();
        assert_eq!(first.0["count"], json!(1));

        // A row inserted behind the controller's back is invisible: the
        // cached payload is still served
        repo.create(&mail_request("second", None)).await.unwrap();
        let stale = list::<_, MailResponse>(&mut repo, &cache, &policy, Some(&admin), url, &filter, &pagination)
            .await
            .unwrap();
        assert_eq!(stale.0["count"], json!(1));

        // A controller-level mutation invalidates, so the next list is fresh
        let (status, _) = create::<_, MailResponse>(&mut repo, &cache, &policy, Some(&admin), &mail_request("third", None))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let after = list::<_, MailResponse>(&mut repo, &cache, &policy, Some(&admin), url, &filter, &pagination)
            .await
            .unwrap();
        assert_eq!(after.0["count"], json!(3));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_retrieve_found_and_missing(pool: PgPool) {
        let cache = test_cache();
        let policy = AccessPolicy::new();

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Mails::new(&mut conn);
        let mail = repo.create(&mail_request("hello", None)).await.unwrap();

        let found = retrieve::<_, MailResponse>(&mut repo, &cache, &policy, None, "/api/mails/x", &mail.id.to_string())
            .await
            .unwrap();
        assert_eq!(found.0["subject"], json!("hello"));

        let missing = retrieve::<_, MailResponse>(&mut repo, &cache, &policy, None, "/api/mails/y", &Uuid::new_v4().to_string()).await;
        assert!(matches!(missing.unwrap_err(), Error::NotFound { .. }));

        // Non-UUID path params fall through to the (absent) slug lookup
        let slug = retrieve::<_, MailResponse>(&mut repo, &cache, &policy, None, "/api/mails/z", "some-slug").await;
        assert!(matches!(slug.unwrap_err(), Error::NotFound { .. }));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_destroy_requires_elevated_by_default(pool: PgPool) {
        let cache = test_cache();
        let policy = AccessPolicy::new();
        let customer = caller(Role::Customer);
        let admin = caller(Role::Admin);

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Mails::new(&mut conn);
        let mail = repo.create(&mail_request("target", None)).await.unwrap();

        let refused = destroy(&mut repo, &cache, &policy, Some(&customer), mail.id).await;
        assert!(matches!(refused.unwrap_err(), Error::Forbidden { .. }));
        // Refused means untouched
        assert!(repo.get_by_id(mail.id).await.unwrap().is_some());

        let status = destroy(&mut repo, &cache, &policy, Some(&admin), mail.id).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(repo.get_by_id(mail.id).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_allows_owner(pool: PgPool) {
        let cache = test_cache();
        let policy = AccessPolicy::new().with(Operation::Update, elevated_or_owner());
        let owner = caller(Role::Customer);
        let stranger = caller(Role::Customer);

        let mut conn = pool.acquire().await.unwrap();

        // The owner reference must point at a real user row
        let owner_id = {
            let mut users = crate::db::handlers::Users::new(&mut conn);
            crate::db::handlers::Repository::create(
                &mut users,
                &crate::db::models::users::UserCreateDBRequest {
                    username: "owner".to_string(),
                    email: "owner@example.com".to_string(),
                    first_name: None,
                    last_name: None,
                    role: Role::Customer,
                    is_active: true,
                    password_hash: None,
                    created_by: None,
                },
            )
            .await
            .unwrap()
            .id
        };
        let owner = CurrentUser { id: owner_id, ..owner };

        let mut repo = Mails::new(&mut conn);
        let mail = repo.create(&mail_request("owned", Some(owner_id))).await.unwrap();

        let update_req = crate::db::models::mails::MailUpdateDBRequest {
            subject: Some("changed".to_string()),
            ..Default::default()
        };

        let refused = update::<_, MailResponse>(&mut repo, &cache, &policy, Some(&stranger), mail.id, &update_req).await;
        assert!(matches!(refused.unwrap_err(), Error::Forbidden { .. }));

        let accepted = update::<_, MailResponse>(&mut repo, &cache, &policy, Some(&owner), mail.id, &update_req)
            .await
            .unwrap();
        assert_eq!(accepted.0.subject.as_deref(), Some("changed"));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_destroy_all_partitions_by_ownership(pool: PgPool) {
        let cache = test_cache();
        let policy = AccessPolicy::new().with(Operation::DestroyAll, Capability::Authenticated);

        let mut conn = pool.acquire().await.unwrap();

        let owner_id = {
            let mut users = crate::db::handlers::Users::new(&mut conn);
            crate::db::handlers::Repository::create(
                &mut users,
                &crate::db::models::users::UserCreateDBRequest {
                    username: "bulkowner".to_string(),
                    email: "bulkowner@example.com".to_string(),
                    first_name: None,
                    last_name: None,
                    role: Role::Customer,
                    is_active: true,
                    password_hash: None,
                    created_by: None,
                },
            )
            .await
            .unwrap()
            .id
        };
        let owner = CurrentUser {
            id: owner_id,
            username: "bulkowner".to_string(),
            email: "bulkowner@example.com".to_string(),
            role: Role::Customer,
        };

        let mut repo = Mails::new(&mut conn);
        let mine = repo.create(&mail_request("mine", Some(owner_id))).await.unwrap();
        let theirs = repo.create(&mail_request("theirs", None)).await.unwrap();
        let ghost = Uuid::new_v4();

        let ids = vec![mine.id, theirs.id, ghost];
        let (status, body) = destroy_all::<_, MailResponse>(&mut repo, &cache, &policy, Some(&owner), &ids)
            .await
            .unwrap();

        // Exactly the owned record was deleted; the rest are itemized
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.0["status"], json!("success"));
        assert_eq!(body.0["deleted_items"].as_array().unwrap().len(), 1);
        assert_eq!(body.0["un_deleted_items"].as_array().unwrap().len(), 2);
        assert!(repo.get_by_id(mine.id).await.unwrap().is_none());
        assert!(repo.get_by_id(theirs.id).await.unwrap().is_some());

        // All-refused turns into a 401 with the submitted ids echoed back
        let (status, body) = destroy_all::<_, MailResponse>(&mut repo, &cache, &policy, Some(&owner), &[theirs.id])
            .await
            .unwrap();
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body.0["status"], json!("error"));

        // Nothing-exists turns into a 400
        let (status, _) = destroy_all::<_, MailResponse>(&mut repo, &cache, &policy, Some(&owner), &[Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_many_is_elevated_only(pool: PgPool) {
        let policy = AccessPolicy::new().with(Operation::GetMany, Capability::Elevated);
        let admin = caller(Role::Admin);
        let customer = caller(Role::Customer);

        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Mails::new(&mut conn);
        let a = repo.create(&mail_request("a", None)).await.unwrap();
        let b = repo.create(&mail_request("b", None)).await.unwrap();

        let refused = get_many::<_, MailResponse>(&mut repo, &policy, Some(&customer), &[a.id]).await;
        assert!(matches!(refused.unwrap_err(), Error::Forbidden { .. }));

        let results = get_many::<_, MailResponse>(&mut repo, &policy, Some(&admin), &[b.id, a.id]).await.unwrap();
        assert_eq!(results.0.len(), 2);
        // Request order is preserved
        assert_eq!(results.0[0].id, b.id);

        let missing = get_many::<_, MailResponse>(&mut repo, &policy, Some(&admin), &[Uuid::new_v4()]).await;
        assert!(matches!(missing.unwrap_err(), Error::NotFound { .. }));
    }
}
