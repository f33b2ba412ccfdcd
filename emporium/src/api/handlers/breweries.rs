//! Brewery directory proxy.
//!
//! Thin passthrough to a public brewery directory API: filter query
//! parameters are forwarded verbatim and the upstream JSON body is relayed,
//! including 404s on single lookups.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::{
    api::models::users::CurrentUser,
    errors::{Error, Result},
    AppState,
};

/// Filter parameters the upstream directory understands.
const PASSTHROUGH_PARAMS: [&str; 9] = [
    "by_city", "by_dist", "by_ids", "by_name", "by_state", "by_postal", "by_type", "page", "sort",
];

/// GET /api/breweries
#[tracing::instrument(skip_all)]
pub async fn list_breweries(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>> {
    let mut url = state.config.brewery.base_url.clone();
    {
        let mut pairs = url.query_pairs_mut();

        let per_page = params
            .get("per_page")
            .cloned()
            .unwrap_or_else(|| state.config.brewery.default_per_page.to_string());
        pairs.append_pair("per_page", &per_page);

        for name in PASSTHROUGH_PARAMS {
            if let Some(value) = params.get(name) {
                pairs.append_pair(name, value);
            }
        }
    }

    let response = state.http.get(url).send().await.map_err(|e| Error::Internal {
        operation: format!("fetch brewery directory: {e}"),
    })?;

    let body: Value = response.json().await.map_err(|e| Error::Internal {
        operation: format!("decode brewery directory response: {e}"),
    })?;

    Ok(Json(body))
}

/// GET /api/breweries/{id} - single lookup, relaying the upstream 404 body
/// and status as-is.
#[tracing::instrument(skip_all)]
pub async fn get_brewery(
    State(state): State<AppState>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Value>)> {
    let url = format!("{}/{}", state.config.brewery.base_url.as_str().trim_end_matches('/'), id);

    let response = state.http.get(url).send().await.map_err(|e| Error::Internal {
        operation: format!("fetch brewery directory: {e}"),
    })?;

    let status = response.status();
    let body: Value = response.json().await.map_err(|e| Error::Internal {
        operation: format!("decode brewery directory response: {e}"),
    })?;

    if status == reqwest::StatusCode::NOT_FOUND {
        return Ok((StatusCode::NOT_FOUND, Json(body)));
    }

    Ok((StatusCode::OK, Json(body)))
}
