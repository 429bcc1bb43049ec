//! Full-text search over page plain text.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::{blocking, ApiError, ApiResult};
use crate::state::AppState;
use infracal_core::Error;

const DEFAULT_SEARCH_LIMIT: usize = 20;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/search", get(search))
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
    limit: Option<usize>,
}

/// GET /api/search?q= — pages containing every term, best first.
async fn search(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let query = params
        .q
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| ApiError(Error::InvalidInput("q is required".into())))?;
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

    let hits = {
        let query = query.clone();
        blocking(&state, move |s| s.store.search_pages(&query, limit)).await?
    };
    Ok(Json(serde_json::json!({
        "query": query,
        "results": hits,
        "total": hits.len(),
    })))
}
