//! Event read routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use super::{blocking, ApiResult};
use crate::state::AppState;
use infracal_core::Error;
use infracal_store::{Event, EventFilter};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(list_events))
        .route("/events/{id}", get(get_event))
}

#[derive(Deserialize)]
struct EventsQuery {
    valid: Option<bool>,
    version: Option<String>,
    page_id: Option<i64>,
    config_id: Option<String>,
    q: Option<String>,
    limit: Option<usize>,
}

/// GET /api/events — filter by validity, extractor version, page, or a
/// full-text match on the owning page.
async fn list_events(
    State(state): State<Arc<AppState>>,
    Query(q): Query<EventsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let filter = EventFilter {
        page_id: q.page_id,
        valid: q.valid,
        extraction_version: q.version,
        config_id: q.config_id,
        query: q.q.filter(|s| !s.trim().is_empty()),
        limit: q.limit,
    };
    let events = blocking(&state, move |s| s.store.list_events(&filter)).await?;
    Ok(Json(serde_json::json!({
        "events": events,
        "total": events.len(),
    })))
}

/// GET /api/events/{id}
async fn get_event(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Event>> {
    blocking(&state, move |s| {
        s.store
            .get_event(id)?
            .ok_or_else(|| Error::NotFound(format!("event {id}")))
    })
    .await
    .map(Json)
}
