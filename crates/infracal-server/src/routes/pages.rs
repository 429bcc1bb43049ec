//! Crawled page routes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::{blocking, ApiError, ApiResult};
use crate::state::AppState;
use infracal_core::Error;
use infracal_store::{PageFetch, PageFilter};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/pages",
            post(upsert_page).get(list_pages).delete(delete_pages),
        )
        .route("/pages/batch", post(upsert_pages))
        .route("/pages/{id}", get(get_page).delete(delete_page))
}

/// POST /api/pages — insert or overwrite the page for a url.
async fn upsert_page(
    State(state): State<Arc<AppState>>,
    Json(fetch): Json<PageFetch>,
) -> ApiResult<impl IntoResponse> {
    let page_id = blocking(&state, move |s| s.store.upsert_page(&fetch)).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "page_id": page_id })),
    ))
}

#[derive(Deserialize)]
struct BatchRequest {
    pages: Vec<PageFetch>,
}

/// POST /api/pages/batch — upsert many pages in one transaction.
async fn upsert_pages(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> ApiResult<impl IntoResponse> {
    let page_ids = blocking(&state, move |s| s.store.upsert_pages(&req.pages)).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "page_ids": page_ids, "total": page_ids.len() })),
    ))
}

#[derive(Deserialize)]
struct ListQuery {
    config_id: Option<String>,
    limit: Option<usize>,
}

/// GET /api/pages — page list without bodies.
async fn list_pages(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let filter = PageFilter {
        config_id: q.config_id,
        limit: q.limit,
    };
    let pages = blocking(&state, move |s| s.store.list_pages(&filter)).await?;
    let pages: Vec<_> = pages
        .into_iter()
        .map(|mut p| {
            p.page_content = None;
            p.plain_text = None;
            p
        })
        .collect();
    Ok(Json(serde_json::json!({ "pages": pages, "total": pages.len() })))
}

/// GET /api/pages/{id}
async fn get_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<infracal_store::Page>> {
    blocking(&state, move |s| {
        s.store
            .get_page(id)?
            .ok_or_else(|| Error::NotFound(format!("page {id}")))
    })
    .await
    .map(Json)
}

/// DELETE /api/pages/{id} — removes the page and its events.
async fn delete_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    if blocking(&state, move |s| s.store.delete_page(id)).await? {
        Ok(Json(serde_json::json!({ "deleted": true, "page_id": id })))
    } else {
        Err(ApiError(Error::NotFound(format!("page {id}"))))
    }
}

#[derive(Deserialize)]
struct DeleteQuery {
    config_id: Option<String>,
}

/// DELETE /api/pages?config_id= — removes every page of one crawler config.
async fn delete_pages(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DeleteQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let config_id = q
        .config_id
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError(Error::InvalidInput("config_id is required".into())))?;
    let deleted = blocking(&state, move |s| s.store.delete_pages_by_config(&config_id)).await?;
    Ok(Json(serde_json::json!({ "pages_deleted": deleted })))
}
