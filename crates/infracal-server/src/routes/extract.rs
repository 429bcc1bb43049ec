//! Extraction job routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use super::{ApiError, ApiResult};
use crate::state::{AppState, ExtractJob};
use crate::worker;
use infracal_core::Error;
use infracal_extract::extractor_for;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/extract", post(start_extraction))
        .route("/extract/jobs", get(list_jobs))
        .route("/extract/jobs/{job_id}", get(get_job))
}

#[derive(Deserialize, Default)]
struct ExtractBody {
    limit: Option<usize>,
    config_id: Option<String>,
    extraction_version: Option<String>,
}

/// POST /api/extract — queue an extraction run over stored pages.
async fn start_extraction(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExtractBody>,
) -> ApiResult<impl IntoResponse> {
    let version = body
        .extraction_version
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| state.config.default_extractor.clone());
    // Reject unknown versions before anything is queued.
    let version = extractor_for(&version)?.version().to_string();

    let job = worker::enqueue(&state, version, body.config_id, body.limit);
    Ok((StatusCode::ACCEPTED, Json(serde_json::json!(job))))
}

/// GET /api/extract/jobs — newest first.
async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let jobs = state.extract_jobs.read();
    let mut all_jobs: Vec<&ExtractJob> = jobs.values().collect();
    all_jobs.sort_by(|a, b| b.queued_at.cmp(&a.queued_at));

    Json(serde_json::json!({
        "jobs": all_jobs,
        "total": all_jobs.len(),
    }))
}

/// GET /api/extract/jobs/{job_id}
async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ExtractJob>> {
    state
        .extract_jobs
        .read()
        .get(&job_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError(Error::NotFound(format!("job {job_id}"))))
}
