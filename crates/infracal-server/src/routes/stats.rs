//! Stats and health routes.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use super::{blocking, ApiResult};
use crate::state::{AppState, JobStatus};
use infracal_extract::VERSIONS;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(get_stats))
        .route("/health", get(health))
}

/// GET /api/stats — storage statistics and queue depth.
async fn get_stats(State(state): State<Arc<AppState>>) -> ApiResult<Json<serde_json::Value>> {
    let stats = blocking(&state, |s| s.store.get_stats()).await?;

    Ok(Json(serde_json::json!({
        "pages": stats.pages,
        "events": stats.events,
        "validEvents": stats.valid_events,
        "eventsByVersion": stats.events_by_version,
        "migrationsApplied": stats.migrations_applied,
        "dbSizeMb": stats.db_size_mb,
        "defaultExtractor": state.config.default_extractor,
        "extractors": VERSIONS,
        "extractQueue": {
            "queued": state.jobs_with_status(JobStatus::Queued),
            "processing": state.jobs_with_status(JobStatus::Processing),
        },
    })))
}

/// GET /api/health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "infracal",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
