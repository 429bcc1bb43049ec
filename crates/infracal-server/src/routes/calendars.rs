//! iCalendar feeds, one per crawler config.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;

use super::{blocking, ApiError, ApiResult};
use crate::state::AppState;
use infracal_core::Error;
use infracal_extract::format_ical;
use infracal_store::EventFilter;

const FEED_LIMIT: usize = 50_000;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/calendars/{config_id}", get(get_calendar))
}

/// GET /api/calendars/{config_id} — valid events of one config as `text/calendar`.
async fn get_calendar(
    State(state): State<Arc<AppState>>,
    Path(config_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let filter = EventFilter {
        config_id: Some(config_id.clone()),
        valid: Some(true),
        limit: Some(FEED_LIMIT),
        ..Default::default()
    };
    let events = blocking(&state, move |s| s.store.list_events(&filter)).await?;
    if events.is_empty() {
        return Err(ApiError(Error::NotFound(format!(
            "no valid events for config {config_id}"
        ))));
    }

    let body = format_ical(&events, &config_id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}.ics\"", config_id.replace('"', "")),
            ),
        ],
        body,
    ))
}
