//! Run event replay and session message history.
//!
//! - `GET /v1/runs/:run_id/events`        — keyset-paginated event replay.
//! - `GET /v1/sessions/:session_id/messages` — message history for a session.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Json};
use sa_domain::model::EventType;
use serde::Deserialize;

use crate::http::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub after_ts: Option<i64>,
    pub types: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

pub async fn run_events(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(q): Query<EventsQuery>,
) -> impl IntoResponse {
    let types = q.types.as_deref().map(parse_event_types);
    let limit = q.limit.clamp(1, 500);

    match state.store.get_events(&run_id, q.after_ts, types.as_deref(), limit) {
        Ok(page) => Json(serde_json::json!({
            "events": page.events,
            "has_more": page.has_more,
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn session_messages(State(state): State<AppState>, Path(session_id): Path<String>) -> impl IntoResponse {
    match state.store.get_session(&session_id) {
        Some(_) => Json(serde_json::json!({ "messages": state.store.list_messages(&session_id, 500) })).into_response(),
        None => error_response(sa_domain::error::Error::NotFound(format!("session {session_id}"))),
    }
}

fn parse_event_types(raw: &str) -> Vec<EventType> {
    raw.split(',')
        .filter_map(|s| serde_json::from_value(serde_json::Value::String(s.trim().to_string())).ok())
        .collect()
}
