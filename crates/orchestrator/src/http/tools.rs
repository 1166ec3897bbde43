//! Direct tool invocation surface for operators/agents calling the
//! orchestrator's HTTP API directly (as opposed to going through a run's
//! own agent-driven tool calls).
//!
//! - `POST /v1/tools/:tool_name/invoke`      — `InvokeTool`.
//! - `GET  /v1/tool_calls/:tool_call_id`      — current projection.
//! - `POST /v1/tool_calls/:tool_call_id/wait` — long-poll until terminal or timeout.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::engine::tool::invoke_tool;
use crate::http::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct InvokeToolBody {
    pub run_id: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

pub async fn invoke(
    State(state): State<AppState>,
    Path(tool_name): Path<String>,
    Json(body): Json<InvokeToolBody>,
) -> impl IntoResponse {
    match invoke_tool(&state, &body.run_id, &tool_name, body.args, body.idempotency_key, body.timeout_ms).await {
        Ok(projection) => Json(projection).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn get_tool_call(State(state): State<AppState>, Path(tool_call_id): Path<String>) -> impl IntoResponse {
    match state.store.get_tool_call(&tool_call_id) {
        Some(tc) => Json(tc.projection()).into_response(),
        None => error_response(sa_domain::error::Error::NotFound(format!("tool call {tool_call_id}"))),
    }
}

#[derive(Debug, Deserialize)]
pub struct WaitQuery {
    #[serde(default = "default_wait_ms")]
    pub timeout_ms: u64,
}

fn default_wait_ms() -> u64 {
    10_000
}

/// Poll the store every 50ms until the tool call reaches a terminal
/// status or the wait budget elapses, whichever comes first — not a
/// push-based wait, since the store has no subscription API.
pub async fn wait(
    State(state): State<AppState>,
    Path(tool_call_id): Path<String>,
    axum::extract::Query(q): axum::extract::Query<WaitQuery>,
) -> impl IntoResponse {
    let deadline = tokio::time::Instant::now() + Duration::from_millis(q.timeout_ms);
    loop {
        match state.store.get_tool_call(&tool_call_id) {
            None => return error_response(sa_domain::error::Error::NotFound(format!("tool call {tool_call_id}"))),
            Some(tc) if tc.status.is_terminal() || tokio::time::Instant::now() >= deadline => {
                return Json(tc.projection()).into_response();
            }
            Some(_) => {}
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
