//! Agent registry endpoints.
//!
//! - `POST /v1/agents/register` — register (or re-register) an agent by name.
//! - `GET  /v1/agents`          — list all known agents.
//! - `GET  /v1/agents/:id`      — get one agent.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use serde::Deserialize;

use crate::http::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterAgentBody {
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

pub async fn register(State(state): State<AppState>, Json(body): Json<RegisterAgentBody>) -> impl IntoResponse {
    let agent = state.store.register_agent(&body.name, &body.endpoint, body.capabilities);
    Json(agent).into_response()
}

pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "agents": state.store.list_agents() }))
}

pub async fn get_one(State(state): State<AppState>, Path(agent_id): Path<String>) -> impl IntoResponse {
    match state.store.get_agent(&agent_id) {
        Some(agent) => Json(agent).into_response(),
        None => error_response(sa_domain::error::Error::NotFound(format!("agent {agent_id}"))),
    }
}
