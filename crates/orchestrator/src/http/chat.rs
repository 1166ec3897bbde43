//! OpenAI-compatible shim.
//!
//! `POST /v1/chat/completions` translates a standard OpenAI chat request
//! into an `InvokeAgent` call against the run engine, blocks until the run
//! reaches a terminal status, and re-shapes the result as an OpenAI
//! `ChatCompletion` response. `GET /v1/models` lists registered agents as
//! if they were models.
//!
//! Streaming (`stream: true`) is not implemented: the run engine pushes
//! deltas to Ingress, not to the HTTP caller, so an OpenAI-shaped SSE
//! stream has no event source to draw from here.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use serde::{Deserialize, Serialize};

use sa_domain::error::Error;
use sa_domain::model::{Role, RunStatus};

use crate::engine::run::invoke_agent;
use crate::http::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct OpenAIChatRequest {
    pub model: String,
    pub messages: Vec<OpenAIMessage>,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub user: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
struct OpenAIChatResponse {
    id: String,
    object: &'static str,
    created: i64,
    model: String,
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Serialize)]
struct OpenAIChoice {
    index: u32,
    message: OpenAIResponseMessage,
    finish_reason: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAIResponseMessage {
    role: &'static str,
    content: String,
}

const WAIT_TIMEOUT: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub async fn chat_completions(
    State(state): State<AppState>,
    Json(body): Json<OpenAIChatRequest>,
) -> impl IntoResponse {
    if body.stream {
        return error_response(Error::Validation(
            "stream=true is not supported; deltas are pushed to ingress, not this endpoint".to_string(),
        ));
    }

    let user_message = match extract_last_user_message(&body.messages) {
        Some(m) => m,
        None => {
            return error_response(Error::Validation(
                "no user message found in messages array".to_string(),
            ))
        }
    };

    let agent_id = match resolve_agent_id(&state, &body.model) {
        Some(id) => id,
        None => return error_response(Error::NotFound(format!("agent/model {}", body.model))),
    };

    let user_id = body.user.unwrap_or_else(|| "openai-compat".to_string());
    let model = body.model.clone();

    let outcome = match invoke_agent(Arc::new(state.clone()), None, agent_id, &user_id, user_message).await {
        Ok(o) => o,
        Err(e) => return error_response(e),
    };

    let run = match wait_for_terminal_run(&state, &outcome.run_id).await {
        Some(r) => r,
        None => {
            return error_response(Error::Timeout(format!(
                "run {} did not finish within the chat completion wait budget",
                outcome.run_id
            )))
        }
    };

    match run.status {
        RunStatus::Done => {
            let content = last_assistant_message(&state, &outcome.session_id).unwrap_or_default();
            let response = OpenAIChatResponse {
                id: format!("chatcmpl-{}", outcome.run_id),
                object: "chat.completion",
                created: sa_domain::ids::now_ms() / 1000,
                model,
                choices: vec![OpenAIChoice {
                    index: 0,
                    message: OpenAIResponseMessage { role: "assistant", content },
                    finish_reason: "stop",
                }],
            };
            Json(response).into_response()
        }
        RunStatus::Cancelled => error_response(Error::Internal("run was cancelled".to_string())),
        _ => {
            let message = run
                .error
                .map(|e| e.message)
                .unwrap_or_else(|| "run failed".to_string());
            error_response(Error::Upstream(message))
        }
    }
}

pub async fn list_models(State(state): State<AppState>) -> impl IntoResponse {
    let agents = state.store.list_agents();
    let data: Vec<serde_json::Value> = agents
        .into_iter()
        .map(|a| {
            serde_json::json!({
                "id": a.id,
                "object": "model",
                "created": a.created_at / 1000,
                "owned_by": a.name,
            })
        })
        .collect();
    Json(serde_json::json!({ "object": "list", "data": data }))
}

fn extract_last_user_message(messages: &[OpenAIMessage]) -> Option<String> {
    messages.iter().rev().find(|m| m.role == "user").map(|m| m.content.clone())
}

/// `model` may be either an agent id or an agent name; names are matched
/// first since that is the more natural OpenAI-client-facing spelling.
fn resolve_agent_id(state: &AppState, model: &str) -> Option<String> {
    let agents = state.store.list_agents();
    if let Some(a) = agents.iter().find(|a| a.name == model) {
        return Some(a.id.clone());
    }
    agents.iter().find(|a| a.id == model).map(|a| a.id.clone())
}

async fn wait_for_terminal_run(state: &AppState, run_id: &str) -> Option<sa_domain::model::Run> {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if let Some(run) = state.store.get_run(run_id) {
            if run.status.is_terminal() {
                return Some(run);
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn last_assistant_message(state: &AppState, session_id: &str) -> Option<String> {
    state
        .store
        .list_messages(session_id, 50)
        .into_iter()
        .rev()
        .find(|m| m.role == Role::Assistant)
        .map(|m| m.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::Config;
    use sa_domain::policy::DefaultPolicyEvaluator;
    use sa_domain::store::InMemoryStore;

    fn test_state() -> AppState {
        let store: Arc<dyn sa_domain::store::Store> = Arc::new(InMemoryStore::new());
        AppState {
            config: Arc::new(Config::default()),
            store,
            policy: Arc::new(DefaultPolicyEvaluator::with_defaults()),
            server_tools: Arc::new(crate::server_tools::ServerToolRegistry::with_defaults()),
            agent_client: Arc::new(sa_agent_client::AgentClient::new(Duration::from_secs(5))),
            ingress_client: Arc::new(crate::ingress_client::IngressClient::new("127.0.0.1", 1)),
            api_token_hash: None,
            cancel_tokens: Arc::new(crate::engine::cancel::CancelMap::new()),
        }
    }

    #[test]
    fn extract_last_user_message_picks_final_user_turn() {
        let messages = vec![
            OpenAIMessage { role: "system".to_string(), content: "be nice".to_string() },
            OpenAIMessage { role: "user".to_string(), content: "first".to_string() },
            OpenAIMessage { role: "assistant".to_string(), content: "ack".to_string() },
            OpenAIMessage { role: "user".to_string(), content: "second".to_string() },
        ];
        assert_eq!(extract_last_user_message(&messages), Some("second".to_string()));
    }

    #[test]
    fn extract_last_user_message_none_when_no_user_turn() {
        let messages = vec![OpenAIMessage { role: "system".to_string(), content: "be nice".to_string() }];
        assert_eq!(extract_last_user_message(&messages), None);
    }

    #[test]
    fn resolve_agent_id_matches_by_name_then_id() {
        let state = test_state();
        let agent = state.store.register_agent("helper", "http://localhost:1/invoke", vec![]);
        assert_eq!(resolve_agent_id(&state, "helper"), Some(agent.id.clone()));
        assert_eq!(resolve_agent_id(&state, &agent.id), Some(agent.id));
        assert_eq!(resolve_agent_id(&state, "nonexistent"), None);
    }

    #[tokio::test]
    async fn wait_for_terminal_run_returns_none_on_a_run_that_never_finishes() {
        let state = test_state();
        let agent = state.store.register_agent("helper", "http://localhost:1/invoke", vec![]);
        let session = state.store.get_or_create_session(None, "u1");
        let run = state.store.create_run(&session.id, &agent.id);
        // never calls finish_run; the wait must give up once the deadline passes.
        let deadline = tokio::time::Instant::now() + Duration::from_millis(120);
        let result = loop {
            if let Some(r) = state.store.get_run(&run.id) {
                if r.status.is_terminal() {
                    break Some(r);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                break None;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        };
        assert!(result.is_none());
    }
}
