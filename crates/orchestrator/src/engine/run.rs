//! The run engine: `InvokeAgent`, the agent streaming loop, finalization,
//! and `CancelRun`.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use sa_agent_client::{AgentStreamEvent, InvokeRequest};
use sa_domain::error::{Error, Result};
use sa_domain::ids;
use sa_domain::model::{ErrorPayload, EventType, Role, RunStatus};
use sa_domain::store::CancelOutcome;
use sa_protocol::OutboundFrame;

use crate::state::AppState;

pub struct InvokeAgentOutcome {
    pub run_id: String,
    pub session_id: String,
    pub agent_id: String,
}

/// `InvokeAgent(session_id, agent_id, input_message, context, request_id?)`.
/// Validates inputs, gets-or-creates the session, resolves the agent,
/// creates the run, appends the user message and the two opening events,
/// then hands off to the streaming loop asynchronously and returns
/// immediately with the run id.
pub async fn invoke_agent(
    state: Arc<AppState>,
    session_id: Option<String>,
    agent_id: String,
    user_id: &str,
    message_content: String,
) -> Result<InvokeAgentOutcome> {
    if agent_id.trim().is_empty() {
        return Err(Error::Validation("agent_id is required".to_string()));
    }
    if message_content.trim().is_empty() {
        return Err(Error::Validation("message content must not be empty".to_string()));
    }

    let agent = state
        .store
        .get_agent(&agent_id)
        .ok_or_else(|| Error::NotFound(format!("agent {agent_id}")))?;

    let session = state.store.get_or_create_session(session_id.as_deref(), user_id);
    let run = state.store.create_run(&session.id, &agent.id);

    state
        .store
        .append_message(&session.id, Some(&run.id), Role::User, &message_content);
    state
        .store
        .append_event(&run.id, EventType::RunStarted, serde_json::json!({ "agent_id": agent.id }));
    state.store.append_event(
        &run.id,
        EventType::UserInput,
        serde_json::json!({ "content": message_content }),
    );
    state.store.set_run_running(&run.id)?;

    state.cancel_tokens.create(&run.id);

    let outcome = InvokeAgentOutcome {
        run_id: run.id.clone(),
        session_id: session.id.clone(),
        agent_id: agent.id.clone(),
    };

    let spawn_state = state.clone();
    let run_id = run.id.clone();
    let session_id = session.id.clone();
    let agent_endpoint = agent.endpoint.clone();
    let spawn_agent_id = agent.id.clone();
    tokio::spawn(async move {
        run_streaming_loop(spawn_state, run_id, session_id, spawn_agent_id, agent_endpoint).await;
    });

    Ok(outcome)
}

async fn run_streaming_loop(
    state: Arc<AppState>,
    run_id: String,
    session_id: String,
    agent_id: String,
    agent_endpoint: String,
) {
    state.store.append_event(&run_id, EventType::AgentInvokeStarted, serde_json::json!({}));

    let messages = state.store.list_messages(&session_id, 50);
    let messages_json: Vec<serde_json::Value> = messages
        .iter()
        .map(|m| serde_json::json!({"role": m.role, "content": m.content}))
        .collect();
    let input_message = messages.last().map(|m| m.content.clone()).unwrap_or_default();

    let req = InvokeRequest {
        agent_id: &agent_id,
        session_id: &session_id,
        run_id: &run_id,
        input_message: &input_message,
        messages: &messages_json,
        context: serde_json::Value::Null,
    };

    let agent_timeout = Duration::from_millis(state.config.timeouts.agent_timeout_ms);
    let invoke_url = format!("{agent_endpoint}/invoke");

    let stream_result = tokio::time::timeout(agent_timeout, state.agent_client.invoke_stream(&invoke_url, &req)).await;

    let stream = match stream_result {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            finalize_failed(&state, &run_id, &session_id, ErrorPayload::new("upstream", e.to_string())).await;
            return;
        }
        Err(_) => {
            finalize_failed(
                &state,
                &run_id,
                &session_id,
                ErrorPayload::new("timeout", "agent invoke timed out"),
            )
            .await;
            return;
        }
    };
    tokio::pin!(stream);

    let mut final_message: Option<String> = None;
    let mut usage: Option<serde_json::Value> = None;
    let mut stream_error: Option<ErrorPayload> = None;

    while let Some(event) = stream.next().await {
        if state.cancel_tokens.is_cancelled(&run_id) {
            break;
        }
        match event {
            AgentStreamEvent::Delta { text } => {
                state.store.append_event(
                    &run_id,
                    EventType::AgentStreamDelta,
                    serde_json::json!({ "text": text }),
                );
                push(&state, &session_id, OutboundFrame::Delta {
                    ts: ids::now_ms(),
                    run_id: run_id.clone(),
                    text,
                })
                .await;
            }
            AgentStreamEvent::Done { final_message: fm, usage: u } => {
                final_message = fm;
                usage = u;
                // Per the streaming loop contract, `done` does not terminate
                // the stream by itself; keep reading until it closes.
            }
            AgentStreamEvent::Error { code, message } => {
                stream_error = Some(ErrorPayload::new(code, message));
                break;
            }
            AgentStreamEvent::State => {}
        }
    }

    if state.cancel_tokens.is_cancelled(&run_id) {
        state.cancel_tokens.remove(&run_id);
        return;
    }
    state.cancel_tokens.remove(&run_id);

    if let Some(err) = stream_error {
        finalize_failed(&state, &run_id, &session_id, err).await;
        return;
    }

    state.store.append_event(&run_id, EventType::AgentInvokeDone, serde_json::json!({}));
    if let Some(ref text) = final_message {
        state
            .store
            .append_message(&session_id, Some(&run_id), Role::Assistant, text);
    }
    state.store.append_event(
        &run_id,
        EventType::RunDone,
        serde_json::json!({ "usage": usage }),
    );
    if let Err(e) = state.store.finish_run(&run_id, RunStatus::Done, None) {
        tracing::warn!(run_id, error = %e, "failed to finalize run as done");
    }
    push(&state, &session_id, OutboundFrame::Done {
        ts: ids::now_ms(),
        run_id: run_id.clone(),
        usage,
    })
    .await;
}

async fn finalize_failed(state: &Arc<AppState>, run_id: &str, session_id: &str, error: ErrorPayload) {
    state.store.append_event(
        run_id,
        EventType::RunFailed,
        serde_json::json!({ "code": error.code, "message": error.message }),
    );
    if let Err(e) = state.store.finish_run(run_id, RunStatus::Failed, Some(error.clone())) {
        tracing::warn!(run_id, error = %e, "failed to finalize run as failed");
    }
    state.cancel_tokens.remove(run_id);
    push(state, session_id, OutboundFrame::Error {
        ts: ids::now_ms(),
        request_id: None,
        code: error.code,
        message: error.message,
    })
    .await;
}

async fn push(state: &Arc<AppState>, session_id: &str, frame: OutboundFrame) {
    state.ingress_client.push_event(session_id, frame).await;
}

/// `CancelRun` is idempotent: a terminal run returns success with no
/// side effects; otherwise it writes `CANCELLED`, records `run_cancelled`,
/// and flips the cooperative cancellation token the streaming loop polls.
pub async fn cancel_run(state: &AppState, run_id: &str) -> Result<CancelOutcome> {
    let outcome = state.store.cancel_run(run_id)?;
    if outcome == CancelOutcome::Cancelled {
        state
            .store
            .append_event(run_id, EventType::RunCancelled, serde_json::json!({}));
        state.cancel_tokens.cancel(run_id);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::Config;
    use sa_domain::policy::DefaultPolicyEvaluator;
    use sa_domain::store::InMemoryStore;

    fn test_state() -> Arc<AppState> {
        let store: Arc<dyn sa_domain::store::Store> = Arc::new(InMemoryStore::new());
        Arc::new(AppState {
            config: Arc::new(Config::default()),
            store,
            policy: Arc::new(DefaultPolicyEvaluator::with_defaults()),
            server_tools: Arc::new(crate::server_tools::ServerToolRegistry::with_defaults()),
            agent_client: Arc::new(sa_agent_client::AgentClient::new(Duration::from_secs(5))),
            ingress_client: Arc::new(crate::ingress_client::IngressClient::new("127.0.0.1", 1)),
            api_token_hash: None,
            cancel_tokens: Arc::new(crate::engine::cancel::CancelMap::new()),
        })
    }

    #[tokio::test]
    async fn invoke_agent_rejects_unknown_agent() {
        let state = test_state();
        let err = invoke_agent(state, None, "agt_missing".to_string(), "u1", "hello".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), sa_domain::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn invoke_agent_rejects_empty_content() {
        let state = test_state();
        state.store.register_agent("a1", "http://localhost:1/invoke", vec![]);
        let agent = state.store.list_agents().remove(0);
        let err = invoke_agent(state, None, agent.id, "u1", "   ".to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), sa_domain::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn cancel_run_is_idempotent_no_op_on_terminal() {
        let state = test_state();
        state.store.register_agent("a1", "http://localhost:1/invoke", vec![]);
        let agent = state.store.list_agents().remove(0);
        let session = state.store.get_or_create_session(None, "u1");
        let run = state.store.create_run(&session.id, &agent.id);
        state.store.finish_run(&run.id, RunStatus::Done, None).unwrap();

        let outcome = cancel_run(&state, &run.id).await.unwrap();
        assert_eq!(outcome, CancelOutcome::AlreadyTerminal);
    }
}
