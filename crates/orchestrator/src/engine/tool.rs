//! The tool-call engine: `InvokeTool` and `SubmitToolResult`.

use sa_domain::error::{Error, Result};
use sa_domain::ids;
use sa_domain::model::{ErrorPayload, EventType, ToolCall, ToolCallStatus, ToolKind};
use sa_domain::policy::{PolicyDecision, PolicyRequest};
use sa_protocol::client::summarize_args;
use sa_protocol::OutboundFrame;

use crate::state::AppState;

/// `InvokeTool(tool_name, {run_id, args, idempotency_key?, timeout_ms?})`.
/// Returns the client/agent-facing projection (`succeeded` / `pending` /
/// `failed`), never an `Err` for policy or unknown-tool outcomes — those
/// are values per the error taxonomy, not control-flow failures. `Err`
/// is reserved for a missing run (not-found) and genuine store failures.
pub async fn invoke_tool(
    state: &AppState,
    run_id: &str,
    tool_name: &str,
    args: serde_json::Value,
    idempotency_key: Option<String>,
    timeout_ms: Option<u64>,
) -> Result<serde_json::Value> {
    let run = state
        .store
        .get_run(run_id)
        .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
    let session = state
        .store
        .get_session(&run.session_id)
        .ok_or_else(|| Error::NotFound(format!("session {}", run.session_id)))?;

    let Some(tool) = state.store.get_tool(tool_name) else {
        return Ok(serde_json::json!({
            "status": "failed",
            "error": { "code": "unknown_tool", "message": format!("tool {tool_name} is not registered") },
        }));
    };

    if let Some(key) = &idempotency_key {
        if let Some(existing) = state.store.find_tool_call_by_idempotency(run_id, tool_name, key) {
            return Ok(existing.projection());
        }
    }

    let verdict = state.policy.evaluate(PolicyRequest {
        tool_name,
        user_id: &session.user_id,
        args: &args,
    });

    let declared_timeout = timeout_ms.unwrap_or(tool.declared_timeout_ms);
    let tool_call = state.store.create_tool_call(
        run_id,
        tool_name,
        tool.kind,
        args,
        idempotency_key,
        declared_timeout,
    );

    match verdict.decision {
        PolicyDecision::Block => {
            let reason = verdict.reason.unwrap_or_else(|| "blocked by policy".to_string());
            let tool_call = state.store.set_tool_call_status(
                &tool_call.id,
                ToolCallStatus::Blocked,
                None,
                Some(ErrorPayload::new("blocked", reason.clone())),
            )?;
            state.store.append_event(
                run_id,
                EventType::PolicyDecision,
                serde_json::json!({ "tool_call_id": tool_call.id, "decision": "block", "reason": reason }),
            );
            Ok(tool_call.projection())
        }
        PolicyDecision::RequireApproval => {
            let tool_call = state
                .store
                .set_tool_call_status(&tool_call.id, ToolCallStatus::WaitingApproval, None, None)?;
            let approval = state.store.create_approval(run_id, &tool_call.id);
            state.store.link_approval(&tool_call.id, &approval.id)?;

            let args_summary = summarize_args(&tool_call.args);
            state.store.append_event(
                run_id,
                EventType::ApprovalRequired,
                serde_json::json!({
                    "approval_id": approval.id,
                    "tool_call_id": tool_call.id,
                    "tool_name": tool_name,
                    "args_summary": args_summary,
                    "args": tool_call.args,
                }),
            );
            push(state, &run.session_id, OutboundFrame::ApprovalRequired {
                ts: ids::now_ms(),
                run_id: run_id.to_string(),
                approval_id: approval.id,
                tool_call_id: tool_call.id.clone(),
                tool_name: tool_name.to_string(),
                args_summary,
                args: tool_call.args.clone(),
            })
            .await;
            Ok(tool_call.projection())
        }
        PolicyDecision::Allow => dispatch_allowed(state, &run, &tool_call).await,
    }
}

/// Branch on tool kind for a tool call that has been cleared to proceed
/// (either via the initial `allow` decision, or via a subsequent
/// approval). Shared by [`invoke_tool`] and the approval engine.
pub(crate) async fn dispatch_allowed(
    state: &AppState,
    run: &sa_domain::model::Run,
    tool_call: &ToolCall,
) -> Result<serde_json::Value> {
    match tool_call.kind {
        ToolKind::Server => {
            state
                .store
                .set_tool_call_status(&tool_call.id, ToolCallStatus::Running, None, None)?;
            match state.server_tools.dispatch(&tool_call.tool_name, tool_call.args.clone()).await {
                Ok(result) => {
                    let updated = state.store.set_tool_call_status(
                        &tool_call.id,
                        ToolCallStatus::Succeeded,
                        Some(result),
                        None,
                    )?;
                    state.store.append_event(
                        &run.id,
                        EventType::ToolResult,
                        serde_json::json!({ "tool_call_id": updated.id, "status": "succeeded", "result": updated.result }),
                    );
                    Ok(updated.projection())
                }
                Err(e) => {
                    let updated = state.store.set_tool_call_status(
                        &tool_call.id,
                        ToolCallStatus::Failed,
                        None,
                        Some(ErrorPayload::new("upstream", e.to_string())),
                    )?;
                    state.store.append_event(
                        &run.id,
                        EventType::ToolResult,
                        serde_json::json!({ "tool_call_id": updated.id, "status": "failed", "error": updated.error }),
                    );
                    Ok(updated.projection())
                }
            }
        }
        ToolKind::Client => {
            let deadline_ts = ids::now_ms() + tool_call.declared_timeout_ms as i64;
            let updated = state
                .store
                .set_tool_call_status(&tool_call.id, ToolCallStatus::Dispatched, None, None)?;
            state.store.append_event(
                &run.id,
                EventType::ToolRequest,
                serde_json::json!({
                    "tool_call_id": updated.id,
                    "tool_name": updated.tool_name,
                    "args": updated.args,
                    "deadline_ts": deadline_ts,
                }),
            );
            push(state, &run.session_id, OutboundFrame::ToolRequest {
                ts: ids::now_ms(),
                run_id: run.id.clone(),
                tool_call_id: updated.id.clone(),
                tool_name: updated.tool_name.clone(),
                args: updated.args.clone(),
                deadline_ts,
            })
            .await;
            Ok(updated.projection())
        }
    }
}

/// `SubmitToolResult(tool_call_id, {status, result?, error?})`.
pub async fn submit_tool_result(
    state: &AppState,
    tool_call_id: &str,
    ok: bool,
    result: Option<serde_json::Value>,
    error: Option<String>,
) -> Result<serde_json::Value> {
    let tool_call = state
        .store
        .get_tool_call(tool_call_id)
        .ok_or_else(|| Error::NotFound(format!("tool call {tool_call_id}")))?;

    if tool_call.status.is_terminal() {
        return Ok(tool_call.projection());
    }
    if !matches!(tool_call.status, ToolCallStatus::Dispatched | ToolCallStatus::Running) {
        return Err(Error::Conflict(format!(
            "tool call {tool_call_id} is not awaiting a result (status {:?})",
            tool_call.status
        )));
    }

    let (new_status, error_payload) = if ok {
        (ToolCallStatus::Succeeded, None)
    } else {
        (
            ToolCallStatus::Failed,
            Some(ErrorPayload::new("client_error", error.unwrap_or_else(|| "tool call failed".to_string()))),
        )
    };

    let updated = state
        .store
        .set_tool_call_status(tool_call_id, new_status, result, error_payload)?;
    state.store.append_event(
        &updated.run_id,
        EventType::ToolResult,
        serde_json::json!({ "tool_call_id": updated.id, "status": if ok { "succeeded" } else { "failed" }, "result": updated.result, "error": updated.error }),
    );
    Ok(updated.projection())
}

async fn push(state: &AppState, session_id: &str, frame: OutboundFrame) {
    state.ingress_client.push_event(session_id, frame).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::Config;
    use sa_domain::policy::DefaultPolicyEvaluator;
    use sa_domain::store::InMemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AppState {
        let store: Arc<dyn sa_domain::store::Store> = Arc::new(InMemoryStore::new());
        store.register_tool("search.web", ToolKind::Server, 1000, None);
        store.register_tool("dangerous.command", ToolKind::Server, 1000, None);
        store.register_tool("payments.transfer", ToolKind::Server, 1000, None);
        store.register_tool("browser.screenshot", ToolKind::Client, 5, None);
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

    fn seed_run(state: &AppState) -> (String, String) {
        let session = state.store.get_or_create_session(None, "u1");
        state.store.register_agent("a1", "http://localhost:1", vec![]);
        let run = state.store.create_run(&session.id, "agt_1");
        (run.id, session.id)
    }

    #[tokio::test]
    async fn blocked_tool_returns_failed_without_tool_result_event() {
        let state = test_state();
        let (run_id, _) = seed_run(&state);
        let resp = invoke_tool(&state, &run_id, "dangerous.command", serde_json::json!({}), None, None)
            .await
            .unwrap();
        assert_eq!(resp["status"], "failed");
        assert_eq!(resp["error"]["code"], "blocked");

        let page = state.store.get_events(&run_id, None, None, 100).unwrap();
        assert!(page.events.iter().any(|e| e.event_type == EventType::PolicyDecision));
        assert!(!page.events.iter().any(|e| e.event_type == EventType::ToolResult));
    }

    #[tokio::test]
    async fn client_tool_dispatch_returns_pending_waiting_client() {
        let state = test_state();
        let (run_id, _) = seed_run(&state);
        let resp = invoke_tool(
            &state,
            &run_id,
            "browser.screenshot",
            serde_json::json!({}),
            None,
            Some(5),
        )
        .await
        .unwrap();
        assert_eq!(resp["status"], "pending");
        assert_eq!(resp["reason"], "waiting_client");
    }

    #[tokio::test]
    async fn approval_required_for_large_transfer() {
        let state = test_state();
        let (run_id, _) = seed_run(&state);
        let resp = invoke_tool(
            &state,
            &run_id,
            "payments.transfer",
            serde_json::json!({"amount": 200}),
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(resp["status"], "pending");
        assert_eq!(resp["reason"], "waiting_approval");
    }

    #[tokio::test]
    async fn submit_tool_result_on_terminal_is_idempotent_echo() {
        let state = test_state();
        let (run_id, _) = seed_run(&state);
        let resp = invoke_tool(&state, &run_id, "search.web", serde_json::json!({}), None, None)
            .await
            .unwrap();
        let tool_call_id = resp["tool_call_id"].as_str().unwrap().to_string();

        // server tool already terminal (succeeded synchronously); resubmitting
        // returns the stored projection rather than erroring.
        let second = submit_tool_result(&state, &tool_call_id, false, None, Some("late".to_string()))
            .await
            .unwrap();
        assert_eq!(second["status"], "succeeded");
    }

    #[tokio::test]
    async fn submit_tool_result_unknown_id_not_found() {
        let state = test_state();
        let err = submit_tool_result(&state, "tc_missing", true, None, None).await.unwrap_err();
        assert_eq!(err.kind(), sa_domain::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn invoke_with_same_idempotency_key_returns_same_tool_call_id() {
        let state = test_state();
        let (run_id, _) = seed_run(&state);
        let first = invoke_tool(
            &state,
            &run_id,
            "search.web",
            serde_json::json!({}),
            Some("key1".to_string()),
            None,
        )
        .await
        .unwrap();
        let second = invoke_tool(
            &state,
            &run_id,
            "search.web",
            serde_json::json!({}),
            Some("key1".to_string()),
            None,
        )
        .await
        .unwrap();
        assert_eq!(first["tool_call_id"], second["tool_call_id"]);
    }
}
