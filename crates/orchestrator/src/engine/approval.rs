//! The approval engine: `DecideApproval`.

use sa_domain::error::{Error, Result};
use sa_domain::model::{ApprovalDecision, ApprovalStatus, ErrorPayload, EventType, ToolCallStatus};

use crate::engine::tool::dispatch_allowed;
use crate::state::AppState;

/// `DecideApproval(approval_id, decision, reason?)`.
///
/// An unknown id is not-found. A non-pending approval echoes its stored
/// status idempotently — a second `approve` or a late `reject` after the
/// sweeper already expired it is a no-op, not an error. Otherwise the
/// decision is recorded and, on `approve`, the owning tool call resumes
/// through the same allow-path the tool engine uses for a policy `allow`
/// verdict; on `reject` the tool call is failed with a synthetic error
/// and a `tool_result` event is emitted.
pub async fn decide_approval(
    state: &AppState,
    approval_id: &str,
    decision: ApprovalDecision,
    reason: Option<String>,
) -> Result<serde_json::Value> {
    let approval = state
        .store
        .get_approval(approval_id)
        .ok_or_else(|| Error::NotFound(format!("approval {approval_id}")))?;

    if approval.status.is_terminal() {
        return Ok(approval_projection(&approval));
    }

    let updated = state
        .store
        .decide_approval(approval_id, decision, reason.clone(), None)?;
    state.store.append_event(
        &approval.run_id,
        EventType::ApprovalDecision,
        serde_json::json!({
            "approval_id": updated.id,
            "tool_call_id": approval.tool_call_id,
            "decision": decision_str(decision),
            "reason": reason,
        }),
    );

    let tool_call = state
        .store
        .get_tool_call(&approval.tool_call_id)
        .ok_or_else(|| Error::NotFound(format!("tool call {}", approval.tool_call_id)))?;

    match updated.status {
        ApprovalStatus::Approved => {
            if tool_call.status != ToolCallStatus::WaitingApproval {
                // Already resolved by some other path (e.g. the sweeper
                // timed out the tool call first); nothing to resume.
                return Ok(approval_projection(&updated));
            }
            let run = state
                .store
                .get_run(&tool_call.run_id)
                .ok_or_else(|| Error::NotFound(format!("run {}", tool_call.run_id)))?;
            state
                .store
                .set_tool_call_status(&tool_call.id, ToolCallStatus::Approved, None, None)?;
            dispatch_allowed(state, &run, &tool_call).await?;
            Ok(approval_projection(&updated))
        }
        ApprovalStatus::Rejected => {
            if tool_call.status.is_terminal() {
                return Ok(approval_projection(&updated));
            }
            let rejected = state.store.set_tool_call_status(
                &tool_call.id,
                ToolCallStatus::Rejected,
                None,
                Some(ErrorPayload::new(
                    "rejected",
                    reason.clone().unwrap_or_else(|| "rejected".to_string()),
                )),
            )?;
            state.store.append_event(
                &rejected.run_id,
                EventType::ToolResult,
                serde_json::json!({ "tool_call_id": rejected.id, "status": "failed", "error": rejected.error }),
            );
            Ok(approval_projection(&updated))
        }
        ApprovalStatus::Pending | ApprovalStatus::Expired => Ok(approval_projection(&updated)),
    }
}

fn decision_str(decision: ApprovalDecision) -> &'static str {
    match decision {
        ApprovalDecision::Approve => "approve",
        ApprovalDecision::Reject => "reject",
    }
}

fn approval_projection(approval: &sa_domain::model::Approval) -> serde_json::Value {
    serde_json::json!({
        "approval_id": approval.id,
        "status": approval.status,
        "decided_at": approval.decided_at,
        "reason": approval.reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::Config;
    use sa_domain::model::ToolKind;
    use sa_domain::policy::DefaultPolicyEvaluator;
    use sa_domain::store::InMemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AppState {
        let store: Arc<dyn sa_domain::store::Store> = Arc::new(InMemoryStore::new());
        store.register_tool("payments.transfer", ToolKind::Server, 1000, None);
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

    async fn seed_waiting_approval(state: &AppState) -> (String, String) {
        let session = state.store.get_or_create_session(None, "u1");
        let run = state.store.create_run(&session.id, "agt_1");
        let resp = crate::engine::tool::invoke_tool(
            state,
            &run.id,
            "payments.transfer",
            serde_json::json!({"amount": 500}),
            None,
            None,
        )
        .await
        .unwrap();
        assert_eq!(resp["reason"], "waiting_approval");
        (resp["tool_call_id"].as_str().unwrap().to_string(), run.id)
    }

    #[tokio::test]
    async fn approve_resumes_and_settles_the_tool_call() {
        let state = test_state();
        let (tool_call_id, _run_id) = seed_waiting_approval(&state).await;
        let tool_call = state.store.get_tool_call(&tool_call_id).unwrap();
        let approval_id = tool_call.approval_id.clone().unwrap();

        decide_approval(&state, &approval_id, ApprovalDecision::Approve, None)
            .await
            .unwrap();

        let resolved = state.store.get_tool_call(&tool_call_id).unwrap();
        assert_eq!(resolved.status, ToolCallStatus::Succeeded);
    }

    #[tokio::test]
    async fn reject_fails_the_tool_call_with_rejected_error() {
        let state = test_state();
        let (tool_call_id, _run_id) = seed_waiting_approval(&state).await;
        let tool_call = state.store.get_tool_call(&tool_call_id).unwrap();
        let approval_id = tool_call.approval_id.clone().unwrap();

        decide_approval(
            &state,
            &approval_id,
            ApprovalDecision::Reject,
            Some("too risky".to_string()),
        )
        .await
        .unwrap();

        let resolved = state.store.get_tool_call(&tool_call_id).unwrap();
        assert_eq!(resolved.status, ToolCallStatus::Rejected);
        assert_eq!(resolved.error.unwrap().code, "rejected");
    }

    #[tokio::test]
    async fn second_decision_on_terminal_approval_is_idempotent_echo() {
        let state = test_state();
        let (tool_call_id, _run_id) = seed_waiting_approval(&state).await;
        let tool_call = state.store.get_tool_call(&tool_call_id).unwrap();
        let approval_id = tool_call.approval_id.clone().unwrap();

        decide_approval(&state, &approval_id, ApprovalDecision::Approve, None)
            .await
            .unwrap();
        let second = decide_approval(&state, &approval_id, ApprovalDecision::Reject, None)
            .await
            .unwrap();
        assert_eq!(second["status"], "approved");

        let resolved = state.store.get_tool_call(&tool_call_id).unwrap();
        assert_eq!(resolved.status, ToolCallStatus::Succeeded);
    }

    #[tokio::test]
    async fn unknown_approval_id_is_not_found() {
        let state = test_state();
        let err = decide_approval(&state, "appr_missing", ApprovalDecision::Approve, None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), sa_domain::error::ErrorKind::NotFound);
    }
}
