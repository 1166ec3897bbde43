//! The timeout sweeper: a periodic tick that scans non-terminal tool
//! calls past their declared deadline, marks them `TIMEOUT`, and expires
//! their owning `PENDING` approval if one exists.

use std::sync::Arc;
use std::time::Duration;

use sa_domain::ids;
use sa_domain::model::{ApprovalStatus, ErrorPayload, EventType, ToolCallStatus};

use crate::state::AppState;

pub fn spawn(state: Arc<AppState>) {
    let tick_ms = state.config.timeouts.sweeper_tick_ms;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
        loop {
            interval.tick().await;
            tick(&state).await;
        }
    });
}

async fn tick(state: &AppState) {
    let started = std::time::Instant::now();
    let expired = state
        .store
        .scan_expired_tool_calls(ids::now_ms(), state.config.timeouts.sweeper_batch_limit);
    if expired.is_empty() {
        return;
    }
    let scanned = expired.len();
    let mut timed_out = 0usize;

    for tool_call in expired {
        let updated = match state.store.set_tool_call_status(
            &tool_call.id,
            ToolCallStatus::Timeout,
            None,
            Some(ErrorPayload::new("timeout", "tool call timed out")),
        ) {
            Ok(tc) => tc,
            Err(e) => {
                tracing::warn!(tool_call_id = %tool_call.id, error = %e, "sweeper failed to mark tool call as timed out");
                continue;
            }
        };
        if updated.status != ToolCallStatus::Timeout {
            // Someone else (a client result, an approval decision) beat
            // the sweeper to a terminal write; nothing left to expire.
            continue;
        }

        state.store.append_event(
            &updated.run_id,
            EventType::ToolResult,
            serde_json::json!({
                "tool_call_id": updated.id,
                "status": "timeout",
                "error": updated.error,
                "timeout_ms": updated.declared_timeout_ms,
            }),
        );

        if let Some(approval_id) = &updated.approval_id {
            if let Some(approval) = state.store.get_approval(approval_id) {
                if approval.status == ApprovalStatus::Pending {
                    if let Some(expired_approval) = state.store.expire_approval(approval_id, "owning tool call timed out") {
                        state.store.append_event(
                            &updated.run_id,
                            EventType::ApprovalDecision,
                            serde_json::json!({ "approval_id": expired_approval.id, "tool_call_id": updated.id, "decision": "expired" }),
                        );
                    }
                }
            }
        }

        timed_out += 1;
        tracing::info!(tool_call_id = %updated.id, run_id = %updated.run_id, "tool call timed out");
    }

    sa_domain::trace::OperationalEvent::SweeperTick {
        scanned,
        timed_out,
        duration_ms: started.elapsed().as_millis() as u64,
    }
    .emit();
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::Config;
    use sa_domain::model::ToolKind;
    use sa_domain::policy::DefaultPolicyEvaluator;
    use sa_domain::store::InMemoryStore;
    use std::sync::Arc;

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

    #[tokio::test]
    async fn sweeper_times_out_a_stale_client_tool_call_and_emits_tool_result() {
        let state = test_state();
        let session = state.store.get_or_create_session(None, "u1");
        let run = state.store.create_run(&session.id, "agt_1");
        let tc = state
            .store
            .create_tool_call(&run.id, "browser.screenshot", ToolKind::Client, serde_json::json!({}), None, 0);
        state.store.set_tool_call_status(&tc.id, ToolCallStatus::Dispatched, None, None).unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        tick(&state).await;

        let reloaded = state.store.get_tool_call(&tc.id).unwrap();
        assert_eq!(reloaded.status, ToolCallStatus::Timeout);

        let page = state.store.get_events(&run.id, None, None, 100).unwrap();
        assert!(page.events.iter().any(|e| e.event_type == EventType::ToolResult));
    }

    #[tokio::test]
    async fn sweeper_expires_the_owning_pending_approval() {
        let state = test_state();
        let session = state.store.get_or_create_session(None, "u1");
        let run = state.store.create_run(&session.id, "agt_1");
        let tc = state
            .store
            .create_tool_call(&run.id, "payments.transfer", ToolKind::Server, serde_json::json!({}), None, 0);
        state
            .store
            .set_tool_call_status(&tc.id, ToolCallStatus::WaitingApproval, None, None)
            .unwrap();
        let approval = state.store.create_approval(&run.id, &tc.id);
        state.store.link_approval(&tc.id, &approval.id).unwrap();

        tokio::time::sleep(Duration::from_millis(5)).await;
        tick(&state).await;

        let reloaded = state.store.get_approval(&approval.id).unwrap();
        assert_eq!(reloaded.status, ApprovalStatus::Expired);
    }

    #[tokio::test]
    async fn sweeper_is_a_no_op_when_nothing_has_expired() {
        let state = test_state();
        let session = state.store.get_or_create_session(None, "u1");
        let run = state.store.create_run(&session.id, "agt_1");
        state
            .store
            .create_tool_call(&run.id, "search.web", ToolKind::Server, serde_json::json!({}), None, 60_000);
        tick(&state).await;
        // still within its 60s deadline; nothing to assert beyond "didn't panic".
    }
}
