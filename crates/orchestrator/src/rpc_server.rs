//! The internal RPC listener: accepts length-framed JSON requests from
//! Ingress on a plain TCP socket and dispatches them to the engines.

use std::sync::Arc;

use sa_domain::model::ApprovalDecision;
use sa_protocol::rpc::{read_frame, write_frame, OrchestratorRequest, OrchestratorResponse};
use tokio::net::{TcpListener, TcpStream};

use crate::engine::{approval, run, tool};
use crate::state::AppState;

pub async fn serve(state: Arc<AppState>, addr: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr, "orchestrator rpc listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(state, stream).await {
                tracing::debug!(%peer, error = %e, "rpc connection closed");
            }
        });
    }
}

async fn handle_connection(state: Arc<AppState>, mut stream: TcpStream) -> std::io::Result<()> {
    loop {
        let request: OrchestratorRequest = match read_frame(&mut stream).await {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        let response = dispatch(&state, request).await;
        write_frame(&mut stream, &response).await?;
    }
}

async fn dispatch(state: &Arc<AppState>, request: OrchestratorRequest) -> OrchestratorResponse {
    match request {
        OrchestratorRequest::Invoke {
            session_id,
            agent_id,
            request_id: _,
            user_id,
            message_content,
        } => {
            match run::invoke_agent(state.clone(), session_id, agent_id, &user_id, message_content).await {
                Ok(outcome) => OrchestratorResponse::Ok {
                    value: serde_json::json!({
                        "run_id": outcome.run_id,
                        "session_id": outcome.session_id,
                        "agent_id": outcome.agent_id,
                    }),
                },
                Err(e) => err_response(e),
            }
        }
        OrchestratorRequest::SubmitToolResult {
            tool_call_id,
            ok,
            result,
            error,
        } => match tool::submit_tool_result(state, &tool_call_id, ok, result, error).await {
            Ok(value) => OrchestratorResponse::Ok { value },
            Err(e) => err_response(e),
        },
        OrchestratorRequest::SubmitApprovalDecision {
            approval_id,
            decision,
            reason,
        } => {
            let decision = match decision.as_str() {
                "approve" => ApprovalDecision::Approve,
                "reject" => ApprovalDecision::Reject,
                other => {
                    return OrchestratorResponse::Err {
                        code: "validation".to_string(),
                        message: format!("unknown approval decision {other}"),
                    }
                }
            };
            match approval::decide_approval(state, &approval_id, decision, reason).await {
                Ok(value) => OrchestratorResponse::Ok { value },
                Err(e) => err_response(e),
            }
        }
        OrchestratorRequest::CancelRun { run_id } => match run::cancel_run(state, &run_id).await {
            Ok(outcome) => OrchestratorResponse::Ok {
                value: serde_json::json!({ "outcome": format!("{outcome:?}") }),
            },
            Err(e) => err_response(e),
        },
    }
}

fn err_response(e: sa_domain::error::Error) -> OrchestratorResponse {
    OrchestratorResponse::Err {
        code: e.code().to_string(),
        message: e.to_string(),
    }
}
