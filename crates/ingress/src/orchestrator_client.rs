//! The client ingress runs against the orchestrator's internal RPC
//! listener: `Invoke`, `SubmitToolResult`, `SubmitApprovalDecision`, and
//! `CancelRun`. Opens one short-lived TCP connection per call —
//! the internal link is low-volume enough that connection pooling would
//! be premature.

use sa_domain::error::{Error, Result};
use sa_protocol::rpc::{read_frame, write_frame, OrchestratorRequest, OrchestratorResponse};
use tokio::net::TcpStream;

pub struct OrchestratorClient {
    addr: String,
}

impl OrchestratorClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        OrchestratorClient {
            addr: format!("{}:{port}", host.into()),
        }
    }

    pub async fn invoke(
        &self,
        session_id: Option<String>,
        agent_id: String,
        request_id: Option<String>,
        user_id: String,
        message_content: String,
    ) -> Result<serde_json::Value> {
        self.call(OrchestratorRequest::Invoke {
            session_id,
            agent_id,
            request_id,
            user_id,
            message_content,
        })
        .await
    }

    pub async fn submit_tool_result(
        &self,
        tool_call_id: String,
        ok: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Result<serde_json::Value> {
        self.call(OrchestratorRequest::SubmitToolResult {
            tool_call_id,
            ok,
            result,
            error,
        })
        .await
    }

    pub async fn submit_approval_decision(
        &self,
        approval_id: String,
        decision: String,
        reason: Option<String>,
    ) -> Result<serde_json::Value> {
        self.call(OrchestratorRequest::SubmitApprovalDecision {
            approval_id,
            decision,
            reason,
        })
        .await
    }

    pub async fn cancel_run(&self, run_id: String) -> Result<serde_json::Value> {
        self.call(OrchestratorRequest::CancelRun { run_id }).await
    }

    async fn call(&self, request: OrchestratorRequest) -> Result<serde_json::Value> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| Error::Transport(format!("dial orchestrator {}: {e}", self.addr)))?;
        write_frame(&mut stream, &request)
            .await
            .map_err(|e| Error::Transport(format!("write: {e}")))?;
        let response: OrchestratorResponse = read_frame(&mut stream)
            .await
            .map_err(|e| Error::Transport(format!("read: {e}")))?;
        match response {
            OrchestratorResponse::Ok { value } => Ok(value),
            OrchestratorResponse::Err { code, message } => Err(match code.as_str() {
                "invalid_message" => Error::Validation(message),
                "not_found" => Error::NotFound(message),
                "conflict" => Error::Conflict(message),
                "policy" => Error::Policy(message),
                "orchestrator_fail" => Error::Upstream(message),
                "timeout" => Error::Timeout(message),
                _ => Error::Internal(message),
            }),
        }
    }
}
