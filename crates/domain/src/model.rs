//! Core entity types and their finite state machines.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session / Message
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: i64,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub session_id: String,
    #[serde(default)]
    pub run_id: Option<String>,
    pub role: Role,
    pub content: String,
    pub created_at: i64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `CREATED -> RUNNING -> {DONE | FAILED | CANCELLED}`.
///
/// `PausedWaitingTool` / `PausedWaitingApproval` are declared so replay
/// payloads and exhaustive matches account for them, but no code path
/// in this design transitions a run into either state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Created,
    Running,
    PausedWaitingTool,
    PausedWaitingApproval,
    Done,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Failed | RunStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub session_id: String,
    pub agent_id: String,
    pub status: RunStatus,
    pub started_at: i64,
    #[serde(default)]
    pub ended_at: Option<i64>,
    #[serde(default)]
    pub error: Option<ErrorPayload>,
}

impl Run {
    pub fn new(id: String, session_id: String, agent_id: String, now: i64) -> Self {
        Run {
            id,
            session_id,
            agent_id,
            status: RunStatus::Created,
            started_at: now,
            ended_at: None,
            error: None,
        }
    }
}

/// A structured error as recorded on a run or tool call: a stable `code`
/// plus a human-readable `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        ErrorPayload {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Event (append-only log entry)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RunStarted,
    UserInput,
    AgentInvokeStarted,
    AgentStreamDelta,
    AgentInvokeDone,
    RunDone,
    RunFailed,
    RunCancelled,
    PolicyDecision,
    ApprovalRequired,
    ApprovalDecision,
    ToolRequest,
    ToolResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub run_id: String,
    pub ts: i64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub payload: serde_json::Value,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealth {
    Unknown,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default = "default_agent_health")]
    pub health: AgentHealth,
    #[serde(default)]
    pub last_heartbeat: Option<i64>,
    pub created_at: i64,
}

fn default_agent_health() -> AgentHealth {
    AgentHealth::Unknown
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool / ToolCall
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Server,
    Client,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub kind: ToolKind,
    pub declared_timeout_ms: u64,
    #[serde(default)]
    pub schema: Option<serde_json::Value>,
}

/// `CREATED -> POLICY_CHECKED -> {BLOCKED | WAITING_APPROVAL | DISPATCHED |
/// RUNNING} -> {SUCCEEDED | FAILED | TIMEOUT | REJECTED}`, plus `Approved`
/// as a transient state after a positive approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallStatus {
    Created,
    PolicyChecked,
    Blocked,
    WaitingApproval,
    Approved,
    Dispatched,
    Running,
    Succeeded,
    Failed,
    Timeout,
    Rejected,
}

impl ToolCallStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ToolCallStatus::Succeeded
                | ToolCallStatus::Failed
                | ToolCallStatus::Timeout
                | ToolCallStatus::Blocked
                | ToolCallStatus::Rejected
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub run_id: String,
    pub tool_name: String,
    pub kind: ToolKind,
    pub status: ToolCallStatus,
    pub args: serde_json::Value,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ErrorPayload>,
    #[serde(default)]
    pub approval_id: Option<String>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    pub declared_timeout_ms: u64,
    pub created_at: i64,
    #[serde(default)]
    pub completed_at: Option<i64>,
}

impl ToolCall {
    /// The client/agent-facing projection returned by `InvokeTool` and by
    /// idempotent echoes of a terminal or in-flight tool call.
    pub fn projection(&self) -> serde_json::Value {
        let (status_str, reason) = match self.status {
            ToolCallStatus::Succeeded => ("succeeded", None),
            ToolCallStatus::Blocked
            | ToolCallStatus::Failed
            | ToolCallStatus::Timeout
            | ToolCallStatus::Rejected => ("failed", None),
            ToolCallStatus::WaitingApproval => ("pending", Some("waiting_approval")),
            ToolCallStatus::Dispatched => ("pending", Some("waiting_client")),
            ToolCallStatus::Running
            | ToolCallStatus::Created
            | ToolCallStatus::PolicyChecked
            | ToolCallStatus::Approved => ("pending", Some("in_progress")),
        };
        serde_json::json!({
            "tool_call_id": self.id,
            "status": status_str,
            "reason": reason,
            "result": self.result,
            "error": self.error,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Approval
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ApprovalStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: String,
    pub run_id: String,
    pub tool_call_id: String,
    pub status: ApprovalStatus,
    pub created_at: i64,
    #[serde(default)]
    pub decided_at: Option<i64>,
    #[serde(default)]
    pub decided_by: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_terminal() {
        assert!(RunStatus::Done.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(!RunStatus::Created.is_terminal());
        assert!(!RunStatus::PausedWaitingTool.is_terminal());
    }

    #[test]
    fn tool_call_status_terminal() {
        assert!(ToolCallStatus::Succeeded.is_terminal());
        assert!(ToolCallStatus::Blocked.is_terminal());
        assert!(ToolCallStatus::Rejected.is_terminal());
        assert!(!ToolCallStatus::Dispatched.is_terminal());
        assert!(!ToolCallStatus::WaitingApproval.is_terminal());
    }

    #[test]
    fn tool_call_projection_pending_kinds() {
        let base = ToolCall {
            id: "tc_1".into(),
            run_id: "run_1".into(),
            tool_name: "x".into(),
            kind: ToolKind::Client,
            status: ToolCallStatus::Dispatched,
            args: serde_json::json!({}),
            result: None,
            error: None,
            approval_id: None,
            idempotency_key: None,
            declared_timeout_ms: 1000,
            created_at: 0,
            completed_at: None,
        };
        let p = base.projection();
        assert_eq!(p["status"], "pending");
        assert_eq!(p["reason"], "waiting_client");
    }
}
