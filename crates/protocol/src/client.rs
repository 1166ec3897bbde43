//! Client duplex protocol (the edge): JSON text frames exchanged between
//! a client and Ingress over a WebSocket connection.

use serde::{Deserialize, Serialize};

/// A message a client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    Hello {
        #[serde(default)]
        ts: i64,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        client_meta: Option<serde_json::Value>,
    },
    AgentInvoke {
        #[serde(default)]
        ts: i64,
        #[serde(default)]
        request_id: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
        agent_id: String,
        message: InvokeMessage,
    },
    ToolResult {
        #[serde(default)]
        ts: i64,
        run_id: String,
        tool_call_id: String,
        ok: bool,
        #[serde(default)]
        result: Option<serde_json::Value>,
        #[serde(default)]
        error: Option<String>,
    },
    ApprovalDecision {
        #[serde(default)]
        ts: i64,
        run_id: String,
        approval_id: String,
        decision: String,
        #[serde(default)]
        reason: Option<String>,
    },
    CancelRun {
        #[serde(default)]
        ts: i64,
        run_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeMessage {
    pub role: String,
    pub content: String,
}

/// A message the service may push to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    HelloAck {
        ts: i64,
        session_id: String,
    },
    RunStarted {
        ts: i64,
        run_id: String,
    },
    Delta {
        ts: i64,
        run_id: String,
        text: String,
    },
    State {
        ts: i64,
        run_id: String,
        state: serde_json::Value,
    },
    ToolRequest {
        ts: i64,
        run_id: String,
        tool_call_id: String,
        tool_name: String,
        args: serde_json::Value,
        deadline_ts: i64,
    },
    ApprovalRequired {
        ts: i64,
        run_id: String,
        approval_id: String,
        tool_call_id: String,
        tool_name: String,
        args_summary: String,
        args: serde_json::Value,
    },
    Done {
        ts: i64,
        run_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<serde_json::Value>,
    },
    Error {
        ts: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        code: String,
        message: String,
    },
}

/// Summarize an args object into a short human-readable string for
/// `approval_required.args_summary` (e.g. `amount=200, to="acct_9"`).
pub fn summarize_args(args: &serde_json::Value) -> String {
    match args.as_object() {
        Some(map) => {
            let parts: Vec<String> = map
                .iter()
                .take(6)
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            parts.join(", ")
        }
        None => args.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hello_frame() {
        let raw = r#"{"type":"hello","ts":1,"api_key":""}"#;
        let frame: InboundFrame = serde_json::from_str(raw).unwrap();
        match frame {
            InboundFrame::Hello { api_key, .. } => assert_eq!(api_key, Some("".to_string())),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn summarizes_args() {
        let args = serde_json::json!({"amount": 200, "to": "acct_9"});
        let summary = summarize_args(&args);
        assert!(summary.contains("amount=200"));
    }
}
