//! Opaque, prefixed identifiers.
//!
//! Every entity id is a short string with a type prefix (`sess_`, `run_`,
//! `msg_`, `evt_`, `tc_`, `ap_`, `agt_`) followed by a UUIDv4 with hyphens
//! stripped. The prefix makes ids self-describing in logs and payloads;
//! it is not parsed back into a type at runtime.

fn generate(prefix: &str) -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{uuid}")
}

pub fn session_id() -> String {
    generate("sess")
}

pub fn run_id() -> String {
    generate("run")
}

pub fn message_id() -> String {
    generate("msg")
}

pub fn event_id() -> String {
    generate("evt")
}

pub fn tool_call_id() -> String {
    generate("tc")
}

pub fn approval_id() -> String {
    generate("ap")
}

pub fn agent_id() -> String {
    generate("agt")
}

pub fn connection_id() -> String {
    generate("conn")
}

/// Current wall-clock time in milliseconds, the timestamp unit used
/// throughout the data model.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
