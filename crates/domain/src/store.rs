//! The persistence layer.
//!
//! [`Store`] is the trait boundary the engines program against; the
//! in-memory implementation backs it with a single [`parking_lot::Mutex`]
//! guarding every map — one serialized writer, matching the "single
//! SQLite connection mandated" constraint in spirit without actually
//! depending on SQLite for this scope. Swapping in a real SQLite-backed
//! implementation later is a matter of implementing this trait again; no
//! engine code would need to change.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::ids;
use crate::model::{
    Agent, Approval, ApprovalDecision, ApprovalStatus, ErrorPayload, Event, EventType, Message,
    Role, Run, RunStatus, Session, Tool, ToolCall, ToolCallStatus, ToolKind,
};

pub struct EventPage {
    pub events: Vec<Event>,
    pub has_more: bool,
}

/// Outcome of a [`Store::cancel_run`] call: `Cancelled` means this call
/// performed the transition; `AlreadyTerminal` means it was a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyTerminal,
}

pub trait Store: Send + Sync {
    fn get_or_create_session(&self, session_id: Option<&str>, user_id: &str) -> Session;
    fn get_session(&self, session_id: &str) -> Option<Session>;

    fn append_message(&self, session_id: &str, run_id: Option<&str>, role: Role, content: &str) -> Message;
    fn list_messages(&self, session_id: &str, limit: usize) -> Vec<Message>;

    fn create_run(&self, session_id: &str, agent_id: &str) -> Run;
    fn get_run(&self, run_id: &str) -> Option<Run>;
    fn set_run_running(&self, run_id: &str) -> Result<()>;
    fn finish_run(&self, run_id: &str, status: RunStatus, error: Option<ErrorPayload>) -> Result<()>;
    fn cancel_run(&self, run_id: &str) -> Result<CancelOutcome>;

    fn append_event(&self, run_id: &str, event_type: EventType, payload: serde_json::Value) -> Event;
    fn get_events(
        &self,
        run_id: &str,
        after_ts: Option<i64>,
        types: Option<&[EventType]>,
        limit: usize,
    ) -> Result<EventPage>;

    fn register_agent(&self, name: &str, endpoint: &str, capabilities: Vec<String>) -> Agent;
    fn get_agent(&self, agent_id: &str) -> Option<Agent>;
    fn list_agents(&self) -> Vec<Agent>;

    fn register_tool(&self, name: &str, kind: ToolKind, declared_timeout_ms: u64, schema: Option<serde_json::Value>) -> Tool;
    fn get_tool(&self, name: &str) -> Option<Tool>;

    fn find_tool_call_by_idempotency(
        &self,
        run_id: &str,
        tool_name: &str,
        key: &str,
    ) -> Option<ToolCall>;
    fn create_tool_call(
        &self,
        run_id: &str,
        tool_name: &str,
        kind: ToolKind,
        args: serde_json::Value,
        idempotency_key: Option<String>,
        declared_timeout_ms: u64,
    ) -> ToolCall;
    fn get_tool_call(&self, id: &str) -> Option<ToolCall>;
    /// Move a non-terminal tool call to a new non-terminal or terminal
    /// status, optionally attaching a result/error. When the target
    /// status is terminal, `completed_at` is only set if it was `None`
    /// (guards against a race with a concurrent terminal write).
    fn set_tool_call_status(
        &self,
        id: &str,
        status: ToolCallStatus,
        result: Option<serde_json::Value>,
        error: Option<ErrorPayload>,
    ) -> Result<ToolCall>;
    fn link_approval(&self, tool_call_id: &str, approval_id: &str) -> Result<()>;
    /// Scan up to `limit` non-terminal tool calls whose deadline has
    /// elapsed as of `now`. Used by the timeout sweeper.
    fn scan_expired_tool_calls(&self, now: i64, limit: usize) -> Vec<ToolCall>;

    fn create_approval(&self, run_id: &str, tool_call_id: &str) -> Approval;
    fn get_approval(&self, id: &str) -> Option<Approval>;
    fn decide_approval(
        &self,
        id: &str,
        decision: ApprovalDecision,
        reason: Option<String>,
        decided_by: Option<String>,
    ) -> Result<Approval>;
    /// Expire a still-pending approval (sweeper path). No-op if already
    /// terminal.
    fn expire_approval(&self, id: &str, reason: &str) -> Option<Approval>;

    fn health_counts(&self) -> serde_json::Value;
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    messages: HashMap<String, Vec<Message>>,
    runs: HashMap<String, Run>,
    events: HashMap<String, Vec<Event>>,
    last_event_ts: HashMap<String, i64>,
    agents: HashMap<String, Agent>,
    tools: HashMap<String, Tool>,
    tool_calls: HashMap<String, ToolCall>,
    idempotency_index: HashMap<(String, String, String), String>,
    approvals: HashMap<String, Approval>,
}

pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for InMemoryStore {
    fn get_or_create_session(&self, session_id: Option<&str>, user_id: &str) -> Session {
        let mut inner = self.inner.lock();
        if let Some(id) = session_id {
            if let Some(existing) = inner.sessions.get(id) {
                return existing.clone();
            }
            let session = Session {
                id: id.to_string(),
                user_id: user_id.to_string(),
                created_at: ids::now_ms(),
                metadata: serde_json::Value::Null,
            };
            inner.sessions.insert(id.to_string(), session.clone());
            return session;
        }
        let session = Session {
            id: ids::session_id(),
            user_id: user_id.to_string(),
            created_at: ids::now_ms(),
            metadata: serde_json::Value::Null,
        };
        inner.sessions.insert(session.id.clone(), session.clone());
        session
    }

    fn get_session(&self, session_id: &str) -> Option<Session> {
        self.inner.lock().sessions.get(session_id).cloned()
    }

    fn append_message(&self, session_id: &str, run_id: Option<&str>, role: Role, content: &str) -> Message {
        let message = Message {
            id: ids::message_id(),
            session_id: session_id.to_string(),
            run_id: run_id.map(str::to_string),
            role,
            content: content.to_string(),
            created_at: ids::now_ms(),
        };
        let mut inner = self.inner.lock();
        inner
            .messages
            .entry(session_id.to_string())
            .or_default()
            .push(message.clone());
        message
    }

    fn list_messages(&self, session_id: &str, limit: usize) -> Vec<Message> {
        let inner = self.inner.lock();
        let all = inner.messages.get(session_id).cloned().unwrap_or_default();
        let start = all.len().saturating_sub(limit);
        all[start..].to_vec()
    }

    fn create_run(&self, session_id: &str, agent_id: &str) -> Run {
        let run = Run::new(ids::run_id(), session_id.to_string(), agent_id.to_string(), ids::now_ms());
        self.inner.lock().runs.insert(run.id.clone(), run.clone());
        run
    }

    fn get_run(&self, run_id: &str) -> Option<Run> {
        self.inner.lock().runs.get(run_id).cloned()
    }

    fn set_run_running(&self, run_id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if !run.status.is_terminal() {
            run.status = RunStatus::Running;
        }
        Ok(())
    }

    fn finish_run(&self, run_id: &str, status: RunStatus, error: Option<ErrorPayload>) -> Result<()> {
        let mut inner = self.inner.lock();
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if run.status.is_terminal() {
            return Ok(());
        }
        run.status = status;
        run.ended_at = Some(ids::now_ms());
        run.error = error;
        Ok(())
    }

    fn cancel_run(&self, run_id: &str) -> Result<CancelOutcome> {
        let mut inner = self.inner.lock();
        let run = inner
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::NotFound(format!("run {run_id}")))?;
        if run.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        run.status = RunStatus::Cancelled;
        run.ended_at = Some(ids::now_ms());
        Ok(CancelOutcome::Cancelled)
    }

    fn append_event(&self, run_id: &str, event_type: EventType, payload: serde_json::Value) -> Event {
        let mut inner = self.inner.lock();
        let now = ids::now_ms();
        let ts = match inner.last_event_ts.get(run_id) {
            Some(prev) if *prev >= now => prev + 1,
            _ => now,
        };
        inner.last_event_ts.insert(run_id.to_string(), ts);
        let event = Event {
            id: ids::event_id(),
            run_id: run_id.to_string(),
            ts,
            event_type,
            payload,
        };
        inner.events.entry(run_id.to_string()).or_default().push(event.clone());
        event
    }

    fn get_events(
        &self,
        run_id: &str,
        after_ts: Option<i64>,
        types: Option<&[EventType]>,
        limit: usize,
    ) -> Result<EventPage> {
        let inner = self.inner.lock();
        if !inner.runs.contains_key(run_id) {
            return Err(Error::NotFound(format!("run {run_id}")));
        }
        let all = inner.events.get(run_id).cloned().unwrap_or_default();
        let after = after_ts.unwrap_or(i64::MIN);
        let filtered: Vec<Event> = all
            .into_iter()
            .filter(|e| e.ts > after)
            .filter(|e| types.map(|t| t.contains(&e.event_type)).unwrap_or(true))
            .collect();
        let has_more = filtered.len() > limit;
        let events = filtered.into_iter().take(limit).collect();
        Ok(EventPage { events, has_more })
    }

    fn register_agent(&self, name: &str, endpoint: &str, capabilities: Vec<String>) -> Agent {
        let mut inner = self.inner.lock();
        // Re-registration by name replaces the endpoint of an existing agent.
        let existing_id = inner
            .agents
            .values()
            .find(|a| a.name == name)
            .map(|a| a.id.clone());

        let agent = if let Some(id) = existing_id {
            let a = inner.agents.get_mut(&id).expect("just found by id");
            a.endpoint = endpoint.to_string();
            a.capabilities = capabilities;
            a.clone()
        } else {
            let agent = Agent {
                id: ids::agent_id(),
                name: name.to_string(),
                endpoint: endpoint.to_string(),
                capabilities,
                health: crate::model::AgentHealth::Unknown,
                last_heartbeat: None,
                created_at: ids::now_ms(),
            };
            inner.agents.insert(agent.id.clone(), agent.clone());
            agent
        };
        agent
    }

    fn get_agent(&self, agent_id: &str) -> Option<Agent> {
        self.inner.lock().agents.get(agent_id).cloned()
    }

    fn list_agents(&self) -> Vec<Agent> {
        self.inner.lock().agents.values().cloned().collect()
    }

    fn register_tool(
        &self,
        name: &str,
        kind: ToolKind,
        declared_timeout_ms: u64,
        schema: Option<serde_json::Value>,
    ) -> Tool {
        let tool = Tool {
            name: name.to_string(),
            kind,
            declared_timeout_ms,
            schema,
        };
        self.inner.lock().tools.insert(name.to_string(), tool.clone());
        tool
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.inner.lock().tools.get(name).cloned()
    }

    fn find_tool_call_by_idempotency(
        &self,
        run_id: &str,
        tool_name: &str,
        key: &str,
    ) -> Option<ToolCall> {
        let inner = self.inner.lock();
        let id = inner
            .idempotency_index
            .get(&(run_id.to_string(), tool_name.to_string(), key.to_string()))?;
        inner.tool_calls.get(id).cloned()
    }

    fn create_tool_call(
        &self,
        run_id: &str,
        tool_name: &str,
        kind: ToolKind,
        args: serde_json::Value,
        idempotency_key: Option<String>,
        declared_timeout_ms: u64,
    ) -> ToolCall {
        let mut inner = self.inner.lock();
        let tool_call = ToolCall {
            id: ids::tool_call_id(),
            run_id: run_id.to_string(),
            tool_name: tool_name.to_string(),
            kind,
            status: ToolCallStatus::Created,
            args,
            result: None,
            error: None,
            approval_id: None,
            idempotency_key: idempotency_key.clone(),
            declared_timeout_ms,
            created_at: ids::now_ms(),
            completed_at: None,
        };
        if let Some(key) = idempotency_key {
            inner.idempotency_index.insert(
                (run_id.to_string(), tool_name.to_string(), key),
                tool_call.id.clone(),
            );
        }
        inner.tool_calls.insert(tool_call.id.clone(), tool_call.clone());
        tool_call
    }

    fn get_tool_call(&self, id: &str) -> Option<ToolCall> {
        self.inner.lock().tool_calls.get(id).cloned()
    }

    fn set_tool_call_status(
        &self,
        id: &str,
        status: ToolCallStatus,
        result: Option<serde_json::Value>,
        error: Option<ErrorPayload>,
    ) -> Result<ToolCall> {
        let mut inner = self.inner.lock();
        let tc = inner
            .tool_calls
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("tool call {id}")))?;

        if tc.status.is_terminal() {
            return Ok(tc.clone());
        }

        tc.status = status;
        if let Some(r) = result {
            tc.result = Some(r);
        }
        if let Some(e) = error {
            tc.error = Some(e);
        }
        if status.is_terminal() && tc.completed_at.is_none() {
            tc.completed_at = Some(ids::now_ms());
        }
        Ok(tc.clone())
    }

    fn link_approval(&self, tool_call_id: &str, approval_id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let tc = inner
            .tool_calls
            .get_mut(tool_call_id)
            .ok_or_else(|| Error::NotFound(format!("tool call {tool_call_id}")))?;
        tc.approval_id = Some(approval_id.to_string());
        Ok(())
    }

    fn scan_expired_tool_calls(&self, now: i64, limit: usize) -> Vec<ToolCall> {
        let inner = self.inner.lock();
        inner
            .tool_calls
            .values()
            .filter(|tc| !tc.status.is_terminal())
            .filter(|tc| now - tc.created_at >= tc.declared_timeout_ms as i64)
            .take(limit)
            .cloned()
            .collect()
    }

    fn create_approval(&self, run_id: &str, tool_call_id: &str) -> Approval {
        let approval = Approval {
            id: ids::approval_id(),
            run_id: run_id.to_string(),
            tool_call_id: tool_call_id.to_string(),
            status: ApprovalStatus::Pending,
            created_at: ids::now_ms(),
            decided_at: None,
            decided_by: None,
            reason: None,
        };
        self.inner.lock().approvals.insert(approval.id.clone(), approval.clone());
        approval
    }

    fn get_approval(&self, id: &str) -> Option<Approval> {
        self.inner.lock().approvals.get(id).cloned()
    }

    fn decide_approval(
        &self,
        id: &str,
        decision: ApprovalDecision,
        reason: Option<String>,
        decided_by: Option<String>,
    ) -> Result<Approval> {
        let mut inner = self.inner.lock();
        let approval = inner
            .approvals
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("approval {id}")))?;
        if approval.status.is_terminal() {
            return Ok(approval.clone());
        }
        approval.status = match decision {
            ApprovalDecision::Approve => ApprovalStatus::Approved,
            ApprovalDecision::Reject => ApprovalStatus::Rejected,
        };
        approval.decided_at = Some(ids::now_ms());
        approval.decided_by = decided_by;
        approval.reason = reason;
        Ok(approval.clone())
    }

    fn expire_approval(&self, id: &str, reason: &str) -> Option<Approval> {
        let mut inner = self.inner.lock();
        let approval = inner.approvals.get_mut(id)?;
        if approval.status.is_terminal() {
            return Some(approval.clone());
        }
        approval.status = ApprovalStatus::Expired;
        approval.decided_at = Some(ids::now_ms());
        approval.reason = Some(reason.to_string());
        Some(approval.clone())
    }

    fn health_counts(&self) -> serde_json::Value {
        let inner = self.inner.lock();
        serde_json::json!({
            "sessions": inner.sessions.len(),
            "runs": inner.runs.len(),
            "tool_calls": inner.tool_calls.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> InMemoryStore {
        InMemoryStore::new()
    }

    #[test]
    fn run_cancel_is_idempotent() {
        let s = store();
        let session = s.get_or_create_session(None, "u1");
        let run = s.create_run(&session.id, "agt_1");
        assert_eq!(s.cancel_run(&run.id).unwrap(), CancelOutcome::Cancelled);
        assert_eq!(s.cancel_run(&run.id).unwrap(), CancelOutcome::AlreadyTerminal);
        let reloaded = s.get_run(&run.id).unwrap();
        assert_eq!(reloaded.status, RunStatus::Cancelled);
    }

    #[test]
    fn finish_run_sets_ended_at_once() {
        let s = store();
        let session = s.get_or_create_session(None, "u1");
        let run = s.create_run(&session.id, "agt_1");
        s.finish_run(&run.id, RunStatus::Done, None).unwrap();
        let reloaded = s.get_run(&run.id).unwrap();
        assert!(reloaded.status.is_terminal());
        assert!(reloaded.ended_at.is_some());

        // A second terminal write is a no-op (first write wins).
        s.finish_run(&run.id, RunStatus::Failed, None).unwrap();
        let reloaded = s.get_run(&run.id).unwrap();
        assert_eq!(reloaded.status, RunStatus::Done);
    }

    #[test]
    fn events_are_monotonic_and_paginated() {
        let s = store();
        let session = s.get_or_create_session(None, "u1");
        let run = s.create_run(&session.id, "agt_1");
        for i in 0..5 {
            s.append_event(&run.id, EventType::AgentStreamDelta, serde_json::json!({"i": i}));
        }
        let page = s.get_events(&run.id, None, None, 3).unwrap();
        assert_eq!(page.events.len(), 3);
        assert!(page.has_more);
        let mut last_ts = i64::MIN;
        for e in &page.events {
            assert!(e.ts >= last_ts);
            last_ts = e.ts;
        }
    }

    #[test]
    fn get_events_unknown_run_errors() {
        let s = store();
        assert!(s.get_events("run_missing", None, None, 10).is_err());
    }

    #[test]
    fn tool_result_submission_is_idempotent_on_terminal() {
        let s = store();
        let session = s.get_or_create_session(None, "u1");
        let run = s.create_run(&session.id, "agt_1");
        let tc = s.create_tool_call(&run.id, "search.web", ToolKind::Server, serde_json::json!({}), None, 1000);
        let first = s
            .set_tool_call_status(&tc.id, ToolCallStatus::Succeeded, Some(serde_json::json!({"v": 1})), None)
            .unwrap();
        assert_eq!(first.result, Some(serde_json::json!({"v": 1})));

        let second = s
            .set_tool_call_status(&tc.id, ToolCallStatus::Succeeded, Some(serde_json::json!({"v": 2})), None)
            .unwrap();
        // Stored result is the first write; the terminal write never overwrote it.
        assert_eq!(second.result, Some(serde_json::json!({"v": 1})));
    }

    #[test]
    fn idempotency_key_collapses_repeated_invokes() {
        let s = store();
        let session = s.get_or_create_session(None, "u1");
        let run = s.create_run(&session.id, "agt_1");
        let first = s.create_tool_call(
            &run.id,
            "search.web",
            ToolKind::Server,
            serde_json::json!({}),
            Some("key1".to_string()),
            1000,
        );
        let found = s.find_tool_call_by_idempotency(&run.id, "search.web", "key1");
        assert_eq!(found.unwrap().id, first.id);
    }

    #[test]
    fn approval_decision_is_sticky() {
        let s = store();
        let session = s.get_or_create_session(None, "u1");
        let run = s.create_run(&session.id, "agt_1");
        let approval = s.create_approval(&run.id, "tc_1");
        let approved = s
            .decide_approval(&approval.id, ApprovalDecision::Approve, None, None)
            .unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);

        let second = s
            .decide_approval(&approval.id, ApprovalDecision::Reject, None, None)
            .unwrap();
        assert_eq!(second.status, ApprovalStatus::Approved);
    }

    #[test]
    fn scan_expired_tool_calls_respects_deadline_and_limit() {
        let s = store();
        let session = s.get_or_create_session(None, "u1");
        let run = s.create_run(&session.id, "agt_1");
        let tc = s.create_tool_call(&run.id, "slow.tool", ToolKind::Client, serde_json::json!({}), None, 0);
        let expired = s.scan_expired_tool_calls(ids::now_ms() + 1, 100);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, tc.id);
    }
}
