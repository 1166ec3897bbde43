use serde::Serialize;

/// Structured operational events emitted by both services via `tracing`.
///
/// These are distinct from the persisted [`crate::model::Event`] log: they
/// are process-local observability signals (slow consumers, sweeper ticks,
/// link failures), never replayed to a client and never stored.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum OperationalEvent {
    SlowConsumer {
        connection_id: String,
        session_id: String,
    },
    ConnectionRegistered {
        connection_id: String,
        session_id: String,
    },
    ConnectionUnregistered {
        connection_id: String,
        session_id: String,
    },
    SweeperTick {
        scanned: usize,
        timed_out: usize,
        duration_ms: u64,
    },
    PushFailed {
        session_id: String,
        reason: String,
    },
    RpcDialFailed {
        target: String,
        reason: String,
    },
    AgentStreamFailed {
        run_id: String,
        agent_id: String,
        reason: String,
    },
}

impl OperationalEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(op_event = %json, "sa_event");
    }
}
