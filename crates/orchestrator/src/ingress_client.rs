//! The small client the orchestrator runs for Ingress's push RPC.
//! Failures are logged but never block the write of the authoritative
//! event to the event log: callers should fire-and-forget
//! via [`IngressClient::push_event`] after the store write has already
//! succeeded.

use sa_domain::trace::OperationalEvent;
use sa_protocol::rpc::{read_frame, write_frame, IngressRequest, IngressResponse};
use sa_protocol::OutboundFrame;
use tokio::net::TcpStream;

pub struct IngressClient {
    addr: String,
}

impl IngressClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        IngressClient {
            addr: format!("{}:{port}", host.into()),
        }
    }

    /// Best-effort push. Returns `true` if Ingress reported the event was
    /// delivered to at least one connection; `false` on any failure
    /// (dial failure, write failure, or Ingress reporting no bound
    /// connections) — the caller never treats this as an error.
    pub async fn push_event(&self, session_id: &str, frame: OutboundFrame) -> bool {
        match self.try_push(session_id, frame).await {
            Ok(delivered) => delivered,
            Err(reason) => {
                OperationalEvent::PushFailed {
                    session_id: session_id.to_string(),
                    reason: reason.clone(),
                }
                .emit();
                tracing::warn!(session_id, reason, "push to ingress failed");
                false
            }
        }
    }

    async fn try_push(&self, session_id: &str, frame: OutboundFrame) -> Result<bool, String> {
        let mut stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| format!("dial {}: {e}", self.addr))?;
        let request = IngressRequest::PushEvent {
            session_id: session_id.to_string(),
            frame,
        };
        write_frame(&mut stream, &request)
            .await
            .map_err(|e| format!("write: {e}"))?;
        let response: IngressResponse = read_frame(&mut stream).await.map_err(|e| format!("read: {e}"))?;
        match response {
            IngressResponse::Ok { delivered } => Ok(delivered),
            IngressResponse::Err { message } => Err(message),
        }
    }
}
