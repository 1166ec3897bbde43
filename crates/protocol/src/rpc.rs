//! Internal orchestrator ↔ ingress RPC: length-framed JSON over a plain
//! TCP stream. Each direction uses a 4-byte big-endian length prefix
//! followed by a JSON body — no HTTP framing, no multiplexing beyond one
//! request in flight per open stream.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Requests Ingress sends to the Orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum OrchestratorRequest {
    Invoke {
        session_id: Option<String>,
        agent_id: String,
        request_id: Option<String>,
        user_id: String,
        message_content: String,
    },
    SubmitToolResult {
        tool_call_id: String,
        ok: bool,
        result: Option<serde_json::Value>,
        error: Option<String>,
    },
    SubmitApprovalDecision {
        approval_id: String,
        decision: String,
        reason: Option<String>,
    },
    CancelRun {
        run_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrchestratorResponse {
    Ok { value: serde_json::Value },
    Err { code: String, message: String },
}

/// Requests the Orchestrator sends to Ingress — currently just the one
/// push-event call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum IngressRequest {
    PushEvent {
        session_id: String,
        frame: crate::client::OutboundFrame,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngressResponse {
    Ok { delivered: bool },
    Err { message: String },
}

const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

pub async fn write_frame<W, T>(writer: &mut W, value: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let len = body.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await
}

pub async fn read_frame<R, T>(reader: &mut R) -> std::io::Result<T>
where
    R: AsyncRead + Unpin,
    T: for<'de> Deserialize<'de>,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("rpc frame of {len} bytes exceeds max {MAX_FRAME_BYTES}"),
        ));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    serde_json::from_slice(&body).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_request_over_an_in_memory_duplex() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let req = OrchestratorRequest::CancelRun {
            run_id: "run_1".to_string(),
        };
        write_frame(&mut a, &req).await.unwrap();
        let decoded: OrchestratorRequest = read_frame(&mut b).await.unwrap();
        match decoded {
            OrchestratorRequest::CancelRun { run_id } => assert_eq!(run_id, "run_1"),
            _ => panic!("wrong variant"),
        }
    }

    #[tokio::test]
    async fn rejects_oversized_frames() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let len = MAX_FRAME_BYTES + 1;
        a.write_all(&len.to_be_bytes()).await.unwrap();
        let result: std::io::Result<OrchestratorRequest> = read_frame(&mut b).await;
        assert!(result.is_err());
    }
}
