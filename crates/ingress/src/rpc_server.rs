//! The internal RPC listener ingress exposes to the orchestrator:
//! `PushEvent(session_id, frame)`. The orchestrator dials this
//! after every user-visible transition; delivery is best-effort and
//! never blocks the authoritative event-log write on the other end.

use std::sync::Arc;

use sa_protocol::rpc::{read_frame, write_frame, IngressRequest, IngressResponse};
use tokio::net::{TcpListener, TcpStream};

use crate::hub::Hub;

pub async fn serve(hub: Arc<Hub>, addr: &str) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr, "ingress rpc listening");
    loop {
        let (stream, peer) = listener.accept().await?;
        let hub = hub.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(hub, stream).await {
                tracing::debug!(%peer, error = %e, "rpc connection closed");
            }
        });
    }
}

async fn handle_connection(hub: Arc<Hub>, mut stream: TcpStream) -> std::io::Result<()> {
    loop {
        let request: IngressRequest = match read_frame(&mut stream).await {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e),
        };
        let response = match request {
            IngressRequest::PushEvent { session_id, frame } => {
                let delivered = hub.broadcast(&session_id, frame);
                IngressResponse::Ok { delivered }
            }
        };
        write_frame(&mut stream, &response).await?;
    }
}
