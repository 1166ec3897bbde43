//! The client duplex protocol edge: one axum WebSocket
//! connection per client, split into a reader task (parses inbound
//! frames, dispatches to the orchestrator) and a writer task (drains the
//! connection's outbound channel, emits periodic pings). The two tasks
//! share a channel created before `hello` binds a session, so
//! pre-handshake frames (`hello_ack`, early `error`s) flow through the
//! same path as post-handshake hub-routed pushes.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use sa_domain::error::Error;
use sa_domain::ids;
use sa_protocol::{InboundFrame, OutboundFrame};

use crate::auth;
use crate::hub::OUTBOUND_QUEUE_CAPACITY;
use crate::state::AppState;

pub async fn handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = ids::connection_id();
    let (mut sink, mut stream) = socket.split();

    let write_timeout = Duration::from_millis(state.config.timeouts.write_timeout_ms);
    let ping_interval = Duration::from_millis(state.config.timeouts.ping_interval_ms);
    let read_timeout = Duration::from_millis(state.config.timeouts.read_timeout_ms);
    let max_message_bytes = state.config.timeouts.max_message_bytes;

    let (tx, rx) = mpsc::channel::<OutboundFrame>(OUTBOUND_QUEUE_CAPACITY);

    let writer = tokio::spawn(async move {
        run_writer(&mut sink, rx, write_timeout, ping_interval).await;
    });

    let mut session_id: Option<String> = None;

    loop {
        let next = tokio::time::timeout(read_timeout, stream.next()).await;
        let message = match next {
            Ok(Some(Ok(m))) => m,
            Ok(Some(Err(e))) => {
                tracing::debug!(%connection_id, error = %e, "websocket read error");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::debug!(%connection_id, "read timeout; closing idle connection");
                break;
            }
        };

        match message {
            Message::Text(text) => {
                if text.len() > max_message_bytes {
                    send_error(&tx, None, "invalid_message", format!("message of {} bytes exceeds max {max_message_bytes}", text.len())).await;
                    continue;
                }
                let frame: InboundFrame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(e) => {
                        send_error(&tx, None, "invalid_message", format!("unparseable frame: {e}")).await;
                        continue;
                    }
                };
                dispatch(&state, &connection_id, &mut session_id, &tx, frame).await;
            }
            // axum answers WS-level pings automatically; a pong refreshes
            // the read deadline simply by being the frame that restarts
            // the next `timeout` wait, same as any other received frame.
            Message::Ping(_) | Message::Pong(_) | Message::Binary(_) => {}
            Message::Close(_) => break,
        }
    }

    drop(tx);
    if session_id.is_some() {
        state.hub.unregister(&connection_id);
    }
    let _ = writer.await;
    tracing::info!(%connection_id, "connection closed");
}

/// Drains the outbound channel as text frames and emits a ping on the
/// configured interval. Exits once the channel closes (the reader
/// dropped its sender and the hub dropped its registered clone) or a
/// write fails, sending a close frame first.
async fn run_writer(
    sink: &mut (impl futures_util::Sink<Message, Error = axum::Error> + Unpin),
    mut rx: mpsc::Receiver<OutboundFrame>,
    write_timeout: Duration,
    ping_interval: Duration,
) {
    use futures_util::SinkExt;

    let mut ticker = tokio::time::interval(ping_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                let Ok(json) = serde_json::to_string(&frame) else { continue };
                if tokio::time::timeout(write_timeout, sink.send(Message::Text(json))).await.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if tokio::time::timeout(write_timeout, sink.send(Message::Ping(Vec::new()))).await.is_err() {
                    break;
                }
            }
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

async fn dispatch(
    state: &AppState,
    connection_id: &str,
    session_id: &mut Option<String>,
    tx: &mpsc::Sender<OutboundFrame>,
    frame: InboundFrame,
) {
    match frame {
        InboundFrame::Hello { api_key, session_id: requested, .. } => {
            if let Some(expected) = state.config.server.api_key.as_deref().filter(|k| !k.is_empty()) {
                let provided = api_key.as_deref().unwrap_or("");
                if !auth::token_eq(provided, expected) {
                    send_error(tx, None, "unauthorized", "invalid or missing api key".to_string()).await;
                    return;
                }
            }

            if let Some(bound) = session_id.as_ref() {
                // Re-hello on an already-bound connection: ack the
                // existing binding, no re-registration.
                let _ = tx.send(OutboundFrame::HelloAck { ts: ids::now_ms(), session_id: bound.clone() }).await;
                return;
            }

            let bound = requested.unwrap_or_else(ids::session_id);
            state.hub.register_with_sender(connection_id.to_string(), bound.clone(), tx.clone());
            *session_id = Some(bound.clone());
            let _ = tx.send(OutboundFrame::HelloAck { ts: ids::now_ms(), session_id: bound }).await;
        }
        InboundFrame::AgentInvoke { request_id, session_id: frame_session, agent_id, message, .. } => {
            let Some(sess) = session_id.clone().or(frame_session) else {
                send_session_required(tx, request_id).await;
                return;
            };
            let client = state.orchestrator_client.clone();
            tokio::spawn(async move {
                if let Err(e) = client
                    .invoke(Some(sess.clone()), agent_id, request_id.clone(), sess, message.content)
                    .await
                {
                    log_rpc_error(&e, "agent_invoke");
                }
            });
        }
        InboundFrame::ToolResult { tool_call_id, ok, result, error, .. } => {
            if session_id.is_none() {
                send_session_required(tx, None).await;
                return;
            }
            let client = state.orchestrator_client.clone();
            tokio::spawn(async move {
                if let Err(e) = client.submit_tool_result(tool_call_id, ok, result, error).await {
                    log_rpc_error(&e, "tool_result");
                }
            });
        }
        InboundFrame::ApprovalDecision { approval_id, decision, reason, .. } => {
            if session_id.is_none() {
                send_session_required(tx, None).await;
                return;
            }
            let Some(normalized) = normalize_decision(&decision) else {
                send_error(tx, None, "invalid_message", format!("unrecognized approval decision {decision:?}")).await;
                return;
            };
            let client = state.orchestrator_client.clone();
            tokio::spawn(async move {
                if let Err(e) = client.submit_approval_decision(approval_id, normalized.to_string(), reason).await {
                    log_rpc_error(&e, "approval_decision");
                }
            });
        }
        InboundFrame::CancelRun { run_id, .. } => {
            if session_id.is_none() {
                send_session_required(tx, None).await;
                return;
            }
            let client = state.orchestrator_client.clone();
            tokio::spawn(async move {
                if let Err(e) = client.cancel_run(run_id).await {
                    log_rpc_error(&e, "cancel_run");
                }
            });
        }
    }
}

/// Accepts the current and two legacy spellings (`approve|reject`,
/// `APPROVE|REJECT`, `APPROVED|REJECTED`).
fn normalize_decision(raw: &str) -> Option<&'static str> {
    match raw {
        "approve" | "APPROVE" | "APPROVED" => Some("approve"),
        "reject" | "REJECT" | "REJECTED" => Some("reject"),
        _ => None,
    }
}

fn log_rpc_error(e: &Error, frame_type: &str) {
    tracing::warn!(frame_type, error = %e, "orchestrator rpc call failed");
}

async fn send_session_required(tx: &mpsc::Sender<OutboundFrame>, request_id: Option<String>) {
    send_error(tx, request_id, "session_required", "a session must be bound via hello before sending this frame".to_string()).await;
}

async fn send_error(tx: &mpsc::Sender<OutboundFrame>, request_id: Option<String>, code: &str, message: String) {
    let _ = tx
        .send(OutboundFrame::Error {
            ts: ids::now_ms(),
            request_id,
            code: code.to_string(),
            message,
        })
        .await;
}
