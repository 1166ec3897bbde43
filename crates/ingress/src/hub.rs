//! The ingress fan-out fabric.
//!
//! A process-wide registry mapping connection id -> outbound channel and
//! session id -> connection set, guarded by a single mutex the way
//! [`sa_domain::store::InMemoryStore`] guards its maps — one serialized
//! writer, no caller ever touches the maps directly. Broadcast is a
//! non-blocking enqueue per connection; a connection whose queue would
//! block is unregistered rather than allowed to stall the others (drop
//! the slowest, preserve the hub).

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use sa_domain::trace::OperationalEvent;
use sa_protocol::OutboundFrame;
use tokio::sync::mpsc;

pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

struct ConnectionHandle {
    session_id: String,
    sender: mpsc::Sender<OutboundFrame>,
}

struct Inner {
    connections: HashMap<String, ConnectionHandle>,
    sessions: HashMap<String, HashSet<String>>,
}

pub struct Hub {
    inner: Mutex<Inner>,
}

impl Hub {
    pub fn new() -> Self {
        Hub {
            inner: Mutex::new(Inner {
                connections: HashMap::new(),
                sessions: HashMap::new(),
            }),
        }
    }

    /// Register a new connection bound to `session_id`, returning the
    /// receiver half of its bounded outbound channel for the writer task.
    pub fn register(&self, connection_id: String, session_id: String) -> mpsc::Receiver<OutboundFrame> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        self.register_with_sender(connection_id, session_id, tx);
        rx
    }

    /// Register a connection whose writer task already owns an outbound
    /// channel (the socket writer was spawned before `hello` bound a
    /// session, so the sender predates registration). Used by the ws
    /// reader; [`Hub::register`] is the self-contained variant used by
    /// tests and anything that doesn't need to pre-exist a channel.
    pub fn register_with_sender(&self, connection_id: String, session_id: String, sender: mpsc::Sender<OutboundFrame>) {
        {
            let mut inner = self.inner.lock();
            inner.connections.insert(
                connection_id.clone(),
                ConnectionHandle { session_id: session_id.clone(), sender },
            );
            inner.sessions.entry(session_id.clone()).or_default().insert(connection_id.clone());
        }
        OperationalEvent::ConnectionRegistered { connection_id, session_id }.emit();
    }

    /// Remove a connection from both maps and clean up an emptied session
    /// set. A no-op if the connection is already gone.
    pub fn unregister(&self, connection_id: &str) {
        let removed = {
            let mut inner = self.inner.lock();
            let Some(handle) = inner.connections.remove(connection_id) else {
                return;
            };
            if let Some(set) = inner.sessions.get_mut(&handle.session_id) {
                set.remove(connection_id);
                if set.is_empty() {
                    inner.sessions.remove(&handle.session_id);
                }
            }
            handle.session_id
        };
        OperationalEvent::ConnectionUnregistered {
            connection_id: connection_id.to_string(),
            session_id: removed,
        }
        .emit();
    }

    /// Non-blocking fan-out to every connection currently bound to
    /// `session_id`. Returns `true` iff at least one connection was bound
    /// and accepted the frame. A connection whose queue is full or whose
    /// receiver has already gone away is unregistered after the pass.
    pub fn broadcast(&self, session_id: &str, frame: OutboundFrame) -> bool {
        let targets: Vec<(String, mpsc::Sender<OutboundFrame>)> = {
            let inner = self.inner.lock();
            match inner.sessions.get(session_id) {
                Some(ids) if !ids.is_empty() => ids
                    .iter()
                    .filter_map(|id| inner.connections.get(id).map(|h| (id.clone(), h.sender.clone())))
                    .collect(),
                _ => return false,
            }
        };

        let mut delivered = false;
        let mut overflowed = Vec::new();
        for (connection_id, sender) in &targets {
            match sender.try_send(frame.clone()) {
                Ok(()) => delivered = true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    OperationalEvent::SlowConsumer {
                        connection_id: connection_id.clone(),
                        session_id: session_id.to_string(),
                    }
                    .emit();
                    overflowed.push(connection_id.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => overflowed.push(connection_id.clone()),
            }
        }
        for id in &overflowed {
            self.unregister(id);
        }
        delivered
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn session_connection_count(&self, session_id: &str) -> usize {
        self.inner.lock().sessions.get(session_id).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(text: &str) -> OutboundFrame {
        OutboundFrame::Delta { ts: 1, run_id: "run_1".to_string(), text: text.to_string() }
    }

    #[tokio::test]
    async fn broadcast_delivers_to_a_bound_connection() {
        let hub = Hub::new();
        let mut rx = hub.register("c1".to_string(), "sess_1".to_string());
        let delivered = hub.broadcast("sess_1", delta("hi"));
        assert!(delivered);
        let frame = rx.recv().await.unwrap();
        matches!(frame, OutboundFrame::Delta { .. });
    }

    #[test]
    fn broadcast_to_unknown_session_returns_false() {
        let hub = Hub::new();
        assert!(!hub.broadcast("sess_missing", delta("hi")));
    }

    #[tokio::test]
    async fn unregister_removes_from_session_set_and_closes_the_channel() {
        let hub = Hub::new();
        let mut rx = hub.register("c1".to_string(), "sess_1".to_string());
        hub.unregister("c1");
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.session_connection_count("sess_1"), 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn broadcast_fans_out_to_every_connection_on_a_session() {
        let hub = Hub::new();
        let mut rx1 = hub.register("c1".to_string(), "sess_1".to_string());
        let mut rx2 = hub.register("c2".to_string(), "sess_1".to_string());
        hub.broadcast("sess_1", delta("hi"));
        assert!(rx1.recv().await.is_some());
        assert!(rx2.recv().await.is_some());
    }

    #[tokio::test]
    async fn a_full_queue_is_evicted_without_affecting_other_connections() {
        let hub = Hub::new();
        let rx1 = hub.register("c1".to_string(), "sess_1".to_string());
        let mut rx2 = hub.register("c2".to_string(), "sess_1".to_string());
        // Never drain c1's receiver, so its queue fills.
        std::mem::forget(rx1);
        for _ in 0..OUTBOUND_QUEUE_CAPACITY {
            hub.broadcast("sess_1", delta("x"));
        }
        assert_eq!(hub.session_connection_count("sess_1"), 2);

        // One more push overflows c1's queue; c1 is evicted, c2 keeps receiving.
        hub.broadcast("sess_1", delta("overflow"));
        assert_eq!(hub.session_connection_count("sess_1"), 1);
        assert!(rx2.recv().await.is_some());
    }
}
