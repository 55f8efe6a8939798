//! Connection manager for WebSocket clients
//!
//! The `ConnectionManager` tracks every authenticated session and owns the
//! bounded control queue used to push replies (acks, history pages, errors)
//! to a session's write loop. Room traffic reaches the write loop through the
//! session's own topic queue, fed by the broker.
//!
//! # Architecture
//!
//! ```text
//! handler ──send_to(id, frame)──▶ control queue ──┐
//!                                                  ├──▶ write loop ──▶ socket
//! TopicBroker ──try_send(event)──▶ topic queue ───┘
//! ```
//!
//! Both queues are bounded by `connection.outbound_buffer`. A full queue
//! marks the session as slow and cancels it.

use super::protocol::ServerFrame;
use crate::broker::TopicEvent;
use crate::core::auth::Principal;
use crate::core::session::Session;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};

const DRAIN_POLL: Duration = Duration::from_millis(20);

/// A handle to a single WebSocket connection
struct ConnectionHandle {
    session: Arc<Session>,
    /// Sender to push ServerFrames to the client's write loop
    tx: mpsc::Sender<ServerFrame>,
}

/// Receiving ends drained by a connection's write loop
pub struct SessionChannels {
    pub frames: mpsc::Receiver<ServerFrame>,
    pub topic: mpsc::Receiver<TopicEvent>,
}

/// Manages all active WebSocket sessions
///
/// Thread-safe via `RwLock`; lookups are frequent, connect/disconnect are not.
pub struct ConnectionManager {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
    outbound_buffer: usize,
}

impl ConnectionManager {
    /// Create a new ConnectionManager with per-session queue capacity
    pub fn new(outbound_buffer: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            outbound_buffer: outbound_buffer.max(1),
        }
    }

    /// Register a new session for an authenticated principal
    ///
    /// Returns the session and the queues its write loop must drain.
    pub async fn connect(&self, principal: Principal) -> (Arc<Session>, SessionChannels) {
        let (session, topic) = Session::open(principal, self.outbound_buffer);
        let session = Arc::new(session);
        let (tx, frames) = mpsc::channel(self.outbound_buffer);

        self.connections.write().await.insert(
            session.id().to_string(),
            ConnectionHandle {
                session: session.clone(),
                tx,
            },
        );

        tracing::info!(
            session_id = %session.id(),
            principal = %session.principal().name,
            "WebSocket session opened"
        );

        (session, SessionChannels { frames, topic })
    }

    /// Remove a session when the client disconnects
    pub async fn disconnect(&self, session_id: &str) -> Option<Arc<Session>> {
        let removed = self.connections.write().await.remove(session_id);
        if removed.is_some() {
            tracing::debug!(session_id = %session_id, "WebSocket session removed");
        }
        removed.map(|handle| handle.session)
    }

    /// Send a frame to a specific session
    ///
    /// Never waits. Returns `false` if the session is gone or its queue is
    /// full; a full queue also cancels the session.
    pub async fn send_to(&self, session_id: &str, frame: ServerFrame) -> bool {
        let connections = self.connections.read().await;
        let Some(conn) = connections.get(session_id) else {
            return false;
        };

        match conn.tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    session_id = %session_id,
                    "Control queue full, closing slow session"
                );
                conn.session.cancel_token().cancel();
                false
            }
            // Receiver dropped: the write loop already exited
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Look up a session by id
    pub async fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.connections
            .read()
            .await
            .get(session_id)
            .map(|handle| handle.session.clone())
    }

    /// All sessions held by one principal (multi-device)
    pub async fn sessions_for(&self, principal_id: &str) -> Vec<Arc<Session>> {
        self.connections
            .read()
            .await
            .values()
            .filter(|handle| handle.session.principal().id == principal_id)
            .map(|handle| handle.session.clone())
            .collect()
    }

    /// Cancel every session, used on server shutdown
    pub async fn close_all(&self) {
        let connections = self.connections.read().await;
        for handle in connections.values() {
            handle.session.cancel_token().cancel();
        }
        tracing::info!(sessions = connections.len(), "Closing all WebSocket sessions");
    }

    /// Wait until every session has deregistered, up to `limit`
    ///
    /// A session deregisters only after its teardown has recorded the
    /// synthetic leave. Returns `false` if sessions remained when time ran out.
    pub async fn drain(&self, limit: Duration) -> bool {
        let emptied = async {
            while self.connection_count().await > 0 {
                tokio::time::sleep(DRAIN_POLL).await;
            }
        };
        tokio::time::timeout(limit, emptied).await.is_ok()
    }

    /// Get the number of active connections (for monitoring)
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
