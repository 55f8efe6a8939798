//! Live connection sessions
//!
//! A [`Session`] binds one authenticated principal to one open connection and
//! at most one subscribed room. The same [`ConnectionState`] machine is used by
//! the server side of a connection and by the reconnecting client:
//!
//! ```text
//! Connecting -> Authenticating -> Open -> {Reconnecting, Closing} -> Closed
//! ```
//!
//! `Reconnecting` only ever occurs on the client side; a server session that
//! loses its transport goes straight to `Closing`.

use crate::broker::{SubscriptionHandle, TopicEvent};
use crate::core::auth::Principal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Authenticating = 1,
    Open = 2,
    Reconnecting = 3,
    Closing = 4,
    Closed = 5,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Authenticating,
            2 => ConnectionState::Open,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }

    /// Whether the state machine can move from `self` to `next`
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Connecting, Authenticating)
                | (Connecting, Reconnecting)
                | (Connecting, Closing)
                | (Connecting, Closed)
                | (Authenticating, Open)
                | (Authenticating, Reconnecting)
                | (Authenticating, Closing)
                | (Authenticating, Closed)
                | (Open, Reconnecting)
                | (Open, Closing)
                | (Reconnecting, Connecting)
                | (Reconnecting, Closing)
                | (Reconnecting, Closed)
                | (Closing, Closed)
        )
    }

    pub fn is_terminal(self) -> bool {
        self == ConnectionState::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Authenticating => "authenticating",
            ConnectionState::Open => "open",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// The room a session is currently joined to
#[derive(Debug, Clone)]
pub struct RoomBinding {
    pub room_id: Uuid,
    pub handle: SubscriptionHandle,
}

/// One connection's subscription and auth binding
///
/// Sessions are shared as `Arc<Session>` between the connection's reader and
/// writer tasks, the coordinator and the broker's subscriber set.
pub struct Session {
    id: String,
    principal: Principal,
    state: AtomicU8,
    created: Instant,
    last_heartbeat_ms: AtomicU64,
    room: Mutex<Option<RoomBinding>>,
    topic_tx: mpsc::Sender<TopicEvent>,
    cancel: CancellationToken,
}

impl Session {
    /// Create an open session for an authenticated principal
    ///
    /// Returns the session and the receiving end of its topic queue. The
    /// queue is bounded by `buffer`; the broker evicts the session when it
    /// fills up.
    pub fn open(principal: Principal, buffer: usize) -> (Self, mpsc::Receiver<TopicEvent>) {
        let (topic_tx, topic_rx) = mpsc::channel(buffer.max(1));
        let session = Self {
            id: format!("sess_{}", Uuid::new_v4().simple()),
            principal,
            state: AtomicU8::new(ConnectionState::Open as u8),
            created: Instant::now(),
            last_heartbeat_ms: AtomicU64::new(0),
            room: Mutex::new(None),
            topic_tx,
            cancel: CancellationToken::new(),
        };
        (session, topic_rx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move to `next` if the transition is legal, returning the previous state
    pub fn transition(&self, next: ConnectionState) -> Option<ConnectionState> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let from = ConnectionState::from_u8(current);
            if !from.can_transition_to(next) {
                return None;
            }
            match self.state.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    tracing::debug!(session_id = %self.id, from = %from, to = %next, "session state changed");
                    return Some(from);
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Record inbound traffic from the peer
    pub fn touch(&self) {
        let elapsed = self.created.elapsed().as_millis() as u64;
        self.last_heartbeat_ms.store(elapsed, Ordering::Release);
    }

    /// Time since the peer was last heard from
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_heartbeat_ms.load(Ordering::Acquire));
        self.created.elapsed().saturating_sub(last)
    }

    /// The room binding, locked for the caller's exclusive use
    pub fn room(&self) -> &Mutex<Option<RoomBinding>> {
        &self.room
    }

    /// Currently joined room, if any
    pub async fn room_id(&self) -> Option<Uuid> {
        self.room.lock().await.as_ref().map(|b| b.room_id)
    }

    /// Sender half of the topic queue, handed to the broker on subscribe
    pub fn topic_sender(&self) -> mpsc::Sender<TopicEvent> {
        self.topic_tx.clone()
    }

    /// Cancelled when the session must be torn down
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("principal", &self.principal.name)
            .field("state", &self.state())
            .finish()
    }
}
