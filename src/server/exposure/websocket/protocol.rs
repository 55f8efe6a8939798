//! WebSocket message protocol definitions
//!
//! Defines the JSON frames exchanged between chat clients and the server.
//! Rooms are addressed by destination strings:
//!
//! - `/topic/room/{roomId}`: server → client broadcast channel
//! - `/app/room/{roomId}`: client → server inbound channel
//!
//! ## Client → Server Frames
//!
//! ```json
//! // Present credentials (only needed when the upgrade request carried none)
//! {"type": "connect", "token": "..."}
//!
//! // Join a room
//! {"type": "subscribe", "destination": "/topic/room/6f1c..."}
//!
//! // Leave a room
//! {"type": "unsubscribe", "destination": "/topic/room/6f1c..."}
//!
//! // Post to a room
//! {"type": "send", "destination": "/app/room/6f1c...",
//!  "body": {"type": "CHAT", "sender": "Ali", "message": "Asalaamu Alaikum"}}
//!
//! // Fetch history
//! {"type": "history", "room_id": "6f1c...", "page": 0, "size": 20}
//!
//! // Keepalive
//! {"type": "ping"}
//! ```
//!
//! ## Server → Client Frames
//!
//! ```json
//! {"type": "connected", "session_id": "sess_...", "principal": "Ali", "heartbeat_interval_ms": 4000}
//! {"type": "subscribed", "destination": "/topic/room/6f1c..."}
//! {"type": "message", "destination": "/topic/room/6f1c...",
//!  "body": {"sequenceNo": 3, "roomId": "6f1c...", "type": "CHAT", "sender": "Ali", ...}}
//! {"type": "history", "room_id": "6f1c...", "page": {"content": [...], "isLastPage": true, ...}}
//! {"type": "room_closed", "room_id": "6f1c..."}
//! {"type": "error", "code": "NOT_JOINED", "message": "..."}
//! ```

use crate::broker::{TopicEvent, topic_for};
use crate::core::error::{ChatError, ChatResult};
use crate::core::message::{ChatMessage, StoredMessage};
use crate::core::page::Page;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TOPIC_PREFIX: &str = "/topic/room/";
const APP_PREFIX: &str = "/app/room/";

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Handshake credential
    Connect { token: String },
    /// Join the room behind a topic destination
    Subscribe { destination: String },
    /// Leave the room behind a topic destination
    Unsubscribe { destination: String },
    /// Publish a chat frame to an app destination
    Send {
        destination: String,
        body: ChatMessage,
    },
    /// Request a history page
    History {
        room_id: Uuid,
        #[serde(default)]
        page: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<usize>,
    },
    /// Keepalive ping
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Handshake accepted
    Connected {
        session_id: String,
        principal: String,
        heartbeat_interval_ms: u64,
    },
    /// Room joined
    Subscribed { destination: String },
    /// Room left
    Unsubscribed { destination: String },
    /// A message committed to a subscribed room
    Message {
        destination: String,
        body: StoredMessage,
    },
    /// Reply to a history request
    History { room_id: Uuid, page: Page },
    /// The room was closed by the event lifecycle
    RoomClosed { room_id: Uuid },
    /// Keepalive response
    Pong,
    /// Error message
    Error { code: String, message: String },
}

impl From<&ChatError> for ServerFrame {
    fn from(err: &ChatError) -> Self {
        let response = err.to_response();
        ServerFrame::Error {
            code: response.code,
            message: response.message,
        }
    }
}

impl From<TopicEvent> for ServerFrame {
    fn from(event: TopicEvent) -> Self {
        match event {
            TopicEvent::Message(message) => ServerFrame::Message {
                destination: topic_for(&message.room_id),
                body: (*message).clone(),
            },
            TopicEvent::Closed { room_id } => ServerFrame::RoomClosed { room_id },
        }
    }
}

/// A parsed room destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// `/topic/room/{id}`
    Topic(Uuid),
    /// `/app/room/{id}`
    App(Uuid),
}

impl Destination {
    pub fn parse(raw: &str) -> ChatResult<Self> {
        if let Some(id) = raw.strip_prefix(TOPIC_PREFIX) {
            return Ok(Destination::Topic(Uuid::parse_str(id)?));
        }
        if let Some(id) = raw.strip_prefix(APP_PREFIX) {
            return Ok(Destination::App(Uuid::parse_str(id)?));
        }
        Err(ChatError::invalid(format!("unknown destination '{}'", raw)))
    }

    pub fn room_id(&self) -> Uuid {
        match self {
            Destination::Topic(id) | Destination::App(id) => *id,
        }
    }

    /// Parse and require a `/topic/room/{id}` destination
    pub fn topic(raw: &str) -> ChatResult<Uuid> {
        match Self::parse(raw)? {
            Destination::Topic(id) => Ok(id),
            Destination::App(_) => Err(ChatError::invalid(format!(
                "'{}' is not a subscribable topic",
                raw
            ))),
        }
    }

    /// Parse and require a `/app/room/{id}` destination
    pub fn app(raw: &str) -> ChatResult<Uuid> {
        match Self::parse(raw)? {
            Destination::App(id) => Ok(id),
            Destination::Topic(_) => Err(ChatError::invalid(format!(
                "'{}' is not a publish destination",
                raw
            ))),
        }
    }
}

/// Publish address for a room, as used by clients
pub fn app_destination(room_id: &Uuid) -> String {
    format!("{}{}", APP_PREFIX, room_id)
}
