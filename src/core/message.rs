//! Chat message types
//!
//! [`ChatMessage`] is the unit clients send and the store persists. Once the
//! store has accepted a message it is wrapped in a [`StoredMessage`], which
//! carries the room-scoped sequence number that totally orders the room's log.
//!
//! # Wire format
//!
//! ```json
//! {"type": "CHAT", "sender": "Ali", "message": "Asalaamu Alaikum", "timestamp": "2026-01-09T12:30:00Z"}
//! {"type": "JOIN", "sender": "Ali"}
//! ```
//!
//! A stored message adds `sequenceNo` and `roomId` to the same object.

use crate::core::error::{ChatError, ChatResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind discriminator shared by the wire and storage layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Chat,
    Join,
    Leave,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageKind::Chat => "CHAT",
            MessageKind::Join => "JOIN",
            MessageKind::Leave => "LEAVE",
        };
        f.write_str(s)
    }
}

/// A chat event scoped to one room
///
/// The timestamp is optional until the message is appended; the store stamps
/// it when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatMessage {
    Chat {
        sender: String,
        #[serde(rename = "message")]
        body: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    Join {
        sender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    Leave {
        sender: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
}

impl ChatMessage {
    /// Create an unstamped chat message
    pub fn chat(sender: impl Into<String>, body: impl Into<String>) -> Self {
        ChatMessage::Chat {
            sender: sender.into(),
            body: body.into(),
            timestamp: None,
        }
    }

    /// Create an unstamped join notice
    pub fn join(sender: impl Into<String>) -> Self {
        ChatMessage::Join {
            sender: sender.into(),
            timestamp: None,
        }
    }

    /// Create an unstamped leave notice
    pub fn leave(sender: impl Into<String>) -> Self {
        ChatMessage::Leave {
            sender: sender.into(),
            timestamp: None,
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            ChatMessage::Chat { .. } => MessageKind::Chat,
            ChatMessage::Join { .. } => MessageKind::Join,
            ChatMessage::Leave { .. } => MessageKind::Leave,
        }
    }

    pub fn sender(&self) -> &str {
        match self {
            ChatMessage::Chat { sender, .. }
            | ChatMessage::Join { sender, .. }
            | ChatMessage::Leave { sender, .. } => sender,
        }
    }

    /// Message body, only present for `Chat`
    pub fn body(&self) -> Option<&str> {
        match self {
            ChatMessage::Chat { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            ChatMessage::Chat { timestamp, .. }
            | ChatMessage::Join { timestamp, .. }
            | ChatMessage::Leave { timestamp, .. } => *timestamp,
        }
    }

    /// Replace the timestamp
    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        match &mut self {
            ChatMessage::Chat { timestamp, .. }
            | ChatMessage::Join { timestamp, .. }
            | ChatMessage::Leave { timestamp, .. } => *timestamp = Some(at),
        }
        self
    }

    /// Replace the sender, used to bind a message to its authenticated author
    pub fn with_sender(mut self, name: impl Into<String>) -> Self {
        match &mut self {
            ChatMessage::Chat { sender, .. }
            | ChatMessage::Join { sender, .. }
            | ChatMessage::Leave { sender, .. } => *sender = name.into(),
        }
        self
    }

    /// Check the invariants a message must satisfy before it can be stored
    ///
    /// A `Chat` body must be non-empty after trimming.
    pub fn validate(&self) -> ChatResult<()> {
        if let ChatMessage::Chat { body, .. } = self
            && body.trim().is_empty()
        {
            return Err(ChatError::invalid("message body must not be empty"));
        }
        Ok(())
    }
}

/// A message that has been committed to a room's log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Strictly increasing within a room, starting at 1
    pub sequence_no: u64,
    pub room_id: Uuid,
    #[serde(flatten)]
    pub message: ChatMessage,
}

impl StoredMessage {
    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    pub fn sender(&self) -> &str {
        self.message.sender()
    }

    pub fn body(&self) -> Option<&str> {
        self.message.body()
    }

    /// Stored messages are always stamped; the epoch is only returned for
    /// records written by something other than a store.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.message.timestamp().unwrap_or_default()
    }
}

/// Append-time stamping shared by every store backend
///
/// Returns the timestamp to persist: the message's own timestamp (or `now`
/// when absent) clamped so a room's log never goes backwards in time.
pub fn stamp(
    message: &ChatMessage,
    last: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let candidate = message.timestamp().unwrap_or(now);
    match last {
        Some(last) if last > candidate => last,
        _ => candidate,
    }
}
