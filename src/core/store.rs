//! Message store trait
//!
//! The store exclusively owns each room's canonical message sequence. Rooms
//! are materialized lazily: any operation on an unknown room id behaves as if
//! the room existed with an empty log.

use crate::core::error::ChatResult;
use crate::core::message::{ChatMessage, StoredMessage};
use crate::core::page::Page;
use async_trait::async_trait;
use uuid::Uuid;

/// Durable append-only log of chat events per room
///
/// Implementations must assign sequence numbers `1, 2, 3, ...` per room with
/// no gaps, so `total_count` always equals the newest sequence number.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message to a room's log
    ///
    /// Assigns the next sequence number and a timestamp when absent.
    ///
    /// # Errors
    /// - `RoomClosed` if the room has been closed
    /// - `InvalidMessage` if a `Chat` body is blank
    async fn append(&self, room_id: Uuid, message: ChatMessage) -> ChatResult<StoredMessage>;

    /// Fetch a newest-first page
    ///
    /// An out-of-range `page_index` yields an empty page with
    /// `is_last_page = true`. A zero `page_size` is rejected with
    /// `InvalidMessage`.
    async fn page(&self, room_id: Uuid, page_index: usize, page_size: usize) -> ChatResult<Page>;

    /// Number of messages stored for a room
    async fn total_count(&self, room_id: Uuid) -> ChatResult<u64>;

    /// The full log, newest first
    async fn history(&self, room_id: Uuid) -> ChatResult<Vec<StoredMessage>>;

    /// Permanently reject further writes to a room
    ///
    /// Idempotent. Returns `true` only for the call that closed the room.
    async fn close_room(&self, room_id: Uuid) -> ChatResult<bool>;

    /// Whether `close_room` has been called for this room
    async fn is_closed(&self, room_id: Uuid) -> ChatResult<bool>;

    /// Backend name used in logs and health output
    fn backend_name(&self) -> &'static str;
}
