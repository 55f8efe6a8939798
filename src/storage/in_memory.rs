//! In-memory implementation of MessageStore for testing and development

use crate::core::error::{ChatError, ChatResult};
use crate::core::message::{self, ChatMessage, StoredMessage};
use crate::core::page::{Page, check_page_size, page_window};
use crate::core::store::MessageStore;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

#[derive(Default)]
struct RoomLog {
    messages: Vec<StoredMessage>,
    closed: bool,
}

/// In-memory message store implementation
///
/// Each room's log sits behind its own mutex; the outer `RwLock` only guards
/// the room table, so appends to unrelated rooms never contend.
#[derive(Clone, Default)]
pub struct InMemoryMessageStore {
    rooms: Arc<RwLock<HashMap<Uuid, Arc<Mutex<RoomLog>>>>>,
}

impl InMemoryMessageStore {
    /// Create a new in-memory message store
    pub fn new() -> Self {
        Self::default()
    }

    fn existing_room(&self, room_id: &Uuid) -> ChatResult<Option<Arc<Mutex<RoomLog>>>> {
        let rooms = self
            .rooms
            .read()
            .map_err(|e| anyhow!("Failed to acquire read lock: {}", e))?;
        Ok(rooms.get(room_id).cloned())
    }

    fn room(&self, room_id: Uuid) -> ChatResult<Arc<Mutex<RoomLog>>> {
        if let Some(room) = self.existing_room(&room_id)? {
            return Ok(room);
        }

        let mut rooms = self
            .rooms
            .write()
            .map_err(|e| anyhow!("Failed to acquire write lock: {}", e))?;
        Ok(rooms.entry(room_id).or_default().clone())
    }

    /// Read a room's log under its lock; unknown rooms read as empty
    fn with_log<T>(&self, room_id: &Uuid, f: impl FnOnce(&RoomLog) -> T) -> ChatResult<T> {
        match self.existing_room(room_id)? {
            Some(room) => {
                let log = room
                    .lock()
                    .map_err(|e| anyhow!("Failed to acquire room lock: {}", e))?;
                Ok(f(&log))
            }
            None => Ok(f(&RoomLog::default())),
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn append(&self, room_id: Uuid, message: ChatMessage) -> ChatResult<StoredMessage> {
        message.validate()?;

        let room = self.room(room_id)?;
        let mut log = room
            .lock()
            .map_err(|e| anyhow!("Failed to acquire room lock: {}", e))?;

        if log.closed {
            return Err(ChatError::RoomClosed { room_id });
        }

        let last = log.messages.last().map(StoredMessage::timestamp);
        let at = message::stamp(&message, last, Utc::now());
        let stored = StoredMessage {
            sequence_no: log.messages.len() as u64 + 1,
            room_id,
            message: message.with_timestamp(at),
        };
        log.messages.push(stored.clone());

        Ok(stored)
    }

    async fn page(&self, room_id: Uuid, page_index: usize, page_size: usize) -> ChatResult<Page> {
        check_page_size(page_size)?;
        self.with_log(&room_id, |log| {
            let total = log.messages.len() as u64;
            match page_window(total, page_index, page_size) {
                None => Page::empty(page_index, page_size, total),
                Some(window) => {
                    let start = (*window.start() - 1) as usize;
                    let end = *window.end() as usize;
                    Page {
                        content: log.messages[start..end].iter().rev().cloned().collect(),
                        page_index,
                        page_size,
                        is_last_page: *window.start() == 1,
                        total_count: total,
                    }
                }
            }
        })
    }

    async fn total_count(&self, room_id: Uuid) -> ChatResult<u64> {
        self.with_log(&room_id, |log| log.messages.len() as u64)
    }

    async fn history(&self, room_id: Uuid) -> ChatResult<Vec<StoredMessage>> {
        self.with_log(&room_id, |log| log.messages.iter().rev().cloned().collect())
    }

    async fn close_room(&self, room_id: Uuid) -> ChatResult<bool> {
        let room = self.room(room_id)?;
        let mut log = room
            .lock()
            .map_err(|e| anyhow!("Failed to acquire room lock: {}", e))?;
        let newly_closed = !log.closed;
        log.closed = true;
        Ok(newly_closed)
    }

    async fn is_closed(&self, room_id: Uuid) -> ChatResult<bool> {
        self.with_log(&room_id, |log| log.closed)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
