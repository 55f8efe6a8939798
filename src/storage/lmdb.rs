//! LMDB storage backend using heed (memory-mapped B-tree).
//!
//! LMDB is an embedded key-value store, no external server required.
//! All operations are synchronous (memory-mapped I/O) and are wrapped in
//! `tokio::task::spawn_blocking` for async compatibility.
//!
//! # Databases (named LMDB sub-databases)
//!
//! - `messages`: composite key `{room_uuid}:{sequence_no:020}` → JSON `StoredMessage`
//! - `rooms`: key `{room_uuid}` → JSON `RoomMeta` (message count, closed flag,
//!   newest timestamp)
//!
//! Sequence numbers are zero-padded so lexicographic key order matches
//! numeric order within a room prefix.
//!
//! Every append runs in a single write transaction that reads the room meta,
//! writes the message and bumps the meta. LMDB admits one writer at a time,
//! which gives the dense per-room sequence the store contract requires.
//!
//! # Feature flag
//!
//! Enable with `--features lmdb`. Requires the `heed` crate.

use crate::core::error::{ChatError, ChatResult};
use crate::core::message::{self, ChatMessage, StoredMessage};
use crate::core::page::{Page, check_page_size, page_window};
use crate::core::store::MessageStore;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Encode a value as JSON bytes for LMDB storage.
fn lmdb_encode<T: Serialize>(item: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(item).map_err(|e| anyhow!("lmdb encode: {}", e))
}

/// Decode a value from JSON bytes.
fn lmdb_decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| anyhow!("lmdb decode: {}", e))
}

fn message_key(room_id: &Uuid, sequence_no: u64) -> String {
    format!("{}:{:020}", room_id, sequence_no)
}

/// Rooms without a meta record read as empty and open
fn decode_meta(bytes: Option<&[u8]>) -> Result<RoomMeta> {
    match bytes {
        Some(bytes) => lmdb_decode(bytes),
        None => Ok(RoomMeta::default()),
    }
}

/// Per-room bookkeeping persisted next to the log
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RoomMeta {
    count: u64,
    closed: bool,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Run a blocking LMDB closure off the async runtime
async fn blocking<T, F>(f: F) -> ChatResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ChatError::Internal(format!("lmdb task failed: {}", e)))?;
    result.map_err(|e| match e.downcast::<ChatError>() {
        Ok(chat_err) => chat_err,
        Err(e) => ChatError::storage("lmdb", format!("{:#}", e)),
    })
}

// ---------------------------------------------------------------------------
// LmdbMessageStore
// ---------------------------------------------------------------------------

/// LMDB-backed implementation of [`MessageStore`].
///
/// The `Env` is wrapped in an `Arc` for cheap cloning across async tasks.
///
/// # Example
///
/// ```rust,ignore
/// use jummah_chat::storage::LmdbMessageStore;
///
/// let store = LmdbMessageStore::open("/var/lib/jummah-chat")?;
/// let stored = store.append(room_id, ChatMessage::join("Ali")).await?;
/// ```
#[derive(Clone)]
pub struct LmdbMessageStore {
    env: Arc<Env>,
    messages: Database<Str, Bytes>,
    rooms: Database<Str, Bytes>,
}

impl LmdbMessageStore {
    /// Open (or create) an LMDB environment at `path` and initialise the
    /// `messages` and `rooms` named databases.
    ///
    /// The map size defaults to 256 MB. LMDB will not actually allocate that
    /// much, it is a virtual address space reservation.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(path.as_ref())?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(256 * 1024 * 1024)
                .max_dbs(10)
                .max_readers(126)
                .open(path.as_ref())?
        };

        let mut wtxn = env.write_txn()?;
        let messages: Database<Str, Bytes> = env.create_database(&mut wtxn, Some("messages"))?;
        let rooms: Database<Str, Bytes> = env.create_database(&mut wtxn, Some("rooms"))?;
        wtxn.commit()?;

        tracing::info!(path = %path.as_ref().display(), "LMDB message store opened");

        Ok(Self {
            env: Arc::new(env),
            messages,
            rooms,
        })
    }
}

#[async_trait]
impl MessageStore for LmdbMessageStore {
    async fn append(&self, room_id: Uuid, message: ChatMessage) -> ChatResult<StoredMessage> {
        message.validate()?;

        let env = self.env.clone();
        let messages = self.messages;
        let rooms = self.rooms;

        blocking(move || {
            let mut wtxn = env.write_txn()?;
            let mut meta = decode_meta(rooms.get(&wtxn, &room_id.to_string())?)?;
            if meta.closed {
                return Err(ChatError::RoomClosed { room_id }.into());
            }

            let at = message::stamp(&message, meta.last_timestamp, Utc::now());
            let stored = StoredMessage {
                sequence_no: meta.count + 1,
                room_id,
                message: message.with_timestamp(at),
            };

            messages.put(
                &mut wtxn,
                &message_key(&room_id, stored.sequence_no),
                &lmdb_encode(&stored)?,
            )?;
            meta.count = stored.sequence_no;
            meta.last_timestamp = Some(at);
            rooms.put(&mut wtxn, &room_id.to_string(), &lmdb_encode(&meta)?)?;
            wtxn.commit()?;

            Ok(stored)
        })
        .await
    }

    async fn page(&self, room_id: Uuid, page_index: usize, page_size: usize) -> ChatResult<Page> {
        check_page_size(page_size)?;
        let env = self.env.clone();
        let messages = self.messages;
        let rooms = self.rooms;

        blocking(move || {
            let rtxn = env.read_txn()?;
            let total = decode_meta(rooms.get(&rtxn, &room_id.to_string())?)?.count;

            let Some(window) = page_window(total, page_index, page_size) else {
                return Ok(Page::empty(page_index, page_size, total));
            };

            let is_last_page = *window.start() == 1;
            let mut content = Vec::with_capacity(page_size.min(total as usize));
            for seq in window.rev() {
                let key = message_key(&room_id, seq);
                let bytes = messages
                    .get(&rtxn, &key)?
                    .ok_or_else(|| anyhow!("missing log entry {}", key))?;
                content.push(lmdb_decode::<StoredMessage>(bytes)?);
            }

            Ok(Page {
                content,
                page_index,
                page_size,
                is_last_page,
                total_count: total,
            })
        })
        .await
    }

    async fn total_count(&self, room_id: Uuid) -> ChatResult<u64> {
        let env = self.env.clone();
        let rooms = self.rooms;

        blocking(move || {
            let rtxn = env.read_txn()?;
            Ok(decode_meta(rooms.get(&rtxn, &room_id.to_string())?)?.count)
        })
        .await
    }

    async fn history(&self, room_id: Uuid) -> ChatResult<Vec<StoredMessage>> {
        let env = self.env.clone();
        let messages = self.messages;

        blocking(move || {
            let rtxn = env.read_txn()?;
            let prefix = format!("{}:", room_id);
            let mut results = Vec::new();
            for item in messages.prefix_iter(&rtxn, &prefix)? {
                let (_key, bytes) = item?;
                results.push(lmdb_decode::<StoredMessage>(bytes)?);
            }
            results.reverse();
            Ok(results)
        })
        .await
    }

    async fn close_room(&self, room_id: Uuid) -> ChatResult<bool> {
        let env = self.env.clone();
        let rooms = self.rooms;

        blocking(move || {
            let mut wtxn = env.write_txn()?;
            let mut meta = decode_meta(rooms.get(&wtxn, &room_id.to_string())?)?;
            if meta.closed {
                return Ok(false);
            }
            meta.closed = true;
            rooms.put(&mut wtxn, &room_id.to_string(), &lmdb_encode(&meta)?)?;
            wtxn.commit()?;
            Ok(true)
        })
        .await
    }

    async fn is_closed(&self, room_id: Uuid) -> ChatResult<bool> {
        let env = self.env.clone();
        let rooms = self.rooms;

        blocking(move || {
            let rtxn = env.read_txn()?;
            Ok(decode_meta(rooms.get(&rtxn, &room_id.to_string())?)?.closed)
        })
        .await
    }

    fn backend_name(&self) -> &'static str {
        "lmdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fresh_store() -> (LmdbMessageStore, TempDir) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = LmdbMessageStore::open(dir.path()).expect("Failed to open LMDB store");
        (store, dir)
    }

    #[test]
    fn test_message_keys_sort_numerically() {
        let room = Uuid::new_v4();
        assert!(message_key(&room, 9) < message_key(&room, 10));
        assert!(message_key(&room, 99) < message_key(&room, 100));
    }

    #[tokio::test]
    async fn test_append_and_page() {
        let (store, _dir) = fresh_store();
        let room = Uuid::new_v4();

        for i in 0..12 {
            store
                .append(room, ChatMessage::chat("Ali", format!("m{}", i)))
                .await
                .unwrap();
        }

        let page = store.page(room, 0, 5).await.unwrap();
        let seqs: Vec<u64> = page.content.iter().map(|m| m.sequence_no).collect();
        assert_eq!(seqs, vec![12, 11, 10, 9, 8]);
        assert!(!page.is_last_page);

        let tail = store.page(room, 2, 5).await.unwrap();
        let seqs: Vec<u64> = tail.content.iter().map(|m| m.sequence_no).collect();
        assert_eq!(seqs, vec![2, 1]);
        assert!(tail.is_last_page);

        assert!(store.page(room, 3, 5).await.unwrap().content.is_empty());
    }

    #[tokio::test]
    async fn test_rooms_do_not_share_prefix_results() {
        let (store, _dir) = fresh_store();
        let r1 = Uuid::new_v4();
        let r2 = Uuid::new_v4();

        store.append(r1, ChatMessage::join("Ali")).await.unwrap();
        store.append(r2, ChatMessage::join("Bilal")).await.unwrap();
        store.append(r2, ChatMessage::leave("Bilal")).await.unwrap();

        assert_eq!(store.history(r1).await.unwrap().len(), 1);
        let r2_history = store.history(r2).await.unwrap();
        assert_eq!(r2_history.len(), 2);
        assert_eq!(r2_history[0].sequence_no, 2);
    }

    #[tokio::test]
    async fn test_close_room_is_persisted_and_idempotent() {
        let (store, _dir) = fresh_store();
        let room = Uuid::new_v4();

        assert!(!store.is_closed(room).await.unwrap());
        assert!(store.close_room(room).await.unwrap());
        assert!(!store.close_room(room).await.unwrap());

        let err = store.append(room, ChatMessage::join("Ali")).await.unwrap_err();
        assert_eq!(err.error_code(), "ROOM_CLOSED");
    }

    #[tokio::test]
    async fn test_blank_chat_rejected_before_write() {
        let (store, _dir) = fresh_store();
        let room = Uuid::new_v4();
        let err = store
            .append(room, ChatMessage::chat("Ali", ""))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_MESSAGE");
        assert_eq!(store.total_count(room).await.unwrap(), 0);
    }
}
