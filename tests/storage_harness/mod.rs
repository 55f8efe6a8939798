//! Shared test harness for message store backends
//!
//! Provides helpers for building chat messages and seeding rooms, and the
//! `message_store_tests!` macro that validates any `MessageStore`
//! implementation against the full contract.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//! use storage_harness::*;
//! ```

#![allow(dead_code)]

use jummah_chat::core::{ChatMessage, MessageStore, StoredMessage};
use uuid::Uuid;

#[macro_use]
pub mod message_store_tests;

/// A chat message from `sender` with a numbered body
pub fn numbered(sender: &str, n: usize) -> ChatMessage {
    ChatMessage::chat(sender, format!("message {}", n))
}

/// Append `count` numbered messages to `room`
pub async fn seed_room(store: &dyn MessageStore, room: Uuid, count: usize) -> Vec<StoredMessage> {
    let mut stored = Vec::with_capacity(count);
    for n in 1..=count {
        stored.push(store.append(room, numbered("Ali", n)).await.unwrap());
    }
    stored
}

/// Sequence numbers of a slice of messages, in order
pub fn sequence_numbers(messages: &[StoredMessage]) -> Vec<u64> {
    messages.iter().map(|m| m.sequence_no).collect()
}
