//! Macro-generated test suite for `MessageStore` contract validation.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//!
//! use storage_harness::*;
//! use jummah_chat::storage::InMemoryMessageStore;
//!
//! message_store_tests!(InMemoryMessageStore::new());
//! ```
//!
//! # Generated Tests
//!
//! ## Append
//! - `test_append_assigns_dense_sequence`: 1, 2, 3... per room
//! - `test_append_stamps_missing_timestamp`: stored messages always carry one
//! - `test_append_keeps_explicit_timestamp`
//! - `test_timestamps_never_decrease`: an older explicit timestamp is clamped
//! - `test_append_blank_chat_rejected`: `InvalidMessage`, nothing written
//! - `test_join_and_leave_have_no_body`
//!
//! ## Paging
//! - `test_empty_room`: page 0 is empty and last
//! - `test_first_page_newest_first`
//! - `test_last_partial_page`
//! - `test_page_beyond_end`
//! - `test_zero_page_size_rejected`: `InvalidMessage`
//! - `test_page_never_exceeds_page_size`
//! - `test_page_walk_has_no_gaps_or_duplicates`
//! - `test_history_newest_first`
//!
//! ## Lifecycle
//! - `test_close_room_idempotent`
//! - `test_closed_room_rejects_appends_keeps_history`
//! - `test_rooms_are_independent`
//!
//! ## Concurrency
//! - `test_concurrent_appends`: parallel appends from spawned tasks

/// Generate a full `MessageStore` conformance test suite.
///
/// `$factory` must be an expression that evaluates to a fresh store. It is
/// re-evaluated for each test to ensure isolation.
#[macro_export]
macro_rules! message_store_tests {
    ($factory:expr) => {
        mod message_store_contract_tests {
            use super::*;
            use chrono::{Duration as ChronoDuration, Utc};
            use jummah_chat::core::{ChatError, ChatMessage, MessageKind, MessageStore};
            use std::sync::Arc;
            use uuid::Uuid;

            // ==================================================================
            // Append
            // ==================================================================

            #[tokio::test]
            async fn test_append_assigns_dense_sequence() {
                let store = $factory;
                let room = Uuid::new_v4();

                let stored = seed_room(&store, room, 3).await;
                assert_eq!(sequence_numbers(&stored), vec![1, 2, 3]);
                assert!(stored.iter().all(|m| m.room_id == room));
                assert_eq!(store.total_count(room).await.unwrap(), 3);
            }

            #[tokio::test]
            async fn test_append_stamps_missing_timestamp() {
                let store = $factory;
                let before = Utc::now();
                let stored = store
                    .append(Uuid::new_v4(), ChatMessage::chat("Ali", "hi"))
                    .await
                    .unwrap();
                assert!(stored.message.timestamp().is_some());
                assert!(stored.timestamp() >= before - ChronoDuration::seconds(1));
            }

            #[tokio::test]
            async fn test_append_keeps_explicit_timestamp() {
                let store = $factory;
                let at = Utc::now() - ChronoDuration::minutes(5);
                let stored = store
                    .append(Uuid::new_v4(), ChatMessage::chat("Ali", "hi").with_timestamp(at))
                    .await
                    .unwrap();
                assert_eq!(stored.timestamp(), at);
            }

            #[tokio::test]
            async fn test_timestamps_never_decrease() {
                let store = $factory;
                let room = Uuid::new_v4();
                let now = Utc::now();

                let first = store
                    .append(room, ChatMessage::chat("Ali", "a").with_timestamp(now))
                    .await
                    .unwrap();
                let second = store
                    .append(
                        room,
                        ChatMessage::chat("Ali", "b").with_timestamp(now - ChronoDuration::hours(1)),
                    )
                    .await
                    .unwrap();
                assert!(second.timestamp() >= first.timestamp());
            }

            #[tokio::test]
            async fn test_append_blank_chat_rejected() {
                let store = $factory;
                let room = Uuid::new_v4();

                let err = store
                    .append(room, ChatMessage::chat("Ali", "  \n"))
                    .await
                    .unwrap_err();
                assert!(matches!(err, ChatError::InvalidMessage { .. }));
                assert_eq!(store.total_count(room).await.unwrap(), 0);
            }

            #[tokio::test]
            async fn test_join_and_leave_have_no_body() {
                let store = $factory;
                let room = Uuid::new_v4();

                let join = store.append(room, ChatMessage::join("Ali")).await.unwrap();
                let leave = store.append(room, ChatMessage::leave("Ali")).await.unwrap();
                assert_eq!(join.kind(), MessageKind::Join);
                assert_eq!(leave.kind(), MessageKind::Leave);
                assert_eq!(join.body(), None);
                assert_eq!(leave.sequence_no, 2);
            }

            // ==================================================================
            // Paging
            // ==================================================================

            #[tokio::test]
            async fn test_empty_room() {
                let store = $factory;
                let page = store.page(Uuid::new_v4(), 0, 20).await.unwrap();
                assert!(page.content.is_empty());
                assert!(page.is_last_page);
                assert_eq!(page.total_count, 0);
            }

            #[tokio::test]
            async fn test_first_page_newest_first() {
                let store = $factory;
                let room = Uuid::new_v4();
                seed_room(&store, room, 25).await;

                let page = store.page(room, 0, 10).await.unwrap();
                assert_eq!(
                    sequence_numbers(&page.content),
                    (16..=25).rev().collect::<Vec<u64>>()
                );
                assert!(!page.is_last_page);
                assert_eq!(page.total_count, 25);
                assert_eq!(page.page_index, 0);
                assert_eq!(page.page_size, 10);
            }

            #[tokio::test]
            async fn test_last_partial_page() {
                let store = $factory;
                let room = Uuid::new_v4();
                seed_room(&store, room, 25).await;

                let page = store.page(room, 2, 10).await.unwrap();
                assert_eq!(sequence_numbers(&page.content), vec![5, 4, 3, 2, 1]);
                assert!(page.is_last_page);
            }

            #[tokio::test]
            async fn test_page_beyond_end() {
                let store = $factory;
                let room = Uuid::new_v4();
                seed_room(&store, room, 3).await;

                let page = store.page(room, 1, 3).await.unwrap();
                assert!(page.content.is_empty());
                assert!(page.is_last_page);
                assert_eq!(page.total_count, 3);
            }

            #[tokio::test]
            async fn test_zero_page_size_rejected() {
                let store = $factory;
                let room = Uuid::new_v4();
                seed_room(&store, room, 3).await;

                let err = store.page(room, 0, 0).await.unwrap_err();
                assert!(matches!(err, ChatError::InvalidMessage { .. }));
            }

            #[tokio::test]
            async fn test_page_never_exceeds_page_size() {
                let store = $factory;
                let room = Uuid::new_v4();
                seed_room(&store, room, 7).await;

                for size in 1..=8 {
                    let page = store.page(room, 0, size).await.unwrap();
                    assert!(page.content.len() <= page.page_size);
                    assert_eq!(page.page_size, size);
                }
            }

            #[tokio::test]
            async fn test_page_walk_has_no_gaps_or_duplicates() {
                let store = $factory;
                let room = Uuid::new_v4();
                seed_room(&store, room, 17).await;

                let mut seen = Vec::new();
                let mut index = 0;
                loop {
                    let page = store.page(room, index, 4).await.unwrap();
                    seen.extend(sequence_numbers(&page.content));
                    if page.is_last_page {
                        break;
                    }
                    index += 1;
                }
                assert_eq!(seen, (1..=17).rev().collect::<Vec<u64>>());
            }

            #[tokio::test]
            async fn test_history_newest_first() {
                let store = $factory;
                let room = Uuid::new_v4();
                seed_room(&store, room, 4).await;

                let history = store.history(room).await.unwrap();
                assert_eq!(sequence_numbers(&history), vec![4, 3, 2, 1]);
                assert_eq!(history[0].body(), Some("message 4"));
            }

            // ==================================================================
            // Lifecycle
            // ==================================================================

            #[tokio::test]
            async fn test_close_room_idempotent() {
                let store = $factory;
                let room = Uuid::new_v4();

                assert!(!store.is_closed(room).await.unwrap());
                assert!(store.close_room(room).await.unwrap());
                assert!(!store.close_room(room).await.unwrap());
                assert!(store.is_closed(room).await.unwrap());
            }

            #[tokio::test]
            async fn test_closed_room_rejects_appends_keeps_history() {
                let store = $factory;
                let room = Uuid::new_v4();
                seed_room(&store, room, 2).await;
                store.close_room(room).await.unwrap();

                let err = store
                    .append(room, ChatMessage::chat("Ali", "late"))
                    .await
                    .unwrap_err();
                assert!(matches!(err, ChatError::RoomClosed { room_id } if room_id == room));
                assert_eq!(store.page(room, 0, 20).await.unwrap().content.len(), 2);
            }

            #[tokio::test]
            async fn test_rooms_are_independent() {
                let store = $factory;
                let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

                seed_room(&store, a, 3).await;
                let first_in_b = store.append(b, ChatMessage::join("Bilal")).await.unwrap();
                assert_eq!(first_in_b.sequence_no, 1);

                store.close_room(a).await.unwrap();
                assert!(store.append(b, ChatMessage::chat("Bilal", "ok")).await.is_ok());
                assert_eq!(store.history(b).await.unwrap().len(), 2);
            }

            // ==================================================================
            // Concurrency
            // ==================================================================

            #[tokio::test]
            async fn test_concurrent_appends() {
                let store = Arc::new($factory);
                let room = Uuid::new_v4();

                let mut handles = Vec::new();
                for i in 0..20 {
                    let store = store.clone();
                    handles.push(tokio::spawn(async move {
                        store.append(room, numbered("Ali", i)).await.unwrap().sequence_no
                    }));
                }

                let mut seqs = Vec::new();
                for handle in handles {
                    seqs.push(handle.await.unwrap());
                }
                seqs.sort_unstable();
                assert_eq!(seqs, (1..=20).collect::<Vec<u64>>());
                assert_eq!(store.total_count(room).await.unwrap(), 20);
            }
        }
    };
}
