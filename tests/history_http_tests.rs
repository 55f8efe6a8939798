//! HTTP tests for the history, room-closing and health endpoints
//!
//! Messages are written through the store or the coordinator, then read back
//! over REST with axum_test::TestServer.

use axum_test::TestServer;
use jummah_chat::core::{ChatMessage, MessageStore};
use jummah_chat::server::{ServerBuilder, ServerHost};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

fn create_test_server() -> (TestServer, Arc<ServerHost>) {
    let host = Arc::new(ServerBuilder::new().build_host().unwrap());
    let app = ServerBuilder::router_for(host.clone(), vec![]).unwrap();
    let server = TestServer::new(app);
    (server, host)
}

async fn seed(host: &ServerHost, room: Uuid, count: usize) {
    for i in 1..=count {
        host.store
            .append(room, ChatMessage::chat("Ali", format!("m{}", i)))
            .await
            .unwrap();
    }
}

fn pageable(room: Uuid) -> String {
    format!("/chat/room/{}/history/pageable", room)
}

fn bodies(page: &Value) -> Vec<String> {
    page["content"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["message"].as_str().unwrap().to_string())
        .collect()
}

// =============================================================================
// Health Check Tests
// =============================================================================

mod health_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let (server, _) = create_test_server();

        let response = server.get("/health").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "jummah-chat");
        assert_eq!(body["connections"], 0);
        assert!(body["version"].is_string());
    }

    #[tokio::test]
    async fn test_healthz_endpoint() {
        let (server, _) = create_test_server();

        let response = server.get("/healthz").await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["status"], "ok");
    }
}

// =============================================================================
// Paged History Tests
// =============================================================================

mod pageable_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_page_of_twenty_five() {
        let (server, host) = create_test_server();
        let room = Uuid::new_v4();
        seed(&host, room, 25).await;

        let response = server
            .get(&pageable(room))
            .add_query_param("page", 0)
            .add_query_param("size", 10)
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        let expected: Vec<String> = (16..=25).rev().map(|i| format!("m{}", i)).collect();
        assert_eq!(bodies(&body), expected);
        assert_eq!(body["last"], false);
        assert_eq!(body["first"], true);
        assert_eq!(body["totalElements"], 25);
        assert_eq!(body["totalPages"], 3);
        assert_eq!(body["size"], 10);
        assert_eq!(body["number"], 0);
        assert_eq!(body["numberOfElements"], 10);
    }

    #[tokio::test]
    async fn test_last_partial_page() {
        let (server, host) = create_test_server();
        let room = Uuid::new_v4();
        seed(&host, room, 25).await;

        let body: Value = server
            .get(&pageable(room))
            .add_query_param("page", 2)
            .add_query_param("size", 10)
            .await
            .json();

        let expected: Vec<String> = (1..=5).rev().map(|i| format!("m{}", i)).collect();
        assert_eq!(bodies(&body), expected);
        assert_eq!(body["last"], true);
    }

    #[tokio::test]
    async fn test_defaults_are_page_zero_size_twenty() {
        let (server, host) = create_test_server();
        let room = Uuid::new_v4();
        seed(&host, room, 25).await;

        let body: Value = server.get(&pageable(room)).await.json();
        assert_eq!(body["size"], 20);
        assert_eq!(body["number"], 0);
        assert_eq!(body["content"].as_array().unwrap().len(), 20);
        assert_eq!(body["content"][0]["sequenceNo"], 25);
    }

    #[tokio::test]
    async fn test_unknown_room_is_empty_last_page() {
        let (server, _) = create_test_server();

        let response = server.get(&pageable(Uuid::new_v4())).await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert!(body["content"].as_array().unwrap().is_empty());
        assert_eq!(body["last"], true);
        assert_eq!(body["totalElements"], 0);
    }

    #[tokio::test]
    async fn test_page_beyond_end_is_empty() {
        let (server, host) = create_test_server();
        let room = Uuid::new_v4();
        seed(&host, room, 5).await;

        let body: Value = server
            .get(&pageable(room))
            .add_query_param("page", 9)
            .await
            .json();
        assert!(body["content"].as_array().unwrap().is_empty());
        assert_eq!(body["last"], true);
    }

    #[tokio::test]
    async fn test_walking_pages_sees_every_message_once() {
        let (server, host) = create_test_server();
        let room = Uuid::new_v4();
        seed(&host, room, 23).await;

        let mut seen = Vec::new();
        let mut page = 0;
        loop {
            let body: Value = server
                .get(&pageable(room))
                .add_query_param("page", page)
                .add_query_param("size", 7)
                .await
                .json();
            for message in body["content"].as_array().unwrap() {
                seen.push(message["sequenceNo"].as_u64().unwrap());
            }
            if body["last"] == true {
                break;
            }
            page += 1;
        }

        let expected: Vec<u64> = (1..=23).rev().collect();
        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_size_is_clamped_to_maximum() {
        let (server, host) = create_test_server();
        let room = Uuid::new_v4();
        seed(&host, room, 3).await;

        let body: Value = server
            .get(&pageable(room))
            .add_query_param("size", 5000)
            .await
            .json();
        assert_eq!(body["size"], 100);
    }

    #[tokio::test]
    async fn test_negative_page_rejected() {
        let (server, _) = create_test_server();

        let response = server
            .get(&pageable(Uuid::new_v4()))
            .add_query_param("page", -1)
            .expect_failure()
            .await;
        response.assert_status_bad_request();

        let body: Value = response.json();
        assert_eq!(body["code"], "INVALID_MESSAGE");
    }

    #[tokio::test]
    async fn test_malformed_room_id_rejected() {
        let (server, _) = create_test_server();

        let response = server
            .get("/chat/room/not-a-uuid/history/pageable")
            .expect_failure()
            .await;
        response.assert_status_bad_request();
    }
}

// =============================================================================
// Full History Tests
// =============================================================================

mod full_history_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_history_newest_first() {
        let (server, host) = create_test_server();
        let room = Uuid::new_v4();
        seed(&host, room, 4).await;

        let response = server.get(&format!("/chat/room/{}/history", room)).await;
        response.assert_status_ok();

        let body: Vec<Value> = response.json();
        let seqs: Vec<u64> = body
            .iter()
            .map(|m| m["sequenceNo"].as_u64().unwrap())
            .collect();
        assert_eq!(seqs, vec![4, 3, 2, 1]);
        assert_eq!(body[0]["type"], "CHAT");
        assert_eq!(body[0]["sender"], "Ali");
    }

    #[tokio::test]
    async fn test_full_history_unknown_room() {
        let (server, _) = create_test_server();
        let body: Vec<Value> = server
            .get(&format!("/chat/room/{}/history", Uuid::new_v4()))
            .await
            .json();
        assert!(body.is_empty());
    }
}

// =============================================================================
// Room Closing Tests
// =============================================================================

mod close_room_tests {
    use super::*;

    #[tokio::test]
    async fn test_close_room_is_idempotent() {
        let (server, host) = create_test_server();
        let room = Uuid::new_v4();
        seed(&host, room, 2).await;

        let first: Value = server
            .post(&format!("/chat/room/{}/close", room))
            .await
            .json();
        assert_eq!(first["closed"], true);
        assert_eq!(first["room_id"], room.to_string());

        let second: Value = server
            .post(&format!("/chat/room/{}/close", room))
            .await
            .json();
        assert_eq!(second["closed"], false);

        assert!(host.store.is_closed(room).await.unwrap());
    }

    #[tokio::test]
    async fn test_history_survives_close() {
        let (server, host) = create_test_server();
        let room = Uuid::new_v4();
        seed(&host, room, 3).await;
        server.post(&format!("/chat/room/{}/close", room)).await;

        let body: Value = server.get(&pageable(room)).await.json();
        assert_eq!(body["totalElements"], 3);

        let err = host
            .store
            .append(room, ChatMessage::chat("Ali", "late"))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "ROOM_CLOSED");
    }
}
