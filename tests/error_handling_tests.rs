//! Tests for the typed error handling system
//!
//! These tests verify that:
//! - Errors return correct HTTP status codes
//! - Error responses are properly formatted
//! - Error conversions work correctly
//! - Operations surface the error a client can act on

use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use jummah_chat::prelude::*;
use std::sync::Arc;

// =============================================================================
// HTTP Status Code Tests
// =============================================================================

mod status_code_tests {
    use super::*;

    #[test]
    fn test_auth_rejected_returns_401() {
        let err = ChatError::AuthRejected {
            reason: "expired".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_room_closed_returns_410() {
        let err = ChatError::RoomClosed {
            room_id: Uuid::new_v4(),
        };
        assert_eq!(err.status_code(), StatusCode::GONE);
    }

    #[test]
    fn test_invalid_message_returns_400() {
        assert_eq!(
            ChatError::invalid("blank").status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_transport_failure_returns_502() {
        assert_eq!(
            ChatError::transport("connection reset").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_storage_and_config_errors_return_500() {
        assert_eq!(
            ChatError::storage("lmdb", "map full").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ChatError::Config {
                message: "bad yaml".to_string()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

// =============================================================================
// Error Code Tests
// =============================================================================

mod error_code_tests {
    use super::*;

    #[test]
    fn test_every_variant_has_a_stable_code() {
        let cases = vec![
            (
                ChatError::AuthRejected {
                    reason: "x".to_string(),
                },
                "AUTH_REJECTED",
            ),
            (
                ChatError::RoomClosed {
                    room_id: Uuid::nil(),
                },
                "ROOM_CLOSED",
            ),
            (ChatError::invalid("x"), "INVALID_MESSAGE"),
            (ChatError::NotJoined, "NOT_JOINED"),
            (ChatError::NotConnected, "NOT_CONNECTED"),
            (ChatError::transport("x"), "TRANSPORT_FAILURE"),
            (ChatError::storage("memory", "x"), "STORAGE_ERROR"),
            (
                ChatError::Config {
                    message: "x".to_string(),
                },
                "CONFIG_ERROR",
            ),
            (ChatError::Internal("x".to_string()), "INTERNAL_ERROR"),
        ];

        for (err, code) in cases {
            assert_eq!(err.error_code(), code, "wrong code for {:?}", err);
        }
    }

    #[test]
    fn test_error_frame_carries_code_and_message() {
        let err = ChatError::NotJoined;
        match ServerFrame::from(&err) {
            ServerFrame::Error { code, message } => {
                assert_eq!(code, "NOT_JOINED");
                assert_eq!(message, "Session is not joined to a room");
            }
            other => panic!("Expected error frame, got {:?}", other),
        }
    }
}

// =============================================================================
// IntoResponse Tests
// =============================================================================

mod into_response_tests {
    use super::*;

    #[tokio::test]
    async fn test_room_closed_into_response() {
        let room_id = Uuid::new_v4();
        let response = ChatError::RoomClosed { room_id }.into_response();
        assert_eq!(response.status(), StatusCode::GONE);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "ROOM_CLOSED");
        assert!(body["message"].as_str().unwrap().contains(&room_id.to_string()));
    }

    #[tokio::test]
    async fn test_invalid_message_into_response() {
        let response = ChatError::invalid("message body must not be empty").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "INVALID_MESSAGE");
        assert_eq!(
            body["message"],
            "Invalid message: message body must not be empty"
        );
    }
}

// =============================================================================
// Conversion Tests
// =============================================================================

mod conversion_tests {
    use super::*;

    #[test]
    fn test_serde_json_error_is_invalid_message() {
        let err = serde_json::from_str::<ClientFrame>(r#"{"type":"teleport"}"#).unwrap_err();
        let chat: ChatError = err.into();
        assert!(matches!(chat, ChatError::InvalidMessage { .. }));
    }

    #[test]
    fn test_uuid_error_is_invalid_message() {
        let err = Uuid::parse_str("not-a-room").unwrap_err();
        let chat: ChatError = err.into();
        assert_eq!(chat.error_code(), "INVALID_MESSAGE");
        assert!(chat.to_string().contains("invalid room id"));
    }

    #[test]
    fn test_yaml_error_is_config_error() {
        let err = ChatConfig::from_yaml_str("server: [unclosed").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
    }

    #[test]
    fn test_client_event_from_error() {
        match ClientEvent::from(&ChatError::NotConnected) {
            ClientEvent::Error { code, .. } => assert_eq!(code, "NOT_CONNECTED"),
            other => panic!("Expected error event, got {:?}", other),
        }
    }
}

// =============================================================================
// Operation Error Tests
// =============================================================================

mod operation_tests {
    use super::*;

    fn coordinator() -> RoomCoordinator {
        let store: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
        RoomCoordinator::new(store, Arc::new(TopicBroker::new()))
    }

    fn session() -> (Session, tokio::sync::mpsc::Receiver<TopicEvent>) {
        Session::open(Principal::new("u-ali", "Ali"), 16)
    }

    #[tokio::test]
    async fn test_send_before_join_is_not_joined() {
        let coordinator = coordinator();
        let err = coordinator.send(&session().0, "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::NotJoined));
        assert!(!err.is_terminal());
    }

    #[tokio::test]
    async fn test_send_blank_is_invalid() {
        let coordinator = coordinator();
        let (session, _events) = session();
        coordinator.join(&session, Uuid::new_v4()).await.unwrap();

        let err = coordinator.send(&session, "   ").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_to_closed_room_is_room_closed() {
        let coordinator = coordinator();
        let (session, _events) = session();
        let room = Uuid::new_v4();
        coordinator.join(&session, room).await.unwrap();
        coordinator.close_room(room).await.unwrap();

        let err = coordinator.send(&session, "late").await.unwrap_err();
        assert!(matches!(err, ChatError::RoomClosed { room_id } if room_id == room));
    }

    #[tokio::test]
    async fn test_closed_session_is_not_connected() {
        let coordinator = coordinator();
        let (session, _events) = session();
        session.transition(ConnectionState::Closing);

        let err = coordinator.join(&session, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ChatError::NotConnected));
    }

    #[tokio::test]
    async fn test_unknown_token_is_auth_rejected() {
        let verifier = StaticTokenVerifier::new().with_token("t-ali", Principal::new("u-ali", "Ali"));

        let err = verifier.verify("t-nobody").await.unwrap_err();
        assert!(err.is_terminal());
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(verifier.verify("t-ali").await.unwrap().name, "Ali");
    }
}
