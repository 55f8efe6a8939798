//! Typed error handling for the chat subsystem
//!
//! A single [`ChatError`] enum carries every failure the broker, store,
//! coordinator and connection layers can report. Each variant maps to an
//! HTTP status code and a stable machine-readable code so the same error can
//! be rendered as a JSON HTTP response or as a WebSocket `error` frame.
//!
//! # Error Categories
//!
//! - `AuthRejected`: handshake credential invalid or expired (terminal)
//! - `RoomClosed`: write to a permanently closed room (not retried)
//! - `InvalidMessage`: empty body or malformed frame (connection stays open)
//! - `NotJoined` / `NotConnected`: caller-side precondition violations
//! - `TransportFailure`: network-level drop, drives reconnection
//! - `Storage`, `Config`, `Internal`: ambient failures
//!
//! # Example
//!
//! ```rust,ignore
//! match coordinator.send(&session, "  ").await {
//!     Err(ChatError::InvalidMessage { .. }) => { /* tell the client, keep going */ }
//!     Err(ChatError::NotJoined) => { /* client should resubscribe */ }
//!     Err(e) => tracing::error!(error = %e, "send failed"),
//!     Ok(stored) => tracing::debug!(seq = stored.sequence_no, "sent"),
//! }
//! ```

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The main error type for the chat subsystem
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Handshake credential is invalid or expired
    #[error("Authentication rejected: {reason}")]
    AuthRejected { reason: String },

    /// The room has been permanently closed by the event lifecycle
    #[error("Room '{room_id}' is closed")]
    RoomClosed { room_id: Uuid },

    /// Empty body or malformed frame
    #[error("Invalid message: {reason}")]
    InvalidMessage { reason: String },

    /// The session has no active room subscription
    #[error("Session is not joined to a room")]
    NotJoined,

    /// The underlying transport is not in the `Open` state
    #[error("Not connected")]
    NotConnected,

    /// Network-level drop
    #[error("Transport failure: {reason}")]
    TransportFailure { reason: String },

    /// Storage backend failure
    #[error("{backend} storage error: {message}")]
    Storage { backend: String, message: String },

    /// Invalid or unreadable configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Should not happen in normal operation
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error body for HTTP responses and WebSocket `error` frames
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

impl ChatError {
    /// Shorthand for an `InvalidMessage` error
    pub fn invalid(reason: impl Into<String>) -> Self {
        ChatError::InvalidMessage {
            reason: reason.into(),
        }
    }

    /// Shorthand for a `TransportFailure` error
    pub fn transport(reason: impl Into<String>) -> Self {
        ChatError::TransportFailure {
            reason: reason.into(),
        }
    }

    /// Shorthand for a `Storage` error
    pub fn storage(backend: &str, message: impl ToString) -> Self {
        ChatError::Storage {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::AuthRejected { .. } => StatusCode::UNAUTHORIZED,
            ChatError::RoomClosed { .. } => StatusCode::GONE,
            ChatError::InvalidMessage { .. } => StatusCode::BAD_REQUEST,
            ChatError::NotJoined => StatusCode::CONFLICT,
            ChatError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            ChatError::TransportFailure { .. } => StatusCode::BAD_GATEWAY,
            ChatError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ChatError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ChatError::AuthRejected { .. } => "AUTH_REJECTED",
            ChatError::RoomClosed { .. } => "ROOM_CLOSED",
            ChatError::InvalidMessage { .. } => "INVALID_MESSAGE",
            ChatError::NotJoined => "NOT_JOINED",
            ChatError::NotConnected => "NOT_CONNECTED",
            ChatError::TransportFailure { .. } => "TRANSPORT_FAILURE",
            ChatError::Storage { .. } => "STORAGE_ERROR",
            ChatError::Config { .. } => "CONFIG_ERROR",
            ChatError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the connection should be torn down after reporting this error
    ///
    /// Precondition and validation failures leave the connection open.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatError::AuthRejected { .. } | ChatError::TransportFailure { .. }
        )
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(self.to_response())).into_response()
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::InvalidMessage {
            reason: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ChatError {
    fn from(err: serde_yaml::Error) -> Self {
        ChatError::Config {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for ChatError {
    fn from(err: validator::ValidationErrors) -> Self {
        ChatError::Config {
            message: err.to_string(),
        }
    }
}

impl From<uuid::Error> for ChatError {
    fn from(err: uuid::Error) -> Self {
        ChatError::InvalidMessage {
            reason: format!("invalid room id: {}", err),
        }
    }
}

/// Storage backends work in `anyhow`; anything reaching a caller through
/// this conversion is reported as a storage failure.
impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ChatError>() {
            Ok(chat_err) => chat_err,
            Err(err) => ChatError::Storage {
                backend: "store".to_string(),
                message: format!("{:#}", err),
            },
        }
    }
}

/// A specialized Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;
