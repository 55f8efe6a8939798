//! # Jummah Chat
//!
//! Real-time, room-scoped chat for Jummah events, with durable history.
//!
//! ## Features
//!
//! - **Rooms**: participants join a room over a WebSocket and every message
//!   they send is stored, then fanned out to everyone in the room
//! - **Ordering**: each room's messages carry a strictly increasing
//!   `sequenceNo`, and live delivery follows that order
//! - **History**: newest-first pages over HTTP or the socket
//! - **Presence**: join and leave are recorded, including a synthetic leave
//!   when a connection dies
//! - **Client**: a reconnecting [`client::ChatClient`] that rejoins its room
//! - **Storage**: in-memory by default, LMDB with the `lmdb` feature
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use jummah_chat::prelude::*;
//!
//! let config = ChatConfig::from_yaml_file("chat.yaml")?;
//! ServerBuilder::new().with_config(config).serve().await?;
//! ```

pub mod broker;
pub mod client;
pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        ChatError, ChatMessage, ChatResult, ConnectionState, HistoryParams, HistoryService,
        JoinOutcome, MessageKind, MessageStore, Page, PageResponse, Principal, RoomCoordinator,
        Session, StaticTokenVerifier, StoredMessage, TokenVerifier,
    };

    // === Broker ===
    pub use crate::broker::{TopicBroker, TopicEvent, topic_for};

    // === Storage ===
    pub use crate::storage::InMemoryMessageStore;
    #[cfg(feature = "lmdb")]
    pub use crate::storage::LmdbMessageStore;

    // === Config ===
    pub use crate::config::{ChatConfig, ReconnectConfig, StorageBackend};

    // === Server ===
    pub use crate::server::exposure::websocket::protocol::{ClientFrame, ServerFrame};
    pub use crate::server::{RestExposure, ServerBuilder, ServerHost, WebSocketExposure};

    // === Client ===
    pub use crate::client::{ChatClient, ClientEvent, ReconnectPolicy};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}
