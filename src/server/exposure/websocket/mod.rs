//! WebSocket API exposure for room chat
//!
//! This module provides the `/ws` endpoint and the per-connection session
//! loop. It follows the same pattern as `RestExposure`: it consumes a
//! `ServerHost` and produces a Router.
//!
//! # Architecture
//!
//! ```text
//! Client ──ws──▶ /ws ──▶ ws_handler() ──handshake──▶ ConnectionManager
//!                              │
//!                     subscribe / send / history
//!                              │
//!                       RoomCoordinator ──append──▶ MessageStore
//!                              │
//!                          TopicBroker ──topic queue──▶ write loop ──▶ Client
//! ```
//!
//! See [`protocol`] for the frame format.

mod handler;
pub mod manager;
pub mod protocol;

use crate::server::host::ServerHost;
use anyhow::Result;
use axum::{Router, routing::get};
use std::sync::Arc;

pub use handler::ConnectParams;
pub use manager::ConnectionManager;

/// WebSocket API exposure implementation
///
/// # Example
///
/// ```rust,ignore
/// use jummah_chat::server::{RestExposure, ServerBuilder, WebSocketExposure};
/// use std::sync::Arc;
///
/// let host = Arc::new(ServerBuilder::new().with_config(config).build_host()?);
///
/// let rest_router = RestExposure::build_router(host.clone(), vec![])?;
/// let ws_router = WebSocketExposure::build_router(host)?;
///
/// let app = rest_router.merge(ws_router);
/// ```
pub struct WebSocketExposure;

impl WebSocketExposure {
    /// Build the WebSocket router from a host
    pub fn build_router(host: Arc<ServerHost>) -> Result<Router> {
        let router = Router::new()
            .route("/ws", get(handler::ws_handler))
            .with_state(host);

        Ok(router)
    }
}
