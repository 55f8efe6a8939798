//! Server host for transport-agnostic API exposure
//!
//! `ServerHost` owns the shared chat state (store, broker, coordinator,
//! history service, live sessions) and is handed to every exposure. The
//! REST and WebSocket routers read from the same host, so a message written
//! over one transport is immediately visible on the other.

use crate::broker::TopicBroker;
use crate::config::ChatConfig;
use crate::core::auth::TokenVerifier;
use crate::core::coordinator::RoomCoordinator;
use crate::core::error::ChatResult;
use crate::core::history::HistoryService;
use crate::core::store::MessageStore;
use crate::server::exposure::websocket::manager::ConnectionManager;
use std::sync::Arc;

/// Host context containing all chat state
///
/// # Example
///
/// ```rust,ignore
/// let host = Arc::new(ServerHost::from_builder_components(
///     config,
///     Arc::new(InMemoryMessageStore::new()),
///     Arc::new(verifier),
/// )?);
///
/// let rest_app = RestExposure::build_router(host.clone(), vec![])?;
/// let ws_app = WebSocketExposure::build_router(host)?;
/// ```
pub struct ServerHost {
    /// Validated service configuration
    pub config: Arc<ChatConfig>,

    /// Durable per-room message log
    pub store: Arc<dyn MessageStore>,

    /// Room topic fan-out
    pub broker: Arc<TopicBroker>,

    /// Join/leave/send orchestration
    pub coordinator: Arc<RoomCoordinator>,

    /// Read-only history pagination
    pub history: HistoryService,

    /// Live WebSocket sessions
    pub connections: Arc<ConnectionManager>,

    /// Credential check for the WebSocket handshake
    pub verifier: Arc<dyn TokenVerifier>,
}

impl ServerHost {
    /// Build the host from builder components
    pub fn from_builder_components(
        config: ChatConfig,
        store: Arc<dyn MessageStore>,
        verifier: Arc<dyn TokenVerifier>,
    ) -> ChatResult<Self> {
        config.check()?;

        let broker = Arc::new(TopicBroker::new());
        let coordinator = Arc::new(RoomCoordinator::new(store.clone(), broker.clone()));
        let history = HistoryService::new(store.clone()).with_page_sizes(
            config.history.default_page_size,
            config.history.max_page_size,
        );
        let connections = Arc::new(ConnectionManager::new(config.connection.outbound_buffer));

        tracing::debug!(backend = store.backend_name(), "Chat host assembled");

        Ok(Self {
            config: Arc::new(config),
            store,
            broker,
            coordinator,
            history,
            connections,
            verifier,
        })
    }

    /// Name of the storage backend in use
    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}
