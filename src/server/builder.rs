//! ServerBuilder for fluent API to build the chat server

use super::exposure::{RestExposure, WebSocketExposure};
use super::host::ServerHost;
use crate::config::{ChatConfig, StorageBackend};
use crate::core::auth::TokenVerifier;
use crate::core::error::{ChatError, ChatResult};
use crate::core::store::MessageStore;
use crate::storage::InMemoryMessageStore;
use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Builder for the chat HTTP + WebSocket server
///
/// Without explicit overrides the store and the token verifier are derived
/// from the configuration.
///
/// # Example
///
/// ```ignore
/// let app = ServerBuilder::new()
///     .with_config(ChatConfig::from_yaml_file("chat.yaml")?)
///     .build()?;
/// ```
pub struct ServerBuilder {
    config: ChatConfig,
    store: Option<Arc<dyn MessageStore>>,
    verifier: Option<Arc<dyn TokenVerifier>>,
    custom_routes: Vec<Router>,
}

impl ServerBuilder {
    /// Create a new ServerBuilder with the default configuration
    pub fn new() -> Self {
        Self {
            config: ChatConfig::default(),
            store: None,
            verifier: None,
            custom_routes: Vec::new(),
        }
    }

    /// Use a loaded configuration
    pub fn with_config(mut self, config: ChatConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the message store selected by `storage.backend`
    pub fn with_store(mut self, store: impl MessageStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Override the static-token verifier built from `auth.tokens`
    pub fn with_token_verifier(mut self, verifier: impl TokenVerifier + 'static) -> Self {
        self.verifier = Some(Arc::new(verifier));
        self
    }

    /// Add custom routes to the server
    pub fn with_custom_routes(mut self, routes: Router) -> Self {
        self.custom_routes.push(routes);
        self
    }

    /// Build the transport-agnostic host
    pub fn build_host(mut self) -> ChatResult<ServerHost> {
        let store = match self.store.take() {
            Some(store) => store,
            None => open_store(&self.config)?,
        };
        let verifier = match self.verifier.take() {
            Some(verifier) => verifier,
            None => {
                let verifier = self.config.auth.verifier();
                if verifier.is_empty() {
                    tracing::warn!("No auth tokens configured, every handshake will be rejected");
                }
                Arc::new(verifier)
            }
        };

        ServerHost::from_builder_components(self.config, store, verifier)
    }

    /// Build the final router (REST + WebSocket)
    pub fn build(mut self) -> Result<Router> {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        Self::router_for(host, custom_routes)
    }

    /// Expose an already built host over REST and WebSocket
    pub fn router_for(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
        let rest_router = RestExposure::build_router(host.clone(), custom_routes)?;
        let ws_router = WebSocketExposure::build_router(host)?;

        Ok(rest_router.merge(ws_router).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any)),
        ))
    }

    /// Serve the application with graceful shutdown
    ///
    /// This will:
    /// - Bind to `server.bind_addr` from the configuration
    /// - Start serving requests
    /// - On SIGTERM or Ctrl+C, cancel every WebSocket session and wait (up to
    ///   twice `send_timeout_ms`) for each one to record its leave
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.server.bind_addr).await?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `signal` resolves
    pub async fn serve_with_shutdown<F>(mut self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let custom_routes = std::mem::take(&mut self.custom_routes);
        let host = Arc::new(self.build_host()?);
        let app = Self::router_for(host.clone(), custom_routes)?;

        tracing::info!(
            backend = host.backend_name(),
            "Server listening on {}",
            listener.local_addr()?
        );

        let connections = host.connections.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                signal.await;
                connections.close_all().await;
            })
            .await?;

        // Upgraded sockets outlive axum's graceful shutdown
        let limit = host.config.connection.send_timeout() * 2;
        if !host.connections.drain(limit).await {
            let remaining = host.connections.connection_count().await;
            tracing::warn!(
                remaining = remaining,
                "Sessions still open at shutdown"
            );
        }

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn open_store(config: &ChatConfig) -> ChatResult<Arc<dyn MessageStore>> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryMessageStore::new())),
        #[cfg(feature = "lmdb")]
        StorageBackend::Lmdb => {
            let path = config.storage.path.as_deref().ok_or_else(|| ChatError::Config {
                message: "storage.path is required for the lmdb backend".to_string(),
            })?;
            Ok(Arc::new(crate::storage::LmdbMessageStore::open(path)?))
        }
        #[cfg(not(feature = "lmdb"))]
        StorageBackend::Lmdb => Err(ChatError::Config {
            message: "the lmdb backend requires the `lmdb` feature".to_string(),
        }),
    }
}

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
