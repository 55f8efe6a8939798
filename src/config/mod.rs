//! Configuration loading and management
//!
//! Every field has a serde default, so an empty YAML document is a valid
//! configuration:
//!
//! ```yaml
//! server:
//!   bind_addr: 0.0.0.0:8080
//! connection:
//!   heartbeat_interval_ms: 4000
//!   heartbeat_timeout_ms: 12000
//! history:
//!   default_page_size: 20
//!   max_page_size: 100
//! reconnect:
//!   delay_ms: 5000
//!   max_attempts: 0        # 0 = unlimited
//! storage:
//!   backend: lmdb
//!   path: /var/lib/jummah-chat
//! auth:
//!   tokens:
//!     dev-token-ali: { id: "u-1", name: "Ali" }
//! ```

use crate::core::auth::{Principal, StaticTokenVerifier};
use crate::core::error::{ChatError, ChatResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Complete configuration for the chat service
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ChatConfig {
    #[validate(nested)]
    pub server: ServerConfig,

    #[validate(nested)]
    pub connection: ConnectionConfig,

    #[validate(nested)]
    pub history: HistoryConfig,

    #[validate(nested)]
    pub reconnect: ReconnectConfig,

    pub storage: StorageConfig,

    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to
    #[validate(length(min = 1))]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Per-connection timing and buffering
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Interval between server pings
    #[validate(range(min = 100))]
    pub heartbeat_interval_ms: u64,

    /// Silence after which a connection is considered dead
    #[validate(range(min = 100))]
    pub heartbeat_timeout_ms: u64,

    /// Time allowed for a client to present credentials
    #[validate(range(min = 100))]
    pub handshake_timeout_ms: u64,

    /// Frames a session may have queued before it is evicted as slow
    #[validate(range(min = 1, max = 65536))]
    pub outbound_buffer: usize,

    /// Deadline for a single socket write
    #[validate(range(min = 10))]
    pub send_timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 4_000,
            heartbeat_timeout_ms: 12_000,
            handshake_timeout_ms: 10_000,
            outbound_buffer: 256,
            send_timeout_ms: 5_000,
        }
    }
}

impl ConnectionConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HistoryConfig {
    #[validate(range(min = 1))]
    pub default_page_size: usize,

    #[validate(range(min = 1, max = 1000))]
    pub max_page_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// Client reconnection policy
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    pub delay_ms: u64,

    /// Maximum number of reconnection attempts (0 = unlimited)
    pub max_attempts: u32,

    /// Growth factor applied per attempt (1.0 = fixed delay)
    #[validate(range(min = 1.0, max = 10.0))]
    pub backoff_multiplier: f64,

    /// Upper bound on the delay between attempts
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: 5_000,
            max_attempts: 0,
            backoff_multiplier: 1.0,
            max_delay_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Lmdb,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    /// LMDB directory, required when `backend` is `lmdb`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Static bearer tokens for the bundled verifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: HashMap<String, Principal>,
}

impl AuthConfig {
    pub fn verifier(&self) -> StaticTokenVerifier {
        StaticTokenVerifier::from_map(self.tokens.clone())
    }
}

impl ChatConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ChatResult<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ChatError::Config {
            message: format!("cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> ChatResult<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.check()?;
        Ok(config)
    }

    /// Field rules plus cross-field consistency
    pub fn check(&self) -> ChatResult<()> {
        self.validate()?;

        if self.connection.heartbeat_timeout_ms <= self.connection.heartbeat_interval_ms {
            return Err(ChatError::Config {
                message: "connection.heartbeat_timeout_ms must exceed heartbeat_interval_ms"
                    .to_string(),
            });
        }
        if self.history.default_page_size > self.history.max_page_size {
            return Err(ChatError::Config {
                message: "history.default_page_size must not exceed max_page_size".to_string(),
            });
        }
        if self.storage.backend == StorageBackend::Lmdb && self.storage.path.is_none() {
            return Err(ChatError::Config {
                message: "storage.path is required for the lmdb backend".to_string(),
            });
        }
        Ok(())
    }
}
