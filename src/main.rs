//! Jummah chat server
//!
//! Usage: `jummah-chat [config.yaml]`. The path may also come from the
//! `JUMMAH_CHAT_CONFIG` environment variable; without either, defaults apply.

use anyhow::Result;
use jummah_chat::config::ChatConfig;
use jummah_chat::server::ServerBuilder;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("jummah_chat=info,tower_http=info")),
        )
        .init();

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("JUMMAH_CHAT_CONFIG").ok());

    let config = match config_path {
        Some(path) => {
            tracing::info!(path = %path, "Loading configuration");
            ChatConfig::from_yaml_file(&path)?
        }
        None => ChatConfig::default(),
    };

    tracing::info!(
        backend = ?config.storage.backend,
        "Starting jummah-chat v{}",
        env!("CARGO_PKG_VERSION")
    );

    ServerBuilder::new().with_config(config).serve().await
}
