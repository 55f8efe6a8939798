//! Server module for the chat HTTP + WebSocket endpoints
//!
//! This module provides a `ServerBuilder` that assembles a `ServerHost` from
//! configuration and exposes it through:
//! - REST routes for health, room history and room closing
//! - The `/ws` endpoint for live room sessions

pub mod builder;
pub mod exposure;
pub mod host;

pub use builder::ServerBuilder;
pub use exposure::{RestExposure, WebSocketExposure};
pub use host::ServerHost;
