//! Core domain types and services for room-scoped chat

pub mod auth;
pub mod coordinator;
pub mod error;
pub mod history;
pub mod message;
pub mod page;
pub mod session;
pub mod store;

pub use auth::{Principal, StaticTokenVerifier, TokenVerifier};
pub use coordinator::{JoinOutcome, RoomCoordinator};
pub use error::{ChatError, ChatResult, ErrorResponse};
pub use history::HistoryService;
pub use message::{ChatMessage, MessageKind, StoredMessage};
pub use page::{HistoryParams, Page, PageResponse};
pub use session::{ConnectionState, Session};
pub use store::MessageStore;
