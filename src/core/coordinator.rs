//! Room session coordinator
//!
//! Binds sessions to room subscriptions and turns client intents into
//! store appends followed by broker publishes.
//!
//! # Ordering
//!
//! Every write to a room goes through that room's gate: the append and the
//! publish of the resulting message happen under the same per-room async
//! mutex, so subscribers observe messages in sequence-number order. Publish
//! only enqueues into bounded per-session queues and never waits on a
//! socket, so a slow subscriber cannot hold a gate. Unrelated rooms never
//! share a gate.

use crate::broker::{PublishReport, Subscriber, TopicBroker, TopicEvent};
use crate::core::error::{ChatError, ChatResult};
use crate::core::message::{ChatMessage, StoredMessage};
use crate::core::session::{RoomBinding, Session};
use crate::core::store::MessageStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Result of a successful `join`
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// The session was subscribed and a `Join` message was stored
    Joined(StoredMessage),
    /// The session was already joined to this room; nothing changed
    AlreadyJoined,
}

/// Coordinates joins, leaves and sends across the store and the broker
pub struct RoomCoordinator {
    store: Arc<dyn MessageStore>,
    broker: Arc<TopicBroker>,
    gates: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl RoomCoordinator {
    pub fn new(store: Arc<dyn MessageStore>, broker: Arc<TopicBroker>) -> Self {
        Self {
            store,
            broker,
            gates: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    pub fn broker(&self) -> &Arc<TopicBroker> {
        &self.broker
    }

    async fn gate(&self, room_id: Uuid) -> Arc<Mutex<()>> {
        if let Some(gate) = self.gates.read().await.get(&room_id) {
            return gate.clone();
        }
        self.gates
            .write()
            .await
            .entry(room_id)
            .or_default()
            .clone()
    }

    /// Append a message and publish it under the room's gate
    async fn commit(&self, room_id: Uuid, message: ChatMessage) -> ChatResult<StoredMessage> {
        let gate = self.gate(room_id).await;
        let _guard = gate.lock().await;

        let stored = self.store.append(room_id, message).await?;
        let report = self
            .broker
            .publish(room_id, TopicEvent::Message(Arc::new(stored.clone())))
            .await;
        log_report(&room_id, stored.sequence_no, &report);

        Ok(stored)
    }

    /// Subscribe a session to a room and announce it
    ///
    /// Joining the room the session is already in is a no-op. Joining a
    /// different room leaves the current one first.
    ///
    /// # Errors
    /// - `NotConnected` if the session is not `Open`
    /// - `RoomClosed` if the room no longer accepts writes
    pub async fn join(&self, session: &Session, room_id: Uuid) -> ChatResult<JoinOutcome> {
        if !session.is_open() {
            return Err(ChatError::NotConnected);
        }

        let mut binding = session.room().lock().await;
        if let Some(current) = binding.as_ref() {
            if current.room_id == room_id {
                return Ok(JoinOutcome::AlreadyJoined);
            }
            if let Some(previous) = binding.take() {
                self.leave_binding(session, previous).await?;
            }
        }

        let handle = self
            .broker
            .subscribe(
                room_id,
                Subscriber {
                    session_id: session.id().to_string(),
                    tx: session.topic_sender(),
                    cancel: session.cancel_token().clone(),
                },
            )
            .await;

        match self
            .commit(room_id, ChatMessage::join(&session.principal().name))
            .await
        {
            Ok(stored) => {
                tracing::info!(
                    session_id = %session.id(),
                    room_id = %room_id,
                    sender = %session.principal().name,
                    "Session joined room"
                );
                *binding = Some(RoomBinding { room_id, handle });
                Ok(JoinOutcome::Joined(stored))
            }
            Err(e) => {
                self.broker.unsubscribe(&handle).await;
                Err(e)
            }
        }
    }

    /// Post a chat message to the session's room
    ///
    /// # Errors
    /// - `NotConnected` if the session is not `Open`
    /// - `NotJoined` if the session has no room
    /// - `InvalidMessage` if `body` is blank
    /// - `RoomClosed` if the room was closed
    pub async fn send(&self, session: &Session, body: &str) -> ChatResult<StoredMessage> {
        if !session.is_open() {
            return Err(ChatError::NotConnected);
        }
        let room_id = session.room_id().await.ok_or(ChatError::NotJoined)?;
        if body.trim().is_empty() {
            return Err(ChatError::invalid("message body must not be empty"));
        }

        let stored = self
            .commit(room_id, ChatMessage::chat(&session.principal().name, body))
            .await?;

        tracing::debug!(
            session_id = %session.id(),
            room_id = %room_id,
            sequence_no = stored.sequence_no,
            "Chat message committed"
        );

        Ok(stored)
    }

    /// Unsubscribe the session and announce its departure
    ///
    /// Idempotent: returns `Ok(None)` when the session was not joined. A
    /// closed room skips the `Leave` record.
    pub async fn leave(&self, session: &Session) -> ChatResult<Option<StoredMessage>> {
        let previous = session.room().lock().await.take();
        match previous {
            Some(binding) => self.leave_binding(session, binding).await,
            None => Ok(None),
        }
    }

    async fn leave_binding(
        &self,
        session: &Session,
        binding: RoomBinding,
    ) -> ChatResult<Option<StoredMessage>> {
        self.broker.unsubscribe(&binding.handle).await;

        let room_id = binding.room_id;
        match self
            .commit(room_id, ChatMessage::leave(&session.principal().name))
            .await
        {
            Ok(stored) => {
                tracing::info!(
                    session_id = %session.id(),
                    room_id = %room_id,
                    sender = %session.principal().name,
                    "Session left room"
                );
                Ok(Some(stored))
            }
            Err(ChatError::RoomClosed { .. }) => {
                tracing::debug!(
                    session_id = %session.id(),
                    room_id = %room_id,
                    "Room closed, leave not recorded"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Best-effort synthetic `Leave` on connection teardown
    ///
    /// Failures are logged and swallowed; presence is advisory.
    pub async fn disconnect(&self, session: &Session) {
        if let Err(e) = self.leave(session).await {
            tracing::warn!(
                session_id = %session.id(),
                error = %e,
                "Failed to record leave on disconnect"
            );
        }
    }

    /// Permanently close a room and notify its subscribers
    ///
    /// Idempotent. Returns `true` for the call that closed the room.
    pub async fn close_room(&self, room_id: Uuid) -> ChatResult<bool> {
        let gate = self.gate(room_id).await;
        let _guard = gate.lock().await;

        let newly_closed = self.store.close_room(room_id).await?;
        if newly_closed {
            let report = self
                .broker
                .publish(room_id, TopicEvent::Closed { room_id })
                .await;
            tracing::info!(
                room_id = %room_id,
                notified = report.delivered,
                "Room closed"
            );
        }
        Ok(newly_closed)
    }
}

fn log_report(room_id: &Uuid, sequence_no: u64, report: &PublishReport) {
    if !report.evicted.is_empty() {
        tracing::warn!(
            room_id = %room_id,
            sequence_no,
            evicted = report.evicted.len(),
            "Evicted sessions during publish"
        );
    }
    tracing::debug!(
        room_id = %room_id,
        sequence_no,
        delivered = report.delivered,
        "Published"
    );
}
