//! Topic broker for room-scoped fan-out
//!
//! The broker maps room ids to the sessions subscribed to them and forwards
//! committed messages to every subscriber. It never persists anything; a
//! restart loses all subscriptions and clients re-subscribe on reconnect.
//!
//! # Architecture
//!
//! ```text
//! Coordinator ──publish(room, event)──▶ TopicBroker
//!                                          │
//!                               for each subscriber of room
//!                                          │
//!                                  try_send(event) into the
//!                                  session's bounded queue
//!                                          │
//!                  ok ──▶ writer task ──▶ socket
//!                  full / closed ──▶ evict + cancel session
//! ```
//!
//! Publishing never awaits a subscriber: a slow or dead session is evicted
//! and its teardown is signalled through its cancellation token.

use crate::core::message::StoredMessage;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Events delivered on a room topic
#[derive(Debug, Clone)]
pub enum TopicEvent {
    /// A message committed to the room's log
    Message(Arc<StoredMessage>),
    /// The room was closed by the event lifecycle
    Closed { room_id: Uuid },
}

impl TopicEvent {
    pub fn room_id(&self) -> Uuid {
        match self {
            TopicEvent::Message(message) => message.room_id,
            TopicEvent::Closed { room_id } => *room_id,
        }
    }
}

/// A fan-out target registered with the broker
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub session_id: String,
    pub tx: mpsc::Sender<TopicEvent>,
    pub cancel: CancellationToken,
}

/// Handle returned by [`TopicBroker::subscribe`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionHandle {
    pub id: String,
    pub room_id: Uuid,
    pub session_id: String,
}

/// Topic address for a room, as seen by clients
pub fn topic_for(room_id: &Uuid) -> String {
    format!("/topic/room/{}", room_id)
}

struct Entry {
    subscription_id: String,
    subscriber: Subscriber,
}

#[derive(Default)]
struct Topic {
    subscribers: HashMap<String, Entry>,
    /// Set once the last subscriber is gone; a retired topic is about to be
    /// removed from the map and must not take new subscribers
    retired: bool,
}

/// Outcome of a single publish
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers that accepted the event
    pub delivered: usize,
    /// Sessions evicted because their queue was full or closed
    pub evicted: Vec<String>,
}

type TopicRef = Arc<Mutex<Topic>>;

/// In-memory publish/subscribe router keyed by room id
///
/// Each room has its own lock. The outer map is read-locked for lookups and
/// only write-locked to create a missing topic or drop an empty one; no room
/// lock is ever awaited while the map lock is held.
#[derive(Default)]
pub struct TopicBroker {
    topics: RwLock<HashMap<Uuid, TopicRef>>,
}

impl TopicBroker {
    pub fn new() -> Self {
        Self::default()
    }

    async fn existing(&self, room_id: &Uuid) -> Option<TopicRef> {
        self.topics.read().await.get(room_id).cloned()
    }

    /// The live topic for a room, created on first use
    ///
    /// A retired topic found in the map is replaced by a fresh one.
    async fn topic(&self, room_id: Uuid, stale: Option<&TopicRef>) -> TopicRef {
        if stale.is_none()
            && let Some(topic) = self.existing(&room_id).await
        {
            return topic;
        }

        let mut topics = self.topics.write().await;
        match topics.get(&room_id) {
            Some(current) if !stale.is_some_and(|s| Arc::ptr_eq(s, current)) => current.clone(),
            _ => {
                let fresh = TopicRef::default();
                topics.insert(room_id, fresh.clone());
                fresh
            }
        }
    }

    /// Drop a retired topic from the map unless it was already replaced
    async fn prune(&self, room_id: Uuid, retired: &TopicRef) {
        let mut topics = self.topics.write().await;
        if topics.get(&room_id).is_some_and(|t| Arc::ptr_eq(t, retired)) {
            topics.remove(&room_id);
            tracing::debug!(room_id = %room_id, "Topic pruned");
        }
    }

    /// Register a session as a fan-out target for a room
    ///
    /// Idempotent per (room, session): subscribing again returns the existing
    /// handle.
    pub async fn subscribe(&self, room_id: Uuid, subscriber: Subscriber) -> SubscriptionHandle {
        let mut stale: Option<TopicRef> = None;

        loop {
            let topic_ref = self.topic(room_id, stale.as_ref()).await;
            let mut topic = topic_ref.lock().await;
            if topic.retired {
                drop(topic);
                stale = Some(topic_ref);
                continue;
            }

            if let Some(existing) = topic.subscribers.get(&subscriber.session_id) {
                return SubscriptionHandle {
                    id: existing.subscription_id.clone(),
                    room_id,
                    session_id: subscriber.session_id.clone(),
                };
            }

            let handle = SubscriptionHandle {
                id: format!("sub_{}", Uuid::new_v4().simple()),
                room_id,
                session_id: subscriber.session_id.clone(),
            };
            topic.subscribers.insert(
                subscriber.session_id.clone(),
                Entry {
                    subscription_id: handle.id.clone(),
                    subscriber,
                },
            );

            tracing::debug!(
                room_id = %room_id,
                session_id = %handle.session_id,
                subscription_id = %handle.id,
                subscribers = topic.subscribers.len(),
                "Subscription added"
            );

            return handle;
        }
    }

    /// Remove a binding
    ///
    /// Safe to call repeatedly; returns `true` only when something was removed.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let Some(topic_ref) = self.existing(&handle.room_id).await else {
            return false;
        };

        let now_empty = {
            let mut topic = topic_ref.lock().await;
            let matches = topic
                .subscribers
                .get(&handle.session_id)
                .is_some_and(|e| e.subscription_id == handle.id);
            if !matches {
                return false;
            }

            topic.subscribers.remove(&handle.session_id);
            topic.retired = topic.subscribers.is_empty();
            topic.retired
        };

        tracing::debug!(
            room_id = %handle.room_id,
            session_id = %handle.session_id,
            subscription_id = %handle.id,
            "Subscription removed"
        );

        if now_empty {
            self.prune(handle.room_id, &topic_ref).await;
        }

        true
    }

    /// Deliver an event to every subscriber of a room
    ///
    /// Best-effort and non-blocking. Subscribers whose queue is full or
    /// closed are removed and their cancellation token is fired so the
    /// owning connection tears itself down.
    pub async fn publish(&self, room_id: Uuid, event: TopicEvent) -> PublishReport {
        let Some(topic_ref) = self.existing(&room_id).await else {
            return PublishReport::default();
        };

        let mut report = PublishReport::default();
        let now_empty = {
            let mut topic = topic_ref.lock().await;
            for (session_id, entry) in topic.subscribers.iter() {
                match entry.subscriber.tx.try_send(event.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!(
                            room_id = %room_id,
                            session_id = %session_id,
                            "Subscriber queue full, evicting slow session"
                        );
                        report.evicted.push(session_id.clone());
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!(
                            room_id = %room_id,
                            session_id = %session_id,
                            "Subscriber queue closed, evicting dead session"
                        );
                        report.evicted.push(session_id.clone());
                    }
                }
            }

            for session_id in &report.evicted {
                if let Some(entry) = topic.subscribers.remove(session_id) {
                    entry.subscriber.cancel.cancel();
                }
            }

            if !report.evicted.is_empty() && topic.subscribers.is_empty() {
                topic.retired = true;
            }
            topic.retired
        };

        if now_empty {
            self.prune(room_id, &topic_ref).await;
        }

        report
    }

    /// Number of sessions subscribed to a room
    pub async fn subscriber_count(&self, room_id: &Uuid) -> usize {
        match self.existing(room_id).await {
            Some(topic) => topic.lock().await.subscribers.len(),
            None => 0,
        }
    }

    /// Number of rooms with at least one subscriber
    pub async fn room_count(&self) -> usize {
        self.topics.read().await.len()
    }
}
