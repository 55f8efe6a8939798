//! WebSocket chat client with automatic reconnection
//!
//! [`ChatClient`] is the participant-side half of the connection lifecycle.
//! A background task owns the socket; the client handle sends commands to it
//! and observes its [`ConnectionState`] through a `watch` channel. Server
//! frames arrive as [`ClientEvent`]s on an mpsc channel.
//!
//! When the transport drops, the task moves to `Reconnecting`, waits for the
//! [`ReconnectPolicy`] delay, reconnects with the same credential and joins
//! the room it was in before. A rejected credential is never retried.
//!
//! # Example
//!
//! ```ignore
//! let (client, mut events) =
//!     ChatClient::connect("ws://localhost:8080/ws", "dev-token-ali", ReconnectPolicy::default())
//!         .await?;
//! client.join(room_id).await?;
//! client.send(room_id, "Asalaamu Alaikum").await?;
//!
//! while let Some(event) = events.recv().await {
//!     if let ClientEvent::Message(message) = event {
//!         println!("{}: {:?}", message.sender(), message.body());
//!     }
//! }
//! ```

mod policy;

pub use policy::ReconnectPolicy;

use crate::broker::topic_for;
use crate::core::error::{ChatError, ChatResult};
use crate::core::message::{ChatMessage, StoredMessage};
use crate::core::page::Page;
use crate::core::session::ConnectionState;
use crate::server::exposure::websocket::protocol::{
    ClientFrame, Destination, ServerFrame, app_destination,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, timeout};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

const EVENT_BUFFER: usize = 256;
const COMMAND_BUFFER: usize = 64;
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_HEARTBEAT: Duration = Duration::from_millis(100);
/// Heartbeat intervals of server silence before the connection counts as lost
const SILENCE_FACTOR: u32 = 3;

/// Something the server told us, or a change in the connection
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake accepted (initially and after every reconnect)
    Connected {
        session_id: String,
        principal: String,
    },
    /// The server confirmed a room subscription
    Joined { room_id: Uuid },
    /// The server confirmed leaving a room
    Left { room_id: Uuid },
    /// A message committed to the joined room
    Message(StoredMessage),
    /// Reply to [`ChatClient::request_history`]
    History { room_id: Uuid, page: Page },
    /// The room was closed; no further writes are accepted
    RoomClosed { room_id: Uuid },
    /// The server rejected a frame, or the connection failed for good
    Error { code: String, message: String },
    /// The connection state changed
    StateChanged(ConnectionState),
    /// A reconnection attempt is scheduled after `delay`
    Reconnecting { attempt: u32, delay: Duration },
}

impl From<&ChatError> for ClientEvent {
    fn from(err: &ChatError) -> Self {
        ClientEvent::Error {
            code: err.error_code().to_string(),
            message: err.to_string(),
        }
    }
}

enum Command {
    Frame(ClientFrame),
    Close,
}

/// State shared between the client handle and its connection task
struct Shared {
    url: String,
    token: String,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
    events: mpsc::Sender<ClientEvent>,
    /// Room to rejoin after a reconnect, set once the server acknowledges it
    room: Mutex<Option<Uuid>>,
}

impl Shared {
    async fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!(from = %previous, to = %next, "client state changed");
            self.emit(ClientEvent::StateChanged(next)).await;
        }
    }

    async fn emit(&self, event: ClientEvent) {
        // Receiver dropped: nobody is listening any more
        let _ = self.events.send(event).await;
    }
}

/// Handle to a live chat connection
pub struct ChatClient {
    shared: Arc<Shared>,
    state: watch::Receiver<ConnectionState>,
    commands: mpsc::Sender<Command>,
    principal: String,
    task: JoinHandle<()>,
}

impl ChatClient {
    /// Connect and authenticate
    ///
    /// The first handshake happens before this returns: an invalid token
    /// yields `AuthRejected` and an unreachable server `TransportFailure`.
    /// Later drops are handled by the reconnect loop.
    pub async fn connect(
        url: impl Into<String>,
        token: impl Into<String>,
        policy: ReconnectPolicy,
    ) -> ChatResult<(Self, mpsc::Receiver<ClientEvent>)> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);

        let shared = Arc::new(Shared {
            url: url.into(),
            token: token.into(),
            policy,
            state: state_tx,
            events: events_tx,
            room: Mutex::new(None),
        });

        let established = match handshake(&shared).await {
            Ok(established) => established,
            Err(e) => {
                shared.state.send_replace(ConnectionState::Closed);
                return Err(e);
            }
        };
        let principal = established.principal.clone();
        shared.set_state(ConnectionState::Open).await;
        shared
            .emit(ClientEvent::Connected {
                session_id: established.session_id.clone(),
                principal: principal.clone(),
            })
            .await;

        let task = tokio::spawn(run(established, shared.clone(), commands_rx));

        Ok((
            Self {
                shared,
                state: state_rx,
                commands: commands_tx,
                principal,
                task,
            },
            events_rx,
        ))
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch for state changes
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Display name the server resolved our token to
    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Join a room (leaving the current one, if any)
    ///
    /// The room is remembered for reconnects once the server confirms it
    /// with [`ClientEvent::Joined`].
    pub async fn join(&self, room_id: Uuid) -> ChatResult<()> {
        self.ensure_open()?;
        {
            // The server leaves the current room before joining another
            let mut room = self.shared.room.lock().await;
            if room.is_some_and(|current| current != room_id) {
                *room = None;
            }
        }
        self.submit(ClientFrame::Subscribe {
            destination: topic_for(&room_id),
        })
        .await
    }

    /// Leave a room
    pub async fn leave(&self, room_id: Uuid) -> ChatResult<()> {
        self.ensure_open()?;
        {
            let mut room = self.shared.room.lock().await;
            if *room == Some(room_id) {
                *room = None;
            }
        }
        self.submit(ClientFrame::Unsubscribe {
            destination: topic_for(&room_id),
        })
        .await
    }

    /// Post a chat message to a joined room
    ///
    /// Fails immediately with `NotConnected` unless the connection is open.
    pub async fn send(&self, room_id: Uuid, body: impl Into<String>) -> ChatResult<()> {
        self.ensure_open()?;
        self.submit(ClientFrame::Send {
            destination: app_destination(&room_id),
            body: ChatMessage::chat(&self.principal, body),
        })
        .await
    }

    /// Ask for a history page; the reply arrives as [`ClientEvent::History`]
    pub async fn request_history(
        &self,
        room_id: Uuid,
        page: usize,
        size: Option<usize>,
    ) -> ChatResult<()> {
        self.ensure_open()?;
        self.submit(ClientFrame::History {
            room_id,
            page,
            size,
        })
        .await
    }

    /// Close the connection and wait for the task to finish
    pub async fn close(self) -> ChatResult<()> {
        // The task may already be gone after exhausting its retries
        let _ = self.commands.send(Command::Close).await;
        self.task
            .await
            .map_err(|e| ChatError::Internal(format!("client task failed: {}", e)))
    }

    fn ensure_open(&self) -> ChatResult<()> {
        if self.state() == ConnectionState::Open {
            Ok(())
        } else {
            Err(ChatError::NotConnected)
        }
    }

    async fn submit(&self, frame: ClientFrame) -> ChatResult<()> {
        self.commands
            .send(Command::Frame(frame))
            .await
            .map_err(|_| ChatError::NotConnected)
    }
}

/// A socket that completed the handshake
struct Established {
    ws: WsStream,
    session_id: String,
    principal: String,
    heartbeat: Duration,
}

/// Open the socket and wait for the server's `connected` frame
async fn handshake(shared: &Shared) -> ChatResult<Established> {
    shared.set_state(ConnectionState::Connecting).await;

    let mut request = shared
        .url
        .as_str()
        .into_client_request()
        .map_err(|e| ChatError::transport(e.to_string()))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", shared.token)).map_err(|e| {
        ChatError::AuthRejected {
            reason: format!("token is not a valid header value: {}", e),
        }
    })?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (mut ws, _) = timeout(HANDSHAKE_TIMEOUT, connect_async(request))
        .await
        .map_err(|_| ChatError::transport("connect timed out"))?
        .map_err(|e| ChatError::transport(e.to_string()))?;

    shared.set_state(ConnectionState::Authenticating).await;

    loop {
        let next = timeout(HANDSHAKE_TIMEOUT, ws.next())
            .await
            .map_err(|_| ChatError::transport("handshake timed out"))?;
        match next {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ServerFrame>(text.as_str()) {
                Ok(ServerFrame::Connected {
                    session_id,
                    principal,
                    heartbeat_interval_ms,
                }) => {
                    return Ok(Established {
                        ws,
                        session_id,
                        principal,
                        heartbeat: Duration::from_millis(heartbeat_interval_ms).max(MIN_HEARTBEAT),
                    });
                }
                Ok(ServerFrame::Error { code, message }) if code == "AUTH_REJECTED" => {
                    return Err(ChatError::AuthRejected { reason: message });
                }
                Ok(other) => {
                    tracing::debug!(frame = ?other, "Ignoring frame before handshake completed");
                }
                Err(e) => return Err(ChatError::transport(format!("malformed frame: {}", e))),
            },
            Some(Ok(Message::Close(_))) | None => {
                return Err(ChatError::transport("server closed during handshake"));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ChatError::transport(e.to_string())),
        }
    }
}

/// Why a connection ended
enum Exit {
    /// `close()` was called or the handle was dropped
    Closed,
    /// The transport failed; reconnect
    Lost(String),
}

/// Connection task: drive the socket, reconnect on loss
async fn run(
    mut connection: Established,
    shared: Arc<Shared>,
    mut commands: mpsc::Receiver<Command>,
) {
    loop {
        match drive(connection, &shared, &mut commands).await {
            Exit::Closed => {
                shared.set_state(ConnectionState::Closing).await;
                shared.set_state(ConnectionState::Closed).await;
                tracing::info!("Chat client closed");
                return;
            }
            Exit::Lost(reason) => {
                tracing::warn!(reason = %reason, "Chat connection lost");
                match reconnect(&shared, &mut commands).await {
                    Some(next) => connection = next,
                    None => return,
                }
            }
        }
    }
}

/// Retry the handshake per the policy; `None` means the client is done
async fn reconnect(
    shared: &Shared,
    commands: &mut mpsc::Receiver<Command>,
) -> Option<Established> {
    let mut attempt: u32 = 0;

    loop {
        shared.set_state(ConnectionState::Reconnecting).await;

        if !shared.policy.should_retry(attempt) {
            let err = ChatError::transport(format!("gave up after {} attempts", attempt));
            tracing::warn!(error = %err, "Reconnection abandoned");
            shared.emit(ClientEvent::from(&err)).await;
            shared.set_state(ConnectionState::Closed).await;
            return None;
        }

        let delay = shared.policy.delay_for(attempt);
        attempt += 1;
        shared
            .emit(ClientEvent::Reconnecting { attempt, delay })
            .await;
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = commands.recv() => match command {
                    Some(Command::Frame(_)) => {
                        tracing::debug!("Dropping frame queued while reconnecting");
                    }
                    Some(Command::Close) | None => {
                        shared.set_state(ConnectionState::Closed).await;
                        return None;
                    }
                },
            }
        }

        match handshake(shared).await {
            Ok(mut established) => {
                let room = *shared.room.lock().await;
                if let Some(room_id) = room {
                    let frame = ClientFrame::Subscribe {
                        destination: topic_for(&room_id),
                    };
                    if let Err(e) = send_frame(&mut established.ws, &frame).await {
                        tracing::debug!(error = %e, "Resubscribe failed");
                        continue;
                    }
                    tracing::info!(room_id = %room_id, "Rejoined room after reconnect");
                }
                shared.set_state(ConnectionState::Open).await;
                shared
                    .emit(ClientEvent::Connected {
                        session_id: established.session_id.clone(),
                        principal: established.principal.clone(),
                    })
                    .await;
                return Some(established);
            }
            Err(e @ ChatError::AuthRejected { .. }) => {
                tracing::warn!(error = %e, "Reconnection rejected");
                shared.emit(ClientEvent::from(&e)).await;
                shared.set_state(ConnectionState::Closed).await;
                return None;
            }
            Err(e) => {
                tracing::debug!(attempt, error = %e, "Reconnection attempt failed");
            }
        }
    }
}

/// Pump commands out and server frames in until the connection ends
async fn drive(
    connection: Established,
    shared: &Shared,
    commands: &mut mpsc::Receiver<Command>,
) -> Exit {
    let (mut sink, mut stream): (WsSink, WsSource) = connection.ws.split();

    let silence_limit = connection.heartbeat * SILENCE_FACTOR;
    let mut last_inbound = Instant::now();

    let mut heartbeat = interval(connection.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);
    heartbeat.tick().await;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Frame(frame)) => {
                    if let Err(e) = send_json(&mut sink, &frame).await {
                        return Exit::Lost(e.to_string());
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Exit::Closed;
                }
            },

            next = stream.next() => match next {
                Some(Ok(Message::Text(text))) => {
                    last_inbound = Instant::now();
                    handle_server_frame(shared, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Exit::Lost("server closed the connection".to_string());
                }
                // Pings and pongs only count as liveness
                Some(Ok(_)) => last_inbound = Instant::now(),
                Some(Err(e)) => return Exit::Lost(e.to_string()),
            },

            _ = heartbeat.tick() => {
                if last_inbound.elapsed() > silence_limit {
                    return Exit::Lost(format!(
                        "no traffic from server for {} ms",
                        last_inbound.elapsed().as_millis()
                    ));
                }
                if let Err(e) = send_json(&mut sink, &ClientFrame::Ping).await {
                    return Exit::Lost(e.to_string());
                }
            }
        }
    }
}

async fn handle_server_frame(shared: &Shared, text: &str) {
    let frame = match serde_json::from_str::<ServerFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring malformed server frame");
            return;
        }
    };

    let event = match frame {
        ServerFrame::Message { body, .. } => ClientEvent::Message(body),
        ServerFrame::History { room_id, page } => ClientEvent::History { room_id, page },
        ServerFrame::RoomClosed { room_id } => {
            forget_room(shared, Some(room_id)).await;
            ClientEvent::RoomClosed { room_id }
        }
        ServerFrame::Error { code, message } => {
            if code == "ROOM_CLOSED" {
                forget_room(shared, None).await;
            }
            ClientEvent::Error { code, message }
        }
        ServerFrame::Subscribed { destination } => match topic_room(&destination) {
            Some(room_id) => {
                *shared.room.lock().await = Some(room_id);
                ClientEvent::Joined { room_id }
            }
            None => return,
        },
        ServerFrame::Unsubscribed { destination } => match topic_room(&destination) {
            Some(room_id) => {
                forget_room(shared, Some(room_id)).await;
                ClientEvent::Left { room_id }
            }
            None => return,
        },
        ServerFrame::Connected { .. } | ServerFrame::Pong => return,
    };
    shared.emit(event).await;
}

/// Stop rejoining a room after reconnects; `None` forgets whichever room is held
async fn forget_room(shared: &Shared, room_id: Option<Uuid>) {
    let mut room = shared.room.lock().await;
    if room_id.is_none() || *room == room_id {
        *room = None;
    }
}

fn topic_room(destination: &str) -> Option<Uuid> {
    Destination::topic(destination).ok()
}

async fn send_json(sink: &mut WsSink, frame: &ClientFrame) -> ChatResult<()> {
    let json = serde_json::to_string(frame).map_err(|e| ChatError::Internal(e.to_string()))?;
    sink.send(Message::text(json))
        .await
        .map_err(|e| ChatError::transport(e.to_string()))
}

async fn send_frame(ws: &mut WsStream, frame: &ClientFrame) -> ChatResult<()> {
    let json = serde_json::to_string(frame).map_err(|e| ChatError::Internal(e.to_string()))?;
    ws.send(Message::text(json))
        .await
        .map_err(|e| ChatError::transport(e.to_string()))
}
