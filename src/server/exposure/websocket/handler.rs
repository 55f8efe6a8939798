//! WebSocket upgrade handler and message loop
//!
//! This module handles the HTTP → WebSocket upgrade and runs the per-connection
//! message loop. Each connection goes through:
//!
//! 1. A handshake: the credential comes from the `Authorization` header, the
//!    `access_token` query parameter, or a first `connect` frame
//! 2. A `connected` frame carrying the session id and heartbeat interval
//! 3. A write loop draining the control and topic queues, with heartbeats
//! 4. A read loop dispatching client frames to the coordinator
//! 5. Teardown: a synthetic leave, deregistration, then close

use super::manager::SessionChannels;
use super::protocol::{ClientFrame, Destination, ServerFrame};
use crate::config::ConnectionConfig;
use crate::core::auth::{Principal, bearer_token};
use crate::core::error::{ChatError, ChatResult};
use crate::core::message::MessageKind;
use crate::core::session::{ConnectionState, Session};
use crate::server::host::ServerHost;
use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

/// Query parameters accepted on the upgrade request
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    pub access_token: Option<String>,
}

/// WebSocket upgrade handler
///
/// This is the axum handler for GET /ws. It upgrades the HTTP connection
/// to a WebSocket connection and spawns the message loop.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(host): State<Arc<ServerHost>>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
) -> impl IntoResponse {
    let token = bearer_token(&headers).or(params.access_token);
    ws.on_upgrade(move |socket| handle_socket(socket, host, token))
}

/// Handle a single WebSocket connection
async fn handle_socket(socket: WebSocket, host: Arc<ServerHost>, token: Option<String>) {
    let config = host.config.connection.clone();
    let (mut ws_write, mut ws_read) = socket.split();

    let principal = match authenticate(&host, &mut ws_read, token, config.handshake_timeout()).await
    {
        Ok(principal) => principal,
        Err(e) => {
            tracing::warn!(error = %e, "WebSocket handshake rejected");
            let _ = send_frame(&mut ws_write, &ServerFrame::from(&e), config.send_timeout()).await;
            let close = Message::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: e.error_code().into(),
            }));
            let _ = tokio::time::timeout(config.send_timeout(), ws_write.send(close)).await;
            return;
        }
    };

    let (session, channels) = host.connections.connect(principal).await;

    let connected = ServerFrame::Connected {
        session_id: session.id().to_string(),
        principal: session.principal().name.clone(),
        heartbeat_interval_ms: config.heartbeat_interval_ms,
    };
    if send_frame(&mut ws_write, &connected, config.send_timeout())
        .await
        .is_err()
    {
        session.transition(ConnectionState::Closing);
        host.connections.disconnect(session.id()).await;
        session.transition(ConnectionState::Closed);
        return;
    }
    session.touch();

    let write_handle = tokio::spawn(write_loop(
        ws_write,
        session.clone(),
        channels,
        config.clone(),
    ));

    read_loop(&host, &session, ws_read).await;

    // Cleanup
    session.transition(ConnectionState::Closing);
    session.cancel_token().cancel();
    host.coordinator.disconnect(&session).await;
    host.connections.disconnect(session.id()).await;
    if tokio::time::timeout(config.send_timeout(), write_handle)
        .await
        .is_err()
    {
        tracing::debug!(session_id = %session.id(), "Write loop did not stop in time");
    }
    session.transition(ConnectionState::Closed);

    tracing::info!(session_id = %session.id(), "WebSocket session closed");
}

/// Resolve the connection's principal
///
/// A token from the upgrade request wins; otherwise the first frame must be
/// `connect` and arrive within `deadline`.
async fn authenticate(
    host: &ServerHost,
    ws_read: &mut SplitStream<WebSocket>,
    token: Option<String>,
    deadline: Duration,
) -> ChatResult<Principal> {
    let token = match token {
        Some(token) => token,
        None => tokio::time::timeout(deadline, await_connect_frame(ws_read))
            .await
            .map_err(|_| ChatError::AuthRejected {
                reason: "handshake timed out".to_string(),
            })??,
    };
    host.verifier.verify(&token).await
}

async fn await_connect_frame(ws_read: &mut SplitStream<WebSocket>) -> ChatResult<String> {
    while let Some(msg) = ws_read.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                return match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::Connect { token }) => Ok(token),
                    Ok(_) => Err(ChatError::AuthRejected {
                        reason: "expected a connect frame".to_string(),
                    }),
                    Err(e) => Err(ChatError::AuthRejected {
                        reason: format!("malformed connect frame: {}", e),
                    }),
                };
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => return Err(ChatError::transport(e.to_string())),
        }
    }
    Err(ChatError::transport("connection closed during handshake"))
}

/// Serialize and write one frame under a deadline
async fn send_frame(
    ws_write: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
    deadline: Duration,
) -> ChatResult<()> {
    let json = serde_json::to_string(frame).map_err(|e| ChatError::Internal(e.to_string()))?;
    write_with_deadline(ws_write, Message::Text(json.into()), deadline).await
}

async fn write_with_deadline(
    ws_write: &mut SplitSink<WebSocket, Message>,
    message: Message,
    deadline: Duration,
) -> ChatResult<()> {
    match tokio::time::timeout(deadline, ws_write.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ChatError::transport(e.to_string())),
        Err(_) => Err(ChatError::transport("send deadline exceeded")),
    }
}

/// Forward queued frames to the socket until the session is cancelled
///
/// Also drives the server heartbeat: a ping every interval, and a forced
/// close once the peer has been silent for longer than the timeout.
async fn write_loop(
    mut ws_write: SplitSink<WebSocket, Message>,
    session: Arc<Session>,
    mut channels: SessionChannels,
    config: ConnectionConfig,
) {
    let cancel = session.cancel_token().clone();
    let deadline = config.send_timeout();

    let mut heartbeat = tokio::time::interval(config.heartbeat_interval());
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    heartbeat.tick().await;

    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            Some(frame) = channels.frames.recv() => {
                send_frame(&mut ws_write, &frame, deadline).await
            }
            Some(event) = channels.topic.recv() => {
                // Events still queued for a room the session has left
                if session.room_id().await != Some(event.room_id()) {
                    continue;
                }
                send_frame(&mut ws_write, &ServerFrame::from(event), deadline).await
            }
            _ = heartbeat.tick() => {
                if session.idle_for() > config.heartbeat_timeout() {
                    tracing::warn!(
                        session_id = %session.id(),
                        idle_ms = session.idle_for().as_millis() as u64,
                        "Heartbeat timeout, closing session"
                    );
                    break;
                }
                write_with_deadline(&mut ws_write, Message::Ping(Default::default()), deadline).await
            }
        };

        if let Err(e) = outcome {
            tracing::debug!(
                session_id = %session.id(),
                error = %e,
                "WebSocket write failed, closing"
            );
            break;
        }
    }

    cancel.cancel();
    let _ = write_with_deadline(&mut ws_write, Message::Close(None), deadline).await;
}

/// Read client frames until the peer goes away or the session is cancelled
async fn read_loop(host: &ServerHost, session: &Arc<Session>, mut ws_read: SplitStream<WebSocket>) {
    let cancel = session.cancel_token().clone();

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = ws_read.next() => next,
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                session.touch();
                handle_client_frame(host, session, &text).await;
            }
            Some(Ok(Message::Close(_))) | None => {
                tracing::debug!(session_id = %session.id(), "Client closed connection");
                break;
            }
            // Pong, ping and binary frames only count as liveness
            Some(Ok(_)) => session.touch(),
            Some(Err(e)) => {
                tracing::debug!(
                    session_id = %session.id(),
                    error = %e,
                    "WebSocket read error"
                );
                break;
            }
        }
    }
}

/// Process a single text frame and queue the reply, if any
async fn handle_client_frame(host: &ServerHost, session: &Arc<Session>, text: &str) {
    let reply = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => dispatch(host, session, frame).await,
        Err(e) => Err(ChatError::invalid(format!("malformed frame: {}", e))),
    };

    let frame = match reply {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(e) => {
            tracing::debug!(
                session_id = %session.id(),
                code = e.error_code(),
                error = %e,
                "Client frame rejected"
            );
            ServerFrame::from(&e)
        }
    };
    host.connections.send_to(session.id(), frame).await;
}

async fn dispatch(
    host: &ServerHost,
    session: &Arc<Session>,
    frame: ClientFrame,
) -> ChatResult<Option<ServerFrame>> {
    match frame {
        ClientFrame::Connect { .. } => Err(ChatError::invalid("session already authenticated")),

        ClientFrame::Subscribe { destination } => {
            let room_id = Destination::topic(&destination)?;
            host.coordinator.join(session, room_id).await?;
            Ok(Some(ServerFrame::Subscribed { destination }))
        }

        ClientFrame::Unsubscribe { destination } => {
            let room_id = Destination::topic(&destination)?;
            if session.room_id().await == Some(room_id) {
                host.coordinator.leave(session).await?;
            }
            Ok(Some(ServerFrame::Unsubscribed { destination }))
        }

        ClientFrame::Send { destination, body } => {
            let room_id = Destination::app(&destination)?;
            match body.kind() {
                MessageKind::Chat => {
                    if session.room_id().await != Some(room_id) {
                        return Err(ChatError::NotJoined);
                    }
                    host.coordinator
                        .send(session, body.body().unwrap_or_default())
                        .await?;
                }
                MessageKind::Join => {
                    host.coordinator.join(session, room_id).await?;
                }
                MessageKind::Leave => {
                    if session.room_id().await == Some(room_id) {
                        host.coordinator.leave(session).await?;
                    }
                }
            }
            Ok(None)
        }

        ClientFrame::History {
            room_id,
            page,
            size,
        } => {
            spawn_history_fetch(host, session, room_id, page, size);
            Ok(None)
        }

        ClientFrame::Ping => Ok(Some(ServerFrame::Pong)),
    }
}

/// Serve a history page off the read loop, abandoned if the session closes
fn spawn_history_fetch(
    host: &ServerHost,
    session: &Arc<Session>,
    room_id: Uuid,
    page: usize,
    size: Option<usize>,
) {
    let history = host.history.clone();
    let connections = host.connections.clone();
    let cancel = session.cancel_token().clone();
    let session_id = session.id().to_string();

    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(session_id = %session_id, "History fetch cancelled");
            }
            result = history.fetch_page(room_id, page, size) => {
                let frame = match result {
                    Ok(page) => ServerFrame::History { room_id, page },
                    Err(e) => ServerFrame::from(&e),
                };
                connections.send_to(&session_id, frame).await;
            }
        }
    });
}
