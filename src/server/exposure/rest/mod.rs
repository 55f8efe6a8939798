//! REST API exposure for room chat
//!
//! This module provides the HTTP side of the service: health checks, room
//! history (paged and full) and the room-closing hook used by the event
//! lifecycle. It consumes a `ServerHost` and produces an Axum `Router`.
//!
//! | Method | Path | Response |
//! |---|---|---|
//! | GET | `/health`, `/healthz` | status, service, version, connections |
//! | GET | `/chat/room/{room_id}/history/pageable?page&size` | [`PageResponse`] |
//! | GET | `/chat/room/{room_id}/history` | all messages, newest first |
//! | POST | `/chat/room/{room_id}/close` | `{room_id, closed}` |

use super::super::host::ServerHost;
use crate::core::error::{ChatError, ChatResult};
use crate::core::message::StoredMessage;
use crate::core::page::{HistoryParams, PageResponse};
use anyhow::Result;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

/// REST API exposure implementation
pub struct RestExposure;

impl RestExposure {
    /// Build the REST router from a host
    ///
    /// # Arguments
    ///
    /// * `host` - The server host containing all chat state
    /// * `custom_routes` - Additional custom routes to merge
    pub fn build_router(host: Arc<ServerHost>, custom_routes: Vec<Router>) -> Result<Router> {
        let mut app = Self::health_routes(host.clone()).merge(Self::room_routes(host));

        for custom_router in custom_routes {
            app = app.merge(custom_router);
        }

        Ok(app)
    }

    /// Build health check routes
    fn health_routes(host: Arc<ServerHost>) -> Router {
        Router::new()
            .route("/health", get(health_check))
            .route("/healthz", get(health_check))
            .with_state(host)
    }

    /// Build room history and lifecycle routes
    fn room_routes(host: Arc<ServerHost>) -> Router {
        Router::new()
            .route("/chat/room/{room_id}/history/pageable", get(history_page))
            .route("/chat/room/{room_id}/history", get(full_history))
            .route("/chat/room/{room_id}/close", post(close_room))
            .with_state(host)
    }
}

/// Health check endpoint handler
async fn health_check(State(host): State<Arc<ServerHost>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "jummah-chat",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": host.connections.connection_count().await,
    }))
}

fn room_id(path: Result<Path<Uuid>, PathRejection>) -> ChatResult<Uuid> {
    path.map(|Path(id)| id)
        .map_err(|e| ChatError::invalid(format!("invalid room id: {}", e.body_text())))
}

async fn history_page(
    State(host): State<Arc<ServerHost>>,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<HistoryParams>, QueryRejection>,
) -> ChatResult<Json<PageResponse>> {
    let room_id = room_id(path)?;
    let Query(params) =
        query.map_err(|e| ChatError::invalid(format!("invalid paging: {}", e.body_text())))?;

    let page = host
        .history
        .fetch_page(room_id, params.page, Some(params.size))
        .await?;
    Ok(Json(PageResponse::from(page)))
}

async fn full_history(
    State(host): State<Arc<ServerHost>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ChatResult<Json<Vec<StoredMessage>>> {
    let room_id = room_id(path)?;
    Ok(Json(host.history.full_history(room_id).await?))
}

async fn close_room(
    State(host): State<Arc<ServerHost>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ChatResult<Json<Value>> {
    let room_id = room_id(path)?;
    let closed = host.coordinator.close_room(room_id).await?;
    Ok(Json(json!({
        "room_id": room_id,
        "closed": closed,
    })))
}
