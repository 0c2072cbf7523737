//! WebSocket endpoints for the driver and client channels.
//!
//! Each connection authenticates once at handshake via a `token` query
//! parameter. A role mismatch (e.g. a client-role principal opening the
//! driver channel) rejects the upgrade with a typed error before any room
//! join is possible. A disconnect never cancels in-flight rides -- all
//! dispatch state lives in the coordinator and the durable store, not in
//! the connection.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use ridewire_core::error::CoreError;
use ridewire_core::geo::GeoPoint;
use ridewire_core::roles::{ROLE_ADMIN, ROLE_CLIENT, ROLE_DRIVER};
use ridewire_core::types::DbId;
use ridewire_db::models::presence::LocationReport;
use ridewire_db::repositories::{PresenceRepo, RideRepo};

use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::ws::manager::{driver_room, ride_room};
use crate::ws::protocol::{ClientMessage, DriverMessage, ServerEvent};

/// Routes for the realtime channels, mounted at the server root.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws/driver", get(driver_ws_handler))
        .route("/ws/client", get(client_ws_handler))
}

/// Handshake query: the bearer credential.
#[derive(Debug, Deserialize)]
struct WsAuthQuery {
    token: String,
}

/// Validate the handshake token and check the role fits the namespace.
fn authenticate(
    state: &AppState,
    token: &str,
    allowed_roles: &[&str],
) -> Result<(DbId, String), AppError> {
    let claims = crate::auth::jwt::validate_token(token, &state.config.jwt)
        .map_err(|_| AppError::Core(CoreError::Unauthorized("Invalid or expired token".into())))?;

    if !allowed_roles.contains(&claims.role.as_str()) {
        return Err(AppError::Core(CoreError::Forbidden(format!(
            "Role '{}' may not open this channel",
            claims.role
        ))));
    }
    Ok((claims.sub, claims.role))
}

// ---------------------------------------------------------------------------
// Driver channel
// ---------------------------------------------------------------------------

/// GET /ws/driver -- upgrade a driver connection.
async fn driver_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let (driver_id, _) = authenticate(&state, &query.token, &[ROLE_DRIVER])?;
    Ok(ws.on_upgrade(move |socket| handle_driver_socket(socket, state, driver_id)))
}

async fn handle_driver_socket(socket: WebSocket, state: AppState, driver_id: DbId) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, driver_id, "Driver connected");

    let mut rx = state.ws_manager.add(conn_id.clone(), driver_id, ROLE_DRIVER).await;

    // A driver session only ever occupies its own room; it is joined here
    // and must be re-established on reconnect.
    state
        .ws_manager
        .join_room(&conn_id, &driver_room(driver_id))
        .await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    let connected = ServerEvent::Connected {
        principal_id: driver_id,
        role: ROLE_DRIVER.to_string(),
        timestamp: Utc::now(),
    };
    state
        .ws_manager
        .send_to_conn(&conn_id, connected.to_message())
        .await;

    // Receiver loop: process inbound messages.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => {
                let reply = match serde_json::from_str::<DriverMessage>(&text) {
                    Ok(msg) => handle_driver_message(&state, driver_id, msg).await,
                    Err(e) => Some(ServerEvent::from_error(&CoreError::Validation(format!(
                        "Malformed message: {e}"
                    )))),
                };
                if let Some(event) = reply {
                    state
                        .ws_manager
                        .send_to_conn(&conn_id, event.to_message())
                        .await;
                }
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, driver_id, "Driver disconnected");
}

/// Dispatch one inbound driver message. Returns the direct reply to this
/// connection, if any; room notifications happen inside the coordinator.
async fn handle_driver_message(
    state: &AppState,
    driver_id: DbId,
    msg: DriverMessage,
) -> Option<ServerEvent> {
    match msg {
        DriverMessage::Ping => Some(ServerEvent::Pong {
            timestamp: Utc::now(),
        }),

        DriverMessage::Accept { ride_id } => {
            match state.coordinator.claim_ride(ride_id, driver_id).await {
                // The winner gets ride:status:changed through its driver
                // room; nothing extra to say here.
                Ok(_) => None,
                Err(err) => Some(ServerEvent::from_error(&err)),
            }
        }

        DriverMessage::Refuse { ride_id } => {
            match state.coordinator.refuse_ride(ride_id, driver_id).await {
                Ok(()) => None,
                Err(err) => Some(ServerEvent::from_error(&err)),
            }
        }

        DriverMessage::UpdateStatus {
            ride_id,
            status,
            location,
            final_price,
        } => {
            match state
                .coordinator
                .update_progress(ride_id, driver_id, status, location, final_price)
                .await
            {
                Ok(_) => None,
                Err(err) => Some(ServerEvent::from_error(&err)),
            }
        }

        DriverMessage::ReportLocation {
            latitude,
            longitude,
            heading,
            speed_kmh,
        } => {
            let position = GeoPoint::new(latitude, longitude);
            if let Err(err) = position.validate() {
                return Some(ServerEvent::from_error(&err));
            }
            let report = LocationReport {
                position,
                heading,
                speed_kmh,
            };
            match PresenceRepo::report(&state.pool, driver_id, &report).await {
                Ok(_) => None,
                Err(e) => {
                    tracing::error!(driver_id, error = %e, "Location report failed");
                    Some(ServerEvent::from_error(&CoreError::Internal(
                        "Could not store location".into(),
                    )))
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Client channel
// ---------------------------------------------------------------------------

/// GET /ws/client -- upgrade a client (or admin) connection.
async fn client_ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsAuthQuery>,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let (client_id, role) = authenticate(&state, &query.token, &[ROLE_CLIENT, ROLE_ADMIN])?;
    Ok(ws.on_upgrade(move |socket| handle_client_socket(socket, state, client_id, role)))
}

async fn handle_client_socket(socket: WebSocket, state: AppState, client_id: DbId, role: String) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, client_id, "Client connected");

    let mut rx = state.ws_manager.add(conn_id.clone(), client_id, &role).await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    let connected = ServerEvent::Connected {
        principal_id: client_id,
        role: role.clone(),
        timestamp: Utc::now(),
    };
    state
        .ws_manager
        .send_to_conn(&conn_id, connected.to_message())
        .await;

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Text(text)) => {
                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => {
                        handle_client_message(&state, &conn_id, client_id, &role, msg).await
                    }
                    Err(e) => Some(ServerEvent::from_error(&CoreError::Validation(format!(
                        "Malformed message: {e}"
                    )))),
                };
                if let Some(event) = reply {
                    state
                        .ws_manager
                        .send_to_conn(&conn_id, event.to_message())
                        .await;
                }
            }
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    state.ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, client_id, "Client disconnected");
}

/// Dispatch one inbound client message.
async fn handle_client_message(
    state: &AppState,
    conn_id: &str,
    client_id: DbId,
    role: &str,
    msg: ClientMessage,
) -> Option<ServerEvent> {
    match msg {
        ClientMessage::Ping => Some(ServerEvent::Pong {
            timestamp: Utc::now(),
        }),

        ClientMessage::JoinRide { ride_id } => {
            match authorize_ride_room(state, client_id, role, ride_id).await {
                Ok(()) => {
                    state.ws_manager.join_room(conn_id, &ride_room(ride_id)).await;
                    tracing::info!(client_id, ride_id, "Client joined ride room");
                    Some(ServerEvent::RideJoined {
                        ride_id,
                        timestamp: Utc::now(),
                    })
                }
                Err(err) => Some(ServerEvent::from_error(&err)),
            }
        }

        ClientMessage::LeaveRide { ride_id } => {
            state.ws_manager.leave_room(conn_id, &ride_room(ride_id)).await;
            None
        }
    }
}

/// A client may only watch rides it owns; admins may watch any ride.
async fn authorize_ride_room(
    state: &AppState,
    client_id: DbId,
    role: &str,
    ride_id: DbId,
) -> Result<(), CoreError> {
    let ride = RideRepo::find_by_id(&state.pool, ride_id)
        .await
        .map_err(|e| {
            tracing::error!(ride_id, error = %e, "Ride lookup failed");
            CoreError::Internal("Could not load ride".into())
        })?
        .ok_or(CoreError::NotFound {
            entity: "Ride",
            id: ride_id,
        })?;

    if ride.client_id != client_id && role != ROLE_ADMIN {
        return Err(CoreError::Forbidden("Not your ride".into()));
    }
    Ok(())
}
