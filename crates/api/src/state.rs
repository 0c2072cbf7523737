use std::sync::Arc;

use crate::config::ServerConfig;
use crate::dispatch::Coordinator;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: ridewire_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection and room manager.
    pub ws_manager: Arc<WsManager>,
    /// Dispatch coordinator (offers, claims, cancellations, progress).
    pub coordinator: Arc<Coordinator>,
    /// Event bus for publishing dispatch events.
    pub event_bus: Arc<ridewire_events::EventBus>,
}
