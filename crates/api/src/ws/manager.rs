use std::collections::{HashMap, HashSet};

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

use ridewire_core::types::{DbId, Timestamp};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Room addressing a single driver's devices.
pub fn driver_room(driver_id: DbId) -> String {
    format!("driver:{driver_id}")
}

/// Room addressing the client(s) watching one ride.
pub fn ride_room(ride_id: DbId) -> String {
    format!("ride:{ride_id}")
}

/// A single realtime session.
///
/// Room membership is per-connection local state; it is never persisted
/// and is rebuilt by the client after a reconnect.
pub struct WsConnection {
    /// Authenticated principal id (set at handshake, never changes).
    pub principal_id: DbId,
    /// Role the connection authenticated under (`driver` or `client`;
    /// admins connect on the client channel).
    pub role: String,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// Rooms this connection has joined.
    pub rooms: HashSet<String>,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// Manages all active WebSocket connections and their room memberships.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. Sends are at-most-once per recipient:
/// a connection in a room receives each room publication exactly once,
/// and closed channels are silently skipped (the connection is removed by
/// its own receive loop).
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new authenticated connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(
        &self,
        conn_id: String,
        principal_id: DbId,
        role: &str,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            principal_id,
            role: role.to_string(),
            sender: tx,
            rooms: HashSet::new(),
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID, dropping all its room memberships.
    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Join a room. Authorization happens in the socket handler before
    /// this is called. Returns `false` for unknown connections.
    pub async fn join_room(&self, conn_id: &str, room: &str) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get_mut(conn_id) {
            Some(conn) => {
                conn.rooms.insert(room.to_string());
                true
            }
            None => false,
        }
    }

    /// Leave a room. A no-op for rooms the connection never joined.
    pub async fn leave_room(&self, conn_id: &str, room: &str) -> bool {
        let mut conns = self.connections.write().await;
        match conns.get_mut(conn_id) {
            Some(conn) => conn.rooms.remove(room),
            None => false,
        }
    }

    /// Publish a message to every connection in a room.
    ///
    /// Returns the number of connections the message was sent to.
    pub async fn send_to_room(&self, room: &str, message: Message) -> usize {
        let conns = self.connections.read().await;
        let mut count = 0;
        for conn in conns.values() {
            if conn.rooms.contains(room) {
                let _ = conn.sender.send(message.clone());
                count += 1;
            }
        }
        count
    }

    /// Number of connections currently in a room.
    ///
    /// The broadcaster uses this to skip rides nobody is watching.
    pub async fn room_size(&self, room: &str) -> usize {
        self.connections
            .read()
            .await
            .values()
            .filter(|conn| conn.rooms.contains(room))
            .count()
    }

    /// Send a message to a single connection.
    pub async fn send_to_conn(&self, conn_id: &str, message: Message) -> bool {
        let conns = self.connections.read().await;
        match conns.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
