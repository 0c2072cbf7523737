//! Realtime transport layer.
//!
//! Two role-scoped WebSocket endpoints (`/ws/driver`, `/ws/client`)
//! authenticated at handshake, with room-based multicast on top:
//! `driver:<id>` rooms deliver offers and withdrawals, `ride:<id>` rooms
//! deliver status changes and location updates to the watching client.

pub mod handler;
pub mod heartbeat;
pub mod manager;
pub mod protocol;

pub use handler::router;
pub use heartbeat::start_heartbeat;
pub use manager::{driver_room, ride_room, WsManager};
