//! Ridewire event bus and notification delivery seams.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`RideEvent`] -- the canonical dispatch event envelope.
//! - [`delivery`] -- the push-notification sender trait used to reach
//!   parties without a live realtime connection.

pub mod bus;
pub mod delivery;

pub use bus::{EventBus, RideEvent};
pub use delivery::{LogPushSender, PushNotification, PushSender};
