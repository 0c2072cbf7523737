//! Domain layer for the ridewire dispatch platform.
//!
//! This crate has zero internal dependencies so it can be used by the
//! repository layer, the API server, and any future worker or CLI tooling.
//! It contains:
//!
//! - [`types`] -- shared scalar aliases (database ids, timestamps).
//! - [`error`] -- the domain error taxonomy.
//! - [`geo`] -- pure geofencing math (haversine distance, radius checks).
//! - [`ride`] -- ride statuses and the lifecycle state machine.
//! - [`presence`] -- driver operational statuses and freshness rules.
//! - [`roles`] -- well-known principal role names.

pub mod error;
pub mod geo;
pub mod presence;
pub mod ride;
pub mod roles;
pub mod types;

pub use error::CoreError;
pub use geo::GeoPoint;
pub use presence::DriverStatus;
pub use ride::RideStatus;
