//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Conditional updates return
//! `Option<_>`: `None` means the precondition did not hold (lost race,
//! illegal transition, guard failure) and the row was left untouched.

pub mod presence_repo;
pub mod ride_repo;

pub use presence_repo::PresenceRepo;
pub use ride_repo::RideRepo;
