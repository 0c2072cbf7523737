//! Well-known role name constants.
//!
//! These must match the `role` claim issued by the authentication service.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_CLIENT: &str = "client";
pub const ROLE_DRIVER: &str = "driver";
