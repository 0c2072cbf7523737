use crate::types::DbId;

/// Domain error taxonomy shared across the workspace.
///
/// State-machine and claim violations (`Conflict`, `Geofence`,
/// `StaleState`) are expected outcomes under concurrency and are returned
/// to callers as typed results; only `Internal` represents a fault worth
/// logging at error level.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Proximity check failed. Carries the measured distance so client
    /// UIs can show how far away the driver actually is.
    #[error("Driver is {distance_m:.0} m from the pickup point (max allowed: {max_allowed_m:.0} m)")]
    Geofence { distance_m: f64, max_allowed_m: f64 },

    /// An offer round expired or a presence record went stale.
    #[error("Stale state: {0}")]
    StaleState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
