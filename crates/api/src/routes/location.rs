//! Route definitions for the `/location` resource.

use axum::routing::{post, put};
use axum::Router;

use crate::handlers::location;
use crate::state::AppState;

/// Routes mounted at `/location`.
///
/// ```text
/// POST   /          -> report_location
/// PUT    /status    -> set_availability
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(location::report_location))
        .route("/status", put(location::set_availability))
}
