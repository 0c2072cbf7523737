//! Route definitions for the `/rides` resource.
//!
//! All endpoints require authentication.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::rides;
use crate::state::AppState;

/// Routes mounted at `/rides`.
///
/// ```text
/// GET    /                 -> list_rides
/// POST   /                 -> create_ride
/// GET    /{id}             -> get_ride
/// POST   /{id}/accept      -> accept_ride
/// POST   /{id}/refuse      -> refuse_ride
/// POST   /{id}/progress    -> update_progress
/// POST   /{id}/cancel      -> cancel_ride
/// POST   /{id}/assign      -> assign_ride
/// POST   /{id}/rating      -> rate_ride
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(rides::list_rides).post(rides::create_ride))
        .route("/{id}", get(rides::get_ride))
        .route("/{id}/accept", post(rides::accept_ride))
        .route("/{id}/refuse", post(rides::refuse_ride))
        .route("/{id}/progress", post(rides::update_progress))
        .route("/{id}/cancel", post(rides::cancel_ride))
        .route("/{id}/assign", post(rides::assign_ride))
        .route("/{id}/rating", post(rides::rate_ride))
}
