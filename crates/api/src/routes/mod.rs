pub mod health;
pub mod location;
pub mod rides;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /rides                     create (POST), list (GET)
/// /rides/{id}                get
/// /rides/{id}/accept         driver claim (POST)
/// /rides/{id}/refuse         driver withdrawal (POST)
/// /rides/{id}/progress       driver transition, geofenced (POST)
/// /rides/{id}/cancel         either party or admin (POST)
/// /rides/{id}/assign         admin manual assignment (POST)
/// /rides/{id}/rating         client post-completion rating (POST)
///
/// /location                  driver position report (POST)
/// /location/status           driver availability toggle (PUT)
/// ```
///
/// The WebSocket channels (`/ws/driver`, `/ws/client`) and `/health` are
/// mounted at the server root, not under `/api/v1`.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/rides", rides::router())
        .nest("/location", location::router())
}
