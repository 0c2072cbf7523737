//! Liveness endpoint.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

/// Routes mounted at the server root.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// GET /health
///
/// Reports process liveness and database reachability.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = match ridewire_db::health_check(&state.pool).await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            "unreachable"
        }
    };

    Json(json!({
        "status": "ok",
        "database": database,
    }))
}
