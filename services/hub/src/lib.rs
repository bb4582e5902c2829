pub mod auth;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod playback;
pub mod registry;
pub mod state;
pub mod store;
pub mod ws;

pub use state::AppState;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws::upgrade))
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .fallback(fallback_404)
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "not found" })),
    )
}

mod health {
    use axum::extract::State;
    use axum::response::IntoResponse;

    use crate::state::AppState;

    pub async fn healthz() -> impl IntoResponse {
        "ok"
    }

    /// Unlike `healthz`, this actually reaches the store and bus, so a load
    /// balancer can take an instance with a dead Redis connection out of
    /// rotation instead of routing WebSocket upgrades to it.
    pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
        match (state.store.ping().await, state.bus.ping().await) {
            (Ok(()), Ok(())) => (axum::http::StatusCode::OK, "ok").into_response(),
            (store_result, bus_result) => {
                tracing::warn!(?store_result, ?bus_result, "readyz check failed");
                axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response()
            }
        }
    }
}
