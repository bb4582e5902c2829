use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::info;

use crate::connection;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    token: String,
    #[serde(default)]
    device_id: String,
    #[serde(default)]
    device_name: String,
}

pub async fn upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<ConnectQuery>,
) -> Response {
    let Some(user_id) = state.verifier.verify(&query.token).await else {
        return (
            axum::http::StatusCode::UNAUTHORIZED,
            axum::Json(serde_json::json!({ "error": "invalid or expired token" })),
        )
            .into_response();
    };

    let device_id = if query.device_id.is_empty() {
        connection::random_id()
    } else {
        query.device_id
    };
    let device_name = if query.device_name.is_empty() {
        "Web Player".to_owned()
    } else {
        query.device_name
    };

    let registry = state.registry.clone();
    let store = Arc::clone(&state.store);
    let bus = Arc::clone(&state.bus);

    ws.on_upgrade(move |socket| async move {
        info!(%user_id, %device_id, "connection established");
        connection::run(socket, user_id, device_id, device_name, registry, store, bus).await;
    })
}
