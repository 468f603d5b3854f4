use std::future::ready;
use std::sync::Arc;

use axum::{
    extract::{ws::WebSocket, Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::app::{AppState, GatewayKey};
use crate::ws::transport::WsDuplex;

/// Axum handler: upgrades HTTP to WebSocket at GET /ws/{key}.
///
/// A failed upgrade is logged here and never reaches the registry.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(key): Path<GatewayKey>,
    State(state): State<Arc<AppState>>,
) -> Response {
    if state.registry.is_shutting_down() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    ws.max_message_size(state.config.connections.max_message_bytes)
        .on_failed_upgrade(move |e| warn!(key, error = %e, "WS upgrade failed"))
        .on_upgrade(move |socket| run_connection(socket, key, state))
}

/// Per-connection task: lives for the entire WS session.
async fn run_connection(socket: WebSocket, key: GatewayKey, state: Arc<AppState>) {
    let upgraded = ready(Ok(WsDuplex(socket)));
    if let Err(e) = state.registry.register(key, upgraded).await {
        warn!(key, error = %e, "WS connection refused");
    }
}
