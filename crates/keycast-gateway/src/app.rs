use axum::{
    routing::{get, post},
    Router,
};
use keycast_core::config::KeycastConfig;
use keycast_registry::Registry;
use std::sync::Arc;

/// Key type for this gateway: `/ws/5` and `/broadcast/5` share group `5`.
pub type GatewayKey = i64;

/// Central shared state: passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: KeycastConfig,
    pub registry: Registry<GatewayKey>,
}

impl AppState {
    pub fn new(config: KeycastConfig) -> Self {
        let registry = Registry::with_config(config.connections.clone());
        Self { config, registry }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws/{key}", get(crate::ws::connection::ws_handler))
        .route(
            "/broadcast/{key}",
            post(crate::http::broadcast::broadcast_handler),
        )
        .route("/post/{key}", get(crate::http::broadcast::post_demo_handler))
        .route(
            "/groups/{key}/members",
            get(crate::http::members::members_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
