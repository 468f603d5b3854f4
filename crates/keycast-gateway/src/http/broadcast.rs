//! Broadcast endpoints.
//!
//! `POST /broadcast/{key}` sends the request body (UTF-8 text) to every
//! connection under `key`. `GET /post/{key}` sends a timestamped demo message.
//! Both answer 204 once fan-out is done; the response never says how many
//! connections were reached.

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use crate::app::{AppState, GatewayKey};

/// POST /broadcast/{key}
pub async fn broadcast_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<GatewayKey>,
    body: String,
) -> StatusCode {
    state.registry.broadcast(&key, &body).await;
    StatusCode::NO_CONTENT
}

/// GET /post/{key}
pub async fn post_demo_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<GatewayKey>,
) -> StatusCode {
    state.registry.broadcast(&key, &demo_message(key)).await;
    StatusCode::NO_CONTENT
}

fn demo_message(key: GatewayKey) -> String {
    format!(
        "This is the message: coming from id {} at time {}",
        key,
        chrono::Utc::now().to_rfc3339()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_message_names_the_key() {
        let msg = demo_message(5);
        assert!(msg.starts_with("This is the message: coming from id 5 at time "));
    }
}
