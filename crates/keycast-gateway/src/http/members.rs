use axum::{
    extract::{Path, State},
    Json,
};
use keycast_registry::MemberInfo;
use serde::Serialize;
use std::sync::Arc;

use crate::app::{AppState, GatewayKey};

#[derive(Serialize)]
pub struct MembersResponse {
    pub key: GatewayKey,
    pub count: usize,
    pub members: Vec<MemberInfo>,
}

/// GET /groups/{key}/members: current connections under a key, in join order.
pub async fn members_handler(
    State(state): State<Arc<AppState>>,
    Path(key): Path<GatewayKey>,
) -> Json<MembersResponse> {
    let members = state.registry.members(&key);
    Json(MembersResponse {
        key,
        count: members.len(),
        members,
    })
}
