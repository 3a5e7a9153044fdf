use super::ctx::Ctx;
use crate::config::AppState;
use crate::error::Result;
use crate::models::{AccountId, FriendPresence, StatusUpdate, UserStatus};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: UserStatus,
}

/// POST /presence/connect
pub async fn connect(State(state): State<AppState>, ctx: Ctx) -> Result<Json<StatusResponse>> {
    let status = state.presence.connect(ctx.account()).await?;
    Ok(Json(StatusResponse { status }))
}

/// POST /presence/disconnect
pub async fn disconnect(State(state): State<AppState>, ctx: Ctx) -> Result<StatusCode> {
    state.presence.disconnect(ctx.account()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /presence/heartbeat
pub async fn heartbeat(State(state): State<AppState>, ctx: Ctx) -> Result<Json<StatusResponse>> {
    let status = state.presence.heartbeat(ctx.account()).await?;
    Ok(Json(StatusResponse { status }))
}

/// PUT /presence/status
pub async fn update_status(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(update): Json<StatusUpdate>,
) -> Result<Json<StatusResponse>> {
    let status = state
        .presence
        .change_status(ctx.account(), update.status)
        .await?;
    Ok(Json(StatusResponse { status }))
}

/// GET /presence/friends
pub async fn online_friends(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Json<Vec<FriendPresence>>> {
    Ok(Json(state.presence.online_friends(ctx.account().id).await?))
}

/// GET /presence/{account_id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(account): Path<AccountId>,
) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.presence.status_of(account),
    })
}
