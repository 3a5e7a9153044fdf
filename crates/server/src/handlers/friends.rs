use super::ctx::Ctx;
use crate::config::AppState;
use crate::error::Result;
use crate::models::{AccountId, FriendRequestView, Group, Page, PageRequest, RelationshipId, UserView};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct FriendRequestBody {
    pub target_id: AccountId,
}

/// GET /friends
pub async fn list_friends(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<UserView>>> {
    Ok(Json(state.friends.get_friends(ctx.account().id, page).await?))
}

/// GET /friends/requests/incoming
pub async fn incoming_requests(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<FriendRequestView>>> {
    Ok(Json(
        state.friends.get_pending_requests(ctx.account().id, page).await?,
    ))
}

/// GET /friends/requests/outgoing
pub async fn outgoing_requests(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<FriendRequestView>>> {
    Ok(Json(
        state.friends.get_outgoing_requests(ctx.account().id, page).await?,
    ))
}

/// GET /friends/blocked
pub async fn blocked_users(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<UserView>>> {
    Ok(Json(state.friends.get_blocked_users(ctx.account().id, page).await?))
}

/// POST /friends/requests
pub async fn send_request(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(body): Json<FriendRequestBody>,
) -> Result<(StatusCode, Json<FriendRequestView>)> {
    info!("POST /friends/requests - {} -> {}", ctx.account().username, body.target_id);
    let request = state
        .friends
        .send_friend_request(ctx.account(), body.target_id)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// POST /friends/requests/{id}/accept
///
/// Responds with the private group opened for the new friends.
pub async fn accept_request(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<RelationshipId>,
) -> Result<Json<Group>> {
    Ok(Json(state.friends.accept_request(id, ctx.account()).await?))
}

/// POST /friends/requests/{id}/reject
pub async fn reject_request(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<RelationshipId>,
) -> Result<StatusCode> {
    state.friends.reject_request(id, ctx.account()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /friends/requests/{id}
pub async fn cancel_request(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<RelationshipId>,
) -> Result<StatusCode> {
    state.friends.cancel_request(id, ctx.account()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /friends/{id}/block
pub async fn block_user(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(target): Path<AccountId>,
) -> Result<StatusCode> {
    state.friends.block_user(ctx.account(), target).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /friends/{id}/block
pub async fn unblock_user(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(target): Path<AccountId>,
) -> Result<StatusCode> {
    state.friends.unblock_user(ctx.account(), target).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /friends/{id}
pub async fn remove_friend(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(friend): Path<AccountId>,
) -> Result<StatusCode> {
    state.friends.remove_friend(ctx.account(), friend).await?;
    Ok(StatusCode::NO_CONTENT)
}
