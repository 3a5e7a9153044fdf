use super::ctx::Ctx;
use crate::config::AppState;
use crate::error::Result;
use crate::models::{
    AccountId, CreateGroupRequest, GroupId, GroupView, MemberView, MessageView, Page, PageRequest,
    SendMessageRequest, UpdateGroupRequest,
};
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct MemberIds {
    pub account_ids: Vec<AccountId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ThemeBody {
    pub color_theme: String,
}

#[derive(Debug, Serialize)]
pub struct ReadResponse {
    /// False when the cursor was already past the last message
    pub advanced: bool,
}

#[derive(Debug, Serialize)]
pub struct UnreadResponse {
    pub unread_count: i64,
}

/// GET /groups
pub async fn list_groups(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<GroupView>>> {
    Ok(Json(state.groups.list_groups(ctx.account(), page).await?))
}

/// POST /groups
pub async fn create_group(
    State(state): State<AppState>,
    ctx: Ctx,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupView>)> {
    info!("POST /groups - {} creates {:?}", ctx.account().username, request.name);
    let group = state.groups.create_group(ctx.account(), request, None).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

/// GET /groups/{id}
pub async fn get_group(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
) -> Result<Json<GroupView>> {
    Ok(Json(state.groups.get_group_info(id, ctx.account()).await?))
}

/// PATCH /groups/{id}
pub async fn update_group(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
    Json(request): Json<UpdateGroupRequest>,
) -> Result<Json<GroupView>> {
    Ok(Json(
        state.groups.update_group(id, ctx.account(), request, None).await?,
    ))
}

/// PUT /groups/{id}/image
///
/// The body is the raw image.
pub async fn put_image(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
    body: Bytes,
) -> Result<Json<GroupView>> {
    info!("PUT /groups/{}/image - {} bytes", id, body.len());
    Ok(Json(
        state
            .groups
            .update_group(id, ctx.account(), UpdateGroupRequest::default(), Some(body))
            .await?,
    ))
}

/// GET /groups/{id}/messages
pub async fn get_messages(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<MessageView>>> {
    Ok(Json(
        state.groups.load_group_history(id, ctx.account(), page).await?,
    ))
}

/// POST /groups/{id}/messages
pub async fn send_message(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
    Json(request): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>)> {
    let message = state.groups.send_message(id, ctx.account(), request).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// POST /groups/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
) -> Result<Json<ReadResponse>> {
    let advanced = state.groups.mark_as_read(id, ctx.account()).await?;
    Ok(Json(ReadResponse { advanced }))
}

/// GET /groups/{id}/unread
pub async fn unread_count(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
) -> Result<Json<UnreadResponse>> {
    let unread_count = state.groups.unread_count(id, ctx.account()).await?;
    Ok(Json(UnreadResponse { unread_count }))
}

/// POST /groups/{id}/typing
pub async fn typing(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
) -> Result<StatusCode> {
    state.groups.send_typing(id, ctx.account()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /groups/{id}/members
pub async fn add_members(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
    Json(body): Json<MemberIds>,
) -> Result<Json<Vec<MemberView>>> {
    Ok(Json(
        state
            .groups
            .add_members(id, ctx.account(), &body.account_ids)
            .await?,
    ))
}

/// DELETE /groups/{id}/members
pub async fn remove_members(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
    Json(body): Json<MemberIds>,
) -> Result<StatusCode> {
    state
        .groups
        .remove_members(id, ctx.account(), &body.account_ids)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /groups/{id}/admins/{account_id}
pub async fn add_admin(
    State(state): State<AppState>,
    ctx: Ctx,
    Path((id, account)): Path<(GroupId, AccountId)>,
) -> Result<StatusCode> {
    state.groups.add_admin(id, ctx.account(), account).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /groups/{id}/admins/{account_id}
pub async fn remove_admin(
    State(state): State<AppState>,
    ctx: Ctx,
    Path((id, account)): Path<(GroupId, AccountId)>,
) -> Result<StatusCode> {
    state.groups.remove_admin(id, ctx.account(), account).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /groups/{id}/mute
pub async fn mute(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
) -> Result<StatusCode> {
    state.groups.mute_group(id, ctx.account()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /groups/{id}/mute
pub async fn unmute(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
) -> Result<StatusCode> {
    state.groups.unmute_group(id, ctx.account()).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /groups/{id}/theme
pub async fn get_theme(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
) -> Result<Json<ThemeBody>> {
    let color_theme = state.groups.get_color_theme(id, ctx.account()).await?;
    Ok(Json(ThemeBody { color_theme }))
}

/// PUT /groups/{id}/theme
pub async fn put_theme(
    State(state): State<AppState>,
    ctx: Ctx,
    Path(id): Path<GroupId>,
    Json(body): Json<ThemeBody>,
) -> Result<StatusCode> {
    state
        .groups
        .set_color_theme(id, ctx.account(), &body.color_theme)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
