use super::ctx::Ctx;
use crate::config::AppState;
use crate::error::Result;
use crate::models::{Page, PageRequest, UserView};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// GET /users/search?q=
pub async fn search_users(
    State(state): State<AppState>,
    ctx: Ctx,
    Query(search): Query<SearchQuery>,
    Query(page): Query<PageRequest>,
) -> Result<Json<Page<UserView>>> {
    Ok(Json(
        state
            .friends
            .search_users(ctx.account().id, &search.q, page)
            .await?,
    ))
}
