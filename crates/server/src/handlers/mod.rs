//! HTTP transport
//!
//! Thin axum layer over the engines: every route except `/health` runs
//! behind [`ctx::mw_require_account`] and hands the resolved account to
//! the core.

pub mod ctx;
pub mod events;
pub mod friends;
pub mod groups;
pub mod presence;
pub mod users;

pub use crate::config::AppState;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        // Friends
        .route("/friends", get(friends::list_friends))
        .route("/friends/requests", post(friends::send_request))
        .route("/friends/requests/incoming", get(friends::incoming_requests))
        .route("/friends/requests/outgoing", get(friends::outgoing_requests))
        .route("/friends/requests/{id}", delete(friends::cancel_request))
        .route("/friends/requests/{id}/accept", post(friends::accept_request))
        .route("/friends/requests/{id}/reject", post(friends::reject_request))
        .route("/friends/blocked", get(friends::blocked_users))
        .route(
            "/friends/{id}/block",
            post(friends::block_user).delete(friends::unblock_user),
        )
        .route("/friends/{id}", delete(friends::remove_friend))
        // Live events
        .route("/events", get(events::subscribe))
        // Users
        .route("/users/search", get(users::search_users))
        // Presence
        .route("/presence/connect", post(presence::connect))
        .route("/presence/disconnect", post(presence::disconnect))
        .route("/presence/heartbeat", post(presence::heartbeat))
        .route("/presence/status", put(presence::update_status))
        .route("/presence/friends", get(presence::online_friends))
        .route("/presence/{account_id}", get(presence::get_status))
        // Groups
        .route("/groups", get(groups::list_groups).post(groups::create_group))
        .route("/groups/{id}", get(groups::get_group).patch(groups::update_group))
        .route(
            "/groups/{id}/messages",
            get(groups::get_messages).post(groups::send_message),
        )
        .route("/groups/{id}/read", post(groups::mark_read))
        .route("/groups/{id}/unread", get(groups::unread_count))
        .route("/groups/{id}/typing", post(groups::typing))
        .route("/groups/{id}/image", put(groups::put_image))
        .route(
            "/groups/{id}/members",
            post(groups::add_members).delete(groups::remove_members),
        )
        .route(
            "/groups/{id}/admins/{account_id}",
            post(groups::add_admin).delete(groups::remove_admin),
        )
        .route("/groups/{id}/mute", post(groups::mute).delete(groups::unmute))
        .route("/groups/{id}/theme", get(groups::get_theme).put(groups::put_theme))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            ctx::mw_require_account,
        ));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .merge(api)
        .with_state(state)
}
