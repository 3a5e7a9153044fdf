use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chat_server::clock::{Clock, ManualClock};
use chat_server::config::{AppState, ChatServerConfig};
use chat_server::dispatch::BroadcastDispatcher;
use chat_server::handlers::{ctx::ACCOUNT_HEADER, router};
use chat_server::images::DiskImageStore;
use chat_server::models::{Account, NewAccount};
use chat_server::store::connect_memory;
use futures::StreamExt;
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

async fn app() -> (Router, AppState, TempDir) {
    let images = tempdir().unwrap();
    let dispatcher = BroadcastDispatcher::new(64);
    let state = AppState::assemble(
        ChatServerConfig::default(),
        connect_memory().await.unwrap(),
        Arc::new(ManualClock::starting_now()),
        Arc::new(dispatcher.clone()),
        Arc::new(DiskImageStore::new(images.path())),
    )
    .with_event_stream(dispatcher);
    (router(state.clone()), state, images)
}

async fn register(state: &AppState, username: &str) -> Account {
    state
        .accounts
        .create(
            NewAccount {
                username: username.into(),
                name: username.to_uppercase(),
                surname: "Test".into(),
                email: format!("{}@example.com", username),
                password_hash: "x".into(),
                provider_id: None,
            },
            ManualClock::starting_now().now(),
        )
        .await
        .unwrap()
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    actor: Option<&Account>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(actor) = actor {
        builder = builder.header(ACCOUNT_HEADER, actor.id.to_string());
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn test_health_needs_no_account() {
    let (app, _state, _dir) = app().await;
    let (status, _) = call(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_missing_or_unknown_account_is_unauthorized() {
    let (app, _state, _dir) = app().await;

    let (status, body) = call(&app, Method::GET, "/friends", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    let request = Request::builder()
        .uri("/groups")
        .header(ACCOUNT_HEADER, "00000000-0000-0000-0000-000000000000")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_friend_request_over_http() {
    let (app, state, _dir) = app().await;
    let alice = register(&state, "alice").await;
    let bob = register(&state, "bob").await;

    let (status, request) = call(
        &app,
        Method::POST,
        "/friends/requests",
        Some(&alice),
        Some(json!({ "target_id": bob.id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(request["status"], "PENDING");

    let (status, body) = call(
        &app,
        Method::POST,
        "/friends/requests",
        Some(&alice),
        Some(json!({ "target_id": alice.id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "SELF_REFERENCE");

    let id = request["id"].as_str().unwrap().to_string();
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/friends/requests/{}/accept", id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, group) = call(
        &app,
        Method::POST,
        &format!("/friends/requests/{}/accept", id),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(group["group_type"], "PRIVATE");

    let (status, friends) = call(&app, Method::GET, "/friends", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(friends["total"], 1);
    assert_eq!(friends["items"][0]["username"], "bob");
}

#[tokio::test]
async fn test_group_messages_over_http() {
    let (app, state, _dir) = app().await;
    let alice = register(&state, "alice").await;
    let bob = register(&state, "bob").await;
    let eve = register(&state, "eve").await;

    let (status, group) = call(
        &app,
        Method::POST,
        "/groups",
        Some(&alice),
        Some(json!({ "name": "Climbing", "member_ids": [bob.id] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let id = group["id"].as_str().unwrap().to_string();

    let (status, message) = call(
        &app,
        Method::POST,
        &format!("/groups/{}/messages", id),
        Some(&bob),
        Some(json!({ "content": "saturday?" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(message["content"], "saturday?");
    assert_eq!(message["sender"]["username"], "bob");

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/groups/{}/messages", id),
        Some(&eve),
        Some(json!({ "content": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/groups/{}/messages", id),
        Some(&eve),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, history) = call(
        &app,
        Method::GET,
        &format!("/groups/{}/messages?page=0&size=10", id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["items"][0]["content"], "saturday?");

    let (status, theme) = call(
        &app,
        Method::GET,
        &format!("/groups/{}/theme", id),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(theme["color_theme"], "#3B82F6");

    let (status, _) = call(
        &app,
        Method::PATCH,
        &format!("/groups/{}", id),
        Some(&bob),
        Some(json!({ "name": "Bouldering" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, renamed) = call(
        &app,
        Method::PATCH,
        &format!("/groups/{}", id),
        Some(&alice),
        Some(json!({ "name": "Bouldering" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["name"], "Bouldering");
}

#[tokio::test]
async fn test_presence_over_http() {
    let (app, state, _dir) = app().await;
    let alice = register(&state, "alice").await;

    let (status, body) = call(&app, Method::POST, "/presence/connect", Some(&alice), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ONLINE");

    let (status, body) = call(
        &app,
        Method::PUT,
        "/presence/status",
        Some(&alice),
        Some(json!({ "status": "AWAY" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "AWAY");

    let (_, body) = call(
        &app,
        Method::GET,
        &format!("/presence/{}", alice.id),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(body["status"], "AWAY");
}

#[tokio::test]
async fn test_event_feed_delivers_own_events_only() {
    let (app, state, _dir) = app().await;
    let alice = register(&state, "alice").await;
    let bob = register(&state, "bob").await;
    let carol = register(&state, "carol").await;

    let request = Request::builder()
        .uri("/events")
        .header(ACCOUNT_HEADER, bob.id.to_string())
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let mut feed = response.into_body().into_data_stream();

    // Only carol hears about this one.
    call(
        &app,
        Method::POST,
        "/groups",
        Some(&alice),
        Some(json!({ "name": "Carol only", "member_ids": [carol.id] })),
    )
    .await;
    call(
        &app,
        Method::POST,
        "/groups",
        Some(&alice),
        Some(json!({ "name": "Chess", "member_ids": [bob.id] })),
    )
    .await;

    let chunk = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let frame = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(frame.contains("event: groups"));
    assert!(frame.contains("GROUP_ADDED"));
    assert!(frame.contains("Chess"));
    assert!(!frame.contains("Carol only"));
}
