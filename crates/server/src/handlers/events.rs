//! Live event feed
//!
//! Forwards the dispatcher's envelopes meant for the acting account as
//! server-sent events: everything on its own channels, plus topic events of
//! groups it currently belongs to.

use super::ctx::Ctx;
use crate::config::AppState;
use crate::dispatch::{topic_group, Channel, Destination, Envelope};
use crate::error::{Error, Result};
use crate::models::Account;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// GET /events
pub async fn subscribe(
    State(state): State<AppState>,
    ctx: Ctx,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let events = state
        .events
        .as_ref()
        .ok_or_else(|| Error::not_found("event stream"))?;
    // Subscribe before returning so nothing sent after this call is missed.
    let mut rx = events.subscribe();
    let account = ctx.account().clone();
    info!("[Events] {} subscribed", account.username);

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    if !is_for(&state, &account, &envelope).await {
                        continue;
                    }
                    match Event::default()
                        .event(event_name(&envelope.destination))
                        .json_data(&envelope.event)
                    {
                        Ok(event) => yield Ok::<_, Infallible>(event),
                        Err(e) => warn!("[Events] Could not encode event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("[Events] {} lagged, {} event(s) skipped", account.username, skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("[Events] Feed for {} closed", account.username);
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(KEEP_ALIVE)))
}

async fn is_for(state: &AppState, account: &Account, envelope: &Envelope) -> bool {
    match &envelope.destination {
        Destination::User { username, .. } => *username == account.username,
        Destination::Topic { topic } => match topic_group(topic) {
            Some(group) => state
                .groups
                .is_member(group, account.id)
                .await
                .unwrap_or_else(|e| {
                    warn!("[Events] Membership check for {} failed: {}", topic, e);
                    false
                }),
            None => false,
        },
    }
}

fn event_name(destination: &Destination) -> &'static str {
    match destination {
        Destination::User { channel, .. } => match channel {
            Channel::Messages => "messages",
            Channel::Groups => "groups",
            Channel::Presence => "presence",
        },
        Destination::Topic { .. } => "topic",
    }
}
