//! Notification dispatch
//!
//! The core only decides what to push and to whom. Delivery is the
//! transport's job: [`BroadcastDispatcher`] publishes every envelope on a
//! broadcast channel that the socket layer subscribes to.

use crate::models::{AccountId, GroupId, GroupView, MemberView, MessageView, UserStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Per-user delivery queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Messages,
    Groups,
    Presence,
}

/// Live update pushed to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum ChatEvent {
    Message {
        message: MessageView,
    },
    ReadReceipt {
        group_id: GroupId,
        member: MemberView,
    },
    MemberAdded {
        group_id: GroupId,
        members: Vec<MemberView>,
    },
    MemberRemoved {
        group_id: GroupId,
        account_ids: Vec<AccountId>,
    },
    /// Sent to an account that was removed from a group
    Removed {
        group_id: GroupId,
    },
    /// Sent to an account that was added to a group
    GroupAdded {
        group: GroupView,
    },
    GroupUpdated {
        group_id: GroupId,
        name: String,
        image_url: Option<String>,
    },
    Presence {
        username: String,
        status: UserStatus,
    },
    Typing {
        group_id: GroupId,
        username: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Destination {
    User { username: String, channel: Channel },
    Topic { topic: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub destination: Destination,
    pub event: ChatEvent,
}

/// Fire-and-forget delivery; no acknowledgement is surfaced.
pub trait Dispatcher: Send + Sync {
    fn send_to_user(&self, username: &str, channel: Channel, event: &ChatEvent);
    fn send_to_topic(&self, topic: &str, event: &ChatEvent);
}

/// Topic carrying ephemeral events for one group
pub fn group_topic(group_id: GroupId) -> String {
    format!("group.{}", group_id)
}

/// Group id of a topic built by [`group_topic`].
pub fn topic_group(topic: &str) -> Option<GroupId> {
    topic
        .strip_prefix("group.")
        .and_then(|id| uuid::Uuid::parse_str(id).ok())
}

/// Broadcast channel for real-time updates
#[derive(Clone)]
pub struct BroadcastDispatcher {
    tx: broadcast::Sender<Envelope>,
}

impl BroadcastDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    fn publish(&self, envelope: Envelope) {
        // No live subscriber just means nobody is connected right now.
        if self.tx.send(envelope).is_err() {
            debug!("[Dispatch] no subscribers, event dropped");
        }
    }
}

impl Dispatcher for BroadcastDispatcher {
    fn send_to_user(&self, username: &str, channel: Channel, event: &ChatEvent) {
        self.publish(Envelope {
            destination: Destination::User {
                username: username.to_string(),
                channel,
            },
            event: event.clone(),
        });
    }

    fn send_to_topic(&self, topic: &str, event: &ChatEvent) {
        self.publish(Envelope {
            destination: Destination::Topic {
                topic: topic.to_string(),
            },
            event: event.clone(),
        });
    }
}
