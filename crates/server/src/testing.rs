//! Shared fixtures for unit tests

use crate::chat::GroupManager;
use crate::clock::{Clock, ManualClock};
use crate::config::{AppState, ChatServerConfig};
use crate::dispatch::{Channel, ChatEvent, Destination, Dispatcher, Envelope};
use crate::error::Result;
use crate::friends::FriendManager;
use crate::images::DiskImageStore;
use crate::models::{
    Account, CreateGroupRequest, GroupId, MessageView, NewAccount, SendMessageRequest,
};
use crate::presence::PresenceService;
use crate::store::{connect_memory, AccountStore, GroupStore};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tempfile::TempDir;

/// Dispatcher that keeps every envelope for inspection.
#[derive(Default)]
pub struct RecordingDispatcher {
    sent: Mutex<Vec<Envelope>>,
}

impl RecordingDispatcher {
    pub fn events_for(&self, username: &str, channel: Channel) -> Vec<ChatEvent> {
        self.sent
            .lock()
            .iter()
            .filter(|e| {
                matches!(&e.destination, Destination::User { username: u, channel: c }
                    if u == username && *c == channel)
            })
            .map(|e| e.event.clone())
            .collect()
    }

    pub fn events_for_topic(&self, topic: &str) -> Vec<ChatEvent> {
        self.sent
            .lock()
            .iter()
            .filter(|e| matches!(&e.destination, Destination::Topic { topic: t } if t == topic))
            .map(|e| e.event.clone())
            .collect()
    }
}

impl Dispatcher for RecordingDispatcher {
    fn send_to_user(&self, username: &str, channel: Channel, event: &ChatEvent) {
        self.sent.lock().push(Envelope {
            destination: Destination::User {
                username: username.to_string(),
                channel,
            },
            event: event.clone(),
        });
    }

    fn send_to_topic(&self, topic: &str, event: &ChatEvent) {
        self.sent.lock().push(Envelope {
            destination: Destination::Topic {
                topic: topic.to_string(),
            },
            event: event.clone(),
        });
    }
}

/// Every engine over a private in-memory database and a manual clock.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub accounts: AccountStore,
    pub group_store: GroupStore,
    pub groups: Arc<GroupManager>,
    pub friends: Arc<FriendManager>,
    pub presence: Arc<PresenceService>,
    _images: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        let pool = connect_memory().await.unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let images = TempDir::new().unwrap();

        let state = AppState::assemble(
            ChatServerConfig::default(),
            pool.clone(),
            clock.clone(),
            dispatcher.clone(),
            Arc::new(DiskImageStore::new(images.path())),
        );

        Self {
            clock,
            dispatcher,
            accounts: state.accounts,
            group_store: GroupStore::new(pool),
            groups: state.groups,
            friends: state.friends,
            presence: state.presence,
            _images: images,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Move the clock one second forward.
    pub fn tick(&self) {
        self.clock.advance(Duration::seconds(1));
    }

    /// Account `username` named "<Username> Tester".
    pub async fn account(&self, username: &str) -> Account {
        let mut name = username.to_string();
        if let Some(first) = name.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        self.accounts
            .create(
                NewAccount {
                    username: username.to_string(),
                    name,
                    surname: "Tester".to_string(),
                    email: format!("{}@example.com", username),
                    password_hash: "$2b$12$hash".to_string(),
                    provider_id: None,
                },
                self.now(),
            )
            .await
            .unwrap()
    }

    /// `a` requests, `b` accepts.
    pub async fn befriend(&self, a: &Account, b: &Account) {
        let request = self.friends.send_friend_request(a, b.id).await.unwrap();
        self.friends.accept_request(request.id, b).await.unwrap();
    }

    /// GROUP owned by `creator` with the given other members.
    pub async fn group(&self, creator: &Account, name: &str, members: &[&Account]) -> GroupId {
        self.groups
            .create_group(
                creator,
                CreateGroupRequest {
                    name: name.to_string(),
                    member_ids: members.iter().map(|a| a.id).collect(),
                },
                None,
            )
            .await
            .unwrap()
            .id
    }

    pub async fn send(&self, group: GroupId, sender: &Account, text: &str) -> Result<MessageView> {
        self.groups
            .send_message(
                group,
                sender,
                SendMessageRequest {
                    content: text.to_string(),
                    content_type: Default::default(),
                    parent_id: None,
                },
            )
            .await
    }
}
