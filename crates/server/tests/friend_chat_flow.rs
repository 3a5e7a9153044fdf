use std::sync::Arc;

use chat_server::clock::{Clock, ManualClock};
use chat_server::config::{AppState, ChatServerConfig};
use chat_server::dispatch::{BroadcastDispatcher, Channel, ChatEvent, Destination, Envelope};
use chat_server::error::Error;
use chat_server::images::DiskImageStore;
use chat_server::models::{
    Account, CreateGroupRequest, GroupType, MessageKind, NewAccount, PageRequest,
    SendMessageRequest, UserStatus,
};
use chat_server::store::connect_memory;
use chrono::Duration;
use tempfile::{tempdir, TempDir};
use tokio::sync::broadcast::Receiver;
use tokio_test::{assert_err, assert_ok};

struct World {
    state: AppState,
    clock: Arc<ManualClock>,
    events: Receiver<Envelope>,
    _images: TempDir,
}

impl World {
    async fn new() -> Self {
        let images = tempdir().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let dispatcher = Arc::new(BroadcastDispatcher::new(256));
        let events = dispatcher.subscribe();

        let state = AppState::assemble(
            ChatServerConfig::default(),
            connect_memory().await.unwrap(),
            clock.clone(),
            dispatcher,
            Arc::new(DiskImageStore::new(images.path())),
        );
        Self {
            state,
            clock,
            events,
            _images: images,
        }
    }

    async fn account(&self, username: &str, name: &str) -> Account {
        self.state
            .accounts
            .create(
                NewAccount {
                    username: username.into(),
                    name: name.into(),
                    surname: "Doe".into(),
                    email: format!("{}@example.com", username),
                    password_hash: "x".into(),
                    provider_id: None,
                },
                self.clock.now(),
            )
            .await
            .unwrap()
    }

    fn tick(&self) {
        self.clock.advance(Duration::seconds(1));
    }

    /// Everything dispatched since the last drain.
    fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(envelope) = self.events.try_recv() {
            out.push(envelope);
        }
        out
    }
}

fn to_user(envelopes: &[Envelope], username: &str, channel: Channel) -> Vec<ChatEvent> {
    envelopes
        .iter()
        .filter(|e| {
            e.destination
                == Destination::User {
                    username: username.into(),
                    channel,
                }
        })
        .map(|e| e.event.clone())
        .collect()
}

fn text(content: &str) -> SendMessageRequest {
    SendMessageRequest {
        content: content.into(),
        content_type: Default::default(),
        parent_id: None,
    }
}

#[tokio::test]
async fn test_friendship_to_private_chat() {
    let mut w = World::new().await;
    let alice = w.account("alice", "Alice").await;
    let bob = w.account("bob", "Bob").await;

    let request = w
        .state
        .friends
        .send_friend_request(&alice, bob.id)
        .await
        .unwrap();
    let incoming = w
        .state
        .friends
        .get_pending_requests(bob.id, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(incoming.total, 1);
    assert_eq!(incoming.items[0].sender.username, "alice");

    let private = w.state.friends.accept_request(request.id, &bob).await.unwrap();
    assert_eq!(private.group_type, GroupType::Private);

    // Bob sees the private group named after Alice.
    let bobs_view = w.state.groups.get_group_info(private.id, &bob).await.unwrap();
    assert_eq!(bobs_view.name, "Alice Doe");
    assert!(bobs_view.admins.is_empty());

    w.drain();
    w.tick();
    let sent = w
        .state
        .groups
        .send_message(private.id, &alice, text("hi bob"))
        .await
        .unwrap();
    assert_eq!(sent.kind, MessageKind::Chat);

    let events = w.drain();
    assert_eq!(to_user(&events, "bob", Channel::Messages).len(), 1);
    assert_eq!(to_user(&events, "alice", Channel::Messages).len(), 1);

    assert_eq!(w.state.groups.unread_count(private.id, &bob).await.unwrap(), 1);
    assert_eq!(w.state.groups.unread_count(private.id, &alice).await.unwrap(), 0);

    w.tick();
    assert!(w.state.groups.mark_as_read(private.id, &bob).await.unwrap());
    assert!(!w.state.groups.mark_as_read(private.id, &bob).await.unwrap());
    assert_eq!(w.state.groups.unread_count(private.id, &bob).await.unwrap(), 0);

    let receipts = to_user(&w.drain(), "alice", Channel::Messages);
    assert!(matches!(receipts.as_slice(), [ChatEvent::ReadReceipt { .. }]));

    // Accepting again finds the same conversation.
    let again = w.state.groups.create_private_group(&bob, &alice).await.unwrap();
    assert_eq!(again.id, private.id);
}

#[tokio::test]
async fn test_block_stops_requests_and_hides_from_search() {
    let w = World::new().await;
    let alice = w.account("alice", "Alice").await;
    let mallory = w.account("mallory", "Mallory").await;

    assert_ok!(w.state.friends.block_user(&alice, mallory.id).await);
    // Blocking twice is harmless.
    assert_ok!(w.state.friends.block_user(&alice, mallory.id).await);

    let err = assert_err!(w.state.friends.send_friend_request(&mallory, alice.id).await);
    assert!(matches!(err, Error::Conflict(_)));

    let found = w
        .state
        .friends
        .search_users(mallory.id, "ali", PageRequest::default())
        .await
        .unwrap();
    assert!(found.items.is_empty());

    assert_ok!(w.state.friends.unblock_user(&alice, mallory.id).await);
    assert_err!(w.state.friends.unblock_user(&alice, mallory.id).await);
    let found = w
        .state
        .friends
        .search_users(mallory.id, "ali", PageRequest::default())
        .await
        .unwrap();
    assert_eq!(found.items.len(), 1);
}

#[tokio::test]
async fn test_group_lifecycle_with_admin_handover() {
    let mut w = World::new().await;
    let alice = w.account("alice", "Alice").await;
    let bob = w.account("bob", "Bob").await;
    let carol = w.account("carol", "Carol").await;

    let group = w
        .state
        .groups
        .create_group(
            &alice,
            CreateGroupRequest {
                name: "Weekend".into(),
                member_ids: vec![bob.id, carol.id],
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(group.members.len(), 3);

    let added = to_user(&w.drain(), "bob", Channel::Groups);
    assert!(matches!(added.as_slice(), [ChatEvent::GroupAdded { .. }]));

    // The only admin leaves; the earliest remaining member takes over.
    w.tick();
    w.state
        .groups
        .remove_members(group.id, &alice, &[alice.id])
        .await
        .unwrap();

    let view = w.state.groups.get_group_info(group.id, &bob).await.unwrap();
    assert_eq!(view.members.len(), 2);
    assert_eq!(view.admins.len(), 1);

    let history = w
        .state
        .groups
        .load_group_history(group.id, &bob, PageRequest::default())
        .await
        .unwrap();
    let last = history.items.last().unwrap();
    assert_eq!(last.kind, MessageKind::System);
    assert_eq!(last.content.as_deref(), Some("alice left the group."));

    let err = w
        .state
        .groups
        .get_group_info(group.id, &alice)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_) | Error::NotFound(_)));
}

#[tokio::test]
async fn test_presence_between_friends() {
    let mut w = World::new().await;
    let alice = w.account("alice", "Alice").await;
    let bob = w.account("bob", "Bob").await;

    let request = w.state.friends.send_friend_request(&alice, bob.id).await.unwrap();
    w.state.friends.accept_request(request.id, &bob).await.unwrap();
    w.drain();

    w.state.presence.connect(&alice).await.unwrap();
    w.state
        .presence
        .change_status(&alice, UserStatus::Busy)
        .await
        .unwrap();

    let online = w.state.presence.online_friends(bob.id).await.unwrap();
    assert_eq!(online.len(), 1);
    assert_eq!(online[0].status, UserStatus::Busy);

    let statuses: Vec<UserStatus> = to_user(&w.drain(), "bob", Channel::Presence)
        .into_iter()
        .filter_map(|e| match e {
            ChatEvent::Presence { status, .. } => Some(status),
            _ => None,
        })
        .collect();
    assert_eq!(statuses, vec![UserStatus::Online, UserStatus::Busy]);

    // No heartbeat for longer than the TTL.
    w.clock.advance(Duration::seconds(61));
    assert_eq!(w.state.presence.status_of(alice.id), UserStatus::Offline);
    assert_eq!(w.state.presence.sweep().await, 1);
    assert!(w.state.presence.online_friends(bob.id).await.unwrap().is_empty());
}
