use super::{Departure, PresenceRegistry};
use crate::clock::Clock;
use crate::dispatch::{Channel, ChatEvent, Dispatcher};
use crate::error::Result;
use crate::friends::FriendManager;
use crate::models::{Account, AccountId, FriendPresence, UserStatus, UserView};
use crate::store::{AccountLookup, AccountStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct PresenceService {
    registry: PresenceRegistry,
    friends: Arc<FriendManager>,
    accounts: AccountStore,
    dispatcher: Arc<dyn Dispatcher>,
    clock: Arc<dyn Clock>,
}

impl PresenceService {
    pub fn new(
        registry: PresenceRegistry,
        friends: Arc<FriendManager>,
        accounts: AccountStore,
        dispatcher: Arc<dyn Dispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            friends,
            accounts,
            dispatcher,
            clock,
        }
    }

    pub async fn connect(&self, account: &Account) -> Result<UserStatus> {
        if self.registry.connect(account.id) {
            info!("[Presence] {} connected", account.username);
            self.notify_friends(account.id, &account.username, UserStatus::Online)
                .await?;
        }
        Ok(self.registry.resolve_status(account.id))
    }

    /// Drop one connection; when it was the last, record `last_seen_at`
    /// and tell friends the account went offline. This also holds when the
    /// entry had already expired but was not swept yet.
    pub async fn disconnect(&self, account: &Account) -> Result<()> {
        match self.registry.disconnect(account.id) {
            Departure::WentOffline => {
                self.accounts
                    .touch_last_seen(account.id, self.clock.now())
                    .await?;
                info!("[Presence] {} disconnected", account.username);
                self.notify_friends(account.id, &account.username, UserStatus::Offline)
                    .await
            }
            Departure::StillConnected => Ok(()),
            Departure::NoEntry => {
                debug!("[Presence] Disconnect from unknown {}", account.username);
                Ok(())
            }
        }
    }

    pub async fn heartbeat(&self, account: &Account) -> Result<UserStatus> {
        if self.registry.heartbeat(account.id) {
            self.notify_friends(account.id, &account.username, UserStatus::Online)
                .await?;
        }
        Ok(self.registry.resolve_status(account.id))
    }

    /// Change the declared status. Ignored for accounts that are not
    /// connected; the resulting effective status is returned either way.
    pub async fn change_status(&self, account: &Account, status: UserStatus) -> Result<UserStatus> {
        if self.registry.set_status(account.id, status) {
            info!("[Presence] {} is now {}", account.username, status);
            self.notify_friends(account.id, &account.username, status).await?;
        } else {
            debug!("[Presence] Status change from disconnected {} ignored", account.username);
        }
        Ok(self.registry.resolve_status(account.id))
    }

    pub fn status_of(&self, account: AccountId) -> UserStatus {
        self.registry.resolve_status(account)
    }

    /// Friends of `account` that are not OFFLINE, with their status.
    pub async fn online_friends(&self, account: AccountId) -> Result<Vec<FriendPresence>> {
        let ids = self.friends.get_friend_ids(account).await?;
        let online: Vec<AccountId> = ids
            .into_iter()
            .filter(|id| self.registry.is_online(*id))
            .collect();
        Ok(self
            .accounts
            .by_ids(&online)
            .await?
            .iter()
            .map(|friend| FriendPresence {
                user: UserView::from(friend),
                status: self.registry.resolve_status(friend.id),
            })
            .collect())
    }

    /// Expire dead entries, stamp their `last_seen_at` and notify friends.
    /// Returns how many entries expired.
    ///
    /// The entries are already gone from the registry, so a failure for one
    /// account is logged and the rest are still handled.
    pub async fn sweep(&self) -> usize {
        let expired = self.registry.sweep_expired();
        let now = self.clock.now();
        for id in &expired {
            if let Err(e) = self.expire(*id, now).await {
                warn!("[Presence] Could not record expiry of {}: {}", id, e);
            }
        }
        if !expired.is_empty() {
            info!("[Presence] Swept {} expired entr(ies)", expired.len());
        }
        expired.len()
    }

    async fn expire(&self, id: AccountId, now: DateTime<Utc>) -> Result<()> {
        self.accounts.touch_last_seen(id, now).await?;
        if let Some(account) = self.accounts.by_id(id).await? {
            self.notify_friends(account.id, &account.username, UserStatus::Offline)
                .await?;
        }
        Ok(())
    }

    /// Run [`sweep`](Self::sweep) every `every` until the runtime shuts down.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }

    async fn notify_friends(&self, account: AccountId, username: &str, status: UserStatus) -> Result<()> {
        let event = ChatEvent::Presence {
            username: username.to_string(),
            status,
        };
        let friends = self.friends.get_friend_usernames(account).await?;
        for friend in &friends {
            self.dispatcher.send_to_user(friend, Channel::Presence, &event);
        }
        debug!(
            "[Presence] {} -> {} notified {} friend(s)",
            username,
            status,
            friends.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::dispatch::{Channel, ChatEvent};
    use crate::models::UserStatus;
    use crate::store::AccountLookup;
    use crate::testing::Harness;
    use chrono::Duration;

    fn presence_events(h: &Harness, user: &str) -> Vec<(String, UserStatus)> {
        h.dispatcher
            .events_for(user, Channel::Presence)
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::Presence { username, status } => Some((username, status)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_connect_notifies_friends_only() {
        let h = Harness::new().await;
        let alice = h.account("alice").await;
        let bob = h.account("bob").await;
        let _carol = h.account("carol").await;
        h.befriend(&alice, &bob).await;

        let status = h.presence.connect(&alice).await.unwrap();
        assert_eq!(status, UserStatus::Online);

        assert_eq!(presence_events(&h, "bob"), vec![("alice".to_string(), UserStatus::Online)]);
        assert!(presence_events(&h, "carol").is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_stamps_last_seen() {
        let h = Harness::new().await;
        let alice = h.account("alice").await;
        let bob = h.account("bob").await;
        h.befriend(&alice, &bob).await;

        h.presence.connect(&alice).await.unwrap();
        h.tick();
        h.presence.disconnect(&alice).await.unwrap();

        assert_eq!(h.presence.status_of(alice.id), UserStatus::Offline);
        let stored = h.accounts.by_id(alice.id).await.unwrap().unwrap();
        assert_eq!(stored.last_seen_at, Some(h.now()));
        assert_eq!(
            presence_events(&h, "bob").last(),
            Some(&("alice".to_string(), UserStatus::Offline))
        );
    }

    #[tokio::test]
    async fn test_disconnect_after_lapsed_ttl_records_last_seen() {
        let h = Harness::new().await;
        let alice = h.account("alice").await;
        let bob = h.account("bob").await;
        h.befriend(&alice, &bob).await;

        h.presence.connect(&alice).await.unwrap();
        h.clock.advance(Duration::seconds(61));
        h.presence.disconnect(&alice).await.unwrap();

        let stored = h.accounts.by_id(alice.id).await.unwrap().unwrap();
        assert_eq!(stored.last_seen_at, Some(h.now()));
        assert_eq!(
            presence_events(&h, "bob").last(),
            Some(&("alice".to_string(), UserStatus::Offline))
        );
        assert_eq!(h.presence.sweep().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_handles_every_expired_entry() {
        let h = Harness::new().await;
        let alice = h.account("alice").await;
        let bob = h.account("bob").await;
        h.befriend(&alice, &bob).await;

        // Known to presence only; nothing to stamp or notify for it.
        let ghost = uuid::Uuid::new_v4();
        h.presence.registry.heartbeat(ghost);
        h.presence.connect(&alice).await.unwrap();

        h.clock.advance(Duration::seconds(61));
        assert_eq!(h.presence.sweep().await, 2);
        assert!(h
            .accounts
            .by_id(alice.id)
            .await
            .unwrap()
            .unwrap()
            .last_seen_at
            .is_some());
    }

    #[tokio::test]
    async fn test_status_change_ignored_when_disconnected() {
        let h = Harness::new().await;
        let alice = h.account("alice").await;

        let status = h.presence.change_status(&alice, UserStatus::Busy).await.unwrap();
        assert_eq!(status, UserStatus::Offline);

        h.presence.connect(&alice).await.unwrap();
        let status = h.presence.change_status(&alice, UserStatus::Busy).await.unwrap();
        assert_eq!(status, UserStatus::Busy);
    }

    #[tokio::test]
    async fn test_sweep_expires_and_online_friends() {
        let h = Harness::new().await;
        let alice = h.account("alice").await;
        let bob = h.account("bob").await;
        let carol = h.account("carol").await;
        h.befriend(&alice, &bob).await;
        h.befriend(&alice, &carol).await;

        h.presence.connect(&bob).await.unwrap();
        h.clock.advance(Duration::seconds(45));
        h.presence.connect(&carol).await.unwrap();
        h.presence.change_status(&carol, UserStatus::Away).await.unwrap();

        let online = h.presence.online_friends(alice.id).await.unwrap();
        assert_eq!(online.len(), 2);

        h.clock.advance(Duration::seconds(30));
        assert_eq!(h.presence.sweep().await, 1);

        let online = h.presence.online_friends(alice.id).await.unwrap();
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].user.id, carol.id);
        assert_eq!(online[0].status, UserStatus::Away);
        assert!(h
            .accounts
            .by_id(bob.id)
            .await
            .unwrap()
            .unwrap()
            .last_seen_at
            .is_some());
    }
}
