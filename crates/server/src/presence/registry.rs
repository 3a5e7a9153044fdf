use crate::clock::Clock;
use crate::models::{AccountId, UserStatus};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
struct PresenceEntry {
    status: UserStatus,
    /// Open sockets for the account
    connections: u32,
    expires_at: DateTime<Utc>,
}

impl PresenceEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Outcome of [`PresenceRegistry::disconnect`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Other connections of the account are still open
    StillConnected,
    /// The entry is gone; the account is now offline
    WentOffline,
    /// Nothing was registered for the account
    NoEntry,
}

/// In-process presence map, partitioned into independently locked shards.
///
/// Entries expire `ttl` after the last connect or heartbeat. Expiry is
/// checked lazily on every read; [`sweep_expired`](Self::sweep_expired)
/// drops dead entries for good.
pub struct PresenceRegistry {
    shards: Vec<RwLock<HashMap<AccountId, PresenceEntry>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl PresenceRegistry {
    pub fn new(shards: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let shards = (0..shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, ttl, clock }
    }

    fn shard(&self, account: AccountId) -> &RwLock<HashMap<AccountId, PresenceEntry>> {
        let index = (account.as_u128() % self.shards.len() as u128) as usize;
        &self.shards[index]
    }

    /// Register a new connection. Returns true if the account was offline
    /// before.
    pub fn connect(&self, account: AccountId) -> bool {
        let now = self.clock.now();
        let mut shard = self.shard(account).write();
        match shard.get_mut(&account) {
            Some(entry) if entry.is_live(now) => {
                entry.connections += 1;
                entry.expires_at = now + self.ttl;
                false
            }
            _ => {
                shard.insert(
                    account,
                    PresenceEntry {
                        status: UserStatus::Online,
                        connections: 1,
                        expires_at: now + self.ttl,
                    },
                );
                true
            }
        }
    }

    /// Drop one connection. An entry whose TTL already lapsed is removed
    /// and reported as [`Departure::WentOffline`] so that the caller still
    /// records the departure.
    pub fn disconnect(&self, account: AccountId) -> Departure {
        let now = self.clock.now();
        let mut shard = self.shard(account).write();
        let Some(entry) = shard.get_mut(&account) else {
            return Departure::NoEntry;
        };
        if !entry.is_live(now) {
            debug!("[Presence] Disconnect of {} after expiry", account);
            shard.remove(&account);
            return Departure::WentOffline;
        }

        entry.connections = entry.connections.saturating_sub(1);
        if entry.connections == 0 {
            shard.remove(&account);
            Departure::WentOffline
        } else {
            Departure::StillConnected
        }
    }

    /// Renew the TTL. With no live entry this counts as a reconnect at
    /// ONLINE, and true is returned.
    pub fn heartbeat(&self, account: AccountId) -> bool {
        let now = self.clock.now();
        let mut shard = self.shard(account).write();
        match shard.get_mut(&account) {
            Some(entry) if entry.is_live(now) => {
                entry.expires_at = now + self.ttl;
                false
            }
            _ => {
                debug!("[Presence] Heartbeat from {} without entry, reconnecting", account);
                shard.insert(
                    account,
                    PresenceEntry {
                        status: UserStatus::Online,
                        connections: 1,
                        expires_at: now + self.ttl,
                    },
                );
                true
            }
        }
    }

    /// Overwrite the declared status of a connected account. Returns false
    /// (and changes nothing) when the account has no live entry.
    pub fn set_status(&self, account: AccountId, status: UserStatus) -> bool {
        let now = self.clock.now();
        let mut shard = self.shard(account).write();
        match shard.get_mut(&account) {
            Some(entry) if entry.is_live(now) => {
                entry.status = status;
                true
            }
            _ => false,
        }
    }

    /// OFFLINE without a live entry, otherwise the declared status.
    pub fn resolve_status(&self, account: AccountId) -> UserStatus {
        let now = self.clock.now();
        self.shard(account)
            .read()
            .get(&account)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.status)
            .unwrap_or(UserStatus::Offline)
    }

    pub fn is_online(&self, account: AccountId) -> bool {
        self.resolve_status(account) != UserStatus::Offline
    }

    /// Remove every expired entry and return whose they were.
    pub fn sweep_expired(&self) -> Vec<AccountId> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for shard in &self.shards {
            let mut shard = shard.write();
            shard.retain(|account, entry| {
                let live = entry.is_live(now);
                if !live {
                    expired.push(*account);
                }
                live
            });
        }
        expired
    }
}
