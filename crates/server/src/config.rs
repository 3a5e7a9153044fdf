//! Chat server configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::warn;

use crate::chat::GroupManager;
use crate::clock::Clock;
use crate::dispatch::{BroadcastDispatcher, Dispatcher};
use crate::friends::FriendManager;
use crate::images::ImageStore;
use crate::presence::{PresenceRegistry, PresenceService};
use crate::store::{AccountStore, GroupStore, MessageStore, RelationshipStore};

/// Configuration for the chat server
#[derive(Clone, Debug)]
pub struct ChatServerConfig {
    /// sqlx connection string
    pub database_url: String,
    /// Listen address for the HTTP API
    pub http_addr: String,
    /// Where uploaded group images are written
    pub image_dir: PathBuf,
    /// Presence entries expire this long after the last heartbeat
    pub presence_ttl_secs: u64,
    pub presence_sweep_secs: u64,
    pub presence_shards: usize,
    /// Colour theme given to new groups
    pub default_color_theme: String,
    /// Buffered events per dispatcher subscriber
    pub dispatch_capacity: usize,
}

impl Default for ChatServerConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:chat.sqlite".to_string(),
            http_addr: "0.0.0.0:3001".to_string(),
            image_dir: PathBuf::from("./uploads"),
            presence_ttl_secs: 60,
            presence_sweep_secs: 30,
            presence_shards: 16,
            default_color_theme: "#3B82F6".to_string(),
            dispatch_capacity: 1024,
        }
    }
}

impl ChatServerConfig {
    /// Defaults overridden by whatever environment variables are set.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            http_addr: std::env::var("HTTP_ADDR").unwrap_or(defaults.http_addr),
            image_dir: std::env::var("IMAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.image_dir),
            presence_ttl_secs: env_parse("PRESENCE_TTL_SECS", defaults.presence_ttl_secs),
            presence_sweep_secs: env_parse("PRESENCE_SWEEP_SECS", defaults.presence_sweep_secs),
            presence_shards: env_parse("PRESENCE_SHARDS", defaults.presence_shards),
            default_color_theme: std::env::var("DEFAULT_COLOR_THEME")
                .unwrap_or(defaults.default_color_theme),
            dispatch_capacity: env_parse("DISPATCH_CAPACITY", defaults.dispatch_capacity),
        }
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.image_dir).await?;
        Ok(())
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("[Config] Ignoring invalid {}={:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ChatServerConfig,
    pub accounts: AccountStore,
    pub friends: Arc<FriendManager>,
    pub groups: Arc<GroupManager>,
    pub presence: Arc<PresenceService>,
    /// Feed behind `GET /events`; absent when events go elsewhere
    pub events: Option<BroadcastDispatcher>,
}

impl AppState {
    /// Wire every engine over one pool and the given collaborators.
    pub fn assemble(
        config: ChatServerConfig,
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        dispatcher: Arc<dyn Dispatcher>,
        images: Arc<dyn ImageStore>,
    ) -> Self {
        let accounts = AccountStore::new(pool.clone());

        let groups = Arc::new(GroupManager::new(
            GroupStore::new(pool.clone()),
            MessageStore::new(pool.clone()),
            accounts.clone(),
            RelationshipStore::new(pool.clone()),
            dispatcher.clone(),
            images,
            clock.clone(),
            config.default_color_theme.clone(),
        ));

        let friends = Arc::new(FriendManager::new(
            RelationshipStore::new(pool),
            accounts.clone(),
            groups.clone(),
            clock.clone(),
        ));

        let registry = PresenceRegistry::new(
            config.presence_shards,
            chrono::Duration::seconds(config.presence_ttl_secs as i64),
            clock.clone(),
        );
        let presence = Arc::new(PresenceService::new(
            registry,
            friends.clone(),
            accounts.clone(),
            dispatcher,
            clock,
        ));

        Self {
            config,
            accounts,
            friends,
            groups,
            presence,
            events: None,
        }
    }

    /// Serve `dispatcher`'s envelopes to connected clients.
    pub fn with_event_stream(mut self, dispatcher: BroadcastDispatcher) -> Self {
        self.events = Some(dispatcher);
        self
    }
}
