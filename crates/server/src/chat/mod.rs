//! Group & Message Engine
//!
//! Owns groups, memberships and the message log. Every write goes through
//! the stores; every live update goes out through the [`Dispatcher`] to
//! each member's private channel.

mod groups;
mod messages;
mod views;

use crate::clock::Clock;
use crate::dispatch::{Channel, ChatEvent, Dispatcher};
use crate::error::{Error, Result};
use crate::images::ImageStore;
use crate::models::{Account, AccountId, Group, GroupId, GroupType, Membership};
use crate::store::{AccountStore, GroupStore, MessageStore, RelationshipStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

pub struct GroupManager {
    groups: GroupStore,
    messages: MessageStore,
    accounts: AccountStore,
    relationships: RelationshipStore,
    dispatcher: Arc<dyn Dispatcher>,
    images: Arc<dyn ImageStore>,
    clock: Arc<dyn Clock>,
    default_theme: String,
}

impl GroupManager {
    pub fn new(
        groups: GroupStore,
        messages: MessageStore,
        accounts: AccountStore,
        relationships: RelationshipStore,
        dispatcher: Arc<dyn Dispatcher>,
        images: Arc<dyn ImageStore>,
        clock: Arc<dyn Clock>,
        default_theme: impl Into<String>,
    ) -> Self {
        Self {
            groups,
            messages,
            accounts,
            relationships,
            dispatcher,
            images,
            clock,
            default_theme: default_theme.into(),
        }
    }

    /// Whether `account` currently belongs to the group.
    pub async fn is_member(&self, group_id: GroupId, account: AccountId) -> Result<bool> {
        Ok(self.groups.member(group_id, account).await?.is_some())
    }

    /// A live group; soft-deleted groups count as missing.
    async fn active_group(&self, id: GroupId) -> Result<Group> {
        match self.groups.find(id).await? {
            Some(group) if !group.is_deleted => Ok(group),
            _ => Err(Error::not_found(format!("group {}", id))),
        }
    }

    async fn require_member(&self, group: &Group, account: AccountId) -> Result<Membership> {
        self.groups
            .member(group.id, account)
            .await?
            .ok_or_else(|| Error::Forbidden("not a member of this group".into()))
    }

    /// Admin-only operations exist for GROUP type only.
    async fn require_admin(&self, group: &Group, account: AccountId) -> Result<Membership> {
        if group.group_type == GroupType::Private {
            return Err(Error::InvalidState("this is a private chat".into()));
        }
        let membership = self.require_member(group, account).await?;
        if !membership.is_admin {
            return Err(Error::Forbidden("only admins can modify the group".into()));
        }
        Ok(membership)
    }

    /// Drop accounts that have a block in place with `actor`, either way.
    async fn without_blocked(&self, actor: AccountId, accounts: Vec<Account>) -> Result<Vec<Account>> {
        let blocked = self.relationships.blocked_ids(actor).await?;
        if blocked.is_empty() {
            return Ok(accounts);
        }
        Ok(accounts
            .into_iter()
            .filter(|a| {
                let keep = !blocked.contains(&a.id);
                if !keep {
                    debug!("[Groups] Skipping {}: blocked with {}", a.username, actor);
                }
                keep
            })
            .collect())
    }

    /// Accounts of the given memberships, keyed by id.
    async fn member_accounts(&self, members: &[Membership]) -> Result<HashMap<AccountId, Account>> {
        let ids: Vec<_> = members.iter().map(|m| m.account_id).collect();
        Ok(self
            .accounts
            .by_ids(&ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect())
    }

    fn fan_out<'a>(&self, recipients: impl IntoIterator<Item = &'a Account>, channel: Channel, event: &ChatEvent) {
        for account in recipients {
            self.dispatcher.send_to_user(&account.username, channel, event);
        }
    }
}

/// Comma-joined usernames, or "someone" when empty.
fn joined_usernames(accounts: &[Account]) -> String {
    if accounts.is_empty() {
        return "someone".to_string();
    }
    accounts
        .iter()
        .map(|a| a.username.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
