//! Rendering of groups and messages for one viewer

use super::GroupManager;
use crate::error::Result;
use crate::models::{
    Account, AccountId, Group, GroupType, GroupView, MemberView, Membership, Message, MessageId,
    MessageView, ParentSummary, UserView,
};
use std::collections::{HashMap, HashSet};

pub(super) fn member_view(membership: &Membership, account: &Account) -> MemberView {
    MemberView {
        user: UserView::from(account),
        joined_at: membership.joined_at,
        last_read_time: membership.last_read_time,
        is_muted: membership.is_muted,
        is_admin: membership.is_admin,
    }
}

impl GroupManager {
    /// Group as `viewer` sees it: own unread count and mute flag, and a
    /// PRIVATE group named after the other member.
    pub(crate) async fn render_group(&self, group: &Group, viewer: AccountId) -> Result<GroupView> {
        let memberships = self.groups.members(group.id).await?;
        let accounts = self.member_accounts(&memberships).await?;

        let members: Vec<MemberView> = memberships
            .iter()
            .filter_map(|m| accounts.get(&m.account_id).map(|a| member_view(m, a)))
            .collect();
        let admins = members
            .iter()
            .filter(|m| m.is_admin)
            .map(|m| m.user.clone())
            .collect();

        let own = memberships.iter().find(|m| m.account_id == viewer);
        let unread_count = match own {
            Some(m) => self.messages.count_unread(group.id, viewer, m.last_read_time).await?,
            None => 0,
        };

        let name = match group.group_type {
            GroupType::Private => memberships
                .iter()
                .find(|m| m.account_id != viewer)
                .and_then(|m| accounts.get(&m.account_id))
                .map(Account::display_name)
                .unwrap_or_else(|| group.name.clone()),
            GroupType::Group => group.name.clone(),
        };

        Ok(GroupView {
            id: group.id,
            name,
            group_type: group.group_type,
            image_url: group.image_url.clone(),
            color_theme: group.color_theme.clone(),
            created_at: group.created_at,
            last_message: group.last_message_content.clone(),
            last_message_time: group.last_message_time,
            unread_count,
            muted: own.map(|m| m.is_muted).unwrap_or(false),
            admins,
            members,
        })
    }

    /// Render messages in the given order. Parents are looked up in the
    /// batch first and fetched only when they fall outside it.
    pub(crate) async fn render_messages(&self, group: &Group, messages: Vec<Message>) -> Result<Vec<MessageView>> {
        let mut arena: HashMap<MessageId, Message> = messages.iter().map(|m| (m.id, m.clone())).collect();

        let missing: Vec<MessageId> = messages
            .iter()
            .filter_map(|m| m.body.parent())
            .filter(|id| !arena.contains_key(id))
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        for parent in self.messages.find_many(&missing).await? {
            arena.insert(parent.id, parent);
        }

        let sender_ids: Vec<AccountId> = arena
            .values()
            .filter_map(|m| m.body.sender())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let senders: HashMap<AccountId, UserView> = self
            .accounts
            .by_ids(&sender_ids)
            .await?
            .iter()
            .map(|a| (a.id, UserView::from(a)))
            .collect();
        let sender_of = |m: &Message| m.body.sender().and_then(|id| senders.get(&id).cloned());

        Ok(messages
            .iter()
            .map(|m| MessageView {
                id: m.id,
                group_id: m.group_id,
                group_name: group.name.clone(),
                timestamp: m.timestamp,
                kind: m.body.kind(),
                sender: sender_of(m),
                content: m.body.content().map(str::to_string),
                content_type: m.body.content_type(),
                parent: m.body.parent().and_then(|id| arena.get(&id)).map(|p| ParentSummary {
                    id: p.id,
                    kind: p.body.kind(),
                    sender: sender_of(p),
                    content: p.body.content().map(str::to_string),
                    content_type: p.body.content_type(),
                }),
            })
            .collect())
    }
}
