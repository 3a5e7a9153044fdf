//! Sending, history, read cursors and typing

use super::views::member_view;
use super::GroupManager;
use crate::dispatch::{group_topic, Channel, ChatEvent};
use crate::error::{Error, Result};
use crate::models::{Account, Group, GroupId, GroupType, MessageBody, MessageView, Page, PageRequest, SendMessageRequest};
use tracing::{debug, info, warn};

impl GroupManager {
    /// Append a CHAT message, refresh the group's last-message fields,
    /// advance the sender's cursor and push the message to every member.
    pub async fn send_message(
        &self,
        group_id: GroupId,
        actor: &Account,
        request: SendMessageRequest,
    ) -> Result<MessageView> {
        let group = self.active_group(group_id).await?;
        self.require_member(&group, actor.id).await?;
        if group.group_type == GroupType::Private {
            self.require_unblocked(&group, actor).await?;
        }

        // A parent outside this group is dropped rather than rejected.
        let parent = match request.parent_id {
            Some(id) => self
                .messages
                .find(id)
                .await?
                .filter(|p| p.group_id == group.id)
                .map(|p| p.id),
            None => None,
        };

        let now = self.clock.now();
        let message = self
            .messages
            .append(
                group.id,
                now,
                MessageBody::Chat {
                    sender: actor.id,
                    content: request.content.clone(),
                    content_type: request.content_type,
                    parent,
                },
            )
            .await?;
        self.groups.set_last_message(group.id, &request.content, now).await?;
        self.groups.set_last_read(group.id, actor.id, now).await?;

        let view = self
            .render_messages(&group, vec![message])
            .await?
            .pop()
            .ok_or_else(|| Error::StorageFailure("rendered message missing".into()))?;

        let memberships = self.groups.members(group.id).await?;
        let accounts = self.member_accounts(&memberships).await?;
        self.fan_out(
            accounts.values(),
            Channel::Messages,
            &ChatEvent::Message { message: view.clone() },
        );

        debug!("[Chat] {} -> group {} (message {})", actor.username, group.id, view.id);
        Ok(view)
    }

    /// A private chat goes quiet once either side blocks the other.
    async fn require_unblocked(&self, group: &Group, actor: &Account) -> Result<()> {
        for other in self.groups.members(group.id).await? {
            if other.account_id != actor.id
                && self.relationships.is_blocked(actor.id, other.account_id).await?
            {
                warn!("[Chat] {} blocked in private group {}", actor.username, group.id);
                return Err(Error::Conflict("relationship is blocked".into()));
            }
        }
        Ok(())
    }

    /// A page of history in chronological order. Non-members get
    /// `NotFound` so the group's existence is not revealed.
    pub async fn load_group_history(
        &self,
        group_id: GroupId,
        actor: &Account,
        page: PageRequest,
    ) -> Result<Page<MessageView>> {
        let group = self.active_group(group_id).await?;
        if self.groups.member(group.id, actor.id).await?.is_none() {
            return Err(Error::not_found(format!("group {}", group_id)));
        }

        let mut newest_first = self.messages.page_desc(group.id, page).await?;
        newest_first.items.reverse();
        let Page { items, page, size, total } = newest_first;
        let items = self.render_messages(&group, items).await?;
        Ok(Page { items, page, size, total })
    }

    /// Advance the actor's cursor to now and broadcast a read receipt.
    /// Returns false when the cursor was already past the last message.
    pub async fn mark_as_read(&self, group_id: GroupId, actor: &Account) -> Result<bool> {
        let group = self.active_group(group_id).await?;
        let membership = self.require_member(&group, actor.id).await?;

        if let Some(last) = group.last_message_time {
            if membership.last_read_time >= last {
                return Ok(false);
            }
        }

        let now = self.clock.now();
        self.groups.set_last_read(group.id, actor.id, now).await?;

        let memberships = self.groups.members(group.id).await?;
        let accounts = self.member_accounts(&memberships).await?;
        if let Some(updated) = memberships.iter().find(|m| m.account_id == actor.id) {
            let event = ChatEvent::ReadReceipt {
                group_id: group.id,
                member: member_view(updated, actor),
            };
            self.fan_out(accounts.values(), Channel::Messages, &event);
        }

        info!("[Chat] {} read group {}", actor.username, group.id);
        Ok(true)
    }

    /// CHAT messages by others after the actor's cursor.
    pub async fn unread_count(&self, group_id: GroupId, actor: &Account) -> Result<i64> {
        let group = self.active_group(group_id).await?;
        let membership = self.require_member(&group, actor.id).await?;
        self.messages
            .count_unread(group.id, actor.id, membership.last_read_time)
            .await
    }

    /// Ephemeral typing notice on the group topic; nothing is stored.
    pub async fn send_typing(&self, group_id: GroupId, actor: &Account) -> Result<()> {
        let group = self.active_group(group_id).await?;
        self.require_member(&group, actor.id).await?;
        self.dispatcher.send_to_topic(
            &group_topic(group.id),
            &ChatEvent::Typing {
                group_id: group.id,
                username: actor.username.clone(),
            },
        );
        Ok(())
    }
}
