//! Group lifecycle, membership and per-member settings

use super::views::member_view;
use super::{joined_usernames, GroupManager};
use crate::dispatch::{Channel, ChatEvent};
use crate::error::{Error, Result};
use crate::models::{
    Account, AccountId, CreateGroupRequest, Group, GroupId, GroupType, GroupView, MemberView,
    MessageBody, Page, PageRequest, UpdateGroupRequest,
};
use crate::store::groups::{private_key, InitialMember};
use bytes::Bytes;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

impl GroupManager {
    async fn store_image(&self, image: Option<Bytes>) -> Result<Option<String>> {
        match image {
            Some(bytes) if !bytes.is_empty() => Ok(Some(self.images.save(bytes).await?)),
            _ => Ok(None),
        }
    }

    /// Create a GROUP with `creator` as sole admin. Unknown member ids and
    /// accounts blocked with the creator are skipped.
    pub async fn create_group(
        &self,
        creator: &Account,
        request: CreateGroupRequest,
        image: Option<Bytes>,
    ) -> Result<GroupView> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidState("group name must not be blank".into()));
        }
        let image_url = self.store_image(image).await?;

        let wanted: HashSet<AccountId> = request
            .member_ids
            .into_iter()
            .filter(|id| *id != creator.id)
            .collect();
        let found = self.accounts.by_ids(&wanted.into_iter().collect::<Vec<_>>()).await?;
        let others = self.without_blocked(creator.id, found).await?;

        let group = Group {
            id: Uuid::new_v4(),
            name: name.to_string(),
            group_type: GroupType::Group,
            image_url,
            color_theme: self.default_theme.clone(),
            created_at: self.clock.now(),
            last_message_content: None,
            last_message_time: None,
            is_deleted: false,
        };
        let mut members = vec![InitialMember {
            account_id: creator.id,
            is_admin: true,
        }];
        members.extend(others.iter().map(|a| InitialMember {
            account_id: a.id,
            is_admin: false,
        }));
        self.groups.create(&group, None, &members).await?;

        info!(
            "[Groups] {} created group {} with {} member(s)",
            creator.username,
            group.id,
            members.len()
        );

        let view = self.render_group(&group, creator.id).await?;
        self.fan_out(&others, Channel::Groups, &ChatEvent::GroupAdded { group: view.clone() });
        Ok(view)
    }

    /// Look up or create the PRIVATE group for exactly this pair.
    pub async fn create_private_group(&self, a: &Account, b: &Account) -> Result<Group> {
        if let Some(existing) = self.groups.find_private(a.id, b.id).await? {
            return Ok(existing);
        }

        let group = Group {
            id: Uuid::new_v4(),
            name: format!("Private: {}-{}", a.username, b.username),
            group_type: GroupType::Private,
            image_url: None,
            color_theme: self.default_theme.clone(),
            created_at: self.clock.now(),
            last_message_content: None,
            last_message_time: None,
            is_deleted: false,
        };
        let members = [
            InitialMember { account_id: a.id, is_admin: false },
            InitialMember { account_id: b.id, is_admin: false },
        ];

        match self.groups.create(&group, Some(private_key(a.id, b.id)), &members).await {
            Ok(()) => {
                info!("[Groups] Private group {} for {} and {}", group.id, a.username, b.username);
                Ok(group)
            }
            // Lost a race with a concurrent creation for the same pair.
            Err(Error::Conflict(_)) => self
                .groups
                .find_private(a.id, b.id)
                .await?
                .ok_or_else(|| Error::Conflict("private group creation raced".into())),
            Err(e) => Err(e),
        }
    }

    /// Rename and/or set the image of a GROUP. Admin only.
    pub async fn update_group(
        &self,
        group_id: GroupId,
        actor: &Account,
        request: UpdateGroupRequest,
        image: Option<Bytes>,
    ) -> Result<GroupView> {
        let group = self.active_group(group_id).await?;
        self.require_admin(&group, actor.id).await?;

        if let Some(image_url) = self.store_image(image).await? {
            self.groups.set_image(group.id, &image_url).await?;
        }

        if let Some(name) = request.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            self.groups.set_name(group.id, name).await?;
            self.post_system_message(
                &group,
                format!("User {} changed group name to: {}", actor.username, name),
            )
            .await?;
        }

        let group = self.active_group(group_id).await?;
        let memberships = self.groups.members(group.id).await?;
        let accounts = self.member_accounts(&memberships).await?;
        self.fan_out(
            accounts.values(),
            Channel::Messages,
            &ChatEvent::GroupUpdated {
                group_id: group.id,
                name: group.name.clone(),
                image_url: group.image_url.clone(),
            },
        );

        info!("[Groups] {} updated group {}", actor.username, group.id);
        self.render_group(&group, actor.id).await
    }

    /// The actor's live groups, most recent activity first.
    pub async fn list_groups(&self, actor: &Account, page: PageRequest) -> Result<Page<GroupView>> {
        let groups = self.groups.groups_for(actor.id, page).await?;
        let mut views = Vec::with_capacity(groups.items.len());
        for group in &groups.items {
            views.push(self.render_group(group, actor.id).await?);
        }
        debug!("[Groups] Listed {} group(s) for {}", views.len(), actor.username);
        Ok(Page {
            items: views,
            page: groups.page,
            size: groups.size,
            total: groups.total,
        })
    }

    pub async fn get_group_info(&self, group_id: GroupId, actor: &Account) -> Result<GroupView> {
        let group = self.active_group(group_id).await?;
        self.require_member(&group, actor.id).await?;
        self.render_group(&group, actor.id).await
    }

    /// Add accounts to a GROUP. Admin only; existing members, unknown ids
    /// and accounts blocked with the actor are skipped. Returns the members
    /// actually added.
    pub async fn add_members(
        &self,
        group_id: GroupId,
        actor: &Account,
        account_ids: &[AccountId],
    ) -> Result<Vec<MemberView>> {
        let group = self.active_group(group_id).await?;
        self.require_admin(&group, actor.id).await?;

        let now = self.clock.now();
        let mut added = Vec::new();
        let candidates = self.accounts.by_ids(account_ids).await?;
        for account in self.without_blocked(actor.id, candidates).await? {
            if self.groups.add_member(group.id, account.id, now).await? {
                added.push(account);
            }
        }
        if added.is_empty() {
            return Ok(Vec::new());
        }

        self.post_system_message(&group, format!("{} added: {}", actor.username, joined_usernames(&added)))
            .await?;

        let memberships = self.groups.members(group.id).await?;
        let accounts = self.member_accounts(&memberships).await?;
        let added_ids: HashSet<AccountId> = added.iter().map(|a| a.id).collect();
        let added_views: Vec<MemberView> = memberships
            .iter()
            .filter(|m| added_ids.contains(&m.account_id))
            .filter_map(|m| accounts.get(&m.account_id).map(|a| member_view(m, a)))
            .collect();

        self.fan_out(
            accounts.values(),
            Channel::Messages,
            &ChatEvent::MemberAdded {
                group_id: group.id,
                members: added_views.clone(),
            },
        );
        for account in &added {
            let view = self.render_group(&group, account.id).await?;
            self.dispatcher
                .send_to_user(&account.username, Channel::Groups, &ChatEvent::GroupAdded { group: view });
        }

        info!(
            "[Groups] {} added {} member(s) to {}",
            actor.username,
            added.len(),
            group.id
        );
        Ok(added_views)
    }

    /// Remove members. Admins may remove anyone; any member may remove
    /// only themselves. The last member leaving soft-deletes the group and
    /// the last admin leaving promotes the longest-standing member.
    pub async fn remove_members(&self, group_id: GroupId, actor: &Account, account_ids: &[AccountId]) -> Result<()> {
        let group = self.active_group(group_id).await?;
        if group.group_type == GroupType::Private {
            return Err(Error::InvalidState("this is a private chat".into()));
        }
        let membership = self.require_member(&group, actor.id).await?;

        let targets: HashSet<AccountId> = account_ids.iter().copied().collect();
        let removing_self = targets.len() == 1 && targets.contains(&actor.id);
        if !removing_self && !membership.is_admin {
            return Err(Error::Forbidden("only admins can remove other members".into()));
        }

        let mut removed = Vec::new();
        for account in self.accounts.by_ids(&targets.into_iter().collect::<Vec<_>>()).await? {
            if self.groups.remove_member(group.id, account.id).await? {
                removed.push(account);
            }
        }
        if removed.is_empty() {
            return Ok(());
        }

        let removal_notice = ChatEvent::Removed { group_id: group.id };
        self.fan_out(&removed, Channel::Groups, &removal_notice);

        let remaining = self.groups.members(group.id).await?;
        if remaining.is_empty() {
            self.groups.soft_delete(group.id).await?;
            info!("[Groups] Group {} has no members left, deleted", group.id);
            return Ok(());
        }

        if !remaining.iter().any(|m| m.is_admin) {
            let successor = &remaining[0];
            self.groups.set_admin(group.id, successor.account_id, true).await?;
            info!(
                "[Groups] Promoted {} to admin of {}",
                successor.account_id, group.id
            );
        }

        let accounts = self.member_accounts(&remaining).await?;
        self.fan_out(
            accounts.values(),
            Channel::Messages,
            &ChatEvent::MemberRemoved {
                group_id: group.id,
                account_ids: removed.iter().map(|a| a.id).collect(),
            },
        );

        let notice = if removing_self {
            format!("{} left the group.", actor.username)
        } else {
            format!("{} removed: {}", actor.username, joined_usernames(&removed))
        };
        self.post_system_message(&group, notice).await?;

        info!(
            "[Groups] {} removed {} member(s) from {}",
            actor.username,
            removed.len(),
            group.id
        );
        Ok(())
    }

    pub async fn add_admin(&self, group_id: GroupId, actor: &Account, target: AccountId) -> Result<()> {
        let group = self.active_group(group_id).await?;
        self.require_admin(&group, actor.id).await?;
        if self.groups.member(group.id, target).await?.is_none() {
            return Err(Error::not_found(format!("member {}", target)));
        }
        self.groups.set_admin(group.id, target, true).await?;
        info!("[Groups] {} made {} admin of {}", actor.username, target, group.id);
        Ok(())
    }

    /// Demote an admin. The sole admin cannot demote themselves before
    /// nominating a successor.
    pub async fn remove_admin(&self, group_id: GroupId, actor: &Account, target: AccountId) -> Result<()> {
        let group = self.active_group(group_id).await?;
        self.require_admin(&group, actor.id).await?;
        if self.groups.member(group.id, target).await?.is_none() {
            return Err(Error::not_found(format!("member {}", target)));
        }

        if target == actor.id {
            let admins = self
                .groups
                .members(group.id)
                .await?
                .iter()
                .filter(|m| m.is_admin)
                .count();
            if admins == 1 {
                return Err(Error::InvalidState(
                    "nominate a new admin before removing your own admin role".into(),
                ));
            }
        }

        self.groups.set_admin(group.id, target, false).await?;
        info!("[Groups] {} revoked admin of {} in {}", actor.username, target, group.id);
        Ok(())
    }

    pub async fn mute_group(&self, group_id: GroupId, actor: &Account) -> Result<()> {
        self.set_muted(group_id, actor, true).await
    }

    pub async fn unmute_group(&self, group_id: GroupId, actor: &Account) -> Result<()> {
        self.set_muted(group_id, actor, false).await
    }

    async fn set_muted(&self, group_id: GroupId, actor: &Account, muted: bool) -> Result<()> {
        let group = self.active_group(group_id).await?;
        self.require_member(&group, actor.id).await?;
        self.groups.set_muted(group.id, actor.id, muted).await?;
        debug!("[Groups] {} set muted={} on {}", actor.username, muted, group.id);
        Ok(())
    }

    pub async fn set_color_theme(&self, group_id: GroupId, actor: &Account, theme: &str) -> Result<()> {
        let group = self.active_group(group_id).await?;
        self.require_member(&group, actor.id).await?;
        self.groups.set_color_theme(group.id, theme).await?;
        debug!("[Groups] Theme of {} set to {}", group.id, theme);
        Ok(())
    }

    pub async fn get_color_theme(&self, group_id: GroupId, actor: &Account) -> Result<String> {
        let group = self.active_group(group_id).await?;
        self.require_member(&group, actor.id).await?;
        Ok(group.color_theme)
    }

    /// Append a SYSTEM message and push it to every member.
    pub(super) async fn post_system_message(&self, group: &Group, content: String) -> Result<()> {
        let now = self.clock.now();
        let message = self
            .messages
            .append(group.id, now, MessageBody::System { content })
            .await?;

        let memberships = self.groups.members(group.id).await?;
        let accounts = self.member_accounts(&memberships).await?;
        let mut views = self.render_messages(group, vec![message]).await?;
        if let Some(view) = views.pop() {
            self.fan_out(accounts.values(), Channel::Messages, &ChatEvent::Message { message: view });
        }
        Ok(())
    }
}
