//! Friendship Engine
//!
//! Owns the relationship state machine between two accounts:
//!
//! ```text
//! none -> PENDING -> ACCEPTED | REJECTED
//! REJECTED -> none            (on a new request)
//! any -> BLOCKED              (unilateral)
//! BLOCKED -> none             (unblock by the blocker)
//! ```
//!
//! At most one edge exists per unordered pair; the store enforces it.

use crate::chat::GroupManager;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::models::{
    Account, AccountId, FriendRequestView, Group, Page, PageRequest, Relationship, RelationshipId,
    RelationshipStatus, UserView,
};
use crate::store::relationships::Direction;
use crate::store::{AccountLookup, AccountStore, RelationshipStore};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Queries shorter than this return nothing.
pub const MIN_SEARCH_LEN: usize = 2;

pub struct FriendManager {
    relationships: RelationshipStore,
    accounts: AccountStore,
    groups: Arc<GroupManager>,
    clock: Arc<dyn Clock>,
}

impl FriendManager {
    pub fn new(
        relationships: RelationshipStore,
        accounts: AccountStore,
        groups: Arc<GroupManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            relationships,
            accounts,
            groups,
            clock,
        }
    }

    async fn account(&self, id: AccountId) -> Result<Account> {
        self.accounts
            .by_id(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("account {}", id)))
    }

    async fn relationship(&self, id: RelationshipId) -> Result<Relationship> {
        self.relationships
            .find(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("friend request {}", id)))
    }

    /// Both directed edges of the pair, `(a -> b, b -> a)`.
    async fn pair(&self, a: AccountId, b: AccountId) -> Result<(Option<Relationship>, Option<Relationship>)> {
        let direct = self.relationships.find_directed(a, b).await?;
        let reverse = self.relationships.find_directed(b, a).await?;
        Ok((direct, reverse))
    }

    /// Reject a new request if the pair is blocked, already friends or has
    /// a pending request. Returns a REJECTED edge that may be replaced.
    fn check_requestable(
        direct: Option<Relationship>,
        reverse: Option<Relationship>,
    ) -> Result<Option<Relationship>> {
        let edges = [direct, reverse];
        let has = |status: RelationshipStatus| edges.iter().flatten().any(|e| e.status == status);

        if has(RelationshipStatus::Blocked) {
            return Err(Error::Conflict("relationship is blocked".into()));
        }
        if has(RelationshipStatus::Accepted) {
            return Err(Error::Conflict("already friends".into()));
        }
        if has(RelationshipStatus::Pending) {
            return Err(Error::Conflict("a friend request is already pending".into()));
        }
        let [direct, reverse] = edges;
        Ok(direct.or(reverse))
    }

    pub async fn send_friend_request(&self, sender: &Account, target_id: AccountId) -> Result<FriendRequestView> {
        if sender.id == target_id {
            return Err(Error::SelfReference);
        }
        let target = self.account(target_id).await?;

        let (direct, reverse) = self.pair(sender.id, target.id).await?;
        if let Some(rejected) = Self::check_requestable(direct, reverse)? {
            self.relationships.delete(rejected.id).await?;
        }

        let edge = match self
            .relationships
            .insert(sender.id, target.id, RelationshipStatus::Pending, self.clock.now())
            .await
        {
            Ok(edge) => edge,
            Err(Error::Conflict(reason)) => {
                // A concurrent write landed first; report what it left behind.
                let (direct, reverse) = self.pair(sender.id, target.id).await?;
                Self::check_requestable(direct, reverse)?;
                return Err(Error::Conflict(reason));
            }
            Err(e) => return Err(e),
        };

        info!("[Friends] Request sent: {} -> {}", sender.username, target.username);
        Ok(request_view(&edge, sender, &target, sender.id))
    }

    /// Accept a pending request addressed to `actor` and open the pair's
    /// private group.
    pub async fn accept_request(&self, request_id: RelationshipId, actor: &Account) -> Result<Group> {
        let request = self.relationship(request_id).await?;
        if request.to_account != actor.id {
            return Err(Error::Forbidden("only the receiver can accept a request".into()));
        }
        if request.status != RelationshipStatus::Pending {
            return Err(Error::InvalidState(format!(
                "request is {}, not pending",
                request.status.as_str()
            )));
        }

        self.relationships
            .set_status(request.id, RelationshipStatus::Accepted)
            .await?;
        let requester = self.account(request.from_account).await?;
        let group = self.groups.create_private_group(&requester, actor).await?;

        info!(
            "[Friends] Request {} accepted: {} <-> {}",
            request.id, requester.username, actor.username
        );
        Ok(group)
    }

    pub async fn reject_request(&self, request_id: RelationshipId, actor: &Account) -> Result<()> {
        let request = self.relationship(request_id).await?;
        if request.to_account != actor.id {
            return Err(Error::Forbidden("only the receiver can reject a request".into()));
        }
        if request.status != RelationshipStatus::Pending {
            return Err(Error::InvalidState(format!(
                "request is {}, not pending",
                request.status.as_str()
            )));
        }

        self.relationships
            .set_status(request.id, RelationshipStatus::Rejected)
            .await?;
        info!("[Friends] Request {} rejected by {}", request.id, actor.username);
        Ok(())
    }

    /// Withdraw a pending request. The sender cancelling one that was
    /// already accepted does nothing.
    pub async fn cancel_request(&self, request_id: RelationshipId, actor: &Account) -> Result<()> {
        let request = self.relationship(request_id).await?;
        if request.from_account != actor.id {
            return Err(Error::Forbidden("only the sender can cancel a request".into()));
        }
        if request.status == RelationshipStatus::Accepted {
            debug!("[Friends] Cancel of accepted request {} ignored", request.id);
            return Ok(());
        }
        if request.status != RelationshipStatus::Pending {
            return Err(Error::InvalidState(format!(
                "request is {}, not pending",
                request.status.as_str()
            )));
        }

        self.relationships.delete(request.id).await?;
        info!("[Friends] Request {} cancelled by {}", request.id, actor.username);
        Ok(())
    }

    /// Block `target`, overriding any friendship or pending request. A block
    /// already placed by `target` leaves things as they are.
    pub async fn block_user(&self, blocker: &Account, target_id: AccountId) -> Result<()> {
        if blocker.id == target_id {
            return Err(Error::SelfReference);
        }
        let target = self.account(target_id).await?;

        let (direct, reverse) = self.pair(blocker.id, target.id).await?;
        if let Some(reverse) = reverse {
            if reverse.status == RelationshipStatus::Blocked {
                debug!(
                    "[Friends] {} already blocked by {}, nothing to do",
                    blocker.username, target.username
                );
                return Ok(());
            }
            self.relationships.delete(reverse.id).await?;
        }

        match direct {
            Some(edge) => {
                self.relationships
                    .set_status(edge.id, RelationshipStatus::Blocked)
                    .await?
            }
            None => {
                self.relationships
                    .insert(blocker.id, target.id, RelationshipStatus::Blocked, self.clock.now())
                    .await?;
            }
        }

        info!("[Friends] {} blocked {}", blocker.username, target.username);
        Ok(())
    }

    pub async fn unblock_user(&self, blocker: &Account, target_id: AccountId) -> Result<()> {
        if blocker.id == target_id {
            return Err(Error::SelfReference);
        }
        match self.relationships.find_directed(blocker.id, target_id).await? {
            Some(edge) if edge.status == RelationshipStatus::Blocked => {
                self.relationships.delete(edge.id).await?;
                info!("[Friends] {} unblocked {}", blocker.username, target_id);
                Ok(())
            }
            _ => Err(Error::InvalidState("no block placed on this account".into())),
        }
    }

    /// End a friendship. The private group is kept.
    pub async fn remove_friend(&self, actor: &Account, friend_id: AccountId) -> Result<()> {
        if actor.id == friend_id {
            return Err(Error::SelfReference);
        }
        let removed = self
            .relationships
            .delete_pair_with_status(actor.id, friend_id, RelationshipStatus::Accepted)
            .await?;
        if removed == 0 {
            warn!("[Friends] {} tried to remove non-friend {}", actor.username, friend_id);
            return Err(Error::InvalidState("not friends".into()));
        }
        info!("[Friends] {} removed friend {}", actor.username, friend_id);
        Ok(())
    }

    // -- projections --

    async fn users_by_id(&self, ids: &[AccountId]) -> Result<HashMap<AccountId, Account>> {
        Ok(self
            .accounts
            .by_ids(ids)
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect())
    }

    /// Counterparts of a page of edges, in edge order.
    async fn counterpart_page(&self, account: AccountId, edges: Page<Relationship>) -> Result<Page<UserView>> {
        let ids: Vec<_> = edges.items.iter().map(|e| e.counterpart(account)).collect();
        let users = self.users_by_id(&ids).await?;
        let Page { items, page, size, total } = edges;
        let items = items
            .iter()
            .filter_map(|e| users.get(&e.counterpart(account)).map(UserView::from))
            .collect();
        Ok(Page { items, page, size, total })
    }

    async fn request_page(&self, viewer: AccountId, edges: Page<Relationship>) -> Result<Page<FriendRequestView>> {
        let ids: Vec<_> = edges
            .items
            .iter()
            .flat_map(|e| [e.from_account, e.to_account])
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let users = self.users_by_id(&ids).await?;
        let Page { items, page, size, total } = edges;
        let items = items
            .iter()
            .filter_map(|e| {
                let sender = users.get(&e.from_account)?;
                let receiver = users.get(&e.to_account)?;
                Some(request_view(e, sender, receiver, viewer))
            })
            .collect();
        Ok(Page { items, page, size, total })
    }

    pub async fn get_friends(&self, account: AccountId, page: PageRequest) -> Result<Page<UserView>> {
        let edges = self
            .relationships
            .list(account, Direction::Either, RelationshipStatus::Accepted, page)
            .await?;
        self.counterpart_page(account, edges).await
    }

    /// Requests waiting for `account` to answer.
    pub async fn get_pending_requests(&self, account: AccountId, page: PageRequest) -> Result<Page<FriendRequestView>> {
        let edges = self
            .relationships
            .list(account, Direction::Incoming, RelationshipStatus::Pending, page)
            .await?;
        self.request_page(account, edges).await
    }

    pub async fn get_outgoing_requests(&self, account: AccountId, page: PageRequest) -> Result<Page<FriendRequestView>> {
        let edges = self
            .relationships
            .list(account, Direction::Outgoing, RelationshipStatus::Pending, page)
            .await?;
        self.request_page(account, edges).await
    }

    /// Accounts `account` has blocked.
    pub async fn get_blocked_users(&self, account: AccountId, page: PageRequest) -> Result<Page<UserView>> {
        let edges = self
            .relationships
            .list(account, Direction::Outgoing, RelationshipStatus::Blocked, page)
            .await?;
        self.counterpart_page(account, edges).await
    }

    /// Self plus everyone `account` has a live relation with: friends,
    /// pending either way, blocked either way.
    pub async fn get_excluded_user_ids(&self, account: AccountId) -> Result<HashSet<AccountId>> {
        let mut excluded = HashSet::from([account]);
        for edge in self.relationships.all_involving(account).await? {
            if edge.status != RelationshipStatus::Rejected {
                excluded.insert(edge.counterpart(account));
            }
        }
        Ok(excluded)
    }

    pub async fn get_friend_ids(&self, account: AccountId) -> Result<Vec<AccountId>> {
        self.relationships.friend_ids(account).await
    }

    pub async fn get_friend_usernames(&self, account: AccountId) -> Result<Vec<String>> {
        let ids = self.relationships.friend_ids(account).await?;
        Ok(self
            .accounts
            .by_ids(&ids)
            .await?
            .into_iter()
            .map(|a| a.username)
            .collect())
    }

    /// Prefix search over name, surname and username, skipping anyone the
    /// actor already has a relation with.
    pub async fn search_users(&self, actor: AccountId, query: &str, page: PageRequest) -> Result<Page<UserView>> {
        let query = query.trim();
        if query.chars().count() < MIN_SEARCH_LEN {
            return Ok(Page::empty(page));
        }
        let excluded = self.get_excluded_user_ids(actor).await?;
        let found = self.accounts.search_candidates(query, &excluded, page).await?;
        debug!("[Friends] Search {:?}: {} hit(s)", query, found.total);
        Ok(found.map(|a| UserView::from(&a)))
    }
}

fn request_view(edge: &Relationship, sender: &Account, receiver: &Account, viewer: AccountId) -> FriendRequestView {
    FriendRequestView {
        id: edge.id,
        sender: UserView::from(sender),
        receiver: UserView::from(receiver),
        status: edge.status,
        outgoing: edge.from_account == viewer,
    }
}
