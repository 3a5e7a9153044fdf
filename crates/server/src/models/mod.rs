use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type AccountId = Uuid;
pub type GroupId = Uuid;
pub type RelationshipId = Uuid;
pub type MessageId = i64;

/// Registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub provider_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.name, self.surname).trim().to_string()
    }
}

/// Input for registering an account. Credential hashing happens upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password_hash: String,
    pub provider_id: Option<String>,
}

/// Public account info (no credentials)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub id: AccountId,
    pub username: String,
    pub name: String,
    pub surname: String,
}

impl From<&Account> for UserView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            name: account.name.clone(),
            surname: account.surname.clone(),
        }
    }
}

/// Declared availability of a connected account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Online,
    Away,
    Busy,
    Offline,
}

// ---------------------------------------------------------------------------
// Relationships
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipStatus {
    Pending,
    Accepted,
    Rejected,
    Blocked,
}

impl RelationshipStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Pending => "pending",
            RelationshipStatus::Accepted => "accepted",
            RelationshipStatus::Rejected => "rejected",
            RelationshipStatus::Blocked => "blocked",
        }
    }
}

impl FromStr for RelationshipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RelationshipStatus::Pending),
            "accepted" => Ok(RelationshipStatus::Accepted),
            "rejected" => Ok(RelationshipStatus::Rejected),
            "blocked" => Ok(RelationshipStatus::Blocked),
            other => Err(format!("unknown relationship status: {}", other)),
        }
    }
}

/// Directed relationship edge. ACCEPTED is symmetric in meaning even though
/// it is stored from requester to receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub from_account: AccountId,
    pub to_account: AccountId,
    pub status: RelationshipStatus,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// The account on the other end of the edge, seen from `account`.
    pub fn counterpart(&self, account: AccountId) -> AccountId {
        if self.from_account == account {
            self.to_account
        } else {
            self.from_account
        }
    }
}

/// Friend request as shown to either party
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestView {
    pub id: RelationshipId,
    pub sender: UserView,
    pub receiver: UserView,
    pub status: RelationshipStatus,
    pub outgoing: bool,
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupType {
    /// Auto-managed two-member conversation
    Private,
    Group,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Private => "private",
            GroupType::Group => "group",
        }
    }
}

impl FromStr for GroupType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "private" => Ok(GroupType::Private),
            "group" => Ok(GroupType::Group),
            other => Err(format!("unknown group type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub group_type: GroupType,
    pub image_url: Option<String>,
    pub color_theme: String,
    pub created_at: DateTime<Utc>,
    pub last_message_content: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub is_deleted: bool,
}

/// Per-member state of a group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub group_id: GroupId,
    pub account_id: AccountId,
    pub joined_at: DateTime<Utc>,
    /// Read cursor: messages strictly after it are unread
    pub last_read_time: DateTime<Utc>,
    pub is_muted: bool,
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberView {
    pub user: UserView,
    pub joined_at: DateTime<Utc>,
    pub last_read_time: DateTime<Utc>,
    pub is_muted: bool,
    pub is_admin: bool,
}

/// Group as seen by one member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupView {
    pub id: GroupId,
    pub name: String,
    pub group_type: GroupType,
    pub image_url: Option<String>,
    pub color_theme: String,
    pub created_at: DateTime<Utc>,
    pub last_message: Option<String>,
    pub last_message_time: Option<DateTime<Utc>>,
    pub unread_count: i64,
    pub muted: bool,
    pub admins: Vec<UserView>,
    pub members: Vec<MemberView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<AccountId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    #[default]
    Text,
    Image,
    File,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Text => "text",
            ContentType::Image => "image",
            ContentType::File => "file",
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "image" => Ok(ContentType::Image),
            "file" => Ok(ContentType::File),
            other => Err(format!("unknown content type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    Chat,
    Join,
    Leave,
    Typing,
    System,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Chat => "chat",
            MessageKind::Join => "join",
            MessageKind::Leave => "leave",
            MessageKind::Typing => "typing",
            MessageKind::System => "system",
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(MessageKind::Chat),
            "join" => Ok(MessageKind::Join),
            "leave" => Ok(MessageKind::Leave),
            "typing" => Ok(MessageKind::Typing),
            "system" => Ok(MessageKind::System),
            other => Err(format!("unknown message kind: {}", other)),
        }
    }
}

/// Message payload; each kind carries only the fields valid for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "kind")]
pub enum MessageBody {
    Chat {
        sender: AccountId,
        content: String,
        content_type: ContentType,
        /// Quoted message, stored as an id and resolved lazily
        parent: Option<MessageId>,
    },
    Join {
        account: AccountId,
    },
    Leave {
        account: AccountId,
    },
    Typing {
        account: AccountId,
    },
    System {
        content: String,
    },
}

impl MessageBody {
    pub fn kind(&self) -> MessageKind {
        match self {
            MessageBody::Chat { .. } => MessageKind::Chat,
            MessageBody::Join { .. } => MessageKind::Join,
            MessageBody::Leave { .. } => MessageKind::Leave,
            MessageBody::Typing { .. } => MessageKind::Typing,
            MessageBody::System { .. } => MessageKind::System,
        }
    }

    /// Authoring account; `None` for SYSTEM messages.
    pub fn sender(&self) -> Option<AccountId> {
        match self {
            MessageBody::Chat { sender, .. } => Some(*sender),
            MessageBody::Join { account }
            | MessageBody::Leave { account }
            | MessageBody::Typing { account } => Some(*account),
            MessageBody::System { .. } => None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            MessageBody::Chat { content, .. } | MessageBody::System { content } => Some(content),
            _ => None,
        }
    }

    pub fn content_type(&self) -> Option<ContentType> {
        match self {
            MessageBody::Chat { content_type, .. } => Some(*content_type),
            MessageBody::System { .. } => Some(ContentType::Text),
            _ => None,
        }
    }

    pub fn parent(&self) -> Option<MessageId> {
        match self {
            MessageBody::Chat { parent, .. } => *parent,
            _ => None,
        }
    }
}

/// Entry of the append-only group log, ordered by `(timestamp, id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub group_id: GroupId,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: MessageBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub content_type: ContentType,
    pub parent_id: Option<MessageId>,
}

/// One-level summary of a quoted message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentSummary {
    pub id: MessageId,
    pub kind: MessageKind,
    pub sender: Option<UserView>,
    pub content: Option<String>,
    pub content_type: Option<ContentType>,
}

/// Rendered message as delivered to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageView {
    pub id: MessageId,
    pub group_id: GroupId,
    pub group_name: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub sender: Option<UserView>,
    pub content: Option<String>,
    pub content_type: Option<ContentType>,
    pub parent: Option<ParentSummary>,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendPresence {
    pub user: UserView,
    pub status: UserStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: UserStatus,
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Zero-based page request
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub size: u32,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    pub fn limit(&self) -> i64 {
        self.size.clamp(1, MAX_PAGE_SIZE) as i64
    }

    pub fn offset(&self) -> i64 {
        self.page as i64 * self.limit()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total: u64) -> Self {
        Self {
            items,
            page: request.page,
            size: request.limit() as u32,
            total,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request, 0)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total: self.total,
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserStatus::Online => "ONLINE",
            UserStatus::Away => "AWAY",
            UserStatus::Busy => "BUSY",
            UserStatus::Offline => "OFFLINE",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_request_clamps_size() {
        assert_eq!(PageRequest::new(0, 0).limit(), 1);
        assert_eq!(PageRequest::new(2, 500).limit(), MAX_PAGE_SIZE as i64);
        assert_eq!(PageRequest::new(3, 10).offset(), 30);
    }

    #[test]
    fn test_system_message_has_no_sender() {
        let body = MessageBody::System {
            content: "alice left the group.".into(),
        };
        assert_eq!(body.kind(), MessageKind::System);
        assert_eq!(body.sender(), None);
        assert_eq!(body.parent(), None);
    }

    #[test]
    fn test_message_body_serializes_with_kind_tag() {
        let sender = Uuid::new_v4();
        let body = MessageBody::Chat {
            sender,
            content: "hi".into(),
            content_type: ContentType::Text,
            parent: Some(7),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["kind"], "CHAT");
        assert_eq!(value["parent"], 7);
        assert_eq!(value["content_type"], "TEXT");
    }

    #[test]
    fn test_counterpart() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let edge = Relationship {
            id: Uuid::new_v4(),
            from_account: a,
            to_account: b,
            status: RelationshipStatus::Accepted,
            created_at: Utc::now(),
        };
        assert_eq!(edge.counterpart(a), b);
        assert_eq!(edge.counterpart(b), a);
    }
}
