//! Append-only message log

use super::{from_micros, parse_enum, parse_uuid, to_micros};
use crate::error::{Error, Result};
use crate::models::{
    AccountId, ContentType, GroupId, Message, MessageBody, MessageId, MessageKind, Page, PageRequest,
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    group_id: String,
    kind: String,
    sender_id: Option<String>,
    content: Option<String>,
    content_type: Option<String>,
    parent_id: Option<i64>,
    timestamp: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        let kind: MessageKind = parse_enum(&row.kind)?;
        let sender = row.sender_id.as_deref().map(parse_uuid).transpose()?;
        let missing = |field: &str| Error::StorageFailure(format!("message {} has no {}", row.id, field));

        let body = match kind {
            MessageKind::Chat => MessageBody::Chat {
                sender: sender.ok_or_else(|| missing("sender"))?,
                content: row.content.clone().unwrap_or_default(),
                content_type: row
                    .content_type
                    .as_deref()
                    .map(parse_enum::<ContentType>)
                    .transpose()?
                    .unwrap_or_default(),
                parent: row.parent_id,
            },
            MessageKind::Join => MessageBody::Join {
                account: sender.ok_or_else(|| missing("account"))?,
            },
            MessageKind::Leave => MessageBody::Leave {
                account: sender.ok_or_else(|| missing("account"))?,
            },
            MessageKind::Typing => MessageBody::Typing {
                account: sender.ok_or_else(|| missing("account"))?,
            },
            MessageKind::System => MessageBody::System {
                content: row.content.clone().unwrap_or_default(),
            },
        };

        Ok(Message {
            id: row.id,
            group_id: parse_uuid(&row.group_id)?,
            timestamp: from_micros(row.timestamp)?,
            body,
        })
    }
}

const COLUMNS: &str = "id, group_id, kind, sender_id, content, content_type, parent_id, timestamp";

#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append to the group's log; the id is assigned here.
    pub async fn append(&self, group: GroupId, at: DateTime<Utc>, body: MessageBody) -> Result<Message> {
        let result = sqlx::query(
            "INSERT INTO messages (group_id, kind, sender_id, content, content_type, parent_id, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(group.to_string())
        .bind(body.kind().as_str())
        .bind(body.sender().map(|id| id.to_string()))
        .bind(body.content())
        .bind(body.content_type().map(|t| t.as_str()))
        .bind(body.parent())
        .bind(to_micros(at))
        .execute(&self.pool)
        .await?;

        Ok(Message {
            id: result.last_insert_rowid(),
            group_id: group,
            timestamp: at,
            body,
        })
    }

    pub async fn find(&self, id: MessageId) -> Result<Option<Message>> {
        let sql = format!("SELECT {} FROM messages WHERE id = ?", COLUMNS);
        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Message::try_from).transpose()
    }

    /// Messages for the given ids; unknown ids are skipped.
    pub async fn find_many(&self, ids: &[MessageId]) -> Result<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM messages WHERE id IN (", COLUMNS));
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");

        let rows: Vec<MessageRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Message::try_from).collect()
    }

    /// Newest-first page of the group's log.
    pub async fn page_desc(&self, group: GroupId, page: PageRequest) -> Result<Page<Message>> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages WHERE group_id = ?")
            .bind(group.to_string())
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {} FROM messages WHERE group_id = ?
             ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?",
            COLUMNS
        );
        let rows: Vec<MessageRow> = sqlx::query_as(&sql)
            .bind(group.to_string())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows.into_iter().map(Message::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, page, total as u64))
    }

    /// CHAT messages by other members strictly after the cursor.
    pub async fn count_unread(&self, group: GroupId, account: AccountId, after: DateTime<Utc>) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages
             WHERE group_id = ? AND kind = 'chat' AND timestamp > ? AND sender_id <> ?",
        )
        .bind(group.to_string())
        .bind(to_micros(after))
        .bind(account.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    /// Most recent message of the group, if any.
    pub async fn latest(&self, group: GroupId) -> Result<Option<Message>> {
        let sql = format!(
            "SELECT {} FROM messages WHERE group_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
            COLUMNS
        );
        let row: Option<MessageRow> = sqlx::query_as(&sql)
            .bind(group.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Message::try_from).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Group, GroupType, NewAccount};
    use crate::store::groups::InitialMember;
    use crate::store::{connect_memory, AccountStore, GroupStore};
    use chrono::Duration;
    use uuid::Uuid;

    async fn seeded() -> (MessageStore, GroupId, AccountId, AccountId) {
        let pool = connect_memory().await.unwrap();
        let accounts = AccountStore::new(pool.clone());
        let mut ids = Vec::new();
        for name in ["alice", "bob"] {
            let account = accounts
                .create(
                    NewAccount {
                        username: name.into(),
                        name: name.into(),
                        surname: "T".into(),
                        email: format!("{}@example.com", name),
                        password_hash: "x".into(),
                        provider_id: None,
                    },
                    Utc::now(),
                )
                .await
                .unwrap();
            ids.push(account.id);
        }

        let group = Group {
            id: Uuid::new_v4(),
            name: "g".into(),
            group_type: GroupType::Group,
            image_url: None,
            color_theme: "#3B82F6".into(),
            created_at: Utc::now(),
            last_message_content: None,
            last_message_time: None,
            is_deleted: false,
        };
        let members: Vec<_> = ids
            .iter()
            .map(|id| InitialMember { account_id: *id, is_admin: false })
            .collect();
        GroupStore::new(pool.clone()).create(&group, None, &members).await.unwrap();

        (MessageStore::new(pool), group.id, ids[0], ids[1])
    }

    fn chat(sender: AccountId, content: &str) -> MessageBody {
        MessageBody::Chat {
            sender,
            content: content.into(),
            content_type: ContentType::Text,
            parent: None,
        }
    }

    #[tokio::test]
    async fn test_same_timestamp_orders_by_id() {
        let (store, group, alice, _) = seeded().await;
        let at = Utc::now();
        let first = store.append(group, at, chat(alice, "one")).await.unwrap();
        let second = store.append(group, at, chat(alice, "two")).await.unwrap();
        assert!(second.id > first.id);

        let page = store.page_desc(group, PageRequest::default()).await.unwrap();
        let ids: Vec<_> = page.items.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
        assert_eq!(store.latest(group).await.unwrap().unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_unread_skips_own_and_system_messages() {
        let (store, group, alice, bob) = seeded().await;
        let cursor = Utc::now();
        let later = cursor + Duration::seconds(1);

        store.append(group, later, chat(alice, "mine")).await.unwrap();
        store.append(group, later, chat(bob, "theirs")).await.unwrap();
        store
            .append(group, later, MessageBody::System { content: "renamed".into() })
            .await
            .unwrap();
        store.append(group, cursor, chat(bob, "already read")).await.unwrap();

        assert_eq!(store.count_unread(group, alice, cursor).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_system_message_round_trips_without_sender() {
        let (store, group, _, _) = seeded().await;
        let stored = store
            .append(group, Utc::now(), MessageBody::System { content: "hello".into() })
            .await
            .unwrap();
        let loaded = store.find(stored.id).await.unwrap().unwrap();
        assert_eq!(loaded.body, MessageBody::System { content: "hello".into() });
        assert!(store.find_many(&[stored.id, 9999]).await.unwrap().len() == 1);
    }
}
