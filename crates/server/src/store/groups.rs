//! Groups and per-member state

use super::{conflict_on_unique, from_micros, parse_enum, parse_uuid, to_micros};
use crate::error::Result;
use crate::models::{AccountId, Group, GroupId, Membership, Page, PageRequest};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

#[derive(sqlx::FromRow)]
struct GroupRow {
    id: String,
    name: String,
    group_type: String,
    image_url: Option<String>,
    color_theme: String,
    created_at: i64,
    last_message_content: Option<String>,
    last_message_time: Option<i64>,
    is_deleted: bool,
}

impl TryFrom<GroupRow> for Group {
    type Error = crate::error::Error;

    fn try_from(row: GroupRow) -> Result<Self> {
        Ok(Group {
            id: parse_uuid(&row.id)?,
            name: row.name,
            group_type: parse_enum(&row.group_type)?,
            image_url: row.image_url,
            color_theme: row.color_theme,
            created_at: from_micros(row.created_at)?,
            last_message_content: row.last_message_content,
            last_message_time: row.last_message_time.map(from_micros).transpose()?,
            is_deleted: row.is_deleted,
        })
    }
}

#[derive(sqlx::FromRow)]
struct MemberRow {
    group_id: String,
    account_id: String,
    joined_at: i64,
    last_read_time: i64,
    is_muted: bool,
    is_admin: bool,
}

impl TryFrom<MemberRow> for Membership {
    type Error = crate::error::Error;

    fn try_from(row: MemberRow) -> Result<Self> {
        Ok(Membership {
            group_id: parse_uuid(&row.group_id)?,
            account_id: parse_uuid(&row.account_id)?,
            joined_at: from_micros(row.joined_at)?,
            last_read_time: from_micros(row.last_read_time)?,
            is_muted: row.is_muted,
            is_admin: row.is_admin,
        })
    }
}

const GROUP_COLUMNS: &str = "id, name, group_type, image_url, color_theme, created_at, \
     last_message_content, last_message_time, is_deleted";
const MEMBER_COLUMNS: &str = "group_id, account_id, joined_at, last_read_time, is_muted, is_admin";

/// Key that makes a PRIVATE group unique for its two members
pub fn private_key(a: AccountId, b: AccountId) -> String {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b {
        format!("{}:{}", a, b)
    } else {
        format!("{}:{}", b, a)
    }
}

/// Initial member of a group being created
#[derive(Debug, Clone, Copy)]
pub struct InitialMember {
    pub account_id: AccountId,
    pub is_admin: bool,
}

#[derive(Clone)]
pub struct GroupStore {
    pool: SqlitePool,
}

impl GroupStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a group and its initial members in one transaction. A second
    /// PRIVATE group for the same pair fails with `Conflict`.
    pub async fn create(
        &self,
        group: &Group,
        private_key: Option<String>,
        members: &[InitialMember],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO chat_groups (id, name, group_type, image_url, color_theme, created_at, is_deleted, private_key)
             VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(group.id.to_string())
        .bind(&group.name)
        .bind(group.group_type.as_str())
        .bind(&group.image_url)
        .bind(&group.color_theme)
        .bind(to_micros(group.created_at))
        .bind(private_key)
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "a private group already exists for this pair"))?;

        for member in members {
            sqlx::query(
                "INSERT OR IGNORE INTO group_members (group_id, account_id, joined_at, last_read_time, is_muted, is_admin)
                 VALUES (?, ?, ?, ?, 0, ?)",
            )
            .bind(group.id.to_string())
            .bind(member.account_id.to_string())
            .bind(to_micros(group.created_at))
            .bind(to_micros(group.created_at))
            .bind(member.is_admin)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Any group by id, soft-deleted ones included.
    pub async fn find(&self, id: GroupId) -> Result<Option<Group>> {
        let sql = format!("SELECT {} FROM chat_groups WHERE id = ?", GROUP_COLUMNS);
        let row: Option<GroupRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Group::try_from).transpose()
    }

    pub async fn find_private(&self, a: AccountId, b: AccountId) -> Result<Option<Group>> {
        let sql = format!(
            "SELECT {} FROM chat_groups WHERE private_key = ? AND is_deleted = 0",
            GROUP_COLUMNS
        );
        let row: Option<GroupRow> = sqlx::query_as(&sql)
            .bind(private_key(a, b))
            .fetch_optional(&self.pool)
            .await?;
        row.map(Group::try_from).transpose()
    }

    /// Non-deleted groups of `account`, most recent activity first.
    pub async fn groups_for(&self, account: AccountId, page: PageRequest) -> Result<Page<Group>> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM chat_groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.account_id = ? AND g.is_deleted = 0",
        )
        .bind(account.to_string())
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            "SELECT {} FROM chat_groups g
             JOIN group_members m ON m.group_id = g.id
             WHERE m.account_id = ? AND g.is_deleted = 0
             ORDER BY COALESCE(g.last_message_time, g.created_at) DESC, g.id
             LIMIT ? OFFSET ?",
            GROUP_COLUMNS
                .split(", ")
                .map(|c| format!("g.{}", c))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let rows: Vec<GroupRow> = sqlx::query_as(&sql)
            .bind(account.to_string())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows.into_iter().map(Group::try_from).collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, page, total as u64))
    }

    pub async fn set_last_message(&self, id: GroupId, content: &str, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE chat_groups SET last_message_content = ?, last_message_time = ? WHERE id = ?")
            .bind(content)
            .bind(to_micros(at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_name(&self, id: GroupId, name: &str) -> Result<()> {
        sqlx::query("UPDATE chat_groups SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_image(&self, id: GroupId, image_url: &str) -> Result<()> {
        sqlx::query("UPDATE chat_groups SET image_url = ? WHERE id = ?")
            .bind(image_url)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_color_theme(&self, id: GroupId, theme: &str) -> Result<()> {
        sqlx::query("UPDATE chat_groups SET color_theme = ? WHERE id = ?")
            .bind(theme)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn soft_delete(&self, id: GroupId) -> Result<()> {
        sqlx::query("UPDATE chat_groups SET is_deleted = 1 WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -- memberships --

    pub async fn member(&self, group: GroupId, account: AccountId) -> Result<Option<Membership>> {
        let sql = format!(
            "SELECT {} FROM group_members WHERE group_id = ? AND account_id = ?",
            MEMBER_COLUMNS
        );
        let row: Option<MemberRow> = sqlx::query_as(&sql)
            .bind(group.to_string())
            .bind(account.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Membership::try_from).transpose()
    }

    /// Members in join order.
    pub async fn members(&self, group: GroupId) -> Result<Vec<Membership>> {
        let sql = format!(
            "SELECT {} FROM group_members WHERE group_id = ? ORDER BY joined_at, account_id",
            MEMBER_COLUMNS
        );
        let rows: Vec<MemberRow> = sqlx::query_as(&sql)
            .bind(group.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Membership::try_from).collect()
    }

    /// Returns false if the account already was a member.
    pub async fn add_member(&self, group: GroupId, account: AccountId, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO group_members (group_id, account_id, joined_at, last_read_time, is_muted, is_admin)
             VALUES (?, ?, ?, ?, 0, 0)",
        )
        .bind(group.to_string())
        .bind(account.to_string())
        .bind(to_micros(at))
        .bind(to_micros(at))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Returns false if the account was not a member.
    pub async fn remove_member(&self, group: GroupId, account: AccountId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM group_members WHERE group_id = ? AND account_id = ?")
            .bind(group.to_string())
            .bind(account.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn set_admin(&self, group: GroupId, account: AccountId, is_admin: bool) -> Result<()> {
        sqlx::query("UPDATE group_members SET is_admin = ? WHERE group_id = ? AND account_id = ?")
            .bind(is_admin)
            .bind(group.to_string())
            .bind(account.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_muted(&self, group: GroupId, account: AccountId, is_muted: bool) -> Result<()> {
        sqlx::query("UPDATE group_members SET is_muted = ? WHERE group_id = ? AND account_id = ?")
            .bind(is_muted)
            .bind(group.to_string())
            .bind(account.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_last_read(&self, group: GroupId, account: AccountId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE group_members SET last_read_time = ? WHERE group_id = ? AND account_id = ?")
            .bind(to_micros(at))
            .bind(group.to_string())
            .bind(account.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
