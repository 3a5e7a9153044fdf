//! Relationship edges between accounts

use super::{conflict_on_unique, from_micros, parse_enum, parse_uuid, to_micros};
use crate::error::Result;
use crate::models::{AccountId, Page, PageRequest, Relationship, RelationshipId, RelationshipStatus};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashSet;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct RelationshipRow {
    id: String,
    from_account: String,
    to_account: String,
    status: String,
    created_at: i64,
}

impl TryFrom<RelationshipRow> for Relationship {
    type Error = crate::error::Error;

    fn try_from(row: RelationshipRow) -> Result<Self> {
        Ok(Relationship {
            id: parse_uuid(&row.id)?,
            from_account: parse_uuid(&row.from_account)?,
            to_account: parse_uuid(&row.to_account)?,
            status: parse_enum(&row.status)?,
            created_at: from_micros(row.created_at)?,
        })
    }
}

const COLUMNS: &str = "id, from_account, to_account, status, created_at";

/// Which side of the edge the account must be on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Either,
}

impl Direction {
    fn clause(&self) -> &'static str {
        match self {
            Direction::Outgoing => "from_account = ?1",
            Direction::Incoming => "to_account = ?1",
            Direction::Either => "(from_account = ?1 OR to_account = ?1)",
        }
    }
}

/// Normalized unordered pair key
fn pair_key(a: AccountId, b: AccountId) -> (String, String) {
    let (a, b) = (a.to_string(), b.to_string());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Clone)]
pub struct RelationshipStore {
    pool: SqlitePool,
}

impl RelationshipStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, id: RelationshipId) -> Result<Option<Relationship>> {
        let sql = format!("SELECT {} FROM relationships WHERE id = ?", COLUMNS);
        let row: Option<RelationshipRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Relationship::try_from).transpose()
    }

    /// The directed edge `from -> to`, if any.
    pub async fn find_directed(&self, from: AccountId, to: AccountId) -> Result<Option<Relationship>> {
        let sql = format!(
            "SELECT {} FROM relationships WHERE from_account = ? AND to_account = ?",
            COLUMNS
        );
        let row: Option<RelationshipRow> = sqlx::query_as(&sql)
            .bind(from.to_string())
            .bind(to.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Relationship::try_from).transpose()
    }

    /// Insert a new edge. A second edge for the same unordered pair is
    /// rejected by the pair constraint with `Conflict`.
    pub async fn insert(
        &self,
        from: AccountId,
        to: AccountId,
        status: RelationshipStatus,
        now: DateTime<Utc>,
    ) -> Result<Relationship> {
        let relationship = Relationship {
            id: Uuid::new_v4(),
            from_account: from,
            to_account: to,
            status,
            created_at: now,
        };
        let (low, high) = pair_key(from, to);

        sqlx::query(
            "INSERT INTO relationships (id, from_account, to_account, pair_low, pair_high, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(relationship.id.to_string())
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(low)
        .bind(high)
        .bind(status.as_str())
        .bind(to_micros(now))
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "a relationship already exists for this pair"))?;

        Ok(relationship)
    }

    pub async fn set_status(&self, id: RelationshipId, status: RelationshipStatus) -> Result<()> {
        sqlx::query("UPDATE relationships SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, id: RelationshipId) -> Result<()> {
        sqlx::query("DELETE FROM relationships WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete edges of the given status between the pair, in both directions.
    pub async fn delete_pair_with_status(
        &self,
        a: AccountId,
        b: AccountId,
        status: RelationshipStatus,
    ) -> Result<u64> {
        let (low, high) = pair_key(a, b);
        let result = sqlx::query(
            "DELETE FROM relationships WHERE pair_low = ? AND pair_high = ? AND status = ?",
        )
        .bind(low)
        .bind(high)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Edges of `status` touching `account` on the given side, newest first.
    pub async fn list(
        &self,
        account: AccountId,
        direction: Direction,
        status: RelationshipStatus,
        page: PageRequest,
    ) -> Result<Page<Relationship>> {
        let count_sql = format!(
            "SELECT COUNT(*) FROM relationships WHERE {} AND status = ?2",
            direction.clause()
        );
        let (total,): (i64,) = sqlx::query_as(&count_sql)
            .bind(account.to_string())
            .bind(status.as_str())
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {} FROM relationships WHERE {} AND status = ?2
             ORDER BY created_at DESC, id LIMIT ?3 OFFSET ?4",
            COLUMNS,
            direction.clause()
        );
        let rows: Vec<RelationshipRow> = sqlx::query_as(&sql)
            .bind(account.to_string())
            .bind(status.as_str())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .into_iter()
            .map(Relationship::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page::new(items, page, total as u64))
    }

    /// Every edge touching `account`, any status.
    pub async fn all_involving(&self, account: AccountId) -> Result<Vec<Relationship>> {
        let sql = format!(
            "SELECT {} FROM relationships WHERE from_account = ?1 OR to_account = ?1",
            COLUMNS
        );
        let rows: Vec<RelationshipRow> = sqlx::query_as(&sql)
            .bind(account.to_string())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Relationship::try_from).collect()
    }

    /// Counterparts of every ACCEPTED edge touching `account`.
    pub async fn friend_ids(&self, account: AccountId) -> Result<Vec<AccountId>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT from_account, to_account FROM relationships
             WHERE (from_account = ?1 OR to_account = ?1) AND status = 'accepted'",
        )
        .bind(account.to_string())
        .fetch_all(&self.pool)
        .await?;

        let me = account.to_string();
        rows.into_iter()
            .map(|(from, to)| if from == me { parse_uuid(&to) } else { parse_uuid(&from) })
            .collect()
    }

    /// Accounts on the other end of a BLOCKED edge, whoever placed it.
    pub async fn blocked_ids(&self, account: AccountId) -> Result<HashSet<AccountId>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT from_account, to_account FROM relationships
             WHERE (from_account = ?1 OR to_account = ?1) AND status = 'blocked'",
        )
        .bind(account.to_string())
        .fetch_all(&self.pool)
        .await?;

        let me = account.to_string();
        rows.into_iter()
            .map(|(from, to)| if from == me { parse_uuid(&to) } else { parse_uuid(&from) })
            .collect()
    }

    /// True when either account has blocked the other.
    pub async fn is_blocked(&self, a: AccountId, b: AccountId) -> Result<bool> {
        let (low, high) = pair_key(a, b);
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM relationships WHERE pair_low = ? AND pair_high = ? AND status = 'blocked'",
        )
        .bind(low)
        .bind(high)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }
}
