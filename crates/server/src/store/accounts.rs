//! Account storage and lookup

use super::{conflict_on_unique, from_micros, parse_uuid, to_micros};
use crate::error::Result;
use crate::models::{Account, AccountId, NewAccount, Page, PageRequest};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// Resolves accounts for the rest of the core and the transport.
#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn by_id(&self, id: AccountId) -> Result<Option<Account>>;
    async fn by_username(&self, username: &str) -> Result<Option<Account>>;
    async fn by_email(&self, email: &str) -> Result<Option<Account>>;
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    username: String,
    name: String,
    surname: String,
    email: String,
    password_hash: String,
    provider_id: Option<String>,
    created_at: i64,
    last_seen_at: Option<i64>,
}

impl TryFrom<AccountRow> for Account {
    type Error = crate::error::Error;

    fn try_from(row: AccountRow) -> Result<Self> {
        Ok(Account {
            id: parse_uuid(&row.id)?,
            username: row.username,
            name: row.name,
            surname: row.surname,
            email: row.email,
            password_hash: row.password_hash,
            provider_id: row.provider_id,
            created_at: from_micros(row.created_at)?,
            last_seen_at: row.last_seen_at.map(from_micros).transpose()?,
        })
    }
}

const COLUMNS: &str =
    "id, username, name, surname, email, password_hash, provider_id, created_at, last_seen_at";

#[derive(Clone)]
pub struct AccountStore {
    pool: SqlitePool,
}

impl AccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register an account. Username and email are unique.
    pub async fn create(&self, new: NewAccount, now: DateTime<Utc>) -> Result<Account> {
        let account = Account {
            id: Uuid::new_v4(),
            username: new.username,
            name: new.name,
            surname: new.surname,
            email: new.email,
            password_hash: new.password_hash,
            provider_id: new.provider_id,
            created_at: now,
            last_seen_at: None,
        };

        sqlx::query(
            "INSERT INTO accounts (id, username, name, surname, email, password_hash, provider_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(account.id.to_string())
        .bind(&account.username)
        .bind(&account.name)
        .bind(&account.surname)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.provider_id)
        .bind(to_micros(account.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "username or email already registered"))?;

        info!("[Accounts] Registered {} ({})", account.username, account.id);
        Ok(account)
    }

    pub async fn touch_last_seen(&self, id: AccountId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE accounts SET last_seen_at = ? WHERE id = ?")
            .bind(to_micros(at))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Accounts for the given ids; unknown ids are skipped.
    pub async fn by_ids(&self, ids: &[AccountId]) -> Result<Vec<Account>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM accounts WHERE id IN (", COLUMNS));
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(") ORDER BY username");

        let rows: Vec<AccountRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Account::try_from).collect()
    }

    /// Case-insensitive prefix match on name, surname or username, minus
    /// the excluded ids.
    pub async fn search_candidates(
        &self,
        query: &str,
        excluded: &HashSet<AccountId>,
        page: PageRequest,
    ) -> Result<Page<Account>> {
        let pattern = format!("{}%", escape_like(&query.to_lowercase()));

        let mut count_qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM accounts WHERE ");
        push_search_filter(&mut count_qb, &pattern, excluded);
        let (total,): (i64,) = count_qb.build_query_as().fetch_one(&self.pool).await?;

        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT {} FROM accounts WHERE ", COLUMNS));
        push_search_filter(&mut qb, &pattern, excluded);
        qb.push(" ORDER BY name, surname, username LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows: Vec<AccountRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(Account::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page::new(items, page, total as u64))
    }

    async fn fetch_by(&self, column: &str, value: String) -> Result<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE {} = ?", COLUMNS, column);
        let row: Option<AccountRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Account::try_from).transpose()
    }
}

#[async_trait]
impl AccountLookup for AccountStore {
    async fn by_id(&self, id: AccountId) -> Result<Option<Account>> {
        self.fetch_by("id", id.to_string()).await
    }

    async fn by_username(&self, username: &str) -> Result<Option<Account>> {
        self.fetch_by("username", username.to_string()).await
    }

    async fn by_email(&self, email: &str) -> Result<Option<Account>> {
        self.fetch_by("email", email.to_string()).await
    }
}

fn push_search_filter(qb: &mut QueryBuilder<'_, Sqlite>, pattern: &str, excluded: &HashSet<AccountId>) {
    qb.push("(LOWER(name) LIKE ");
    qb.push_bind(pattern.to_string());
    qb.push(" ESCAPE '\\' OR LOWER(surname) LIKE ");
    qb.push_bind(pattern.to_string());
    qb.push(" ESCAPE '\\' OR LOWER(username) LIKE ");
    qb.push_bind(pattern.to_string());
    qb.push(" ESCAPE '\\')");

    if !excluded.is_empty() {
        qb.push(" AND id NOT IN (");
        let mut separated = qb.separated(", ");
        for id in excluded {
            separated.push_bind(id.to_string());
        }
        separated.push_unseparated(")");
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
