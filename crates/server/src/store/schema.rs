use crate::error::Result;
use sqlx::SqlitePool;

/// Timestamps are INTEGER microseconds since the epoch so that cursor
/// comparisons and `(timestamp, id)` ordering are exact.
const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        surname TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        password_hash TEXT NOT NULL,
        provider_id TEXT,
        created_at INTEGER NOT NULL,
        last_seen_at INTEGER
    )
    "#,
    // pair_low/pair_high is the unordered pair; one edge per pair at a time.
    r#"
    CREATE TABLE IF NOT EXISTS relationships (
        id TEXT PRIMARY KEY,
        from_account TEXT NOT NULL REFERENCES accounts(id),
        to_account TEXT NOT NULL REFERENCES accounts(id),
        pair_low TEXT NOT NULL,
        pair_high TEXT NOT NULL,
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE(pair_low, pair_high)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_relationships_from ON relationships(from_account, status)",
    "CREATE INDEX IF NOT EXISTS idx_relationships_to ON relationships(to_account, status)",
    // private_key is set only for PRIVATE groups, making them unique per pair.
    r#"
    CREATE TABLE IF NOT EXISTS chat_groups (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        group_type TEXT NOT NULL,
        image_url TEXT,
        color_theme TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        last_message_content TEXT,
        last_message_time INTEGER,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        private_key TEXT UNIQUE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS group_members (
        group_id TEXT NOT NULL REFERENCES chat_groups(id),
        account_id TEXT NOT NULL REFERENCES accounts(id),
        joined_at INTEGER NOT NULL,
        last_read_time INTEGER NOT NULL,
        is_muted INTEGER NOT NULL DEFAULT 0,
        is_admin INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (group_id, account_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_group_members_account ON group_members(account_id)",
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        group_id TEXT NOT NULL REFERENCES chat_groups(id),
        kind TEXT NOT NULL,
        sender_id TEXT REFERENCES accounts(id),
        content TEXT,
        content_type TEXT,
        parent_id INTEGER REFERENCES messages(id),
        timestamp INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_group_time ON messages(group_id, timestamp, id)",
];

pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let pool = crate::store::connect_memory().await.unwrap();
        migrate(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        let names: Vec<_> = tables.into_iter().map(|(n,)| n).collect();
        assert_eq!(
            names,
            vec!["accounts", "chat_groups", "group_members", "messages", "relationships"]
        );
    }
}
