//! Relational storage
//!
//! SQLite via sqlx. Each store is a cheap handle around the shared pool and
//! exposes finder-style calls; no store holds a connection across calls.

pub mod accounts;
pub mod groups;
pub mod messages;
pub mod relationships;
pub mod schema;

pub use accounts::{AccountLookup, AccountStore};
pub use groups::GroupStore;
pub use messages::MessageStore;
pub use relationships::RelationshipStore;

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

/// Open (creating if missing) the database at `url` and apply the schema.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new().connect_with(options).await?;
    schema::migrate(&pool).await?;
    info!("[Store] Connected to {}", url);
    Ok(pool)
}

/// Private in-memory database. Pinned to one connection that never idles
/// out, since every SQLite memory connection is its own database.
pub async fn connect_memory() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    schema::migrate(&pool).await?;
    Ok(pool)
}

pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| Error::StorageFailure(format!("timestamp out of range: {}", micros)))
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::StorageFailure(format!("bad id {:?}: {}", raw, e)))
}

pub(crate) fn parse_enum<T: FromStr<Err = String>>(raw: &str) -> Result<T> {
    raw.parse().map_err(Error::StorageFailure)
}

/// Map a unique-constraint violation to `Conflict`, anything else through
/// the usual conversion.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => Error::Conflict(what.to_string()),
        _ => err.into(),
    }
}
