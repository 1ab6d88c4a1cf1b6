//! SQLite file backing the local item cache.
//!
//! The cache holds one table:
//!
//! ```text
//! items(id TEXT PRIMARY KEY, name TEXT, timestamp INTEGER CHECK (timestamp >= 0))
//! ```
//!
//! `id` is the remote document id, so a cached row is always a copy of a
//! remote document. `timestamp` is indexed because every sync reads the
//! newest row to derive its cursor.
//!
//! # Invariants
//! - The schema version lives in `PRAGMA user_version`; 0 means empty file.
//! - Connections handed out by `open_db*` are migrated to `latest_version()`.
//! - A file stamped by a newer binary is refused instead of downgraded.

use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

/// Name of the cache table created by migration 1.
pub const ITEMS_TABLE: &str = "items";

pub type DbResult<T> = Result<T, DbError>;

/// Failure to open or migrate the cache file.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// The file was migrated by a newer binary.
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "cache file has schema version {db_version} but this build only knows \
                 up to {latest_supported}; delete the cache file to rebuild it from the remote store"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Reads the schema version stamped on `conn`.
pub fn schema_version(conn: &Connection) -> DbResult<u32> {
    Ok(conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?)
}

/// Reports whether the cache table exists on `conn`.
pub fn has_items_table(conn: &Connection) -> DbResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
        [ITEMS_TABLE],
        |row| row.get(0),
    )?)
}
