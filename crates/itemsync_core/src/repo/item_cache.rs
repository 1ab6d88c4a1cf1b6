//! Local item cache contracts and SQLite implementation.
//!
//! # Responsibility
//! - Mirror remote items into an ordered, id-keyed local table.
//! - Keep SQL details inside the cache boundary.
//!
//! # Invariants
//! - Write paths validate item identity before SQL mutations.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - Listing order is `timestamp DESC, id DESC`: newest first, and rows
//!   sharing a timestamp come back in reverse key order.

use crate::db::migrations::latest_version;
use crate::db::{has_items_table, schema_version, DbError, ITEMS_TABLE};
use crate::model::item::{validate_id, Item, ItemFields, ItemId, ItemValidationError};
use rusqlite::{params, Connection, ErrorCode, Row};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

const ITEM_SELECT_SQL: &str = "SELECT id, name, timestamp FROM items";

pub type RepoResult<T> = Result<T, RepoError>;

/// Error for local cache persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ItemValidationError),
    Db(DbError),
    NotFound(ItemId),
    Duplicate(ItemId),
    InvalidData(String),
    /// Connection was not opened through `db::open_db*`.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "cached item not found: {id}"),
            Self::Duplicate(id) => write!(f, "cached item already exists: {id}"),
            Self::InvalidData(message) => write!(f, "invalid cached item data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "cache connection has schema version {actual_version}, expected {expected_version}"
            ),
            Self::MissingRequiredTable(table) => write!(f, "cache table `{table}` is missing"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ItemValidationError> for RepoError {
    fn from(value: ItemValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Ordered local table of items keyed by remote id.
pub trait LocalCache {
    /// Inserts one item. Fails with `Duplicate` when the id is already cached.
    fn add(&self, item: &Item) -> RepoResult<()>;
    /// Inserts or replaces every item by id, atomically.
    fn bulk_upsert(&self, items: &[Item]) -> RepoResult<()>;
    /// Replaces name and timestamp of a cached item.
    fn update(&self, id: &str, fields: &ItemFields) -> RepoResult<()>;
    /// Deletes one item and reports whether a row was removed.
    fn delete(&self, id: &str) -> RepoResult<bool>;
    fn get(&self, id: &str) -> RepoResult<Option<Item>>;
    /// Returns every cached item, newest first.
    fn list_by_timestamp_desc(&self) -> RepoResult<Vec<Item>>;
    /// Drops every row whose id is not in `keep` and returns the removed count.
    fn retain_only(&self, keep: &[ItemId]) -> RepoResult<usize>;
}

/// SQLite-backed item cache.
pub struct SqliteItemCache<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteItemCache<'conn> {
    /// Wraps a connection without checking its schema.
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Wraps a connection after checking that migrations were applied.
    ///
    /// # Errors
    /// - `UninitializedConnection` when `PRAGMA user_version` is behind.
    /// - `MissingRequiredTable` when the `items` table is absent.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        let actual_version = schema_version(conn)?;
        let expected_version = latest_version();
        if actual_version < expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }
        if !has_items_table(conn)? {
            return Err(RepoError::MissingRequiredTable(ITEMS_TABLE));
        }

        Ok(Self { conn })
    }
}

impl LocalCache for SqliteItemCache<'_> {
    fn add(&self, item: &Item) -> RepoResult<()> {
        item.validate_persisted()?;
        let id = item.require_id()?;

        let inserted = self.conn.execute(
            "INSERT INTO items (id, name, timestamp) VALUES (?1, ?2, ?3);",
            params![id, item.name.as_str(), item.timestamp],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(err) if is_constraint_violation(&err) => Err(RepoError::Duplicate(id.to_string())),
            Err(err) => Err(err.into()),
        }
    }

    fn bulk_upsert(&self, items: &[Item]) -> RepoResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        for item in items {
            item.validate_persisted()?;
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO items (id, name, timestamp) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    timestamp = excluded.timestamp;",
            )?;
            for item in items {
                stmt.execute(params![item.require_id()?, item.name.as_str(), item.timestamp])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn update(&self, id: &str, fields: &ItemFields) -> RepoResult<()> {
        validate_id(id)?;

        let changed = self.conn.execute(
            "UPDATE items SET name = ?1, timestamp = ?2 WHERE id = ?3;",
            params![fields.name.as_str(), fields.timestamp, id],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> RepoResult<bool> {
        let changed = self
            .conn
            .execute("DELETE FROM items WHERE id = ?1;", [id])?;
        Ok(changed > 0)
    }

    fn get(&self, id: &str) -> RepoResult<Option<Item>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn list_by_timestamp_desc(&self) -> RepoResult<Vec<Item>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ITEM_SELECT_SQL} ORDER BY timestamp DESC, id DESC;"))?;
        let mut rows = stmt.query([])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }
        Ok(items)
    }

    fn retain_only(&self, keep: &[ItemId]) -> RepoResult<usize> {
        let keep: HashSet<&str> = keep.iter().map(String::as_str).collect();
        let cached_ids = {
            let mut stmt = self.conn.prepare("SELECT id FROM items;")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            ids
        };

        let tx = self.conn.unchecked_transaction()?;
        let mut removed = 0;
        for id in cached_ids.iter().filter(|id| !keep.contains(id.as_str())) {
            removed += tx.execute("DELETE FROM items WHERE id = ?1;", [id])?;
        }
        tx.commit()?;
        Ok(removed)
    }
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<Item> {
    let item = Item {
        id: Some(row.get("id")?),
        name: row.get("name")?,
        timestamp: row.get("timestamp")?,
    };
    item.validate_persisted().map_err(|err| {
        RepoError::InvalidData(format!("row {:?} failed validation: {err}", item.id))
    })?;
    Ok(item)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == ErrorCode::ConstraintViolation
    )
}
