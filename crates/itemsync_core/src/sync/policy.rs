//! Incremental sync policy between the local cache and the remote store.
//!
//! # Responsibility
//! - Derive the timestamp cursor from a newest-first cache read.
//! - Choose the remote filter for that cursor.
//! - Merge the cache read with freshly fetched remote items.
//!
//! # Invariants
//! - The cursor is the newest cached timestamp, or 0 for an empty cache.
//! - `Exclusive` returns `local ++ fetched` untouched, duplicates included.
//! - `InclusiveDedup` returns each id once; fetched items win.

use crate::model::item::Item;
use crate::remote::TimestampFilter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How the sync cursor treats items sharing the newest cached timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorMode {
    /// Fetch `timestamp > cursor` and concatenate.
    ///
    /// A remote item written at exactly the cursor timestamp after the cache
    /// read is never fetched by an incremental sync.
    #[default]
    Exclusive,
    /// Fetch `timestamp >= cursor` and merge by id.
    InclusiveDedup,
}

/// Returns the cursor for a cache read ordered newest first.
pub fn cursor_from(local_desc: &[Item]) -> i64 {
    local_desc.first().map_or(0, |item| item.timestamp)
}

/// Returns the remote filter for `cursor` under `mode`.
pub fn remote_filter(mode: CursorMode, cursor: i64) -> TimestampFilter {
    match mode {
        CursorMode::Exclusive => TimestampFilter::After(cursor),
        CursorMode::InclusiveDedup => TimestampFilter::AtOrAfter(cursor),
    }
}

/// Combines the cache read and the fetched items into the sync result.
pub fn merge(mode: CursorMode, local_desc: Vec<Item>, fetched: Vec<Item>) -> Vec<Item> {
    match mode {
        CursorMode::Exclusive => {
            let mut items = local_desc;
            items.extend(fetched);
            items
        }
        CursorMode::InclusiveDedup => dedup_by_id(local_desc, fetched),
    }
}

/// Sorts newest first; items sharing a timestamp are ordered by id, descending.
pub fn sort_newest_first(items: &mut [Item]) {
    items.sort_by(|left, right| {
        right
            .timestamp
            .cmp(&left.timestamp)
            .then_with(|| right.id.cmp(&left.id))
    });
}

fn dedup_by_id(local: Vec<Item>, fetched: Vec<Item>) -> Vec<Item> {
    let mut by_id: HashMap<Option<String>, Item> = HashMap::with_capacity(local.len());
    for item in local.into_iter().chain(fetched) {
        by_id.insert(item.id.clone(), item);
    }
    let mut items: Vec<Item> = by_id.into_values().collect();
    sort_newest_first(&mut items);
    items
}
