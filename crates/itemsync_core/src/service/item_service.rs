//! Item use-case service.
//!
//! # Responsibility
//! - Provide the create/read/update/delete entry points for callers.
//! - Run the incremental sync between remote store and local cache.
//! - Mirror successful remote writes into the local cache.
//!
//! # Invariants
//! - Writes hit the remote store first; the cache is touched only after the
//!   remote call succeeded.
//! - No transaction spans both stores. A failed mirror leaves them diverged
//!   until a later sync overwrites the cache entry by id.
//! - Every failure is logged once here and returned as `ItemServiceError`.

use crate::model::item::{validate_id, validate_name, Item, ItemFields, ItemId, ItemValidationError};
use crate::remote::{RemoteError, RemoteStore, TimestampFilter};
use crate::repo::item_cache::{LocalCache, RepoError};
use crate::sync::clock::{Clock, SystemClock, WriteStamper};
use crate::sync::policy::{self, CursorMode};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Service error for item use-cases.
#[derive(Debug)]
pub enum ItemServiceError {
    /// Input was rejected before any store was touched.
    InvalidInput(ItemValidationError),
    /// The remote call failed; the local cache was not modified.
    Remote(RemoteError),
    /// A local cache read or sync write failed.
    Cache(RepoError),
    /// The remote write succeeded but mirroring it into the cache failed.
    MirrorFailed { id: ItemId, source: RepoError },
}

impl Display for ItemServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(err) => write!(f, "{err}"),
            Self::Remote(err) => write!(f, "{err}"),
            Self::Cache(err) => write!(f, "local cache error: {err}"),
            Self::MirrorFailed { id, source } => write!(
                f,
                "item {id} was saved remotely but the local cache was not updated: {source}"
            ),
        }
    }
}

impl Error for ItemServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(err) => Some(err),
            Self::Remote(err) => Some(err),
            Self::Cache(err) => Some(err),
            Self::MirrorFailed { source, .. } => Some(source),
        }
    }
}

impl From<ItemValidationError> for ItemServiceError {
    fn from(value: ItemValidationError) -> Self {
        Self::InvalidInput(value)
    }
}

impl From<RemoteError> for ItemServiceError {
    fn from(value: RemoteError) -> Self {
        Self::Remote(value)
    }
}

impl From<RepoError> for ItemServiceError {
    fn from(value: RepoError) -> Self {
        Self::Cache(value)
    }
}

impl ItemServiceError {
    /// Short machine-readable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Remote(err) => err.code(),
            Self::Cache(_) => "cache_error",
            Self::MirrorFailed { .. } => "mirror_failed",
        }
    }
}

pub type ServiceResult<T> = Result<T, ItemServiceError>;

/// Result of one sync pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Items returned to the caller, per the active `CursorMode`.
    pub items: Vec<Item>,
    /// Newest cached timestamp before the sync (0 for an empty cache).
    pub cursor: i64,
    /// Number of remote items fetched and upserted.
    pub fetched: usize,
}

/// Result of a full resync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncReport {
    /// Remote items, newest first.
    pub items: Vec<Item>,
    /// Cached rows dropped because the remote store no longer has them.
    pub removed: usize,
}

/// Item service over an injected local cache and remote store.
pub struct ItemService<C: LocalCache, R: RemoteStore> {
    cache: C,
    remote: R,
    stamper: WriteStamper,
    cursor_mode: CursorMode,
}

impl<C: LocalCache, R: RemoteStore> ItemService<C, R> {
    /// Creates a service using wall-clock timestamps and exclusive cursors.
    pub fn new(cache: C, remote: R) -> Self {
        Self::with_clock(cache, remote, Box::new(SystemClock))
    }

    /// Creates a service with a caller-provided clock.
    pub fn with_clock(cache: C, remote: R, clock: Box<dyn Clock>) -> Self {
        Self {
            cache,
            remote,
            stamper: WriteStamper::new(clock),
            cursor_mode: CursorMode::default(),
        }
    }

    /// Selects how the sync cursor handles the timestamp boundary.
    pub fn with_cursor_mode(mut self, mode: CursorMode) -> Self {
        self.cursor_mode = mode;
        self
    }

    pub fn cursor_mode(&self) -> CursorMode {
        self.cursor_mode
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    /// Creates an item remotely, then mirrors it into the cache.
    ///
    /// # Contract
    /// - Returns the server-assigned id.
    /// - Remote failure: nothing is written locally.
    /// - Mirror failure: `MirrorFailed` carries the id of the remote item.
    pub fn create_item(&self, name: &str) -> ServiceResult<ItemId> {
        let fields = ItemFields {
            name: name.to_string(),
            timestamp: self.stamper.next(),
        };
        fields.validate().map_err(|err| log_failure("item_create", None, err.into()))?;

        let id = self
            .remote
            .create(&fields)
            .map_err(|err| log_failure("item_create", None, err.into()))?;

        let item = Item::from_fields(id.clone(), fields);
        if let Err(source) = self.cache.add(&item) {
            return Err(log_failure(
                "item_create",
                Some(&id),
                ItemServiceError::MirrorFailed {
                    id: id.clone(),
                    source,
                },
            ));
        }

        info!(
            "event=item_create module=service status=ok id={} timestamp={}",
            id, item.timestamp
        );
        Ok(id)
    }

    /// Runs one incremental sync and returns the merged item list.
    pub fn get_items(&self) -> ServiceResult<Vec<Item>> {
        self.sync().map(|report| report.items)
    }

    /// Incremental sync: cursor from the cache, fetch newer remote items,
    /// upsert them, then merge per the active `CursorMode`.
    pub fn sync(&self) -> ServiceResult<SyncReport> {
        let started_at = Instant::now();

        let local = self
            .cache
            .list_by_timestamp_desc()
            .map_err(|err| log_failure("item_sync", None, err.into()))?;
        let cursor = policy::cursor_from(&local);
        let filter = policy::remote_filter(self.cursor_mode, cursor);

        let fetched = self
            .remote
            .list_where(filter)
            .map_err(|err| log_failure("item_sync", None, err.into()))?;
        let fetched = keep_cacheable("item_sync", fetched);
        self.cache
            .bulk_upsert(&fetched)
            .map_err(|err| log_failure("item_sync", None, err.into()))?;

        if let Some(newest) = fetched.iter().map(|item| item.timestamp).max() {
            self.stamper.observe(newest);
        }
        self.stamper.observe(cursor);

        let fetched_count = fetched.len();
        let items = policy::merge(self.cursor_mode, local, fetched);
        info!(
            "event=item_sync module=service status=ok cursor={} fetched={} returned={} duration_ms={}",
            cursor,
            fetched_count,
            items.len(),
            started_at.elapsed().as_millis()
        );

        Ok(SyncReport {
            items,
            cursor,
            fetched: fetched_count,
        })
    }

    /// Replaces the cache with the full remote collection.
    ///
    /// This is the only path that drops items deleted by other clients.
    /// Remote documents the cache cannot hold are skipped with a warning.
    pub fn full_resync(&self) -> ServiceResult<ResyncReport> {
        let items = self
            .remote
            .list_all()
            .map_err(|err| log_failure("item_resync", None, err.into()))?;
        let mut items = keep_cacheable("item_resync", items);
        self.cache
            .bulk_upsert(&items)
            .map_err(|err| log_failure("item_resync", None, err.into()))?;

        let keep: Vec<ItemId> = items.iter().filter_map(|item| item.id.clone()).collect();
        let removed = self
            .cache
            .retain_only(&keep)
            .map_err(|err| log_failure("item_resync", None, err.into()))?;

        if let Some(newest) = items.iter().map(|item| item.timestamp).max() {
            self.stamper.observe(newest);
        }
        policy::sort_newest_first(&mut items);
        info!(
            "event=item_resync module=service status=ok items={} removed={}",
            items.len(),
            removed
        );

        Ok(ResyncReport { items, removed })
    }

    /// Returns cached items only, newest first, without contacting the remote.
    pub fn cached_items(&self) -> ServiceResult<Vec<Item>> {
        self.cache
            .list_by_timestamp_desc()
            .map_err(|err| log_failure("item_list_cached", None, err.into()))
    }

    /// Renames an item remotely and refreshes its timestamp, then mirrors it.
    ///
    /// # Contract
    /// - The new timestamp is above every remote timestamp this client can
    ///   see: the cached copy and anything newer than the cache cursor.
    /// - Remote `NotFound` is returned unchanged; the cache is not touched.
    /// - An item missing from the cache is not an error: its new timestamp is
    ///   the newest, so the next sync fetches it.
    pub fn update_item(&self, id: &str, name: &str) -> ServiceResult<()> {
        validate_id(id).map_err(|err| log_failure("item_update", Some(id), err.into()))?;
        validate_name(name).map_err(|err| log_failure("item_update", Some(id), err.into()))?;

        let cached = self
            .cache
            .get(id)
            .map_err(|err| log_failure("item_update", Some(id), err.into()))?;
        if let Some(previous) = &cached {
            self.stamper.observe(previous.timestamp);
        }
        self.raise_stamp_floor()
            .map_err(|err| log_failure("item_update", Some(id), err))?;

        let fields = ItemFields {
            name: name.to_string(),
            timestamp: self.stamper.next(),
        };
        fields
            .validate()
            .map_err(|err| log_failure("item_update", Some(id), err.into()))?;

        self.remote
            .update(id, &fields)
            .map_err(|err| log_failure("item_update", Some(id), err.into()))?;

        match self.cache.update(id, &fields) {
            Ok(()) => {}
            Err(RepoError::NotFound(_)) => {
                debug!("event=item_update module=service status=skip_mirror reason=not_cached id={id}");
            }
            Err(source) => {
                return Err(log_failure(
                    "item_update",
                    Some(id),
                    ItemServiceError::MirrorFailed {
                        id: id.to_string(),
                        source,
                    },
                ));
            }
        }

        info!(
            "event=item_update module=service status=ok id={} timestamp={}",
            id, fields.timestamp
        );
        Ok(())
    }

    /// Observes the cache cursor and every newer remote timestamp.
    ///
    /// Read-only on both stores. Another client may have rewritten an item
    /// with a clock running ahead of ours; stamping above what the remote
    /// holds keeps the rewrite visible to that client's next sync.
    fn raise_stamp_floor(&self) -> ServiceResult<()> {
        let cursor = policy::cursor_from(&self.cache.list_by_timestamp_desc()?);
        self.stamper.observe(cursor);

        let newer = self.remote.list_where(TimestampFilter::After(cursor))?;
        if let Some(newest) = newer.iter().map(|item| item.timestamp).max() {
            self.stamper.observe(newest);
        }
        Ok(())
    }

    /// Deletes an item remotely, then from the cache.
    ///
    /// Deleting an id that neither store knows succeeds.
    pub fn delete_item(&self, id: &str) -> ServiceResult<()> {
        validate_id(id).map_err(|err| log_failure("item_delete", Some(id), err.into()))?;

        self.remote
            .delete(id)
            .map_err(|err| log_failure("item_delete", Some(id), err.into()))?;

        let removed = self.cache.delete(id).map_err(|source| {
            log_failure(
                "item_delete",
                Some(id),
                ItemServiceError::MirrorFailed {
                    id: id.to_string(),
                    source,
                },
            )
        })?;

        info!("event=item_delete module=service status=ok id={id} cached={removed}");
        Ok(())
    }
}

/// Drops fetched documents the cache would reject, logging each one.
fn keep_cacheable(event: &str, fetched: Vec<Item>) -> Vec<Item> {
    fetched
        .into_iter()
        .filter(|item| match item.validate_persisted() {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "event={} module=service status=skip_item id={} error={}",
                    event,
                    item.id.as_deref().unwrap_or("-"),
                    err
                );
                false
            }
        })
        .collect()
}

fn log_failure(event: &str, id: Option<&str>, err: ItemServiceError) -> ItemServiceError {
    error!(
        "event={} module=service status=error id={} error_code={} error={}",
        event,
        id.unwrap_or("-"),
        err.code(),
        err
    );
    err
}
