use itemsync_core::db::open_db_in_memory;
use itemsync_core::{
    Clock, CursorMode, Item, ItemFields, ItemId, ItemService, ItemServiceError,
    ItemValidationError, LocalCache, MemoryRemoteStore, RemoteError, RemoteStore, RepoError,
    RepoResult, SqliteItemCache,
};
use rusqlite::Connection;
use std::cell::Cell;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Clock the test advances by hand.
#[derive(Clone, Default)]
struct ManualClock(Rc<Cell<i64>>);

impl ManualClock {
    fn at(ms: i64) -> Self {
        Self(Rc::new(Cell::new(ms)))
    }

    fn set(&self, ms: i64) {
        self.0.set(ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.0.get()
    }
}

fn service<'conn>(
    conn: &'conn Connection,
    remote: &MemoryRemoteStore,
    clock: &ManualClock,
) -> ItemService<SqliteItemCache<'conn>, MemoryRemoteStore> {
    ItemService::with_clock(
        SqliteItemCache::try_new(conn).unwrap(),
        remote.clone(),
        Box::new(clock.clone()),
    )
}

fn ids(items: &[Item]) -> BTreeSet<String> {
    items.iter().filter_map(|item| item.id.clone()).collect()
}

fn fields(name: &str, timestamp: i64) -> ItemFields {
    ItemFields {
        name: name.to_string(),
        timestamp,
    }
}

#[test]
fn create_update_delete_scenario() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    let id = service.create_item("A").unwrap();
    let items = service.get_items().unwrap();
    let created = items
        .iter()
        .find(|item| item.id.as_deref() == Some(id.as_str()))
        .expect("created item should be listed");
    assert_eq!(created.name, "A");
    let t0 = created.timestamp;
    assert_eq!(t0, 1_000);

    clock.set(2_000);
    service.update_item(&id, "B").unwrap();
    let items = service.get_items().unwrap();
    let updated = items
        .iter()
        .find(|item| item.id.as_deref() == Some(id.as_str()))
        .expect("updated item should be listed");
    assert_eq!(updated.name, "B");
    assert!(updated.timestamp > t0);

    service.delete_item(&id).unwrap();
    let items = service.get_items().unwrap();
    assert!(!ids(&items).contains(&id));
    assert!(remote.list_all().unwrap().is_empty());
    assert!(service.cached_items().unwrap().is_empty());
}

#[test]
fn created_ids_are_a_subset_of_synced_ids() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    let created: BTreeSet<ItemId> = ["A", "B", "C"]
        .into_iter()
        .map(|name| service.create_item(name).unwrap())
        .collect();

    let synced = ids(&service.get_items().unwrap());
    assert!(synced.is_superset(&created));
}

#[test]
fn update_in_same_millisecond_still_advances_timestamp() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(5_000);
    let service = service(&conn, &remote, &clock);

    let id = service.create_item("A").unwrap();
    service.update_item(&id, "B").unwrap();

    let cached = service.cache().get(&id).unwrap().unwrap();
    assert_eq!(cached.name, "B");
    assert!(cached.timestamp > 5_000);
}

#[test]
fn sync_twice_without_writes_returns_same_set() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    remote.insert_document("r1", fields("Remote 1", 10));
    remote.insert_document("r2", fields("Remote 2", 20));
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    let first = service.sync().unwrap();
    assert_eq!(first.cursor, 0);
    assert_eq!(first.fetched, 2);

    let second = service.sync().unwrap();
    assert_eq!(second.cursor, 20);
    assert_eq!(second.fetched, 0);
    assert_eq!(ids(&first.items), ids(&second.items));
    assert_eq!(first.items.len(), second.items.len());
}

#[test]
fn second_client_sees_first_client_writes_after_sync() {
    let conn_a = open_db_in_memory().unwrap();
    let conn_b = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(1_000);
    let client_a = service(&conn_a, &remote, &clock);
    let client_b = service(&conn_b, &remote, &clock);

    let id = client_a.create_item("from a").unwrap();
    assert!(client_b.cached_items().unwrap().is_empty());

    let seen = client_b.get_items().unwrap();
    assert_eq!(seen, vec![Item::with_id(id.clone(), "from a", 1_000)]);
    assert_eq!(
        client_b.cached_items().unwrap(),
        vec![Item::with_id(id, "from a", 1_000)]
    );
}

#[test]
fn items_at_or_below_cursor_are_present_locally_after_sync() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    for (id, ts) in [("a", 5), ("b", 15), ("c", 25)] {
        remote.insert_document(id, fields(id, ts));
    }
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    service.sync().unwrap();
    let cached = ids(&service.cached_items().unwrap());
    let cursor = service.sync().unwrap().cursor;

    let below_cursor: BTreeSet<String> = remote
        .list_all()
        .unwrap()
        .into_iter()
        .filter(|item| item.timestamp <= cursor)
        .filter_map(|item| item.id)
        .collect();
    assert!(cached.is_superset(&below_cursor));
}

#[test]
fn exclusive_cursor_skips_late_write_at_cursor_timestamp() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    remote.insert_document("a", fields("A", 100));
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);
    service.sync().unwrap();

    remote.insert_document("late", fields("Late", 100));
    let report = service.sync().unwrap();
    assert_eq!(report.cursor, 100);
    assert!(!ids(&report.items).contains("late"));
}

#[test]
fn inclusive_cursor_picks_up_boundary_write_without_duplicates() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    remote.insert_document("a", fields("A", 100));
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock).with_cursor_mode(CursorMode::InclusiveDedup);
    service.sync().unwrap();

    remote.insert_document("late", fields("Late", 100));
    let report = service.sync().unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.items.len(), 2);
    assert_eq!(
        ids(&report.items),
        BTreeSet::from(["a".to_string(), "late".to_string()])
    );
}

#[test]
fn exclusive_merge_returns_stale_and_fresh_copy_of_remote_update() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    remote.insert_document("a", fields("A", 100));
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);
    service.sync().unwrap();

    remote.update("a", &fields("A2", 200)).unwrap();
    let report = service.sync().unwrap();
    assert_eq!(
        report.items,
        vec![Item::with_id("a", "A", 100), Item::with_id("a", "A2", 200)]
    );
    assert_eq!(
        service.cached_items().unwrap(),
        vec![Item::with_id("a", "A2", 200)]
    );
}

#[test]
fn remote_failure_on_create_leaves_cache_untouched() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    remote.set_available(false);
    let err = service.create_item("A").unwrap_err();
    assert!(matches!(
        err,
        ItemServiceError::Remote(RemoteError::Unavailable(_))
    ));
    assert!(service.cached_items().unwrap().is_empty());
}

#[test]
fn remote_failure_on_sync_is_distinguishable_from_empty_result() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    assert!(service.get_items().unwrap().is_empty());

    let id = service.create_item("A").unwrap();
    remote.set_available(false);
    let err = service.get_items().unwrap_err();
    assert!(matches!(err, ItemServiceError::Remote(_)));

    let offline = service.cached_items().unwrap();
    assert_eq!(ids(&offline), BTreeSet::from([id]));
}

#[test]
fn blank_names_are_rejected_before_any_store_call() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    let err = service.create_item("   ").unwrap_err();
    assert!(matches!(
        err,
        ItemServiceError::InvalidInput(ItemValidationError::BlankName)
    ));
    assert!(remote.is_empty());

    let id = service.create_item("A").unwrap();
    let err = service.update_item(&id, "").unwrap_err();
    assert!(matches!(err, ItemServiceError::InvalidInput(_)));
    assert_eq!(remote.list_all().unwrap()[0].name, "A");
}

#[test]
fn update_of_missing_remote_item_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    let err = service.update_item("missing", "B").unwrap_err();
    assert!(matches!(
        err,
        ItemServiceError::Remote(RemoteError::NotFound(id)) if id == "missing"
    ));
}

#[test]
fn update_of_uncached_item_reaches_cache_on_next_sync() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    remote.insert_document("r1", fields("Remote", 10));
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    service.update_item("r1", "Renamed").unwrap();
    assert!(service.cached_items().unwrap().is_empty());

    let items = service.get_items().unwrap();
    assert_eq!(items, vec![Item::with_id("r1", "Renamed", 1_000)]);
}

#[test]
fn delete_of_unknown_id_succeeds() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    service.delete_item("never-existed").unwrap();
}

#[test]
fn full_resync_drops_items_deleted_by_other_clients() {
    let conn_a = open_db_in_memory().unwrap();
    let conn_b = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(1_000);
    let client_a = service(&conn_a, &remote, &clock);
    let client_b = service(&conn_b, &remote, &clock);

    let keep = client_a.create_item("keep").unwrap();
    let gone = client_a.create_item("gone").unwrap();
    client_b.sync().unwrap();

    client_a.delete_item(&gone).unwrap();
    // Incremental sync cannot observe remote deletions.
    assert!(ids(&client_b.get_items().unwrap()).contains(&gone));

    let report = client_b.full_resync().unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(ids(&report.items), BTreeSet::from([keep.clone()]));
    assert_eq!(ids(&client_b.cached_items().unwrap()), BTreeSet::from([keep]));
}

#[test]
fn update_from_stale_client_outranks_faster_clock() {
    let conn_a = open_db_in_memory().unwrap();
    let conn_b = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let fast_clock = ManualClock::at(5_000);
    let slow_clock = ManualClock::at(1_000);
    let client_a = service(&conn_a, &remote, &fast_clock);
    let client_b = service(&conn_b, &remote, &slow_clock);

    let id = client_b.create_item("A").unwrap();
    client_a.sync().unwrap();
    client_a.update_item(&id, "B").unwrap();

    // B never synced A's rename before writing its own.
    client_b.update_item(&id, "C").unwrap();
    let stored = remote.list_all().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "C");
    assert!(stored[0].timestamp > 5_000);
    assert_eq!(client_b.cache().get(&id).unwrap(), Some(stored[0].clone()));

    client_a.sync().unwrap();
    assert_eq!(client_a.cached_items().unwrap(), stored);
}

#[test]
fn full_resync_skips_documents_the_cache_rejects() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    remote.insert_document("ok", fields("Ok", 10));
    remote.insert_document("negative", fields("Negative", -5));
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    let report = service.full_resync().unwrap();
    assert_eq!(report.items, vec![Item::with_id("ok", "Ok", 10)]);
    assert_eq!(report.removed, 0);
    assert_eq!(
        service.cached_items().unwrap(),
        vec![Item::with_id("ok", "Ok", 10)]
    );
}

#[test]
fn sync_skips_documents_the_cache_rejects() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    remote.insert_document("bad/id", fields("Bad", 20));
    remote.insert_document("ok", fields("Ok", 10));
    let clock = ManualClock::at(1_000);
    let service = service(&conn, &remote, &clock);

    let report = service.sync().unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.items, vec![Item::with_id("ok", "Ok", 10)]);
}

/// Cache whose writes fail while reads delegate to SQLite.
struct FailingWrites<'conn> {
    inner: SqliteItemCache<'conn>,
}

impl FailingWrites<'_> {
    fn error() -> RepoError {
        RepoError::InvalidData("disk full".to_string())
    }
}

impl LocalCache for FailingWrites<'_> {
    fn add(&self, _item: &Item) -> RepoResult<()> {
        Err(Self::error())
    }

    fn bulk_upsert(&self, _items: &[Item]) -> RepoResult<()> {
        Err(Self::error())
    }

    fn update(&self, _id: &str, _fields: &ItemFields) -> RepoResult<()> {
        Err(Self::error())
    }

    fn delete(&self, _id: &str) -> RepoResult<bool> {
        Err(Self::error())
    }

    fn get(&self, id: &str) -> RepoResult<Option<Item>> {
        self.inner.get(id)
    }

    fn list_by_timestamp_desc(&self) -> RepoResult<Vec<Item>> {
        self.inner.list_by_timestamp_desc()
    }

    fn retain_only(&self, _keep: &[ItemId]) -> RepoResult<usize> {
        Err(Self::error())
    }
}

#[test]
fn mirror_failure_reports_remote_id() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    let clock = ManualClock::at(1_000);

    let failing = ItemService::with_clock(
        FailingWrites {
            inner: SqliteItemCache::try_new(&conn).unwrap(),
        },
        remote.clone(),
        Box::new(clock.clone()),
    );
    let err = failing.create_item("A").unwrap_err();
    let id = match err {
        ItemServiceError::MirrorFailed { id, .. } => id,
        other => panic!("unexpected error: {other}"),
    };
    assert_eq!(remote.len(), 1);
    assert!(failing.cached_items().unwrap().is_empty());

    let err = failing.delete_item(&id).unwrap_err();
    assert!(matches!(err, ItemServiceError::MirrorFailed { .. }));
    assert!(remote.is_empty());

    let healthy = service(&conn, &remote, &clock);
    let kept = healthy.create_item("B").unwrap();
    assert_eq!(ids(&healthy.get_items().unwrap()), BTreeSet::from([kept]));
}

#[test]
fn sync_upsert_failure_is_reported_as_cache_error() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    remote.insert_document("r1", fields("Remote", 10));
    let failing = ItemService::new(
        FailingWrites {
            inner: SqliteItemCache::try_new(&conn).unwrap(),
        },
        remote,
    );

    let err = failing.sync().unwrap_err();
    assert!(matches!(err, ItemServiceError::Cache(_)));
}

#[test]
fn update_cache_failure_is_reported_even_for_uncached_item() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    remote.insert_document("r1", fields("Old", 10));
    let failing = ItemService::with_clock(
        FailingWrites {
            inner: SqliteItemCache::try_new(&conn).unwrap(),
        },
        remote.clone(),
        Box::new(ManualClock::at(1_000)),
    );

    let err = failing.update_item("r1", "New").unwrap_err();
    assert!(matches!(
        &err,
        ItemServiceError::MirrorFailed {
            id,
            source: RepoError::InvalidData(_),
        } if id == "r1"
    ));
}

#[test]
fn update_mirror_failure_keeps_remote_write_until_next_sync() {
    let conn = open_db_in_memory().unwrap();
    let remote = MemoryRemoteStore::new();
    remote.insert_document("r1", fields("Old", 10));
    SqliteItemCache::try_new(&conn)
        .unwrap()
        .add(&Item::with_id("r1", "Old", 10))
        .unwrap();
    let clock = ManualClock::at(1_000);
    let failing = ItemService::with_clock(
        FailingWrites {
            inner: SqliteItemCache::try_new(&conn).unwrap(),
        },
        remote.clone(),
        Box::new(clock.clone()),
    );

    let err = failing.update_item("r1", "New").unwrap_err();
    assert!(matches!(err, ItemServiceError::MirrorFailed { .. }));
    assert_eq!(
        remote.list_all().unwrap(),
        vec![Item::with_id("r1", "New", 1_000)]
    );
    assert_eq!(
        failing.cached_items().unwrap(),
        vec![Item::with_id("r1", "Old", 10)]
    );

    let healthy = service(&conn, &remote, &clock);
    healthy.sync().unwrap();
    assert_eq!(
        healthy.cached_items().unwrap(),
        vec![Item::with_id("r1", "New", 1_000)]
    );
}
