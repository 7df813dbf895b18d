use coupon_core::db::{open_db, open_db_in_memory, open_db_with_options, DbOptions};
use coupon_core::{DecrementOutcome, RepoError, Resource, ResourceStore, SqliteResourceStore};
use rusqlite::Connection;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

#[test]
fn create_and_get_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteResourceStore::try_new(&conn).unwrap();

    let resource = Resource::new("FLASH_SALE_2026", 5).with_expiry(Some(1_900_000_000_000));
    let id = store.create_resource(&resource).unwrap();

    let by_id = store.get_resource(id).unwrap().unwrap();
    let by_name = store.get_resource_by_name("FLASH_SALE_2026").unwrap().unwrap();
    assert_eq!(by_id, by_name);
    assert_eq!(by_id.total, 5);
    assert_eq!(by_id.remaining, 5);
    assert!(by_id.is_active);
    assert_eq!(by_id.expires_at, Some(1_900_000_000_000));
    assert!(by_id.created_at > 0);
}

#[test]
fn unknown_name_returns_none() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteResourceStore::try_new(&conn).unwrap();
    assert!(store.get_resource_by_name("missing").unwrap().is_none());
}

#[test]
fn duplicate_name_is_rejected() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteResourceStore::try_new(&conn).unwrap();

    store.create_resource(&Resource::new("PROMO", 10)).unwrap();
    let err = store.create_resource(&Resource::new("PROMO", 3)).unwrap_err();
    assert!(matches!(err, RepoError::DuplicateName(name) if name == "PROMO"));
}

#[test]
fn invalid_resource_is_rejected_before_sql() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteResourceStore::try_new(&conn).unwrap();

    let err = store.create_resource(&Resource::new("  ", 1)).unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn decrement_applies_until_exhausted_then_reports_insufficient_stock() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteResourceStore::try_new(&conn).unwrap();
    let id = store.create_resource(&Resource::new("X", 3)).unwrap();

    assert_eq!(
        store.decrement(id, 2).unwrap(),
        DecrementOutcome::Applied { remaining: 1 }
    );
    assert_eq!(
        store.decrement(id, 2).unwrap(),
        DecrementOutcome::InsufficientStock
    );
    assert_eq!(store.get_resource(id).unwrap().unwrap().remaining, 1);
    assert_eq!(
        store.decrement(id, 1).unwrap(),
        DecrementOutcome::Applied { remaining: 0 }
    );
    assert_eq!(
        store.decrement(id, 1).unwrap(),
        DecrementOutcome::InsufficientStock
    );
    assert_eq!(store.get_resource(id).unwrap().unwrap().remaining, 0);
}

#[test]
fn decrement_unknown_resource_returns_not_found() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteResourceStore::try_new(&conn).unwrap();
    assert_eq!(
        store.decrement(Uuid::new_v4(), 1).unwrap(),
        DecrementOutcome::NotFound
    );
}

#[test]
fn decrement_by_zero_is_invalid() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteResourceStore::try_new(&conn).unwrap();
    let id = store.create_resource(&Resource::new("X", 3)).unwrap();

    let err = store.decrement(id, 0).unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));
}

#[test]
fn set_active_toggles_flag_and_reports_missing() {
    let conn = open_db_in_memory().unwrap();
    let store = SqliteResourceStore::try_new(&conn).unwrap();
    let id = store.create_resource(&Resource::new("X", 3)).unwrap();

    store.set_active(id, false).unwrap();
    assert!(!store.get_resource(id).unwrap().unwrap().is_active);

    let missing = Uuid::new_v4();
    let err = store.set_active(missing, false).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(found) if found == missing));
}

#[test]
fn store_refuses_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteResourceStore::try_new(&conn).err().unwrap();
    assert!(matches!(err, RepoError::MissingRequiredTable("resources")));
}

#[test]
fn concurrent_decrements_never_exceed_available_units() {
    const AVAILABLE: u32 = 7;
    const CALLERS: usize = 40;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stock.db");
    let id = {
        let conn = open_db(&path).unwrap();
        let store = SqliteResourceStore::try_new(&conn).unwrap();
        store.create_resource(&Resource::new("X", AVAILABLE)).unwrap()
    };

    let barrier = Barrier::new(CALLERS);
    let outcomes: Vec<DecrementOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let barrier = &barrier;
                let path = path.as_path();
                scope.spawn(move || {
                    let conn = open_contended(path);
                    let store = SqliteResourceStore::try_new(&conn).unwrap();
                    barrier.wait();
                    store.decrement(id, 1).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let applied: BTreeSet<u32> = outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            DecrementOutcome::Applied { remaining } => Some(*remaining),
            _ => None,
        })
        .collect();
    let insufficient = outcomes
        .iter()
        .filter(|outcome| **outcome == DecrementOutcome::InsufficientStock)
        .count();

    // Each success observed a distinct post-decrement value: a total order.
    assert_eq!(applied, (0..AVAILABLE).collect::<BTreeSet<_>>());
    assert_eq!(insufficient, CALLERS - AVAILABLE as usize);

    let conn = open_db(&path).unwrap();
    let store = SqliteResourceStore::try_new(&conn).unwrap();
    assert_eq!(store.get_resource(id).unwrap().unwrap().remaining, 0);
}

fn open_contended(path: &Path) -> Connection {
    let options = DbOptions {
        busy_timeout: Duration::from_secs(30),
        ..DbOptions::default()
    };
    open_db_with_options(path, &options).unwrap()
}
