use coupon_core::db::{open_db, open_db_in_memory, open_db_with_options, DbOptions};
use coupon_core::{
    ClaimLedger, PendingRelease, RepoError, ReserveOutcome, SqliteClaimLedger,
};
use rusqlite::Connection;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use uuid::Uuid;

#[test]
fn reserve_creates_once_then_reports_already_exists() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteClaimLedger::try_new(&conn).unwrap();
    let resource_id = Uuid::new_v4();

    let first = ledger.reserve("alice", resource_id, "X").unwrap();
    let reservation = match first {
        ReserveOutcome::Created(reservation) => reservation,
        ReserveOutcome::AlreadyExists => panic!("first reserve must create"),
    };
    assert_eq!(reservation.actor_id, "alice");
    assert_eq!(reservation.resource_id, resource_id);

    assert_eq!(
        ledger.reserve("alice", resource_id, "X").unwrap(),
        ReserveOutcome::AlreadyExists
    );

    let claim = ledger.get_claim("alice", resource_id).unwrap().unwrap();
    assert_eq!(claim.claim_id, reservation.claim_id);
    assert_eq!(claim.resource_name, "X");
}

#[test]
fn pairs_are_independent() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteClaimLedger::try_new(&conn).unwrap();
    let x = Uuid::new_v4();
    let y = Uuid::new_v4();

    assert!(matches!(
        ledger.reserve("alice", x, "X").unwrap(),
        ReserveOutcome::Created(_)
    ));
    assert!(matches!(
        ledger.reserve("alice", y, "Y").unwrap(),
        ReserveOutcome::Created(_)
    ));
    assert!(matches!(
        ledger.reserve("bob", x, "X").unwrap(),
        ReserveOutcome::Created(_)
    ));

    let actors: Vec<String> = ledger
        .list_claims(x)
        .unwrap()
        .into_iter()
        .map(|claim| claim.actor_id)
        .collect();
    assert_eq!(actors.len(), 2);
    assert!(actors.contains(&"alice".to_string()));
    assert!(actors.contains(&"bob".to_string()));
}

#[test]
fn release_is_idempotent_and_frees_the_slot() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteClaimLedger::try_new(&conn).unwrap();
    let resource_id = Uuid::new_v4();

    ledger.reserve("alice", resource_id, "X").unwrap();
    ledger.release("alice", resource_id).unwrap();
    ledger.release("alice", resource_id).unwrap();
    ledger.release("nobody", Uuid::new_v4()).unwrap();

    assert!(ledger.get_claim("alice", resource_id).unwrap().is_none());
    assert!(matches!(
        ledger.reserve("alice", resource_id, "X").unwrap(),
        ReserveOutcome::Created(_)
    ));
}

#[test]
fn scoped_release_leaves_a_newer_reservation_untouched() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteClaimLedger::try_new(&conn).unwrap();
    let resource_id = Uuid::new_v4();

    let ReserveOutcome::Created(stale) = ledger.reserve("alice", resource_id, "X").unwrap() else {
        panic!("first reserve must create");
    };
    ledger.release("alice", resource_id).unwrap();
    let ReserveOutcome::Created(current) = ledger.reserve("alice", resource_id, "X").unwrap()
    else {
        panic!("reserve after release must create");
    };
    assert_ne!(stale.claim_id, current.claim_id);

    ledger.release_reservation(&stale).unwrap();
    let claim = ledger.get_claim("alice", resource_id).unwrap().unwrap();
    assert_eq!(claim.claim_id, current.claim_id);

    ledger.release_reservation(&current).unwrap();
    ledger.release_reservation(&current).unwrap();
    assert!(ledger.get_claim("alice", resource_id).unwrap().is_none());
}

#[test]
fn pending_release_queue_roundtrip() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteClaimLedger::try_new(&conn).unwrap();
    let resource_id = Uuid::new_v4();

    let ReserveOutcome::Created(reservation) = ledger.reserve("alice", resource_id, "X").unwrap()
    else {
        panic!("reserve must create");
    };

    let first = PendingRelease::for_reservation(&reservation, Some("disk I/O error".to_string()));
    ledger.record_pending_release(&first).unwrap();
    let refreshed = PendingRelease::for_reservation(&reservation, Some("still failing".to_string()));
    ledger.record_pending_release(&refreshed).unwrap();

    let pending = ledger.list_pending_releases().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].claim_id, reservation.claim_id);
    assert_eq!(pending[0].actor_id, "alice");
    assert_eq!(pending[0].last_error.as_deref(), Some("still failing"));
    assert_eq!(pending[0].reservation(), reservation);

    ledger.clear_pending_release(reservation.claim_id).unwrap();
    assert!(ledger.list_pending_releases().unwrap().is_empty());
}

#[test]
fn ledger_refuses_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    let err = SqliteClaimLedger::try_new(&conn).err().unwrap();
    assert!(matches!(err, RepoError::MissingRequiredTable("claims")));
}

#[test]
fn concurrent_reserves_for_one_pair_create_exactly_once() {
    const CALLERS: usize = 16;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    drop(open_db(&path).unwrap());
    let resource_id = Uuid::new_v4();

    let barrier = Barrier::new(CALLERS);
    let outcomes: Vec<ReserveOutcome> = thread::scope(|scope| {
        let handles: Vec<_> = (0..CALLERS)
            .map(|_| {
                let barrier = &barrier;
                let path = path.as_path();
                scope.spawn(move || {
                    let options = DbOptions {
                        busy_timeout: Duration::from_secs(30),
                        ..DbOptions::default()
                    };
                    let conn = open_db_with_options(path, &options).unwrap();
                    let ledger = SqliteClaimLedger::try_new(&conn).unwrap();
                    barrier.wait();
                    ledger.reserve("alice", resource_id, "X").unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let created = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, ReserveOutcome::Created(_)))
        .count();
    assert_eq!(created, 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|outcome| **outcome == ReserveOutcome::AlreadyExists)
            .count(),
        CALLERS - 1
    );
}
