//! FileStore persistence tests.

use std::fs;
use teamsync_model::{EntitySet, LocalMember, Member, MemberDerived, MemberStatus};
use teamsync_store::{FileStore, LocalStore, StoreError};
use tempfile::TempDir;

fn member_set(ids: &[&str], updated_at_ms: u64) -> EntitySet {
    let mut set = EntitySet::new();
    for id in ids {
        set.members.insert(
            (*id).into(),
            LocalMember {
                record: Member::new(*id, format!("member {id}")),
                derived: MemberDerived {
                    tracked_ms: 1_000,
                    entry_count: 1,
                    status: MemberStatus::Active,
                },
                updated_at_ms,
            },
        );
    }
    set
}

#[test]
fn missing_file_reads_empty() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(&dir.path().join("nested/cache.json")).unwrap();
    assert!(store.read_all().unwrap().is_empty());
}

#[test]
fn snapshot_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");

    {
        let store = FileStore::open(&path).unwrap();
        store.bulk_upsert(&member_set(&["m1", "m2"], 5)).unwrap();
    }

    let reopened = FileStore::open(&path).unwrap();
    let all = reopened.read_all().unwrap();
    assert_eq!(all, member_set(&["m1", "m2"], 5));
}

#[test]
fn upsert_keeps_untouched_records() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(&dir.path().join("cache.json")).unwrap();

    store.bulk_upsert(&member_set(&["m1"], 1)).unwrap();
    store.bulk_upsert(&member_set(&["m2"], 2)).unwrap();

    let all = store.read_all().unwrap();
    assert_eq!(all.members.len(), 2);
    assert!(!store.path().with_extension("json.tmp").exists());
}

#[test]
fn corrupt_snapshot_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cache.json");
    fs::write(&path, b"{not json").unwrap();

    let store = FileStore::open(&path).unwrap();
    assert!(matches!(store.read_all(), Err(StoreError::Corrupted(_))));
    // a failed write must not replace the existing file
    assert!(store.bulk_upsert(&member_set(&["m1"], 1)).is_err());
    assert_eq!(fs::read(&path).unwrap(), b"{not json");
}

#[test]
fn clear_removes_snapshot() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(&dir.path().join("cache.json")).unwrap();
    store.bulk_upsert(&member_set(&["m1"], 1)).unwrap();

    store.clear().unwrap();
    assert!(store.read_all().unwrap().is_empty());
    // clearing twice is fine
    store.clear().unwrap();
}
