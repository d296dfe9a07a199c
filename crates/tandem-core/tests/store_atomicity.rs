//! Crash safety of the persistent store.
//!
//! A writer that dies before its rename leaves only a temporary file behind.
//! These tests plant such leftovers and check readers never see them.

use std::fs;

use serde::{Deserialize, Serialize};
use tandem_core::{
    config::StoreConfig, migrate::Versioned, Error, KeyPrefix, RecordKey, RecordKind, Store,
};
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Counter {
    value: u64,
}

impl Versioned for Counter {
    const KIND: &'static str = "counter";
}

fn open(dir: &TempDir) -> Store {
    Store::open(dir.path().join("data"), &StoreConfig::default()).unwrap()
}

fn record_dir(dir: &TempDir, key: &RecordKey) -> std::path::PathBuf {
    dir.path()
        .join("data")
        .join(key.kind().to_string())
        .join(key.scope())
}

#[test]
fn interrupted_write_leaves_prior_record() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let key = RecordKey::new(RecordKind::Registry, "crash", "counter").unwrap();
    store.save(&key, &Counter { value: 1 }).unwrap();

    // A writer died after writing half of its temporary file
    fs::write(
        record_dir(&dir, &key).join(".tmp-4242-0-counter"),
        br#"{"schema_version": 1, "kind": "counter", "data": {"val"#,
    )
    .unwrap();

    let reopened = open(&dir);
    assert_eq!(reopened.load::<Counter>(&key).unwrap(), Some(Counter { value: 1 }));
    assert_eq!(
        reopened
            .list_keys(&KeyPrefix::scoped(RecordKind::Registry, "crash").unwrap())
            .unwrap(),
        vec![key]
    );
}

#[test]
fn interrupted_first_write_leaves_record_absent() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let key = RecordKey::new(RecordKind::Registry, "crash", "fresh").unwrap();

    fs::create_dir_all(record_dir(&dir, &key)).unwrap();
    fs::write(record_dir(&dir, &key).join(".tmp-4242-1-fresh"), b"{").unwrap();

    assert_eq!(store.load::<Counter>(&key).unwrap(), None);
    assert!(!store.exists(&key));
}

#[test]
fn many_overwrites_never_expose_partial_records() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let key = RecordKey::new(RecordKind::Registry, "crash", "busy").unwrap();
    store.save(&key, &Counter { value: 0 }).unwrap();

    std::thread::scope(|scope| {
        scope.spawn(|| {
            for value in 1..200 {
                store.save(&key, &Counter { value }).unwrap();
            }
        });
        scope.spawn(|| {
            for _ in 0..200 {
                let seen = store.load::<Counter>(&key).unwrap();
                assert!(seen.is_some());
            }
        });
    });

    assert_eq!(store.load::<Counter>(&key).unwrap(), Some(Counter { value: 199 }));
}

#[test]
fn corruption_is_reported_for_that_key_only() {
    let dir = TempDir::new().unwrap();
    let store = open(&dir);
    let good = RecordKey::new(RecordKind::Registry, "mixed", "good").unwrap();
    let bad = RecordKey::new(RecordKind::Registry, "mixed", "bad").unwrap();
    store.save(&good, &Counter { value: 7 }).unwrap();
    store.save(&bad, &Counter { value: 8 }).unwrap();

    fs::write(record_dir(&dir, &bad).join("bad.json"), b"\x00\x01garbage").unwrap();

    let err = store.load::<Counter>(&bad).unwrap_err();
    assert!(matches!(err, Error::DataCorruption { .. }));
    assert_eq!(err.exit_code(), 4);
    assert_eq!(store.load::<Counter>(&good).unwrap(), Some(Counter { value: 7 }));
}

#[test]
fn unwritable_root_is_a_configuration_error() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"file, not a directory").unwrap();

    let err = Store::open(blocker.join("data"), &StoreConfig::default()).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}
