// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

mod common;

use common::{coordinator, shared_store};
use test_log::test;
use vdisk_fs::{kv::KvError, Error, GlobalLockStore, Namespace};

fn store_for(nspace: &str) -> GlobalLockStore {
    let store = shared_store();
    GlobalLockStore::new(coordinator(&store), Namespace::new(nspace))
}

#[test]
fn initial_write_requires_absence() -> vdisk_fs::Result<()> {
    let locks = store_for("ns");

    assert!(!locks.exists()?);

    let tag = locks.write(b"lock-v1", None)?;
    assert!(locks.exists()?);

    // a second unconditional write must fail: someone holds the lock
    assert!(matches!(
        locks.write(b"lock-v2", None),
        Err(Error::LockHasChanged(_))
    ));

    let (value, read_tag) = locks.read()?;
    assert_eq!(b"lock-v1".to_vec(), value);
    assert_eq!(tag, read_tag);

    Ok(())
}

#[test]
fn conditional_write_checks_the_tag() -> vdisk_fs::Result<()> {
    let locks = store_for("ns");

    let tag1 = locks.write(b"lock-v1", None)?;
    let tag2 = locks.write(b"lock-v2", Some(tag1))?;
    assert_ne!(tag1, tag2);

    // the old tag no longer matches
    assert!(matches!(
        locks.write(b"lock-v3", Some(tag1)),
        Err(Error::LockHasChanged(_))
    ));

    let (value, tag) = locks.read()?;
    assert_eq!(b"lock-v2".to_vec(), value);
    assert_eq!(tag2, tag);

    Ok(())
}

#[test]
fn independent_readers_agree_on_the_tag() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let locks_a = GlobalLockStore::new(coordinator(&store), Namespace::new("ns"));
    let locks_b = GlobalLockStore::new(coordinator(&store), Namespace::new("ns"));

    locks_a.write(b"heartbeat", None)?;

    let (_, tag_a) = locks_a.read()?;
    let (_, tag_b) = locks_b.read()?;
    assert_eq!(tag_a, tag_b);

    // b can take over using the tag it observed on its own
    locks_b.write(b"heartbeat-2", Some(tag_a))?;

    Ok(())
}

#[test]
fn erase_frees_the_lock() -> vdisk_fs::Result<()> {
    let locks = store_for("ns");

    let tag = locks.write(b"lock", None)?;
    locks.erase()?;

    assert!(!locks.exists()?);

    // a deleted lock is not "changed": the store's not-found error
    // surfaces, so callers can tell deletion from contention
    assert!(matches!(
        locks.write(b"lock-v2", Some(tag)),
        Err(Error::Kv(KvError::NotFound(_)))
    ));

    // an unconditional write succeeds again
    locks.write(b"lock-v2", None)?;

    Ok(())
}

#[test]
fn namespaces_are_independent() -> vdisk_fs::Result<()> {
    let store = shared_store();
    let locks_a = GlobalLockStore::new(coordinator(&store), Namespace::new("ns-a"));
    let locks_b = GlobalLockStore::new(coordinator(&store), Namespace::new("ns-b"));

    locks_a.write(b"a", None)?;

    assert!(!locks_b.exists()?);
    locks_b.write(b"b", None)?;

    locks_a.erase()?;
    assert!(locks_b.exists()?);

    Ok(())
}
