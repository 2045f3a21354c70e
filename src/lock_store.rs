// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::kv::{KvCoordinator, KvError, RetryOnAssert};
use crate::Namespace;
use std::sync::Arc;

/// Identity of one version of a stored lock.
///
/// The tag is the 128-bit hash of the lock's serialized form, so independent
/// readers agree on it without extra coordination.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct LockTag(u128);

impl LockTag {
    fn of(serialized_lock: &[u8]) -> Self {
        Self(crate::hash::hash128(serialized_lock))
    }
}

impl std::fmt::Display for LockTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

/// Cluster-wide advisory lock record, one per namespace.
///
/// The lock value itself (typically a heartbeat record) is opaque serialized
/// bytes; writers hand back the tag of the version they read, and a write
/// only goes through if the stored value still hashes to that tag.
pub struct GlobalLockStore {
    kv: Arc<KvCoordinator>,
    nspace: Namespace,
}

impl GlobalLockStore {
    /// Creates the lock store for a namespace.
    #[must_use]
    pub fn new(kv: Arc<KvCoordinator>, nspace: Namespace) -> Self {
        Self { kv, nspace }
    }

    /// The namespace this lock guards.
    #[must_use]
    pub fn name(&self) -> &Namespace {
        &self.nspace
    }

    fn make_key(&self) -> String {
        format!("GlobalLocks/{}", self.nspace)
    }

    /// Whether a lock record exists.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn exists(&self) -> crate::Result<bool> {
        Ok(self.kv.exists(&self.make_key())?)
    }

    /// Reads the current lock and its tag.
    ///
    /// # Errors
    ///
    /// [`KvError::NotFound`] (as [`crate::Error::Kv`]) when no lock exists.
    pub fn read(&self) -> crate::Result<(Vec<u8>, LockTag)> {
        let lock = self.kv.get(&self.make_key())?;
        let tag = LockTag::of(&lock);
        Ok((lock, tag))
    }

    /// Writes a lock value.
    ///
    /// With `prev_tag == None` the key must be absent; with
    /// `prev_tag == Some(t)` the stored value must still hash to `t`.
    /// Returns the tag of the newly written value.
    ///
    /// # Errors
    ///
    /// [`crate::Error::LockHasChanged`] when the stored value no longer
    /// hashes to `prev_tag` or a concurrent writer won the race. A lock that
    /// was deleted outright surfaces as the store's not-found error instead,
    /// so callers can tell deletion from contention.
    pub fn write(&self, lock: &[u8], prev_tag: Option<LockTag>) -> crate::Result<LockTag> {
        let key = self.make_key();

        let res = self.kv.run_sequence(
            "writing global lock",
            |seq| {
                match prev_tag {
                    Some(tag) => {
                        // a vanished key propagates as NotFound, it is not
                        // a tag mismatch
                        let old = self.kv.get(&key)?;

                        if LockTag::of(&old) != tag {
                            log::info!("{}: lock has changed", self.nspace);
                            return Err(crate::Error::LockHasChanged(self.nspace.clone()));
                        }

                        seq.assert(&key, Some(old));
                    }
                    None => seq.assert(&key, None),
                }

                seq.set(&key, lock.to_vec());
                Ok(())
            },
            RetryOnAssert::No,
        );

        match res {
            Ok(()) => Ok(LockTag::of(lock)),
            Err(crate::Error::Kv(KvError::AssertionFailed)) => {
                log::info!("{}: lock has changed", self.nspace);
                Err(crate::Error::LockHasChanged(self.nspace.clone()))
            }
            Err(e) => Err(e),
        }
    }

    /// Removes the lock record.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn erase(&self) -> crate::Result<()> {
        self.kv.delete_prefix(&self.make_key())?;
        Ok(())
    }
}
