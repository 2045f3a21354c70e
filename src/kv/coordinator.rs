// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{KvError, KvResult, KvStore, Sequence};
use std::sync::{Arc, Mutex};

/// Whether [`KvCoordinator::run_sequence`] re-runs the prepare function when
/// the store rejects the sequence with a failed assert
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RetryOnAssert {
    /// Re-read and retry until the sequence goes through
    Yes,
    /// Surface the conflict to the caller
    No,
}

const MAX_RETRIES: u32 = 10_000;

/// Serialized access to the key-value store driver.
///
/// Read accessors pass through; all writes are funneled through
/// [`run_sequence`](Self::run_sequence). Different views over the same store
/// (registry, scrub queues, lock store) share one coordinator so their
/// sequences serialize against a single connection.
///
/// A network-class driver error triggers one reconnect-and-retry before it is
/// surfaced.
pub struct KvCoordinator {
    store: Arc<dyn KvStore>,
    lock: Mutex<()>,
}

impl KvCoordinator {
    /// Wraps a store driver.
    #[must_use]
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    fn call<T>(&self, f: impl Fn(&dyn KvStore) -> KvResult<T>) -> KvResult<T> {
        #[allow(clippy::expect_used)]
        let _guard = self.lock.lock().expect("lock is poisoned");

        match f(&*self.store) {
            Err(e) if e.is_connection_failure() => {
                log::warn!("store unreachable ({e}), reconnecting once");
                self.store.reconnect()?;
                f(&*self.store)
            }
            res => res,
        }
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// [`KvError::NotFound`] if the key does not exist.
    pub fn get(&self, key: &str) -> KvResult<Vec<u8>> {
        self.call(|store| store.get(key))
    }

    /// Whether `key` exists.
    ///
    /// # Errors
    ///
    /// Driver errors after one reconnect attempt.
    pub fn exists(&self, key: &str) -> KvResult<bool> {
        self.call(|store| store.exists(key))
    }

    /// Returns up to `max` keys starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Driver errors after one reconnect attempt.
    pub fn prefix(&self, prefix: &str, max: Option<usize>) -> KvResult<Vec<String>> {
        self.call(|store| store.prefix(prefix, max))
    }

    /// Deletes all keys starting with `prefix`.
    ///
    /// # Errors
    ///
    /// Driver errors after one reconnect attempt.
    pub fn delete_prefix(&self, prefix: &str) -> KvResult<()> {
        self.call(|store| store.delete_prefix(prefix))
    }

    /// Builds a sequence via `prepare` and submits it atomically.
    ///
    /// CAUTION: when passing [`RetryOnAssert::Yes`], `prepare` must re-read
    /// the asserted keys so its asserts hold in the absence of concurrent
    /// updates. Otherwise this turns into a pseudo-infinite loop.
    ///
    /// # Errors
    ///
    /// Errors returned by `prepare` surface unchanged. A rejected assert
    /// surfaces as [`KvError::AssertionFailed`] once retries (if any) are
    /// exhausted.
    pub fn run_sequence<F>(
        &self,
        desc: &str,
        mut prepare: F,
        retry_on_assert: RetryOnAssert,
    ) -> crate::Result<()>
    where
        F: FnMut(&mut Sequence) -> crate::Result<()>,
    {
        let mut tries = 0;

        loop {
            let mut seq = Sequence::new();
            prepare(&mut seq)?;

            match self.call(|store| store.submit(&seq)) {
                Ok(()) => {
                    log::trace!("{desc} succeeded after {} attempt(s)", tries + 1);
                    return Ok(());
                }
                Err(KvError::AssertionFailed) => {
                    tries += 1;

                    if retry_on_assert == RetryOnAssert::Yes && tries < MAX_RETRIES {
                        log::warn!(
                            "{desc} failed due to concurrent update, attempt {tries}. Retrying."
                        );
                    } else {
                        log::error!(
                            "{desc} failed after {tries} attempt(s), retry requested: {}",
                            if retry_on_assert == RetryOnAssert::Yes {
                                "yes"
                            } else {
                                "no"
                            }
                        );
                        return Err(KvError::AssertionFailed.into());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn coordinator() -> KvCoordinator {
        KvCoordinator::new(Arc::new(MemoryKv::default()))
    }

    #[test]
    fn sequence_is_atomic() -> crate::Result<()> {
        let kv = coordinator();

        kv.run_sequence(
            "seed",
            |seq| {
                seq.assert("k", None);
                seq.set("k", b"v1".to_vec());
                Ok(())
            },
            RetryOnAssert::No,
        )?;

        // second run: the absence assert fails, the set must not apply
        let res = kv.run_sequence(
            "seed again",
            |seq| {
                seq.assert("k", None);
                seq.set("k", b"v2".to_vec());
                Ok(())
            },
            RetryOnAssert::No,
        );

        assert!(matches!(
            res,
            Err(crate::Error::Kv(KvError::AssertionFailed))
        ));
        assert_eq!(b"v1".to_vec(), kv.get("k")?);

        Ok(())
    }

    #[test]
    fn retry_re_reads() -> crate::Result<()> {
        let kv = coordinator();
        kv.run_sequence(
            "init",
            |seq| {
                seq.set("counter", vec![0]);
                Ok(())
            },
            RetryOnAssert::No,
        )?;

        let mut attempts = 0;

        kv.run_sequence(
            "bump",
            |seq| {
                let cur = kv.get("counter")?;

                if attempts == 0 {
                    // simulate a concurrent writer between read and submit
                    kv.run_sequence(
                        "interloper",
                        |seq| {
                            seq.set("counter", vec![41]);
                            Ok(())
                        },
                        RetryOnAssert::No,
                    )?;
                }
                attempts += 1;

                seq.assert("counter", Some(cur));
                seq.set("counter", vec![42]);
                Ok(())
            },
            RetryOnAssert::Yes,
        )?;

        assert_eq!(2, attempts);
        assert_eq!(vec![42], kv.get("counter")?);
        Ok(())
    }
}
