// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{KvError, KvResult, KvStore, Op, Sequence};
use std::{collections::BTreeMap, sync::Mutex};

/// In-process [`KvStore`].
///
/// A mutex over an ordered map; trivially linearizable, which makes it the
/// reference implementation for the sequence semantics and the workhorse of
/// the test suite. Can be shared between any number of coordinators to model
/// a multi-node cluster in one process.
#[derive(Default)]
pub struct MemoryKv {
    map: Mutex<BTreeMap<String, Vec<u8>>>,
}

#[allow(clippy::expect_used)]
impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> KvResult<Vec<u8>> {
        self.map
            .lock()
            .expect("lock is poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| KvError::NotFound(key.into()))
    }

    fn exists(&self, key: &str) -> KvResult<bool> {
        Ok(self
            .map
            .lock()
            .expect("lock is poisoned")
            .contains_key(key))
    }

    fn prefix(&self, prefix: &str, max: Option<usize>) -> KvResult<Vec<String>> {
        let map = self.map.lock().expect("lock is poisoned");

        let keys = map
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .take(max.unwrap_or(usize::MAX))
            .map(|(k, _)| k.clone())
            .collect();

        Ok(keys)
    }

    fn delete_prefix(&self, prefix: &str) -> KvResult<()> {
        self.map
            .lock()
            .expect("lock is poisoned")
            .retain(|k, _| !k.starts_with(prefix));

        Ok(())
    }

    fn submit(&self, sequence: &Sequence) -> KvResult<()> {
        let mut map = self.map.lock().expect("lock is poisoned");

        // Dry-run against a working copy so a failed assert leaves
        // the store untouched.
        let mut working = map.clone();

        for op in sequence.ops() {
            match op {
                Op::Assert { key, expected } => {
                    if working.get(key) != expected.as_ref() {
                        return Err(KvError::AssertionFailed);
                    }
                }
                Op::Set { key, value } => {
                    working.insert(key.clone(), value.clone());
                }
                Op::Delete { key } => {
                    working.remove(key);
                }
            }
        }

        *map = working;
        Ok(())
    }

    fn reconnect(&self) -> KvResult<()> {
        Ok(())
    }
}
