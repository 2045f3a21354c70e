// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Extent, ExtentId};
use crate::lru::LruList;
use rustc_hash::FxHashMap;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

struct Inner {
    map: FxHashMap<ExtentId, Arc<Extent>>,
    lru: LruList<ExtentId>,
    capacity: usize,
}

/// Bounded on-disk cache of materialized extents, shared by all containers
/// on a node.
///
/// `find` is compute-if-absent; the internal lock is held across the pull,
/// so at most one pull per extent id runs at any time. Evicting or erasing
/// an entry deletes its backing file. The cache directory is wiped on
/// startup; there is no warm restart.
pub struct ExtentCache {
    dir: PathBuf,
    inner: Mutex<Inner>,
}

impl ExtentCache {
    /// Opens the cache over `dir`, clearing leftover entries.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidConfig`] when `dir` is not an existing
    /// directory or `capacity` is zero.
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> crate::Result<Self> {
        let dir = dir.into();

        if !dir.is_dir() {
            return Err(crate::Error::InvalidConfig(format!(
                "extent cache path {} is not a directory",
                dir.display(),
            )));
        }

        if capacity == 0 {
            return Err(crate::Error::InvalidConfig(
                "extent cache capacity must be > 0".into(),
            ));
        }

        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            log::warn!(
                "leftover entry {} in extent cache - removing it",
                entry.path().display(),
            );
            std::fs::remove_file(entry.path())?;
        }

        Ok(Self {
            dir,
            inner: Mutex::new(Inner {
                map: FxHashMap::default(),
                lru: LruList::default(),
                capacity,
            }),
        })
    }

    fn entry_path(&self, eid: &ExtentId) -> PathBuf {
        self.dir.join(eid.to_string())
    }

    fn remove_file(path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to remove {}: {e}", path.display());
            }
        }
    }

    fn shrink(&self, inner: &mut Inner) {
        while inner.map.len() > inner.capacity {
            let Some(victim) = inner.lru.pop_least_recently_used() else {
                break;
            };

            log::trace!("evicting extent {victim} from cache");
            inner.map.remove(&victim);
            Self::remove_file(&self.entry_path(&victim));
        }
    }

    /// Looks up `eid`, invoking `pull` on a miss to materialize the extent
    /// at the path chosen by the cache.
    ///
    /// `pull` returning `Ok(None)` means the extent does not exist; nothing
    /// is cached in that case.
    ///
    /// # Errors
    ///
    /// Whatever `pull` returns.
    pub fn find<F>(&self, eid: &ExtentId, pull: F) -> crate::Result<Option<Arc<Extent>>>
    where
        F: FnOnce(&ExtentId, &Path) -> crate::Result<Option<Extent>>,
    {
        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("lock is poisoned");

        if let Some(ext) = inner.map.get(eid).cloned() {
            inner.lru.touch(eid.clone());
            return Ok(Some(ext));
        }

        let Some(ext) = pull(eid, &self.entry_path(eid))? else {
            return Ok(None);
        };

        let ext = Arc::new(ext);
        inner.map.insert(eid.clone(), ext.clone());
        inner.lru.touch(eid.clone());
        self.shrink(&mut inner);

        Ok(Some(ext))
    }

    /// Drops `eid` and deletes its backing file.
    pub fn erase(&self, eid: &ExtentId) {
        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("lock is poisoned");

        inner.map.remove(eid);
        inner.lru.remove(eid);
        Self::remove_file(&self.entry_path(eid));
    }

    /// Current capacity in extents.
    #[must_use]
    pub fn capacity(&self) -> usize {
        #[allow(clippy::expect_used)]
        self.inner.lock().expect("lock is poisoned").capacity
    }

    /// Number of cached extents.
    #[must_use]
    pub fn len(&self) -> usize {
        #[allow(clippy::expect_used)]
        self.inner.lock().expect("lock is poisoned").map.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Changes the capacity; shrinking evicts LRU entries immediately.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidConfig`] when `capacity` is zero.
    pub fn set_capacity(&self, capacity: usize) -> crate::Result<()> {
        if capacity == 0 {
            return Err(crate::Error::InvalidConfig(
                "extent cache capacity must be > 0".into(),
            ));
        }

        #[allow(clippy::expect_used)]
        let mut inner = self.inner.lock().expect("lock is poisoned");
        inner.capacity = capacity;
        self.shrink(&mut inner);

        Ok(())
    }
}
