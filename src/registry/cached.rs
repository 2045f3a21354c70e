// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{
    FocConfigMode, ObjectRegistration, ObjectRegistrationPtr, ObjectRegistry,
};
use crate::kv::KvCoordinator;
use crate::lru::LruList;
use crate::{ClusterId, Namespace, NodeId, ObjectId, SnapshotName};
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Whether a lookup may be served from the per-node cache
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IgnoreCache {
    /// Force a registry lookup, refreshing (or invalidating) the entry
    Yes,
    /// Serve cached hits
    No,
}

/// Whether a listing repopulates the cache
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RefreshCache {
    /// Re-fetch every listed registration into the cache
    Yes,
    /// Just list
    No,
}

struct CacheInner {
    map: FxHashMap<ObjectId, ObjectRegistrationPtr>,
    lru: LruList<ObjectId>,
    capacity: usize,
}

impl CacheInner {
    fn insert(&mut self, id: ObjectId, reg: ObjectRegistrationPtr) {
        self.map.insert(id.clone(), reg);
        self.lru.touch(id);

        while self.map.len() > self.capacity {
            let Some(victim) = self.lru.pop_least_recently_used() else {
                break;
            };
            self.map.remove(&victim);
        }
    }

    fn erase(&mut self, id: &ObjectId) {
        self.map.remove(id);
        self.lru.remove(id);
    }
}

/// A per-node LRU cache over the [`ObjectRegistry`].
///
/// The cache may be stale with respect to *other* nodes' writes; that is
/// acceptable because callers re-route using the node id and owner tag from
/// a fresh read ([`IgnoreCache::Yes`]) when staleness is suspected. Reading
/// anything beyond the owner-routing fields (`node_id`, `owner_tag`) from a
/// cached entry is suspicious - tree edges in particular may lag behind.
///
/// The cache lock guards only the map; it is never held while the backing
/// registry does its work, keeping locked sections small.
pub struct CachedObjectRegistry {
    registry: ObjectRegistry,
    cache: Mutex<CacheInner>,
}

impl CachedObjectRegistry {
    /// Opens the cache over a fresh registry handle, pre-warming it with
    /// the current registrations.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn new(
        cluster_id: ClusterId,
        node_id: NodeId,
        kv: Arc<KvCoordinator>,
        cache_capacity: usize,
    ) -> crate::Result<Self> {
        let this = Self {
            registry: ObjectRegistry::new(cluster_id, node_id, kv)?,
            cache: Mutex::new(CacheInner {
                map: FxHashMap::default(),
                lru: LruList::default(),
                capacity: cache_capacity,
            }),
        };

        this.list(RefreshCache::Yes)?;
        Ok(this)
    }

    /// The backing registry.
    #[must_use]
    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.cache.lock().expect("lock is poisoned")
    }

    /// Write-through: run the registry operation, then refresh the cache
    /// entry; a stale entry is evicted when the registry reports the object
    /// gone.
    fn update_cache<F>(&self, id: &ObjectId, op: F) -> crate::Result<ObjectRegistrationPtr>
    where
        F: FnOnce(&ObjectRegistry) -> crate::Result<ObjectRegistrationPtr>,
    {
        match op(&self.registry) {
            Ok(reg) => {
                self.lock().insert(id.clone(), reg.clone());
                Ok(reg)
            }
            Err(e @ crate::Error::ObjectNotRegistered(_)) => {
                self.lock().erase(id);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// See [`ObjectRegistry::register_base_volume`].
    ///
    /// # Errors
    ///
    /// As the backing registry.
    pub fn register_base_volume(
        &self,
        id: &ObjectId,
        nspace: &Namespace,
        foc_config_mode: FocConfigMode,
    ) -> crate::Result<ObjectRegistrationPtr> {
        self.update_cache(id, |registry| {
            registry.register_base_volume(id, nspace, foc_config_mode)
        })
    }

    /// See [`ObjectRegistry::register_file`].
    ///
    /// # Errors
    ///
    /// As the backing registry.
    pub fn register_file(&self, id: &ObjectId) -> crate::Result<ObjectRegistrationPtr> {
        self.update_cache(id, |registry| registry.register_file(id))
    }

    /// See [`ObjectRegistry::register_clone`].
    ///
    /// The parent's cached registration is *not* refreshed here: it did
    /// change (a new descendant), but not in a way that affects rerouting.
    ///
    /// # Errors
    ///
    /// As the backing registry.
    pub fn register_clone(
        &self,
        clone_id: &ObjectId,
        clone_nspace: &Namespace,
        parent_id: &ObjectId,
        maybe_parent_snap: Option<&SnapshotName>,
        foc_config_mode: FocConfigMode,
    ) -> crate::Result<ObjectRegistrationPtr> {
        self.update_cache(clone_id, |registry| {
            registry.register_clone(
                clone_id,
                clone_nspace,
                parent_id,
                maybe_parent_snap,
                foc_config_mode,
            )
        })
    }

    /// See [`ObjectRegistry::convert_base_to_clone`].
    ///
    /// # Errors
    ///
    /// As the backing registry.
    pub fn convert_base_to_clone(
        &self,
        clone_id: &ObjectId,
        clone_nspace: &Namespace,
        parent_id: &ObjectId,
        maybe_parent_snap: Option<&SnapshotName>,
        foc_config_mode: FocConfigMode,
    ) -> crate::Result<ObjectRegistrationPtr> {
        self.update_cache(clone_id, |registry| {
            registry.convert_base_to_clone(
                clone_id,
                clone_nspace,
                parent_id,
                maybe_parent_snap,
                foc_config_mode,
            )
        })
    }

    /// See [`ObjectRegistry::unregister`]; the cache entry goes away either
    /// way.
    ///
    /// # Errors
    ///
    /// As the backing registry.
    pub fn unregister(&self, id: &ObjectId) -> crate::Result<()> {
        match self.registry.unregister(id) {
            Ok(()) => {
                self.lock().erase(id);
                Ok(())
            }
            Err(e @ crate::Error::ObjectNotRegistered(_)) => {
                self.lock().erase(id);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// See [`ObjectRegistry::migrate`].
    ///
    /// # Errors
    ///
    /// As the backing registry.
    pub fn migrate(
        &self,
        id: &ObjectId,
        from: &NodeId,
        to: &NodeId,
    ) -> crate::Result<ObjectRegistrationPtr> {
        self.update_cache(id, |registry| registry.migrate(id, from, to))
    }

    /// See [`ObjectRegistry::set_volume_as_template`].
    ///
    /// # Errors
    ///
    /// As the backing registry.
    pub fn set_volume_as_template(
        &self,
        id: &ObjectId,
    ) -> crate::Result<ObjectRegistrationPtr> {
        self.update_cache(id, |registry| registry.set_volume_as_template(id))
    }

    /// See [`ObjectRegistry::set_foc_config_mode`].
    ///
    /// # Errors
    ///
    /// As the backing registry.
    pub fn set_foc_config_mode(
        &self,
        id: &ObjectId,
        foc_config_mode: FocConfigMode,
    ) -> crate::Result<ObjectRegistrationPtr> {
        self.update_cache(id, |registry| {
            registry.set_foc_config_mode(id, foc_config_mode)
        })
    }

    /// Looks up a registration, serving cached hits unless told otherwise.
    ///
    /// # Errors
    ///
    /// Store failures on the fallback lookup.
    pub fn find(
        &self,
        id: &ObjectId,
        ignore_cache: IgnoreCache,
    ) -> crate::Result<Option<ObjectRegistrationPtr>> {
        if ignore_cache == IgnoreCache::No {
            let mut cache = self.lock();

            if let Some(reg) = cache.map.get(id).cloned() {
                cache.lru.touch(id.clone());
                return Ok(Some(reg));
            }
        }

        let reg = self.registry.find(id)?;
        let mut cache = self.lock();

        match &reg {
            // we don't care if someone put it there in the meantime
            Some(reg) => cache.insert(id.clone(), reg.clone()),
            None => cache.erase(id),
        }

        Ok(reg)
    }

    /// As [`find`](Self::find), but absence is an error.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ObjectNotRegistered`] when absent.
    pub fn find_throw(
        &self,
        id: &ObjectId,
        ignore_cache: IgnoreCache,
    ) -> crate::Result<ObjectRegistrationPtr> {
        self.find(id, ignore_cache)?
            .ok_or_else(|| crate::Error::ObjectNotRegistered(id.clone()))
    }

    /// Lists all registered object ids, optionally re-fetching each
    /// registration into the cache.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn list(&self, refresh_cache: RefreshCache) -> crate::Result<Vec<ObjectId>> {
        let ids = self.registry.list()?;

        if refresh_cache == RefreshCache::Yes {
            for id in &ids {
                if let Some(reg) = self.registry.find(id)? {
                    self.lock().insert(id.clone(), reg);
                }
            }
        }

        Ok(ids)
    }

    /// Clears the whole cache.
    pub fn drop_cache(&self) {
        let mut cache = self.lock();
        cache.map.clear();
        cache.lru.clear();
    }

    /// Drops one entry from the cache.
    pub fn drop_entry_from_cache(&self, id: &ObjectId) {
        self.lock().erase(id);
    }

    #[doc(hidden)]
    pub fn add_to_cache(&self, reg: ObjectRegistration) {
        let id = reg.object_id.clone();
        self.lock().insert(id, Arc::new(reg));
    }
}
