// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Container, ExtentCache, FileDriverConfig};
use crate::backend::Backend;
use crate::ContainerId;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Mutex, MutexGuard};

type ContainerMap = FxHashMap<ContainerId, Arc<Container>>;

/// Per-node registry of live containers.
///
/// Owns the shared extent cache and the backend handle; all container
/// operations dispatch by id.
pub struct ContainerManager {
    backend: Arc<dyn Backend>,
    cache: Arc<ExtentCache>,
    containers: Mutex<ContainerMap>,
}

impl ContainerManager {
    /// Sets up the manager: validates the config, creates the backend
    /// namespace if missing and opens the (cleared) extent cache.
    ///
    /// # Errors
    ///
    /// Config validation, backend or cache-directory failures.
    pub fn new(backend: Arc<dyn Backend>, config: &FileDriverConfig) -> crate::Result<Self> {
        config.validate()?;

        if !backend.namespace_exists()? {
            log::info!(
                "namespace {} does not exist - creating it",
                config.fd_namespace,
            );
            backend.create_namespace()?;
        }

        let cache = Arc::new(ExtentCache::new(
            &config.fd_cache_path,
            config.fd_extent_cache_capacity,
        )?);

        log::info!("up and running, namespace {}", config.fd_namespace);

        Ok(Self {
            backend,
            cache,
            containers: Mutex::new(ContainerMap::default()),
        })
    }

    /// Tears down the file driver's backend namespace.
    ///
    /// # Errors
    ///
    /// Backend failures.
    pub fn destroy(backend: &dyn Backend) -> crate::Result<()> {
        log::info!("destroying file driver namespace");
        backend.delete_namespace()?;
        Ok(())
    }

    #[allow(clippy::expect_used)]
    fn lock(&self) -> MutexGuard<'_, ContainerMap> {
        self.containers.lock().expect("lock is poisoned")
    }

    fn find(&self, cid: &ContainerId) -> Option<Arc<Container>> {
        self.lock().get(cid).cloned()
    }

    fn find_throw(&self, cid: &ContainerId) -> crate::Result<Arc<Container>> {
        self.find(cid)
            .ok_or_else(|| crate::Error::ContainerNotFound(cid.clone()))
    }

    /// Creates an empty container.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ContainerAlreadyExists`] on a duplicate id.
    pub fn create(&self, cid: &ContainerId) -> crate::Result<()> {
        log::trace!("creating container {cid}");

        let mut containers = self.lock();

        if containers.contains_key(cid) {
            log::error!("cannot create {cid} as it exists already");
            return Err(crate::Error::ContainerAlreadyExists(cid.clone()));
        }

        containers.insert(
            cid.clone(),
            Arc::new(Container::new(
                cid.clone(),
                self.cache.clone(),
                self.backend.clone(),
            )),
        );

        Ok(())
    }

    /// Reads from a container; see [`Container::read`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::ContainerNotFound`] plus the container's own errors.
    pub fn read(&self, cid: &ContainerId, off: u64, buf: &mut [u8]) -> crate::Result<usize> {
        self.find_throw(cid)?.read(off, buf)
    }

    /// Writes to a container; see [`Container::write`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::ContainerNotFound`] plus the container's own errors.
    pub fn write(&self, cid: &ContainerId, off: u64, buf: &[u8]) -> crate::Result<usize> {
        self.find_throw(cid)?.write(off, buf)
    }

    /// Resizes a container; see [`Container::resize`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::ContainerNotFound`] plus the container's own errors.
    pub fn resize(&self, cid: &ContainerId, new_size: u64) -> crate::Result<()> {
        self.find_throw(cid)?.resize(new_size)
    }

    /// Logical size of a container.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ContainerNotFound`].
    pub fn size(&self, cid: &ContainerId) -> crate::Result<u64> {
        Ok(self.find_throw(cid)?.size())
    }

    /// Unlinks a container: it disappears from the lookup space first, so
    /// partially failing backend deletions cannot resurrect it.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ContainerNotFound`].
    pub fn unlink(&self, cid: &ContainerId) -> crate::Result<()> {
        log::trace!("unlinking container {cid}");

        let container = self
            .lock()
            .remove(cid)
            .ok_or_else(|| crate::Error::ContainerNotFound(cid.clone()))?;

        container.unlink();
        Ok(())
    }

    /// Drops a container's cached extents; see [`Container::drop_from_cache`].
    ///
    /// # Errors
    ///
    /// [`crate::Error::ContainerNotFound`].
    pub fn drop_from_cache(&self, cid: &ContainerId) -> crate::Result<()> {
        self.find_throw(cid)?.drop_from_cache();
        Ok(())
    }

    /// Revives a container from the backend after a node restart.
    ///
    /// Idempotent: a live container is left alone, and losing the race to a
    /// concurrent restarter is tolerated.
    ///
    /// # Errors
    ///
    /// Backend failures during the resync.
    pub fn restart(&self, cid: &ContainerId) -> crate::Result<()> {
        log::info!("restarting container {cid}");

        {
            let containers = self.lock();

            if containers.contains_key(cid) {
                log::info!("{cid} is already up and running, nothing to restart");
                return Ok(());
            }
        }

        let container = Arc::new(Container::new(
            cid.clone(),
            self.cache.clone(),
            self.backend.clone(),
        ));

        container.restart()?;

        let mut containers = self.lock();

        if containers.contains_key(cid) {
            log::info!("{cid} is already up and running - some other thread beat us to it");
        } else {
            containers.insert(cid.clone(), container);
        }

        Ok(())
    }

    /// Applies an updated configuration; currently only the extent cache
    /// capacity takes effect at runtime.
    ///
    /// # Errors
    ///
    /// Config validation.
    pub fn update(&self, config: &FileDriverConfig) -> crate::Result<()> {
        config.validate()?;

        if config.fd_extent_cache_capacity != self.cache.capacity() {
            self.cache.set_capacity(config.fd_extent_cache_capacity)?;
        }

        Ok(())
    }
}
