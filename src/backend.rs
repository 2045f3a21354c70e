// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The blob backend contract.
//!
//! A [`Backend`] handle is bound to one storage namespace and moves whole
//! objects between the backend and local files; the concrete driver (wire
//! protocol, replication, ...) lives outside this crate.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::Mutex,
};

/// Whether a backend write may replace an existing object
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Overwrite {
    /// Replace the object if it exists
    Yes,
    /// Fail if the object exists
    No,
}

/// Error classes surfaced by a backend driver
#[derive(Debug)]
#[non_exhaustive]
pub enum BackendError {
    /// The requested object does not exist
    ObjectDoesNotExist(String),

    /// The handle's namespace does not exist
    NamespaceDoesNotExist,

    /// An object exists and overwriting was not requested
    OverwriteNotAllowed(String),

    /// Local file I/O while staging an object
    Io(std::io::Error),

    /// Anything else the driver wants to surface
    Other(String),
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BackendError: {self:?}")
    }
}

impl std::error::Error for BackendError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Backend result
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A blob-store handle bound to one namespace.
///
/// Objects are opaque byte blobs addressed by name; `read` materializes an
/// object into a local file, `write` uploads a local file. Namespace
/// management only concerns the handle's own namespace.
pub trait Backend: Send + Sync {
    /// Whether the handle's namespace exists.
    ///
    /// # Errors
    ///
    /// Driver failures.
    fn namespace_exists(&self) -> BackendResult<bool>;

    /// Creates the handle's namespace.
    ///
    /// # Errors
    ///
    /// Driver failures.
    fn create_namespace(&self) -> BackendResult<()>;

    /// Deletes the handle's namespace and everything in it.
    ///
    /// # Errors
    ///
    /// Driver failures.
    fn delete_namespace(&self) -> BackendResult<()>;

    /// Fetches `object_name` into the local file at `path`.
    ///
    /// `require_latest` demands the most recent version from backends with
    /// eventually-consistent reads.
    ///
    /// # Errors
    ///
    /// [`BackendError::ObjectDoesNotExist`] when the object is absent.
    fn read(&self, path: &Path, object_name: &str, require_latest: bool) -> BackendResult<()>;

    /// Uploads the local file at `path` as `object_name`.
    ///
    /// # Errors
    ///
    /// [`BackendError::OverwriteNotAllowed`] when the object exists and
    /// `overwrite` is [`Overwrite::No`].
    fn write(&self, path: &Path, object_name: &str, overwrite: Overwrite) -> BackendResult<()>;

    /// Removes `object_name`.
    ///
    /// # Errors
    ///
    /// [`BackendError::ObjectDoesNotExist`] when the object is absent.
    fn remove(&self, object_name: &str) -> BackendResult<()>;

    /// Lists all object names in the namespace.
    ///
    /// # Errors
    ///
    /// Driver failures.
    fn list_objects(&self) -> BackendResult<Vec<String>>;

    /// Returns the size of `object_name` in bytes.
    ///
    /// # Errors
    ///
    /// [`BackendError::ObjectDoesNotExist`] when the object is absent.
    fn get_size(&self, object_name: &str) -> BackendResult<u64>;
}

#[derive(Default)]
struct MemoryNamespace {
    exists: bool,
    objects: BTreeMap<String, Vec<u8>>,
}

/// In-process [`Backend`] keeping objects on the heap.
///
/// The namespace starts out absent, mirroring a fresh cluster. Used by the
/// test suite and useful for embedding without a real blob store.
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<MemoryNamespace>,
}

impl MemoryBackend {
    /// Creates a backend handle whose namespace does not exist yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[allow(clippy::expect_used)]
impl Backend for MemoryBackend {
    fn namespace_exists(&self) -> BackendResult<bool> {
        Ok(self.inner.lock().expect("lock is poisoned").exists)
    }

    fn create_namespace(&self) -> BackendResult<()> {
        self.inner.lock().expect("lock is poisoned").exists = true;
        Ok(())
    }

    fn delete_namespace(&self) -> BackendResult<()> {
        let mut inner = self.inner.lock().expect("lock is poisoned");
        inner.exists = false;
        inner.objects.clear();
        Ok(())
    }

    fn read(&self, path: &Path, object_name: &str, _require_latest: bool) -> BackendResult<()> {
        let inner = self.inner.lock().expect("lock is poisoned");

        let bytes = inner
            .objects
            .get(object_name)
            .ok_or_else(|| BackendError::ObjectDoesNotExist(object_name.into()))?;

        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn write(&self, path: &Path, object_name: &str, overwrite: Overwrite) -> BackendResult<()> {
        let bytes = std::fs::read(path)?;
        let mut inner = self.inner.lock().expect("lock is poisoned");

        if overwrite == Overwrite::No && inner.objects.contains_key(object_name) {
            return Err(BackendError::OverwriteNotAllowed(object_name.into()));
        }

        inner.objects.insert(object_name.into(), bytes);
        Ok(())
    }

    fn remove(&self, object_name: &str) -> BackendResult<()> {
        self.inner
            .lock()
            .expect("lock is poisoned")
            .objects
            .remove(object_name)
            .map(|_| ())
            .ok_or_else(|| BackendError::ObjectDoesNotExist(object_name.into()))
    }

    fn list_objects(&self) -> BackendResult<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .expect("lock is poisoned")
            .objects
            .keys()
            .cloned()
            .collect())
    }

    fn get_size(&self, object_name: &str) -> BackendResult<u64> {
        self.inner
            .lock()
            .expect("lock is poisoned")
            .objects
            .get(object_name)
            .map(|bytes| bytes.len() as u64)
            .ok_or_else(|| BackendError::ObjectDoesNotExist(object_name.into()))
    }
}
