// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::Namespace;
use std::path::PathBuf;

const DEFAULT_EXTENT_CACHE_CAPACITY: usize = 1_024;

/// File driver configuration
#[derive(Clone, Debug)]
pub struct FileDriverConfig {
    /// On-disk directory for the extent cache; cleared on start
    pub fd_cache_path: PathBuf,

    /// Backend namespace for extent storage
    pub fd_namespace: Namespace,

    /// Number of extents the extent cache can hold
    pub fd_extent_cache_capacity: usize,
}

impl FileDriverConfig {
    /// Config with the default cache capacity (1024 extents).
    #[must_use]
    pub fn new(fd_cache_path: impl Into<PathBuf>, fd_namespace: Namespace) -> Self {
        Self {
            fd_cache_path: fd_cache_path.into(),
            fd_namespace,
            fd_extent_cache_capacity: DEFAULT_EXTENT_CACHE_CAPACITY,
        }
    }

    /// Sets the extent cache capacity.
    #[must_use]
    pub fn with_extent_cache_capacity(mut self, capacity: usize) -> Self {
        self.fd_extent_cache_capacity = capacity;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// [`crate::Error::InvalidConfig`] when `fd_extent_cache_capacity` is 0.
    pub fn validate(&self) -> crate::Result<()> {
        if self.fd_extent_cache_capacity == 0 {
            return Err(crate::Error::InvalidConfig(
                "fd_extent_cache_capacity must be > 0".into(),
            ));
        }

        Ok(())
    }
}
