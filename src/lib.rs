// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Core of a clustered virtual-disk filesystem.
//!
//! ##### NOTE
//!
//! > This crate only provides the cluster metadata and storage core, not a
//! > full virtual-disk stack. The POSIX front-end, the control plane and the
//! > volume driver proper (snapshotting, scrub workers, failover caches) are
//! > external collaborators; only their contracts appear here.
//!
//! ##### About
//!
//! Virtual disks (volumes), their clones and plain files live *somewhere* in
//! a cluster. This crate keeps track of where, and moves the bytes of
//! file-backed objects in and out of a blob backend:
//!
//! - [`registry::ObjectRegistry`] is the durable cluster directory: which
//!   node owns an object, which backend namespace holds its data, and how it
//!   relates to its clone tree. All mutations go through atomic multi-key
//!   sequences against a strongly-consistent key-value store, so concurrent
//!   actors on different nodes serialize without explicit locks.
//! - [`registry::CachedObjectRegistry`] is a per-node read-through cache
//!   over the registry that trades slight staleness for short lock sections.
//! - [`scrub::ScrubManager`] applies scrub results first to the parent
//!   volume, then to the affected sub-tree of clones, and finally hands the
//!   reclaimed storage to a garbage collector. Its state lives in the
//!   key-value store, so any node can crash between steps without losing
//!   work.
//! - [`filedriver::ContainerManager`] maps byte-addressable containers onto
//!   fixed-size extents stored as backend objects, with an on-disk LRU cache
//!   of materialized extents.
//!
//! The key-value store driver ([`kv::KvStore`]) and the blob backend driver
//! ([`backend::Backend`]) are consumed as traits; [`kv::MemoryKv`] and
//! [`backend::MemoryBackend`] ship as in-process implementations.
//!
//! # Example usage
//!
//! ```
//! use std::sync::Arc;
//! use vdisk_fs::{
//!     kv::{KvCoordinator, MemoryKv},
//!     registry::{FocConfigMode, ObjectRegistry},
//!     ClusterId, Namespace, NodeId, ObjectId,
//! };
//!
//! let kv = Arc::new(KvCoordinator::new(Arc::new(MemoryKv::default())));
//! let registry = ObjectRegistry::new(
//!     ClusterId::new("cluster"),
//!     NodeId::new("node-a"),
//!     kv,
//! )?;
//!
//! let reg = registry.register_base_volume(
//!     &ObjectId::new("volume"),
//!     &Namespace::new("volume"),
//!     FocConfigMode::Automatic,
//! )?;
//! assert_eq!(reg.node_id.as_str(), "node-a");
//!
//! registry.unregister(&ObjectId::new("volume"))?;
//! #
//! # Ok::<(), vdisk_fs::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::indexing_slicing)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;

#[doc(hidden)]
pub mod coding;

mod error;

mod hash;

mod id;

pub mod filedriver;

pub mod kv;

mod lock_store;

mod lru;

mod periodic;

pub mod registry;

pub mod scrub;

pub use {
    error::{Error, Result},
    id::{ClusterId, ContainerId, Namespace, NodeId, ObjectId, SnapshotName},
    lock_store::{GlobalLockStore, LockTag},
    registry::OwnerTag,
};
