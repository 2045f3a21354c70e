// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Coordination through a strongly-consistent, replicated key-value store.
//!
//! The store driver itself is consumed through the [`KvStore`] trait; the
//! crate talks to it exclusively through [`KvCoordinator`], which funnels all
//! writes through atomic multi-key [`Sequence`]s with per-key asserts. That
//! retry-on-assert model is how every read-modify-write transition in the
//! registry and the scrub manager is made linearizable without blocking
//! other writers.

mod coordinator;
mod memory;
mod sequence;

pub use {
    coordinator::{KvCoordinator, RetryOnAssert},
    memory::MemoryKv,
    sequence::{Op, Sequence},
};

/// Error classes surfaced by a key-value store driver
#[derive(Debug)]
#[non_exhaustive]
pub enum KvError {
    /// The key does not exist
    NotFound(String),

    /// An assert in a submitted sequence did not hold
    AssertionFailed,

    /// The contacted node is not the store's current master
    NotMaster,

    /// The driver lost its connection
    NotConnected,

    /// Generic network failure
    Network(String),
}

impl KvError {
    /// Whether a reconnect might help.
    #[must_use]
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::NotMaster | Self::NotConnected | Self::Network(_))
    }
}

impl std::fmt::Display for KvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KvError: {self:?}")
    }
}

impl std::error::Error for KvError {}

/// Key-value store result
pub type KvResult<T> = std::result::Result<T, KvError>;

/// Contract of the replicated key-value store driver.
///
/// Implementations must apply a submitted [`Sequence`] atomically: either
/// every op takes effect, or none does and [`KvError::AssertionFailed`] is
/// returned. [`MemoryKv`] is the in-process reference implementation.
pub trait KvStore: Send + Sync {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// [`KvError::NotFound`] if the key does not exist.
    fn get(&self, key: &str) -> KvResult<Vec<u8>>;

    /// Whether `key` exists.
    fn exists(&self, key: &str) -> KvResult<bool>;

    /// Returns up to `max` keys starting with `prefix`, in order.
    fn prefix(&self, prefix: &str, max: Option<usize>) -> KvResult<Vec<String>>;

    /// Deletes all keys starting with `prefix`.
    fn delete_prefix(&self, prefix: &str) -> KvResult<()>;

    /// Atomically applies a sequence of asserts, sets and deletes.
    fn submit(&self, sequence: &Sequence) -> KvResult<()>;

    /// Re-establishes the connection after a network-class failure.
    fn reconnect(&self) -> KvResult<()>;
}
