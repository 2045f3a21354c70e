// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::{
    backend::BackendError,
    coding::{DecodeError, EncodeError},
    filedriver::ExtentId,
    kv::KvError,
    ContainerId, Namespace, NodeId, ObjectId,
};

/// Represents errors that can occur in the virtual-disk filesystem core
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Serialization failed
    Encode(EncodeError),

    /// Deserialization failed
    Decode(DecodeError),

    /// Key-value store error
    Kv(KvError),

    /// Blob backend error
    Backend(BackendError),

    /// A configuration value was rejected
    InvalidConfig(String),

    /// A string did not parse as an extent name
    NotAnExtentId(String),

    /// An extent is marked present but its backend object is gone
    ExtentMissing(ExtentId),

    /// No live container with that id
    ContainerNotFound(ContainerId),

    /// A container with that id is already live
    ContainerAlreadyExists(ContainerId),

    /// The object is already present in the registry
    ObjectAlreadyRegistered(ObjectId),

    /// The object is not present in the registry
    ObjectNotRegistered(ObjectId),

    /// The object is owned by another node (expected, actual)
    WrongOwner {
        /// Object in question
        id: ObjectId,
        /// Owner the caller expected
        expected: NodeId,
        /// Owner found in the registry
        actual: NodeId,
    },

    /// A concurrent update won the race and no retry was requested
    ConflictingUpdate(ObjectId),

    /// The registry contents violate an invariant
    Inconsistency(String),

    /// The operation is not legal on this object's clone-tree position
    InvalidOperation {
        /// Object in question
        id: ObjectId,
        /// Why the operation was refused
        reason: &'static str,
    },

    /// A scrub reply was queued against the wrong object
    InvalidScrubReply(String),

    /// The global lock changed under the writer
    LockHasChanged(Namespace),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VdiskFsError: {self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encode(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Kv(e) => Some(e),
            Self::Backend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<KvError> for Error {
    fn from(value: KvError) -> Self {
        Self::Kv(value)
    }
}

impl From<BackendError> for Error {
    fn from(value: BackendError) -> Self {
        Self::Backend(value)
    }
}

/// Crate result
pub type Result<T> = std::result::Result<T, Error>;
