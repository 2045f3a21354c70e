// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::kv::{KvCoordinator, KvError, RetryOnAssert};
use crate::ClusterId;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    io::{Read, Write},
    sync::Arc,
};

/// Monotonic 64-bit ownership counter used to fence stale owners.
///
/// Every ownership-changing registry operation stamps the registration with
/// a freshly allocated tag; components compare the tag they obtained at
/// operation start against the one stored at commit time. The value 0 is
/// reserved for registrations predating owner tags ("unassigned") and is
/// upgraded in place on first observation.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct OwnerTag(u64);

impl OwnerTag {
    /// The reserved "unassigned / legacy" tag.
    pub const UNASSIGNED: Self = Self(0);

    /// Wraps a raw counter value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Whether this is the legacy 0 tag.
    #[must_use]
    pub fn is_unassigned(self) -> bool {
        self.0 == 0
    }

    /// The successor tag; wrap-around skips the reserved 0.
    #[must_use]
    pub fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            0 => Self(1),
            n => Self(n),
        }
    }
}

impl std::fmt::Display for OwnerTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Encode for OwnerTag {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u64::<BigEndian>(self.0)?;
        Ok(())
    }
}

impl Decode for OwnerTag {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        Ok(Self(reader.read_u64::<BigEndian>()?))
    }
}

/// Cluster-wide owner tag counter, kept in the key-value store.
pub struct OwnerTagAllocator {
    kv: Arc<KvCoordinator>,
    key: String,
}

impl OwnerTagAllocator {
    /// Opens the allocator, initializing the counter to 1 if absent.
    /// Racing initializers on other nodes are tolerated.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn new(cluster_id: &ClusterId, kv: Arc<KvCoordinator>) -> crate::Result<Self> {
        let this = Self {
            kv,
            key: format!("{cluster_id}/last_owner_tag"),
        };
        this.maybe_init()?;
        Ok(this)
    }

    fn maybe_init(&self) -> crate::Result<()> {
        if self.kv.exists(&self.key)? {
            return Ok(());
        }

        let res = self.kv.run_sequence(
            "initializing owner tag counter",
            |seq| {
                seq.assert(&self.key, None);
                seq.set(&self.key, OwnerTag::new(1).encode_into_vec());
                Ok(())
            },
            RetryOnAssert::No,
        );

        match res {
            Err(crate::Error::Kv(KvError::AssertionFailed)) => {
                log::warn!(
                    "failed to initialize counter {} - another node beat us to it?",
                    self.key,
                );

                if self.kv.exists(&self.key)? {
                    Ok(())
                } else {
                    Err(crate::Error::Inconsistency(format!(
                        "counter {} neither initializable nor present",
                        self.key,
                    )))
                }
            }
            other => other,
        }
    }

    /// Atomically allocates the next tag; never returns the reserved 0.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn allocate(&self) -> crate::Result<OwnerTag> {
        let mut tag = OwnerTag::UNASSIGNED;

        self.kv.run_sequence(
            "updating owner tag counter",
            |seq| {
                let buf = self.kv.get(&self.key)?;
                tag = OwnerTag::decode_from_slice(&buf)?;

                seq.assert(&self.key, Some(buf));
                seq.set(&self.key, tag.next().encode_into_vec());
                Ok(())
            },
            RetryOnAssert::Yes,
        )?;

        Ok(tag)
    }

    /// Removes the counter.
    ///
    /// # Errors
    ///
    /// Store failures.
    pub fn destroy(&self) -> crate::Result<()> {
        self.kv.delete_prefix(&self.key)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    #[test]
    fn tags_are_monotonic_and_nonzero() -> crate::Result<()> {
        let kv = Arc::new(KvCoordinator::new(Arc::new(MemoryKv::default())));
        let alloc = OwnerTagAllocator::new(&ClusterId::new("c"), kv.clone())?;

        let a = alloc.allocate()?;
        let b = alloc.allocate()?;

        assert_eq!(OwnerTag::new(1), a);
        assert!(b > a);
        assert!(!a.is_unassigned());

        // a second allocator over the same store continues the count
        let other = OwnerTagAllocator::new(&ClusterId::new("c"), kv)?;
        assert!(other.allocate()? > b);

        Ok(())
    }

    #[test]
    fn wrap_around_skips_zero() {
        assert_eq!(OwnerTag::new(1), OwnerTag::new(u64::MAX).next());
        assert_eq!(OwnerTag::new(2), OwnerTag::new(1).next());
    }
}
