// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::ContainerId;

const SEPARATOR: u8 = b'.';
const SUFFIX_DIGITS: usize = 8;

/// Names one extent of a container.
///
/// The `Display` form doubles as the backend object name:
/// `{container_id}.{offset:08x}` (dot separator, lowercase hex, zero-padded
/// to 8 digits). Because the offset suffix has a fixed width, container ids
/// may themselves contain dots; parsing splits from the end.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ExtentId {
    /// Container this extent belongs to
    pub container_id: ContainerId,

    /// Index of the extent within the container (`byte_offset / CAPACITY`)
    pub offset: u32,
}

impl ExtentId {
    /// Builds an extent id from its parts.
    #[must_use]
    pub fn new(container_id: ContainerId, offset: u32) -> Self {
        Self {
            container_id,
            offset,
        }
    }
}

impl std::fmt::Display for ExtentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:08x}", self.container_id, self.offset)
    }
}

impl std::str::FromStr for ExtentId {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some(sep_at) = s.len().checked_sub(SUFFIX_DIGITS + 1) else {
            return Err(crate::Error::NotAnExtentId(s.into()));
        };

        if s.as_bytes().get(sep_at) != Some(&SEPARATOR) {
            return Err(crate::Error::NotAnExtentId(s.into()));
        }

        // the separator byte is ASCII, so both split points lie on char
        // boundaries
        let (container_id, suffix) = match (s.get(..sep_at), s.get(sep_at + 1..)) {
            (Some(cid), Some(suffix)) => (cid, suffix),
            _ => return Err(crate::Error::NotAnExtentId(s.into())),
        };

        if !suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(crate::Error::NotAnExtentId(s.into()));
        }

        let offset = u32::from_str_radix(suffix, 16)
            .map_err(|_| crate::Error::NotAnExtentId(s.into()))?;

        Ok(Self {
            container_id: ContainerId::new(container_id),
            offset,
        })
    }
}
