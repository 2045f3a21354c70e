// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::{ObjectId, SnapshotName};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::{
    collections::BTreeMap,
    io::{Read, Write},
};

/// Kind of a registered object
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ObjectType {
    /// A plain file, no clone-tree relationships
    File,

    /// A (base or cloned) volume
    Volume,

    /// A volume promoted to read-only, usable as a clone source
    Template,
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "File"),
            Self::Volume => write!(f, "Volume"),
            Self::Template => write!(f, "Template"),
        }
    }
}

impl From<ObjectType> for u8 {
    fn from(value: ObjectType) -> Self {
        match value {
            ObjectType::File => 0,
            ObjectType::Volume => 1,
            ObjectType::Template => 2,
        }
    }
}

impl TryFrom<u8> for ObjectType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::File),
            1 => Ok(Self::Volume),
            2 => Ok(Self::Template),
            _ => Err(()),
        }
    }
}

/// Direct children of an object, each with the parent snapshot it was cloned
/// from (no snapshot iff the parent is a template)
pub type Descendants = BTreeMap<ObjectId, Option<SnapshotName>>;

/// An object's kind and its clone-tree edges.
///
/// Immutable once built; registry mutations replace the whole value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectTreeConfig {
    /// Kind of the object
    pub object_type: ObjectType,

    /// Immediate parent; present iff the object is a clone
    pub parent_volume: Option<ObjectId>,

    /// Direct children and their clone snapshots
    pub descendants: Descendants,
}

impl ObjectTreeConfig {
    /// A base volume: no parent, no descendants yet.
    #[must_use]
    pub fn base() -> Self {
        Self {
            object_type: ObjectType::Volume,
            parent_volume: None,
            descendants: Descendants::new(),
        }
    }

    /// A plain file.
    #[must_use]
    pub fn file() -> Self {
        Self {
            object_type: ObjectType::File,
            parent_volume: None,
            descendants: Descendants::new(),
        }
    }

    /// A freshly cloned volume.
    #[must_use]
    pub fn clone_of(parent: ObjectId) -> Self {
        Self {
            object_type: ObjectType::Volume,
            parent_volume: Some(parent),
            descendants: Descendants::new(),
        }
    }

    /// A template (possibly itself a templatized clone).
    #[must_use]
    pub fn template(parent: Option<ObjectId>) -> Self {
        Self {
            object_type: ObjectType::Template,
            parent_volume: parent,
            descendants: Descendants::new(),
        }
    }

    /// Rebuilds a parent's config with an updated descendant set.
    #[must_use]
    pub fn parent(
        object_type: ObjectType,
        descendants: Descendants,
        grandparent: Option<ObjectId>,
    ) -> Self {
        Self {
            object_type,
            parent_volume: grandparent,
            descendants,
        }
    }
}

impl Encode for ObjectTreeConfig {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_u8(u8::from(self.object_type))?;
        self.parent_volume.encode_into(writer)?;
        self.descendants.encode_into(writer)?;
        Ok(())
    }
}

impl Decode for ObjectTreeConfig {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let raw = reader.read_u8()?;
        let object_type = raw
            .try_into()
            .map_err(|()| DecodeError::InvalidTag(("ObjectType", raw)))?;

        Ok(Self {
            object_type,
            parent_volume: Option::decode_from(reader)?,
            descendants: Descendants::decode_from(reader)?,
        })
    }
}
