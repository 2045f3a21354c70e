// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{ObjectTreeConfig, OwnerTag};
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::{Namespace, NodeId, ObjectId};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::{
    io::{Read, Write},
    sync::Arc,
};

/// Failover-cache configuration mode of a volume
// 0 is deliberately not a valid wire value
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FocConfigMode {
    /// The cluster picks and maintains the failover cache
    Automatic,

    /// The failover cache is configured explicitly
    Manual,
}

impl std::fmt::Display for FocConfigMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Automatic => write!(f, "Automatic"),
            Self::Manual => write!(f, "Manual"),
        }
    }
}

impl From<FocConfigMode> for u8 {
    fn from(value: FocConfigMode) -> Self {
        match value {
            FocConfigMode::Automatic => 1,
            FocConfigMode::Manual => 2,
        }
    }
}

impl TryFrom<u8> for FocConfigMode {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Automatic),
            2 => Ok(Self::Manual),
            _ => Err(()),
        }
    }
}

/// Durable format version of [`ObjectRegistration`].
///
/// - v2: namespace, object id, node id, tree config
/// - v3: adds the owner tag
/// - v4: adds the failover-cache config mode
///
/// Loaders accept anything from v2 up; savers only ever produce v4. A v2
/// registration loads with [`OwnerTag::UNASSIGNED`], which marks it for
/// in-place upgrading.
const FORMAT_VERSION: u8 = 4;
const MIN_FORMAT_VERSION: u8 = 2;

/// A registered object's durable cluster state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObjectRegistration {
    /// Backend namespace holding the object's data
    pub namespace: Namespace,

    /// The object
    pub object_id: ObjectId,

    /// Node currently owning the object
    pub node_id: NodeId,

    /// Clone-tree position
    pub tree_config: ObjectTreeConfig,

    /// Ownership fencing tag
    pub owner_tag: OwnerTag,

    /// Failover-cache configuration mode
    pub foc_config_mode: FocConfigMode,
}

/// Shared handle to a registration as returned by the registries.
pub type ObjectRegistrationPtr = Arc<ObjectRegistration>;

impl ObjectRegistration {
    #[doc(hidden)]
    pub fn encode_with_version(&self, version: u8) -> Result<Vec<u8>, EncodeError> {
        let mut buf = vec![];

        buf.write_u8(version)?;
        self.namespace.encode_into(&mut buf)?;
        self.object_id.encode_into(&mut buf)?;
        self.node_id.encode_into(&mut buf)?;
        self.tree_config.encode_into(&mut buf)?;

        if version > 2 {
            self.owner_tag.encode_into(&mut buf)?;
        }

        if version >= 4 {
            buf.write_u8(u8::from(self.foc_config_mode))?;
        }

        Ok(buf)
    }
}

impl Encode for ObjectRegistration {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        let buf = self.encode_with_version(FORMAT_VERSION)?;
        writer.write_all(&buf)?;
        Ok(())
    }
}

impl Decode for ObjectRegistration {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let version = reader.read_u8()?;

        if !(MIN_FORMAT_VERSION..=FORMAT_VERSION).contains(&version) {
            return Err(DecodeError::InvalidVersion(version));
        }

        let namespace = Namespace::decode_from(reader)?;
        let object_id = ObjectId::decode_from(reader)?;
        let node_id = NodeId::decode_from(reader)?;
        let tree_config = ObjectTreeConfig::decode_from(reader)?;

        let owner_tag = if version > 2 {
            OwnerTag::decode_from(reader)?
        } else {
            OwnerTag::UNASSIGNED
        };

        let foc_config_mode = if version >= 4 {
            let raw = reader.read_u8()?;
            raw.try_into()
                .map_err(|()| DecodeError::InvalidTag(("FocConfigMode", raw)))?
        } else {
            FocConfigMode::Automatic
        };

        Ok(Self {
            namespace,
            object_id,
            node_id,
            tree_config,
            owner_tag,
            foc_config_mode,
        })
    }
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn registration() -> ObjectRegistration {
        ObjectRegistration {
            namespace: Namespace::new("ns"),
            object_id: ObjectId::new("vol"),
            node_id: NodeId::new("node-a"),
            tree_config: ObjectTreeConfig::base(),
            owner_tag: OwnerTag::new(7),
            foc_config_mode: FocConfigMode::Manual,
        }
    }

    #[test]
    fn current_version_roundtrip() {
        let reg = registration();
        let buf = reg.encode_into_vec();

        assert_eq!(4, buf[0]);
        assert_eq!(
            reg,
            ObjectRegistration::decode_from_slice(&buf).expect("decodes")
        );
    }

    #[test]
    fn v2_loads_with_defaults() {
        let buf = registration().encode_with_version(2).expect("encodes");
        let reg = ObjectRegistration::decode_from_slice(&buf).expect("decodes");

        assert_eq!(OwnerTag::UNASSIGNED, reg.owner_tag);
        assert_eq!(FocConfigMode::Automatic, reg.foc_config_mode);
        assert_eq!(NodeId::new("node-a"), reg.node_id);
    }

    #[test]
    fn v3_loads_without_foc_mode() {
        let buf = registration().encode_with_version(3).expect("encodes");
        let reg = ObjectRegistration::decode_from_slice(&buf).expect("decodes");

        assert_eq!(OwnerTag::new(7), reg.owner_tag);
        assert_eq!(FocConfigMode::Automatic, reg.foc_config_mode);
    }

    #[test]
    fn unsupported_versions_are_rejected() {
        for version in [0, 1, 5] {
            let buf = registration()
                .encode_with_version(version.max(2))
                .map(|mut b| {
                    b[0] = version;
                    b
                })
                .expect("encodes");

            assert!(matches!(
                ObjectRegistration::decode_from_slice(&buf),
                Err(DecodeError::InvalidVersion(v)) if v == version
            ));
        }
    }
}
