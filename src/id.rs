// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Strongly-typed identifiers.
//!
//! Each identifier is a newtype over an opaque string; comparisons are
//! byte-wise. Mixing up, say, a node id and an object id is a type error
//! instead of a 3 AM incident.

use crate::coding::{decode_str, encode_str, Decode, DecodeError, Encode, EncodeError};
use std::io::{Read, Write};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw string.
            #[must_use]
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Unwraps into the raw string.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.into())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Encode for $name {
            fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
                encode_str(&self.0, writer)
            }
        }

        impl Decode for $name {
            fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
                Ok(Self(decode_str(reader)?))
            }
        }
    };
}

string_id!(
    /// Identifies a cluster; prefixes all of the cluster's durable keys.
    ClusterId
);

string_id!(
    /// Identifies a node within a cluster.
    NodeId
);

string_id!(
    /// Identifies a registered object (base volume, clone, template or file).
    ObjectId
);

string_id!(
    /// Identifies a container in the file driver.
    ContainerId
);

string_id!(
    /// A backend storage namespace.
    Namespace
);

string_id!(
    /// Name of a volume snapshot.
    SnapshotName
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coding::{Decode, Encode};

    #[test]
    fn roundtrip() {
        let id = ObjectId::new("some-volume");
        let buf = id.encode_into_vec();
        assert_eq!(id, ObjectId::decode_from_slice(&buf).expect("decodes"));
    }

    #[test]
    fn ordering_is_bytewise() {
        assert!(NodeId::new("a") < NodeId::new("b"));
        assert!(NodeId::new("a") < NodeId::new("aa"));
    }
}
