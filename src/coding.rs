// Copyright (c) 2026-present, vdisk-fs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Binary serialization of durable values.
//!
//! Everything that ends up in the key-value store (registrations, scrub
//! queues, garbage blobs) goes through these traits. Integers are big-endian,
//! strings are length-prefixed, containers carry an explicit count.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::{
    collections::BTreeMap,
    io::{Read, Write},
};
use uuid::Uuid;

/// Error during serialization
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "EncodeError({})",
            match self {
                Self::Io(e) => e.to_string(),
            }
        )
    }
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
        }
    }
}

/// Error during deserialization
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),

    /// An enum tag byte had no known meaning (type name, tag)
    InvalidTag((&'static str, u8)),

    /// Unsupported format version
    InvalidVersion(u8),

    /// A string field did not hold valid UTF-8
    InvalidUtf8,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DecodeError({self:?})")
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

/// Trait to serialize stuff
pub trait Encode {
    /// Serializes into writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into vector.
    #[allow(clippy::expect_used)]
    fn encode_into_vec(&self) -> Vec<u8> {
        let mut v = vec![];
        self.encode_into(&mut v).expect("cannot fail");
        v
    }
}

/// Trait to deserialize stuff
pub trait Decode {
    /// Deserializes from reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;

    /// Deserializes from a byte slice.
    fn decode_from_slice(mut bytes: &[u8]) -> Result<Self, DecodeError>
    where
        Self: Sized,
    {
        Self::decode_from(&mut bytes)
    }
}

impl Encode for String {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        encode_str(self, writer)
    }
}

impl Decode for String {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        decode_str(reader)
    }
}

impl<T: Encode> Encode for Option<T> {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            None => writer.write_u8(0)?,
            Some(inner) => {
                writer.write_u8(1)?;
                inner.encode_into(writer)?;
            }
        }
        Ok(())
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        match reader.read_u8()? {
            0 => Ok(None),
            1 => Ok(Some(T::decode_from(reader)?)),
            tag => Err(DecodeError::InvalidTag(("Option", tag))),
        }
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        // NOTE: Truncation is okay, counts never get near u32::MAX
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<BigEndian>(self.len() as u32)?;

        for item in self {
            item.encode_into(writer)?;
        }

        Ok(())
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let len = reader.read_u32::<BigEndian>()?;
        let mut v = Self::with_capacity(len.min(1_024) as usize);

        for _ in 0..len {
            v.push(T::decode_from(reader)?);
        }

        Ok(v)
    }
}

impl<K: Encode, V: Encode> Encode for BTreeMap<K, V> {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<BigEndian>(self.len() as u32)?;

        for (k, v) in self {
            k.encode_into(writer)?;
            v.encode_into(writer)?;
        }

        Ok(())
    }
}

impl<K: Decode + Ord, V: Decode> Decode for BTreeMap<K, V> {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let len = reader.read_u32::<BigEndian>()?;
        let mut map = Self::new();

        for _ in 0..len {
            let k = K::decode_from(reader)?;
            let v = V::decode_from(reader)?;
            map.insert(k, v);
        }

        Ok(map)
    }
}

impl Encode for Uuid {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(self.as_bytes())?;
        Ok(())
    }
}

impl Decode for Uuid {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut bytes = [0u8; 16];
        reader.read_exact(&mut bytes)?;
        Ok(Self::from_bytes(bytes))
    }
}

/// Writes a length-prefixed UTF-8 string.
pub fn encode_str<W: Write>(s: &str, writer: &mut W) -> Result<(), EncodeError> {
    // NOTE: Truncation is okay, identifiers are far below 64 KiB
    #[allow(clippy::cast_possible_truncation)]
    writer.write_u16::<BigEndian>(s.len() as u16)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

/// Reads a length-prefixed UTF-8 string.
pub fn decode_str<R: Read>(reader: &mut R) -> Result<String, DecodeError> {
    let len = reader.read_u16::<BigEndian>()?;
    let mut bytes = vec![0; len.into()];
    reader.read_exact(&mut bytes)?;
    String::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8)
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrip() -> Result<(), DecodeError> {
        let v = String::from("some/key").encode_into_vec();
        assert_eq!("some/key", String::decode_from_slice(&v)?);
        Ok(())
    }

    #[test]
    fn option_roundtrip() -> Result<(), DecodeError> {
        let v = Some(String::from("x")).encode_into_vec();
        assert_eq!(Some(String::from("x")), Option::decode_from_slice(&v)?);

        let v = Option::<String>::None.encode_into_vec();
        assert_eq!(None, Option::<String>::decode_from_slice(&v)?);
        Ok(())
    }

    #[test]
    fn map_roundtrip() -> Result<(), DecodeError> {
        let mut map = BTreeMap::new();
        map.insert(String::from("a"), Some(String::from("1")));
        map.insert(String::from("b"), None);

        let v = map.encode_into_vec();
        assert_eq!(map, BTreeMap::decode_from_slice(&v)?);
        Ok(())
    }

    #[test]
    fn uuid_roundtrip() -> Result<(), DecodeError> {
        let uuid = Uuid::new_v4();
        assert_eq!(uuid, Uuid::decode_from_slice(&uuid.encode_into_vec())?);
        Ok(())
    }

    #[test]
    fn truncated_input_is_rejected() {
        let v = String::from("hello").encode_into_vec();
        assert!(String::decode_from_slice(&v[..3]).is_err());
    }
}
