//! Opaque byte blobs used as both raw-store keys and raw-store values.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec::{Codec, CodecError};

/// Immutable byte sequence with structural equality.
///
/// Two blobs are equal iff their bytes are equal, whatever they decode to.
/// This is what lets entries written under an older schema sit in the same
/// map as current ones.
///
/// Serialized as a standard base64 string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct OpaqueBlob(Vec<u8>);

impl OpaqueBlob {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Encode a value with the given codec.
    pub fn encode<C, T>(codec: &C, value: &T) -> Result<Self, CodecError>
    where
        C: Codec,
        T: Serialize + ?Sized,
    {
        codec.encode(value).map(Self)
    }

    /// Decode the blob into a value of type `T`.
    pub fn decode<C, T>(&self, codec: &C) -> Result<T, CodecError>
    where
        C: Codec,
        T: DeserializeOwned,
    {
        codec.decode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for OpaqueBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for OpaqueBlob {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for OpaqueBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OpaqueBlob({} bytes)", self.0.len())
    }
}

impl Serialize for OpaqueBlob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for OpaqueBlob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Self)
            .map_err(serde::de::Error::custom)
    }
}
