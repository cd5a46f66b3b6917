//! Codec boundary between typed values and canonical bytes.
//!
//! The store only cares whether a conversion succeeded. The error variants
//! exist for logging.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Failure converting a value to or from bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The value could not be encoded.
    #[error("failed to encode {type_name}: {message}")]
    Encode {
        type_name: &'static str,
        message: String,
    },

    /// The bytes are well-formed but do not describe the requested type.
    #[error("bytes do not match {type_name}: {message}")]
    UnknownType {
        type_name: &'static str,
        message: String,
    },

    /// The bytes are truncated or malformed.
    #[error("corrupt data for {type_name}: {message}")]
    CorruptData {
        type_name: &'static str,
        message: String,
    },
}

/// Converts values to canonical bytes and back.
///
/// Encoding must be deterministic: equal values have to produce equal bytes,
/// because encoded keys are compared byte-for-byte. Prefer ordered maps
/// (`BTreeMap`) over `HashMap` inside key types.
pub trait Codec: Send + Sync + 'static {
    /// Encode a value to bytes.
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes into a value of type `T`.
    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode {
            type_name: std::any::type_name::<T>(),
            message: e.to_string(),
        })
    }

    fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| {
            let type_name = std::any::type_name::<T>();
            let message = e.to_string();
            match e.classify() {
                serde_json::error::Category::Data => CodecError::UnknownType { type_name, message },
                _ => CodecError::CorruptData { type_name, message },
            }
        })
    }
}
