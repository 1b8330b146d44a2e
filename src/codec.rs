//! Pluggable payload serialization.
//!
//! Argument tuples and return values travel through the harness as
//! opaque payload buffers. [`MessageCodec`] is the seam where the byte
//! format is chosen; [`JsonCodec`] is the shipped default and is what the
//! generated service stubs use unless told otherwise.
//!
//! # Example
//!
//! ```rust
//! use rockpool::{JsonCodec, MessageCodec};
//!
//! let codec = JsonCodec;
//! let payload = codec.encode(&("hello", 3u64)).expect("encode");
//! let (word, n): (String, u64) = codec.decode(&payload).expect("decode");
//! assert_eq!((word.as_str(), n), ("hello", 3));
//! ```

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Which half of a payload conversion failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecDirection {
    /// Turning a value into payload bytes.
    Encode,
    /// Turning payload bytes back into a value.
    Decode,
}

impl fmt::Display for CodecDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecDirection::Encode => f.write_str("encoding"),
            CodecDirection::Decode => f.write_str("decoding"),
        }
    }
}

/// A payload conversion failed.
///
/// Carries the failing direction plus the serializer's own description.
/// The description is what a caller eventually sees inside a `Failed`
/// response, so codecs should keep it human-readable.
#[derive(Debug, Clone, Error)]
#[error("{direction} failed: {detail}")]
pub struct CodecError {
    direction: CodecDirection,
    detail: String,
}

impl CodecError {
    /// An encoding failure wrapping the serializer's error.
    pub fn encode(cause: impl fmt::Display) -> Self {
        Self {
            direction: CodecDirection::Encode,
            detail: cause.to_string(),
        }
    }

    /// A decoding failure wrapping the serializer's error.
    pub fn decode(cause: impl fmt::Display) -> Self {
        Self {
            direction: CodecDirection::Decode,
            detail: cause.to_string(),
        }
    }

    /// Which half of the conversion failed.
    pub fn direction(&self) -> CodecDirection {
        self.direction
    }

    /// The serializer's description of what went wrong.
    pub fn detail(&self) -> &str {
        &self.detail
    }
}

/// Pluggable serialization format for call payloads.
///
/// The trait requires `Clone + 'static` so codec instances can be stored
/// in stubs and dispatch adapters. Types crossing the wire must
/// implement serde's `Serialize`/`DeserializeOwned`.
pub trait MessageCodec: Clone + 'static {
    /// Encode a value into a payload buffer.
    ///
    /// # Errors
    ///
    /// Fails with a [`CodecDirection::Encode`] error if the value cannot
    /// be serialized.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError>;

    /// Decode a payload buffer back into a value.
    ///
    /// # Errors
    ///
    /// Fails with a [`CodecDirection::Decode`] error if the buffer does
    /// not describe a `T`.
    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError>;
}

/// JSON codec using serde_json.
///
/// Human-readable, which makes failed-call descriptions and logs easy to
/// inspect while debugging a test. Not the most compact format, but the
/// harness never leaves the process so throughput is rarely the concern.
#[derive(Clone, Copy, Default, Debug)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes, CodecError> {
        match serde_json::to_vec(value) {
            Ok(buf) => Ok(Bytes::from(buf)),
            Err(cause) => Err(CodecError::encode(cause)),
        }
    }

    fn decode<T: DeserializeOwned>(&self, payload: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(payload).map_err(CodecError::decode)
    }
}
